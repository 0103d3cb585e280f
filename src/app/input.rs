use super::*;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

impl App {
    pub(super) fn handle_paste_event(&mut self, raw: &str) {
        if self.is_busy() {
            return;
        }
        let normalized = if raw.contains('\r') {
            raw.replace("\r\n", "\n").replace('\r', "\n")
        } else {
            raw.to_string()
        };
        if !normalized.is_empty() {
            self.insert_str(&normalized);
        }
    }

    pub(super) fn clear_input_buffer(&mut self) {
        self.input.clear();
        self.cursor = 0;
        self.slash_hint_idx = 0;
    }

    pub(super) fn slash_hints(&self) -> Vec<String> {
        if !self.input.starts_with('/') || self.input.contains('\n') {
            return Vec::new();
        }
        let query = self.input.trim_start();
        let mut matches: Vec<String> = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(query) && cmd.as_str() != query)
            .cloned()
            .collect();
        if matches.is_empty() && query == "/" {
            matches = self.commands.clone();
        }
        matches.into_iter().take(6).collect()
    }

    pub(super) fn apply_selected_hint(&mut self) -> bool {
        let hints = self.slash_hints();
        let idx = self.slash_hint_idx.min(hints.len().saturating_sub(1));
        let Some(selected) = hints.get(idx).cloned() else {
            return false;
        };
        self.input = selected;
        self.cursor = self.input.len();
        self.slash_hint_idx = 0;
        true
    }

    fn sync_hint_idx(&mut self) {
        let len = self.slash_hints().len();
        if len == 0 {
            self.slash_hint_idx = 0;
        } else if self.slash_hint_idx >= len {
            self.slash_hint_idx = len - 1;
        }
    }

    fn cycle_hint(&mut self, forward: bool) -> bool {
        let len = self.slash_hints().len();
        if len == 0 {
            return false;
        }
        self.slash_hint_idx = if forward {
            (self.slash_hint_idx + 1) % len
        } else {
            (self.slash_hint_idx + len - 1) % len
        };
        true
    }

    pub(super) fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let next = match self.history_pos {
            None => self.history.len().saturating_sub(1),
            Some(i) => i.saturating_sub(1),
        };
        self.history_pos = Some(next);
        self.input = self.history[next].clone();
        self.cursor = self.input.len();
    }

    pub(super) fn history_next(&mut self) {
        let Some(i) = self.history_pos else {
            return;
        };
        if i + 1 >= self.history.len() {
            self.history_pos = None;
            self.input.clear();
            self.cursor = 0;
            return;
        }
        self.history_pos = Some(i + 1);
        self.input = self.history[i + 1].clone();
        self.cursor = self.input.len();
    }

    pub(super) fn insert_char(&mut self, c: char) {
        if self.cursor >= self.input.len() {
            self.input.push(c);
        } else {
            self.input.insert(self.cursor, c);
        }
        self.cursor += c.len_utf8();
    }

    pub(super) fn insert_str(&mut self, s: &str) {
        for c in s.chars() {
            self.insert_char(c);
        }
        if self.input.starts_with('/') {
            self.slash_hint_idx = 0;
            self.sync_hint_idx();
        }
    }

    pub(super) fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        if let Some((prev_idx, _)) = self.input[..self.cursor].char_indices().last() {
            self.input.drain(prev_idx..self.cursor);
            self.cursor = prev_idx;
        }
    }

    pub(super) fn backspace_word(&mut self) {
        while self.cursor > 0 && self.input[..self.cursor].ends_with(' ') {
            self.backspace();
        }
        while self.cursor > 0 && !self.input[..self.cursor].ends_with(' ') {
            self.backspace();
        }
    }

    pub(super) fn delete(&mut self) {
        if let Some(ch) = self.input[self.cursor..].chars().next() {
            let end = self.cursor + ch.len_utf8();
            self.input.drain(self.cursor..end);
        }
    }

    pub(super) fn move_left(&mut self) {
        if let Some((prev_idx, _)) = self.input[..self.cursor].char_indices().last() {
            self.cursor = prev_idx;
        }
    }

    pub(super) fn move_right(&mut self) {
        if let Some(ch) = self.input[self.cursor..].chars().next() {
            self.cursor += ch.len_utf8();
        }
    }

    /// Move focus to the next agent section of the latest reply.
    pub(super) fn cycle_section_focus(&mut self) {
        let keys = self
            .conversation
            .latest_reply()
            .map(|reply| reply.tree().agent_keys())
            .unwrap_or_default();
        if keys.is_empty() {
            self.focus = None;
            self.last_status = "no agent sections".to_string();
            return;
        }
        let next = match self.focus.and_then(|f| keys.iter().position(|k| *k == f)) {
            Some(pos) => keys[(pos + 1) % keys.len()],
            None => keys[0],
        };
        self.focus = Some(next);
        self.last_status = format!("section: {}", next.display_name());
        self.invalidate_render_cache();
    }

    pub(super) fn toggle_focused_section(&mut self) {
        if self.focus.is_none() {
            self.cycle_section_focus();
        }
        let Some(agent) = self.focus else {
            return;
        };
        self.toggle_section(agent);
    }

    pub(super) fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => {
                    self.should_quit = true;
                    return;
                }
                KeyCode::Char('t') => {
                    self.cycle_section_focus();
                    return;
                }
                KeyCode::Char('o') => {
                    self.toggle_focused_section();
                    return;
                }
                _ => {}
            }
        }

        match key.code {
            KeyCode::PageUp => {
                self.scroll_up(5);
                return;
            }
            KeyCode::PageDown => {
                self.scroll_down(5);
                return;
            }
            KeyCode::Esc => {
                if !self.conversation.dismiss_notice() {
                    self.focus = None;
                }
                self.invalidate_render_cache();
                return;
            }
            _ => {}
        }

        // The compose panel is read-only while a reply is pending.
        if self.is_busy() {
            return;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('a') => self.cursor = 0,
                KeyCode::Char('e') => self.cursor = self.input.len(),
                KeyCode::Char('j') => self.insert_char('\n'),
                KeyCode::Char('p') => self.history_prev(),
                KeyCode::Char('n') => self.history_next(),
                KeyCode::Char('w') => self.backspace_word(),
                KeyCode::Char('u') => self.clear_input_buffer(),
                _ => {}
            }
            return;
        }

        if key.modifiers.contains(KeyModifiers::ALT) && matches!(key.code, KeyCode::Backspace) {
            self.backspace_word();
            return;
        }

        match key.code {
            KeyCode::Up => {
                let hints = self.slash_hints();
                if !hints.is_empty() {
                    self.cycle_hint(false);
                    return;
                }
                self.history_prev();
            }
            KeyCode::Down => {
                if self.cycle_hint(true) {
                    return;
                }
                self.history_next();
            }
            KeyCode::Tab => {
                self.cycle_hint(true);
            }
            KeyCode::BackTab => {
                self.cycle_hint(false);
            }
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char('\n');
                    return;
                }
                if self.slash_hints().len() > 1 && self.apply_selected_hint() {
                    return;
                }
                self.submit_current_line();
            }
            KeyCode::Backspace => {
                self.backspace();
                self.sync_hint_idx();
            }
            KeyCode::Delete => {
                self.delete();
                self.sync_hint_idx();
            }
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.input.len(),
            KeyCode::Char(c) => {
                self.insert_char(c);
                if self.input.starts_with('/') {
                    self.slash_hint_idx = 0;
                    self.sync_hint_idx();
                }
            }
            _ => {}
        }
    }
}
