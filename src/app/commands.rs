use super::*;
use base64::Engine;
use std::path::Path;

use crate::transcript::SubmitRejected;

const HELP_TEXT: &str = "commands:
  /help                       show this help
  /clear                      clear the transcript
  /theme [graphite|fjord|ember]
  /context <path> | clear     attach a file as context for following requests
  /toggle [agent]             fold or unfold an agent section of the latest reply
  /collapse [agent|all]       fold sections (default all)
  /expand [agent|all]         unfold sections (default all)
  /copy <n>                   copy code block n of the latest finished reply
  /exit | /quit
agents: reasoner, planner, generation, reviewer";

/// Which sections a fold command targets.
enum SectionTarget {
    All,
    One(AgentId),
}

fn parse_section_target(arg: &str) -> Result<SectionTarget, String> {
    let arg = arg.trim();
    if arg.is_empty() || arg.eq_ignore_ascii_case("all") {
        return Ok(SectionTarget::All);
    }
    AgentId::parse(arg)
        .map(SectionTarget::One)
        .ok_or_else(|| unknown_agent(arg))
}

fn unknown_agent(arg: &str) -> String {
    let names: Vec<&str> = AgentId::all().iter().map(|a| a.as_str()).collect();
    format!("unknown agent '{arg}' ({})", names.join(", "))
}

/// OSC 52 clipboard write; the terminal forwards it to the system clipboard.
pub(super) fn osc52_sequence(text: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
    format!("\u{1b}]52;c;{encoded}\u{7}")
}

impl App {
    pub(super) fn submit_current_line(&mut self) {
        let typed_line = self.input.trim().to_string();
        if typed_line.is_empty() {
            return;
        }

        if typed_line.starts_with('/') {
            self.history.push(typed_line.clone());
            self.history_pos = None;
            self.clear_input_buffer();
            self.run_command(&typed_line);
            return;
        }

        match self.conversation.submit(&self.input) {
            Ok(text) => {
                self.history.push(typed_line);
                self.history_pos = None;
                self.clear_input_buffer();
                info!(chars = text.len(), context = !self.context_code.is_empty(), "submitting");
                self.transport
                    .submit(text, self.context_code.clone(), self.tx.clone());
                self.autoscroll = true;
                self.last_status = "sending".to_string();
                self.follow_scroll();
            }
            Err(SubmitRejected::Busy) => {
                self.last_status = "waiting for the current reply".to_string();
            }
            Err(SubmitRejected::Empty) => {}
        }
    }

    fn run_command(&mut self, line: &str) {
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (line, ""),
        };
        debug!(cmd, "slash command");
        match cmd {
            "/exit" | "/quit" => self.should_quit = true,
            "/help" => self.push_system(HELP_TEXT),
            "/clear" => self.handle_clear(),
            "/theme" => self.handle_theme_change(arg),
            "/context" => self.handle_context_command(arg),
            "/toggle" => self.handle_toggle_command(arg),
            "/collapse" => self.handle_fold_command(arg, true),
            "/expand" => self.handle_fold_command(arg, false),
            "/copy" => self.handle_copy_command(arg),
            other => self.push_system(format!("unknown command: {other} (try /help)")),
        }
    }

    fn handle_clear(&mut self) {
        if !self.conversation.clear() {
            self.push_system("cannot clear while a reply is streaming");
            return;
        }
        self.focus = None;
        self.scroll = 0;
        self.autoscroll = true;
        self.last_status = "cleared".to_string();
        self.follow_scroll();
    }

    pub(super) fn handle_theme_change(&mut self, arg: &str) {
        let next = if arg.is_empty() {
            Some(self.theme.next())
        } else {
            ThemePreset::parse(arg)
        };
        match next {
            Some(theme) => {
                self.theme = theme;
                self.last_status = format!("theme: {}", theme.as_str());
                self.invalidate_render_cache();
            }
            None => self.push_system(format!(
                "unknown theme '{arg}' (expected one of: {})",
                ThemePreset::names().join(", ")
            )),
        }
    }

    fn handle_context_command(&mut self, arg: &str) {
        if arg.is_empty() {
            let msg = match self.conversation.context_file() {
                Some(name) => format!("context: {name} ({} chars)", self.context_code.len()),
                None => "context: none (use /context <path>)".to_string(),
            };
            self.push_system(msg);
            return;
        }
        if arg == "clear" {
            self.context_code.clear();
            self.conversation.handle(
                RelayMessage::ContextUpdate {
                    text: String::new(),
                },
                Instant::now(),
            );
            self.last_status = "context cleared".to_string();
            self.invalidate_render_cache();
            return;
        }

        match std::fs::read_to_string(arg) {
            Ok(content) => {
                let name = Path::new(arg)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| arg.to_string());
                self.attach_context(name, content);
            }
            Err(err) => {
                debug!(path = arg, error = %err, "context file not readable locally");
                if self
                    .transport
                    .spawn_context_fetch(arg.to_string(), self.tx.clone())
                {
                    self.last_status = format!("fetching {} from backend", truncate(arg, 32));
                } else {
                    self.push_system(format!("context: cannot read {arg}: {err}"));
                }
            }
        }
    }

    pub(super) fn attach_context(&mut self, name: String, content: String) {
        info!(file = %name, chars = content.len(), "context attached");
        self.context_code = content;
        self.conversation
            .handle(RelayMessage::ContextUpdate { text: name.clone() }, Instant::now());
        self.last_status = format!("context: {}", truncate(&name, 32));
        self.invalidate_render_cache();
    }

    pub(super) fn toggle_section(&mut self, agent: AgentId) {
        let toggled = self
            .conversation
            .latest_reply_mut()
            .and_then(|reply| reply.tree_mut().toggle(agent));
        match toggled {
            Some(collapsed) => {
                let verb = if collapsed { "folded" } else { "unfolded" };
                self.last_status = format!("{verb} {}", agent.display_name());
                self.follow_scroll();
            }
            None => {
                self.last_status = format!("no {} section", agent.display_name());
            }
        }
    }

    fn handle_toggle_command(&mut self, arg: &str) {
        if arg.is_empty() {
            self.toggle_focused_section();
            return;
        }
        match AgentId::parse(arg) {
            Some(agent) => {
                self.focus = Some(agent);
                self.toggle_section(agent);
            }
            None => self.push_system(unknown_agent(arg)),
        }
    }

    fn handle_fold_command(&mut self, arg: &str, collapsed: bool) {
        let target = match parse_section_target(arg) {
            Ok(target) => target,
            Err(msg) => {
                self.push_system(msg);
                return;
            }
        };
        let Some(reply) = self.conversation.latest_reply_mut() else {
            self.last_status = "no reply yet".to_string();
            return;
        };
        let tree = reply.tree_mut();
        let changed = match target {
            SectionTarget::All => {
                let keys = tree.agent_keys();
                for agent in &keys {
                    tree.set_collapsed(*agent, collapsed);
                }
                keys.len()
            }
            SectionTarget::One(agent) => usize::from(tree.set_collapsed(agent, collapsed)),
        };
        let verb = if collapsed { "folded" } else { "unfolded" };
        self.last_status = format!("{verb} {changed} section(s)");
        self.follow_scroll();
    }

    fn handle_copy_command(&mut self, arg: &str) {
        let Ok(number) = arg.parse::<usize>() else {
            self.push_system("usage: /copy <n>");
            return;
        };
        let code = self.conversation.latest_final_reply().and_then(|reply| {
            reply
                .snippets()
                .iter()
                .find(|s| s.number == number)
                .map(|s| (s.code.clone(), s.lang.clone()))
        });
        match code {
            Some((code, lang)) => {
                self.pending_clipboard = Some(osc52_sequence(&code));
                self.last_status = if lang.is_empty() {
                    format!("copied code block {number}")
                } else {
                    format!("copied code block {number} ({lang})")
                };
            }
            None => self.push_system(format!("no code block {number} in the latest reply")),
        }
    }
}
