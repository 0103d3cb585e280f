use std::io::Stdout;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event, KeyEventKind, MouseEventKind};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Paragraph, Wrap};
use ratatui::Terminal;
use tracing::{debug, info, warn};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::Config;
use crate::relay::{Transport, GREETING};
use crate::transcript::{AgentId, Conversation, RelayMessage};
use crate::{input_cursor_position, truncate};

const ASSISTANT_DIVIDER: char = '│';
const BOT_LABEL: &str = "bot";

mod commands;
mod input;
mod render;
mod runtime;
#[cfg(test)]
mod tests;
mod text;
mod types;
mod ui;
mod worker;

pub(crate) use runtime::run_app;
#[cfg(test)]
use runtime::flatten_lines_to_plain;
#[cfg(test)]
use text::sanitize_runtime_text;
use text::RuntimeTextFilter;
pub(crate) use types::{ThemePalette, ThemePreset, WorkerEvent};

/// Cached rendering state to avoid recomputing transcript lines and scroll bounds every frame.
struct RenderCache {
    /// Generation counter at the time of last cache build.
    generation: u64,
    width: u16,
    height: u16,
    lines: Vec<Line<'static>>,
    scroll_max: u16,
}

impl RenderCache {
    fn new() -> Self {
        Self {
            generation: u64::MAX, // force first rebuild
            width: 0,
            height: 0,
            lines: Vec::new(),
            scroll_max: 0,
        }
    }
}

struct App {
    should_quit: bool,
    spinner_idx: usize,

    input: String,
    cursor: usize,
    history: Vec<String>,
    history_pos: Option<usize>,
    commands: Vec<String>,
    slash_hint_idx: usize,

    conversation: Conversation,
    transport: Transport,
    tx: Sender<WorkerEvent>,
    rx: Receiver<WorkerEvent>,
    /// Content of the attached context file, sent with every request.
    context_code: String,
    /// Agent section of the latest reply that Ctrl+O acts on.
    focus: Option<AgentId>,
    /// OSC 52 sequence waiting to be written to the terminal.
    pending_clipboard: Option<String>,
    /// Escape-sequence state of the reply being streamed.
    chunk_filter: RuntimeTextFilter,

    scroll: u16,
    autoscroll: bool,
    viewport_width: u16,
    viewport_height: u16,
    theme: ThemePreset,
    backend_status: String,
    last_status: String,

    /// Monotonically increasing counter bumped whenever the transcript changes.
    render_generation: u64,
    render_cache: RenderCache,
}

impl App {
    fn new(config: &Config, transport: Transport) -> Self {
        let (tx, rx) = unbounded();
        let mut app = Self {
            should_quit: false,
            spinner_idx: 0,
            input: String::new(),
            cursor: 0,
            history: Vec::new(),
            history_pos: None,
            commands: default_commands(),
            slash_hint_idx: 0,
            conversation: Conversation::new(),
            transport,
            tx,
            rx,
            context_code: String::new(),
            focus: None,
            pending_clipboard: None,
            chunk_filter: RuntimeTextFilter::default(),
            scroll: 0,
            autoscroll: true,
            viewport_width: 120,
            viewport_height: 36,
            theme: config.theme,
            backend_status: "backend: checking".to_string(),
            last_status: "ready".to_string(),
            render_generation: 0,
            render_cache: RenderCache::new(),
        };
        app.show_startup_banner(config);
        app
    }

    /// Kick off the start-up health check and the host greeting.
    fn start_background(&mut self, config: &Config) {
        self.transport.spawn_health_check(self.tx.clone());
        if config.greeting {
            let _ = self.tx.send(WorkerEvent::Relay(RelayMessage::BotMessage {
                text: GREETING.to_string(),
            }));
        }
    }

    /// Bump the render generation to invalidate the render cache.
    fn invalidate_render_cache(&mut self) {
        self.render_generation = self.render_generation.wrapping_add(1);
    }

    pub(super) fn theme_palette(&self) -> ThemePalette {
        self.theme.palette()
    }

    fn is_busy(&self) -> bool {
        self.conversation.is_busy()
    }

    fn push_system(&mut self, text: impl Into<String>) {
        self.conversation.push_system(text);
        self.follow_scroll();
    }

    /// Invalidate render cache and update scroll to follow content.
    fn follow_scroll(&mut self) {
        self.invalidate_render_cache();
        if self.autoscroll {
            self.scroll = self.scroll_max();
        } else {
            self.scroll = self.scroll.min(self.scroll_max());
        }
    }

    fn transcript_area(&self) -> Rect {
        let frame = Rect::new(0, 0, self.viewport_width.max(1), self.viewport_height.max(1));
        ui::inner(ui::split_regions(self, frame).transcript)
    }

    /// Ensure the render cache is up-to-date for the current state.
    /// Returns true if the cache was rebuilt.
    fn ensure_render_cache(&mut self) -> bool {
        let need_rebuild = self.render_cache.generation != self.render_generation
            || self.render_cache.width != self.viewport_width
            || self.render_cache.height != self.viewport_height;
        if !need_rebuild {
            return false;
        }

        let area = self.transcript_area();
        let w = area.width.max(1);
        let lines = self.render_transcript_lines(w);
        let paragraph = Paragraph::new(Text::from(lines.clone())).wrap(Wrap { trim: false });
        let rendered_line_count = paragraph.line_count(w).min(u16::MAX as usize) as u16;
        let scroll_max = rendered_line_count.saturating_sub(area.height);

        self.render_cache = RenderCache {
            generation: self.render_generation,
            width: self.viewport_width,
            height: self.viewport_height,
            lines,
            scroll_max,
        };
        true
    }

    fn scroll_max(&mut self) -> u16 {
        self.ensure_render_cache();
        self.render_cache.scroll_max
    }

    pub(super) fn cached_transcript_lines(&self) -> &[Line<'static>] {
        &self.render_cache.lines
    }

    fn update_viewport(&mut self, width: u16, height: u16) {
        self.viewport_width = width.max(1);
        self.viewport_height = height.max(1);
        let max_scroll = self.scroll_max();
        if self.autoscroll {
            self.scroll = max_scroll;
        } else {
            self.scroll = self.scroll.min(max_scroll);
        }
    }

    fn scroll_up(&mut self, n: u16) {
        let from = if self.autoscroll {
            self.scroll_max()
        } else {
            self.scroll
        };
        self.autoscroll = false;
        self.scroll = from.saturating_sub(n);
    }

    fn scroll_down(&mut self, n: u16) {
        let max_scroll = self.scroll_max();
        self.scroll = self.scroll.saturating_add(n).min(max_scroll);
        if self.scroll >= max_scroll {
            self.autoscroll = true;
        }
    }

    fn input_height(&self, width: u16, prompt_width: u16) -> u16 {
        if self.input.is_empty() {
            return 1;
        }
        let (_, end_y) = input_cursor_position(&self.input, self.input.len(), width, prompt_width);
        end_y.saturating_add(1).max(1)
    }

    fn show_startup_banner(&mut self, config: &Config) {
        let source = match &config.replay {
            Some(path) => format!("replay: {}", path.display()),
            None => format!("backend: {}", config.backend_url),
        };
        self.conversation.push_system(format!(
            "localchat {} | {} | theme: {}\nkeys: Enter send | Shift+Enter newline | Ctrl+T section | Ctrl+O fold | /help",
            env!("CARGO_PKG_VERSION"),
            source,
            self.theme.as_str()
        ));
        self.invalidate_render_cache();
    }
}

fn default_commands() -> Vec<String> {
    [
        "/help",
        "/clear",
        "/context ",
        "/context clear",
        "/toggle ",
        "/collapse all",
        "/expand all",
        "/copy ",
        "/theme graphite",
        "/theme fjord",
        "/theme ember",
        "/exit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
