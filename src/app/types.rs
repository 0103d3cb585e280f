use ratatui::style::{Color, Modifier, Style};

use crate::relay::BackendStatus;
use crate::transcript::{AgentId, RelayMessage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ThemePreset {
    Graphite,
    Fjord,
    Ember,
}

impl ThemePreset {
    pub(crate) fn all() -> [ThemePreset; 3] {
        [ThemePreset::Graphite, ThemePreset::Fjord, ThemePreset::Ember]
    }

    pub(crate) fn names() -> Vec<&'static str> {
        Self::all().iter().map(|t| t.as_str()).collect()
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            ThemePreset::Graphite => "graphite",
            ThemePreset::Fjord => "fjord",
            ThemePreset::Ember => "ember",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "graphite" | "slate" | "gray" => Some(ThemePreset::Graphite),
            "fjord" | "nord" | "blue" => Some(ThemePreset::Fjord),
            "ember" | "warm" | "copper" => Some(ThemePreset::Ember),
            _ => None,
        }
    }

    pub(crate) fn next(self) -> Self {
        match self {
            ThemePreset::Graphite => ThemePreset::Fjord,
            ThemePreset::Fjord => ThemePreset::Ember,
            ThemePreset::Ember => ThemePreset::Graphite,
        }
    }

    pub(crate) fn palette(self) -> ThemePalette {
        match self {
            ThemePreset::Graphite => ThemePalette {
                prompt: Color::Rgb(192, 192, 192),
                input_text: Color::Rgb(224, 224, 224),
                muted_text: Color::Rgb(128, 128, 128),
                highlight_fg: Color::Rgb(255, 255, 255),
                highlight_bg: Color::Rgb(64, 64, 64),
                status_text: Color::Rgb(140, 140, 140),
                user_fg: Color::Rgb(255, 255, 255),
                user_bg: Color::Rgb(38, 38, 38),
                bot_label: Color::Rgb(255, 127, 80),
                assistant_text: Color::Rgb(210, 210, 210),
                system_text: Color::Rgb(160, 160, 160),
                error_label: Color::Rgb(220, 100, 100),
                error_text: Color::Rgb(230, 120, 120),
                banner_title: Color::Rgb(200, 200, 200),
                panel_bg: Color::Rgb(10, 10, 10),
                panel_fg: Color::Rgb(210, 210, 210),
                code_fg: Color::Rgb(220, 220, 220),
                code_bg: Color::Rgb(24, 24, 24),
                inline_code_fg: Color::Rgb(190, 190, 190),
                inline_code_bg: Color::Rgb(34, 34, 34),
                bullet: Color::Rgb(150, 150, 150),
                reasoner: Color::Rgb(186, 140, 255),
                planner: Color::Rgb(97, 175, 239),
                generation: Color::Rgb(152, 195, 121),
                reviewer: Color::Rgb(229, 192, 123),
            },
            ThemePreset::Fjord => ThemePalette {
                prompt: Color::Rgb(100, 150, 200),
                input_text: Color::Rgb(180, 200, 220),
                muted_text: Color::Rgb(80, 100, 120),
                highlight_fg: Color::Rgb(200, 220, 240),
                highlight_bg: Color::Rgb(40, 60, 80),
                status_text: Color::Rgb(90, 110, 130),
                user_fg: Color::Rgb(200, 220, 240),
                user_bg: Color::Rgb(25, 35, 45),
                bot_label: Color::Rgb(136, 192, 208),
                assistant_text: Color::Rgb(170, 190, 210),
                system_text: Color::Rgb(100, 120, 140),
                error_label: Color::Rgb(220, 100, 100),
                error_text: Color::Rgb(230, 120, 120),
                banner_title: Color::Rgb(150, 170, 190),
                panel_bg: Color::Rgb(10, 20, 30),
                panel_fg: Color::Rgb(170, 190, 210),
                code_fg: Color::Rgb(180, 200, 220),
                code_bg: Color::Rgb(5, 15, 25),
                inline_code_fg: Color::Rgb(160, 180, 200),
                inline_code_bg: Color::Rgb(20, 30, 40),
                bullet: Color::Rgb(110, 130, 150),
                reasoner: Color::Rgb(180, 142, 173),
                planner: Color::Rgb(129, 161, 193),
                generation: Color::Rgb(163, 190, 140),
                reviewer: Color::Rgb(235, 203, 139),
            },
            ThemePreset::Ember => ThemePalette {
                prompt: Color::Rgb(204, 204, 204),
                input_text: Color::Rgb(238, 238, 238),
                muted_text: Color::Rgb(153, 153, 153),
                highlight_fg: Color::Rgb(255, 255, 255),
                highlight_bg: Color::Rgb(90, 50, 30),
                status_text: Color::Rgb(170, 170, 170),
                user_fg: Color::Rgb(255, 240, 225),
                user_bg: Color::Rgb(48, 28, 20),
                bot_label: Color::Rgb(255, 160, 90),
                assistant_text: Color::Rgb(220, 220, 220),
                system_text: Color::Rgb(170, 170, 170),
                error_label: Color::Rgb(220, 100, 100),
                error_text: Color::Rgb(230, 120, 120),
                banner_title: Color::Rgb(230, 190, 150),
                panel_bg: Color::Rgb(14, 10, 8),
                panel_fg: Color::Rgb(220, 220, 220),
                code_fg: Color::Rgb(230, 230, 230),
                code_bg: Color::Rgb(26, 18, 14),
                inline_code_fg: Color::Rgb(240, 200, 160),
                inline_code_bg: Color::Rgb(36, 24, 18),
                bullet: Color::Rgb(200, 140, 90),
                reasoner: Color::Rgb(235, 130, 130),
                planner: Color::Rgb(240, 170, 100),
                generation: Color::Rgb(200, 200, 120),
                reviewer: Color::Rgb(150, 200, 180),
            },
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct ThemePalette {
    pub(crate) prompt: Color,
    pub(crate) input_text: Color,
    pub(crate) muted_text: Color,
    pub(crate) highlight_fg: Color,
    pub(crate) highlight_bg: Color,
    pub(crate) status_text: Color,
    pub(crate) user_fg: Color,
    pub(crate) user_bg: Color,
    pub(crate) bot_label: Color,
    pub(crate) assistant_text: Color,
    pub(crate) system_text: Color,
    pub(crate) error_label: Color,
    pub(crate) error_text: Color,
    pub(crate) banner_title: Color,
    pub(crate) panel_bg: Color,
    pub(crate) panel_fg: Color,
    pub(crate) code_fg: Color,
    pub(crate) code_bg: Color,
    pub(crate) inline_code_fg: Color,
    pub(crate) inline_code_bg: Color,
    pub(crate) bullet: Color,
    pub(crate) reasoner: Color,
    pub(crate) planner: Color,
    pub(crate) generation: Color,
    pub(crate) reviewer: Color,
}

impl ThemePalette {
    pub(crate) fn agent_color(self, agent: AgentId) -> Color {
        match agent {
            AgentId::Reasoner => self.reasoner,
            AgentId::Planner => self.planner,
            AgentId::Generation => self.generation,
            AgentId::Reviewer => self.reviewer,
        }
    }

    pub(crate) fn prompt_style(self) -> Style {
        Style::default()
            .fg(self.prompt)
            .add_modifier(Modifier::BOLD)
    }

    pub(crate) fn title_style(self) -> Style {
        Style::default()
            .fg(self.banner_title)
            .add_modifier(Modifier::BOLD)
    }

    pub(crate) fn body_style(self) -> Style {
        Style::default().fg(self.assistant_text)
    }

    pub(crate) fn secondary_style(self) -> Style {
        Style::default().fg(self.system_text)
    }

    pub(crate) fn muted_style(self) -> Style {
        Style::default().fg(self.muted_text)
    }

    pub(crate) fn status_style(self) -> Style {
        Style::default().fg(self.status_text)
    }

    pub(crate) fn error_style(self) -> Style {
        Style::default().fg(self.error_text)
    }

    pub(crate) fn panel_surface_style(self) -> Style {
        Style::default().bg(self.panel_bg).fg(self.panel_fg)
    }

    pub(crate) fn panel_border_style(self) -> Style {
        Style::default().fg(self.highlight_bg)
    }

    pub(crate) fn input_surface_style(self) -> Style {
        Style::default().fg(self.input_text)
    }

    pub(crate) fn hint_selected_style(self) -> Style {
        Style::default()
            .fg(self.highlight_fg)
            .bg(self.highlight_bg)
            .add_modifier(Modifier::BOLD)
    }
}

#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Relay(RelayMessage),
    Health(Result<BackendStatus, String>),
    ContextLoaded {
        name: String,
        result: Result<String, String>,
    },
}
