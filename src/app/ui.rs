use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, Padding, Paragraph, Wrap};
use ratatui::Frame;
use unicode_width::UnicodeWidthStr;

use super::{App, ThemePalette};
use crate::{input_cursor_position, truncate};

const PANEL_PADDING_X: u16 = 1;
const PANEL_PADDING_Y: u16 = 0;
const PANEL_HORIZONTAL_INSET: u16 = 2 + PANEL_PADDING_X * 2;
const PANEL_VERTICAL_INSET: u16 = 2 + PANEL_PADDING_Y * 2;
const PROMPT_PREFIX: &str = "> ";
const NOTICE_MAX_WIDTH: u16 = 64;

// Breathing intensity (8 frames, cycling for ~1s period at 120ms tick).
const BREATH_SCALE_PCT: [u16; 8] = [58, 70, 82, 94, 108, 94, 82, 70];

pub(super) struct Regions {
    pub(super) transcript: Rect,
    pub(super) typing: Option<Rect>,
    pub(super) compose: Rect,
    pub(super) hints: Option<Rect>,
    pub(super) status: Rect,
}

/// Content area of a panel drawn with `panel_block`.
pub(super) fn inner(area: Rect) -> Rect {
    Rect::new(
        area.x + 1 + PANEL_PADDING_X,
        area.y + 1 + PANEL_PADDING_Y,
        area.width.saturating_sub(PANEL_HORIZONTAL_INSET),
        area.height.saturating_sub(PANEL_VERTICAL_INSET),
    )
}

pub(super) fn split_regions(app: &App, frame_area: Rect) -> Regions {
    let prompt_width = UnicodeWidthStr::width(PROMPT_PREFIX) as u16;
    let composer_width = frame_area.width.saturating_sub(PANEL_HORIZONTAL_INSET).max(1);

    let typing_h: u16 = if app.conversation.is_typing() { 1 } else { 0 };
    let hints_h = if app.slash_hints().is_empty() {
        0
    } else {
        1u16.saturating_add(PANEL_VERTICAL_INSET)
    };
    let status_h: u16 = 1;
    let fixed_rows = typing_h + hints_h + status_h;
    let max_input_height = frame_area
        .height
        .saturating_sub(fixed_rows)
        .saturating_sub(PANEL_VERTICAL_INSET + 1)
        .max(3);
    let input_height = app
        .input_height(composer_width, prompt_width)
        .saturating_add(PANEL_VERTICAL_INSET)
        .min(max_input_height);

    let mut constraints = vec![Constraint::Min(PANEL_VERTICAL_INSET + 1)];
    if typing_h > 0 {
        constraints.push(Constraint::Length(typing_h));
    }
    constraints.push(Constraint::Length(input_height));
    if hints_h > 0 {
        constraints.push(Constraint::Length(hints_h));
    }
    constraints.push(Constraint::Length(status_h));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame_area);

    let mut idx = 0usize;
    let mut next = || {
        let c = chunks[idx];
        idx += 1;
        c
    };
    let transcript = next();
    let typing = (typing_h > 0).then(&mut next);
    let compose = next();
    let hints = (hints_h > 0).then(&mut next);
    let status = next();
    Regions {
        transcript,
        typing,
        compose,
        hints,
        status,
    }
}

pub(super) fn draw(f: &mut Frame, app: &App) {
    let theme = app.theme_palette();
    let regions = split_regions(app, f.area());

    let transcript = Paragraph::new(Text::from(app.cached_transcript_lines().to_vec()))
        .style(theme.panel_surface_style())
        .block(panel_block(theme, "chat"))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    f.render_widget(transcript, regions.transcript);

    if let Some(area) = regions.typing {
        f.render_widget(Paragraph::new(build_typing_line(app, theme)), area);
    }

    let compose_title = compose_title(app);
    let input = Paragraph::new(Text::from(build_input_lines(app, theme)))
        .style(theme.input_surface_style())
        .block(panel_block(theme, &compose_title))
        .wrap(Wrap { trim: false });
    f.render_widget(input, regions.compose);

    if let Some(area) = regions.hints {
        let hint_panel = Paragraph::new(Text::from(vec![build_hint_line(app, theme)]))
            .style(theme.panel_surface_style())
            .block(panel_block(theme, "suggestions"));
        f.render_widget(hint_panel, area);
    }

    if !app.is_busy() {
        let prompt_width = UnicodeWidthStr::width(PROMPT_PREFIX) as u16;
        let content = inner(regions.compose);
        let content_width = content.width.max(1);
        let content_height = content.height.max(1);
        let (cx, cy) = input_cursor_position(&app.input, app.cursor, content_width, prompt_width);
        let cursor_x = content.x + cx.min(content_width.saturating_sub(1));
        let cursor_y = content.y + cy.min(content_height.saturating_sub(1));
        f.set_cursor_position((cursor_x, cursor_y));
    }

    let status = Paragraph::new(format!(
        " {} | {} | theme {} | Ctrl+T section | Ctrl+O fold | PgUp/PgDn scroll | Ctrl+C exit",
        app.backend_status,
        truncate(&app.last_status, 40),
        app.theme.as_str(),
    ))
    .style(theme.status_style());
    f.render_widget(status, regions.status);

    if let Some(notice) = app.conversation.notice() {
        draw_notice(f, regions.transcript, &notice.text, theme);
    }
}

fn compose_title(app: &App) -> String {
    let mut title = if app.is_busy() {
        "compose (waiting for reply)".to_string()
    } else {
        "compose".to_string()
    };
    if let Some(name) = app.conversation.context_file() {
        title.push_str(&format!(" · 📎 {}", truncate(name, 32)));
    }
    title
}

fn panel_block(theme: ThemePalette, title: &str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(theme.panel_border_style())
        .title(Span::styled(format!(" {} ", title), theme.title_style()))
        .padding(Padding::new(
            PANEL_PADDING_X,
            PANEL_PADDING_X,
            PANEL_PADDING_Y,
            PANEL_PADDING_Y,
        ))
        .style(theme.panel_surface_style())
}

fn build_input_lines(app: &App, theme: ThemePalette) -> Vec<Line<'static>> {
    let prompt_style = theme.prompt_style();
    if app.input.is_empty() {
        let placeholder = if app.is_busy() {
            "Waiting for the assistant..."
        } else {
            "Ask about your code. Enter send, Shift+Enter newline"
        };
        return vec![Line::from(vec![
            Span::styled(PROMPT_PREFIX.to_string(), prompt_style),
            Span::styled(placeholder, theme.muted_style()),
        ])];
    }

    let text_style = if app.is_busy() {
        theme.muted_style()
    } else {
        Style::default().fg(theme.input_text)
    };
    let indent = " ".repeat(PROMPT_PREFIX.chars().count());
    app.input
        .split('\n')
        .enumerate()
        .map(|(idx, part)| {
            let lead = if idx == 0 {
                PROMPT_PREFIX.to_string()
            } else {
                indent.clone()
            };
            Line::from(vec![
                Span::styled(lead, prompt_style),
                Span::styled(part.to_string(), text_style),
            ])
        })
        .collect()
}

fn build_hint_line(app: &App, theme: ThemePalette) -> Line<'static> {
    let hints = app.slash_hints();
    if hints.is_empty() {
        return Line::from(" ");
    }

    let mut spans = vec![Span::styled(
        " slash suggestions (Tab cycle): ",
        theme.muted_style(),
    )];
    let selected = app.slash_hint_idx.min(hints.len().saturating_sub(1));
    for (i, hint) in hints.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("  "));
        }
        let style = if i == selected {
            theme.hint_selected_style()
        } else {
            theme.muted_style()
        };
        spans.push(Span::styled(hint.clone(), style));
    }
    Line::from(spans)
}

fn scale_rgb(value: u8, pct: u16) -> u8 {
    ((value as u16 * pct) / 100).min(255) as u8
}

fn color_with_breath(base: Color, frame: usize) -> Color {
    let pct = BREATH_SCALE_PCT[frame % BREATH_SCALE_PCT.len()];
    match base {
        Color::Rgb(r, g, b) => Color::Rgb(scale_rgb(r, pct), scale_rgb(g, pct), scale_rgb(b, pct)),
        _ => base,
    }
}

fn build_typing_line(app: &App, theme: ThemePalette) -> Line<'static> {
    let dot = color_with_breath(theme.bot_label, app.spinner_idx);
    Line::from(vec![
        Span::styled(
            " \u{25cf} ",
            Style::default().fg(dot).add_modifier(Modifier::BOLD),
        ),
        Span::styled("assistant is typing...", theme.muted_style()),
    ])
}

fn draw_notice(f: &mut Frame, area: Rect, text: &str, theme: ThemePalette) {
    let width = (UnicodeWidthStr::width(text) as u16 + PANEL_HORIZONTAL_INSET)
        .min(NOTICE_MAX_WIDTH)
        .min(area.width.saturating_sub(2));
    if width <= PANEL_HORIZONTAL_INSET {
        return;
    }
    let measured = Paragraph::new(text.to_string()).wrap(Wrap { trim: false });
    let text_rows = measured.line_count(width - PANEL_HORIZONTAL_INSET) as u16;
    let height = (text_rows + PANEL_VERTICAL_INSET).min(area.height.saturating_sub(1));
    let rect = Rect::new(
        area.x + area.width.saturating_sub(width + 1),
        area.y + 1,
        width,
        height,
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.error_label))
        .title(Span::styled(
            " error ",
            Style::default()
                .fg(theme.error_label)
                .add_modifier(Modifier::BOLD),
        ))
        .padding(Padding::new(PANEL_PADDING_X, PANEL_PADDING_X, 0, 0))
        .style(theme.panel_surface_style());
    f.render_widget(Clear, rect);
    f.render_widget(
        Paragraph::new(text.to_string())
            .style(theme.error_style())
            .block(block)
            .wrap(Wrap { trim: false }),
        rect,
    );
}
