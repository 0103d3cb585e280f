use super::*;
use crate::transcript::{classify_lines, parse_inline, BlockRef, Inline, MdLine, Message, RenderMode, Reply};

const CHEVRON_EXPANDED: &str = "▾";
const CHEVRON_COLLAPSED: &str = "▸";
const AGENT_GUTTER: &str = "┃ ";

/// Block content that makes formatting fail, for exercising the fallback.
#[cfg(test)]
pub(super) const FORMAT_FAILURE_TRIGGER: &str = "@@format-failure@@";

type SpanLine = Vec<Span<'static>>;

fn push_system_lines(lines: &mut Vec<Line<'static>>, text: &str, style: Style) {
    let mut parts = text.split('\n');
    let first = parts.next().unwrap_or_default();
    let first_content = if first.is_empty() { " " } else { first };
    lines.push(Line::from(vec![Span::styled(
        format!("[sys] {first_content}"),
        style,
    )]));

    for part in parts {
        let content = if part.is_empty() { " " } else { part };
        lines.push(Line::from(vec![Span::styled(
            format!("      {content}"),
            style,
        )]));
    }
}

fn push_user_lines(lines: &mut Vec<Line<'static>>, text: &str, width: u16, palette: ThemePalette) {
    let w = width as usize;
    let user_style = Style::default()
        .fg(palette.user_fg)
        .bg(palette.user_bg)
        .add_modifier(Modifier::BOLD);
    for part in text.split('\n') {
        let content = if part.is_empty() { " " } else { part };
        let mut text = format!(" {} ", content);
        let text_w = UnicodeWidthStr::width(text.as_str());
        if text_w < w {
            text.push_str(&" ".repeat(w - text_w));
        }
        lines.push(Line::from(vec![Span::styled(text, user_style)]));
    }
}

impl App {
    pub(super) fn render_transcript_lines(&self, width: u16) -> Vec<Line<'static>> {
        let mut lines = Vec::<Line>::new();
        let palette = self.theme.palette();
        let messages = self.conversation.messages();
        let section_reply = self.conversation.section_reply_index();
        let copy_reply = self.conversation.latest_final_reply_index();

        for (idx, msg) in messages.iter().enumerate() {
            match msg {
                Message::User(text) => push_user_lines(&mut lines, text, width, palette),
                Message::System(text) => {
                    push_system_lines(&mut lines, text, palette.secondary_style())
                }
                Message::Bot(reply) => {
                    let focus = if section_reply == Some(idx) {
                        self.focus
                    } else {
                        None
                    };
                    let copy_labels = copy_reply == Some(idx);
                    let before = lines.len();
                    render_reply(&mut lines, reply, width, palette, focus, copy_labels);
                    if lines.len() == before {
                        continue;
                    }
                }
            }
            lines.push(Line::from(""));
        }

        lines
    }
}

/// Render one reply block by block behind a `bot │` label column.
/// `copy_labels` marks fences with their `/copy` numbers.
pub(super) fn render_reply(
    lines: &mut Vec<Line<'static>>,
    reply: &Reply,
    width: u16,
    palette: ThemePalette,
    focus: Option<AgentId>,
    copy_labels: bool,
) {
    let tree = reply.tree();
    if tree.is_empty() && !reply.is_aborted() {
        return;
    }

    let label_style = Style::default()
        .fg(palette.bot_label)
        .add_modifier(Modifier::BOLD);
    let label_sep = format!("{} {}", BOT_LABEL, ASSISTANT_DIVIDER);
    let indent_sep = format!("{}{}", " ".repeat(BOT_LABEL.len() + 1), ASSISTANT_DIVIDER);
    let label_col_width = BOT_LABEL.len() + 2;
    let content_width = (width as usize).saturating_sub(label_col_width + 1);

    let mut body: Vec<SpanLine> = Vec::new();
    let mut next_snippet = 0usize;
    let mode = tree.mode();
    let render = |text: &str, next_snippet: &mut usize| {
        render_block_text(text, mode, palette, copy_labels, next_snippet)
    };

    for block in tree.blocks() {
        match block {
            BlockRef::Plain(text) => {
                body.extend(render(text, &mut next_snippet));
            }
            BlockRef::Agent(agent) => {
                let color = palette.agent_color(agent.agent);
                let chevron = if agent.collapsed {
                    CHEVRON_COLLAPSED
                } else {
                    CHEVRON_EXPANDED
                };
                let mut header_style = Style::default().fg(color).add_modifier(Modifier::BOLD);
                if focus == Some(agent.agent) {
                    header_style = header_style.bg(palette.highlight_bg);
                }
                body.push(vec![Span::styled(
                    format!(
                        "{} {} {} Agent",
                        chevron,
                        agent.agent.icon(),
                        agent.agent.display_name()
                    ),
                    header_style,
                )]);

                // Collapsed sections still consume their fence numbers so
                // `/copy` numbering matches what an expanded view shows.
                let content = render(&agent.content, &mut next_snippet);
                if agent.collapsed {
                    continue;
                }
                let gutter = Span::styled(AGENT_GUTTER, Style::default().fg(color));
                for line in content {
                    let mut spans = vec![gutter.clone()];
                    spans.extend(line);
                    body.push(spans);
                }
            }
        }
    }

    if reply.is_aborted() {
        body.push(vec![Span::styled(
            "(reply interrupted)".to_string(),
            palette.error_style().add_modifier(Modifier::ITALIC),
        )]);
    }

    let mut first = true;
    for line in body {
        let wrapped = wrap_spans(line, content_width);
        for w_line in wrapped {
            let mut spans = if first {
                vec![Span::styled(label_sep.clone(), label_style), Span::raw(" ")]
            } else {
                vec![Span::styled(indent_sep.clone(), label_style), Span::raw(" ")]
            };
            first = false;
            spans.extend(w_line);
            lines.push(Line::from(spans));
        }
    }
}

/// Literal text while streaming, markdown once final. A formatting panic is
/// contained to this block, which falls back to literal text.
fn render_block_text(
    text: &str,
    mode: RenderMode,
    palette: ThemePalette,
    copy_labels: bool,
    next_snippet: &mut usize,
) -> Vec<SpanLine> {
    match mode {
        RenderMode::Literal => render_literal(text, palette.body_style()),
        RenderMode::Formatted => {
            let mut counter = *next_snippet;
            let formatted = catch_unwind(AssertUnwindSafe(|| {
                render_markdown(text, palette, copy_labels, &mut counter)
            }));
            match formatted {
                Ok(lines) => {
                    *next_snippet = counter;
                    lines
                }
                Err(_) => {
                    // Keep numbering aligned with `Reply::snippets`.
                    *next_snippet += count_fences(text);
                    warn!(len = text.len(), "formatting failed; showing block as plain text");
                    render_literal(text, palette.body_style())
                }
            }
        }
    }
}

fn render_literal(text: &str, style: Style) -> Vec<SpanLine> {
    text.split('\n')
        .map(|line| {
            let content = if line.is_empty() { " " } else { line };
            vec![Span::styled(content.to_string(), style)]
        })
        .collect()
}

fn count_fences(text: &str) -> usize {
    let mut counter = 0;
    classify_lines(text, &mut counter);
    counter
}

/// Render markdown text into styled spans per line.
fn render_markdown(
    text: &str,
    palette: ThemePalette,
    copy_labels: bool,
    next_snippet: &mut usize,
) -> Vec<SpanLine> {
    #[cfg(test)]
    if text.contains(FORMAT_FAILURE_TRIGGER) {
        panic!("formatting failure requested");
    }
    let base_style = palette.body_style();
    let code_block_style = Style::default().fg(palette.code_fg).bg(palette.code_bg);
    let heading_style = Style::default()
        .fg(palette.banner_title)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
    let bullet_style = base_style.fg(palette.bullet);
    let styles = InlineStyles {
        base: base_style,
        bold: base_style.add_modifier(Modifier::BOLD),
        italic: base_style.add_modifier(Modifier::ITALIC),
        link: base_style.add_modifier(Modifier::UNDERLINED),
        url: palette.muted_style(),
        code: Style::default()
            .fg(palette.inline_code_fg)
            .bg(palette.inline_code_bg),
    };

    classify_lines(text, next_snippet)
        .into_iter()
        .map(|line| match line {
            MdLine::Blank => vec![Span::styled(" ".to_string(), base_style)],
            MdLine::FenceOpen { lang, snippet } => {
                let mut spans = vec![Span::styled("───".to_string(), palette.muted_style())];
                if !lang.is_empty() {
                    spans.push(Span::styled(
                        format!(" {lang}"),
                        palette.muted_style().add_modifier(Modifier::ITALIC),
                    ));
                }
                if copy_labels {
                    spans.push(Span::styled(
                        format!(" [copy {snippet}]"),
                        palette.hint_selected_style(),
                    ));
                }
                spans
            }
            MdLine::FenceClose => vec![Span::styled("───".to_string(), palette.muted_style())],
            MdLine::Code(code) => {
                let content = if code.is_empty() { " " } else { code };
                vec![Span::styled(content.to_string(), code_block_style)]
            }
            MdLine::Heading { level, text } => {
                let prefix = "#".repeat(level);
                if text.is_empty() {
                    vec![Span::styled(prefix, heading_style)]
                } else {
                    vec![
                        Span::styled(format!("{} ", prefix), palette.muted_style()),
                        Span::styled(text.to_string(), heading_style),
                    ]
                }
            }
            MdLine::Bullet { indent, text } => {
                let mut spans = Vec::new();
                if indent > 0 {
                    spans.push(Span::raw(" ".repeat(indent)));
                }
                spans.push(Span::styled("\u{2022} ".to_string(), bullet_style));
                spans.extend(inline_spans(text, &styles));
                spans
            }
            MdLine::Numbered {
                indent,
                marker,
                text,
            } => {
                let mut spans = Vec::new();
                if indent > 0 {
                    spans.push(Span::raw(" ".repeat(indent)));
                }
                spans.push(Span::styled(format!("{marker} "), bullet_style));
                spans.extend(inline_spans(text, &styles));
                spans
            }
            MdLine::Quote(text) => {
                let mut spans = vec![Span::styled("▏ ".to_string(), palette.muted_style())];
                spans.extend(inline_spans(text, &styles));
                spans
            }
            MdLine::Text(text) => inline_spans(text, &styles),
        })
        .collect()
}

struct InlineStyles {
    base: Style,
    bold: Style,
    italic: Style,
    link: Style,
    url: Style,
    code: Style,
}

fn inline_spans(text: &str, styles: &InlineStyles) -> SpanLine {
    let mut spans: SpanLine = Vec::new();
    for run in parse_inline(text) {
        match run {
            Inline::Text(t) => spans.push(Span::styled(t, styles.base)),
            Inline::Bold(t) => spans.push(Span::styled(t, styles.bold)),
            Inline::Italic(t) => spans.push(Span::styled(t, styles.italic)),
            Inline::BoldItalic(t) => spans.push(Span::styled(
                t,
                styles.bold.add_modifier(Modifier::ITALIC),
            )),
            Inline::Code(t) => spans.push(Span::styled(format!(" {} ", t), styles.code)),
            Inline::Link { text, url } => {
                let bare = text == url;
                spans.push(Span::styled(text, styles.link));
                if !bare {
                    spans.push(Span::styled(format!(" ({url})"), styles.url));
                }
            }
        }
    }
    if spans.is_empty() {
        return vec![Span::styled(" ".to_string(), styles.base)];
    }
    spans
}

/// Pre-wrap a list of spans so that each resulting line fits within `max_width`
/// display columns.
fn wrap_spans(spans: SpanLine, max_width: usize) -> Vec<SpanLine> {
    if max_width == 0 {
        return vec![spans];
    }
    let mut result: Vec<SpanLine> = Vec::new();
    let mut current_line: SpanLine = Vec::new();
    let mut current_width: usize = 0;

    for span in spans {
        let span_width = UnicodeWidthStr::width(span.content.as_ref());
        if current_width + span_width <= max_width {
            current_width += span_width;
            current_line.push(span);
            continue;
        }
        let style = span.style;
        let text = span.content.into_owned();
        let mut remaining = text.as_str();
        while !remaining.is_empty() {
            let avail = max_width.saturating_sub(current_width);
            if avail == 0 {
                result.push(std::mem::take(&mut current_line));
                current_width = 0;
                continue;
            }
            let mut split_byte = 0;
            let mut cols = 0usize;
            for (byte_idx, ch) in remaining.char_indices() {
                let w = UnicodeWidthChar::width(ch).unwrap_or(0);
                if cols + w > avail {
                    break;
                }
                cols += w;
                split_byte = byte_idx + ch.len_utf8();
            }
            if split_byte == 0 {
                if !current_line.is_empty() {
                    result.push(std::mem::take(&mut current_line));
                    current_width = 0;
                    continue;
                }
                // A single glyph wider than the line; emit it alone.
                let Some(ch) = remaining.chars().next() else {
                    break;
                };
                split_byte = ch.len_utf8();
                cols = UnicodeWidthChar::width(ch).unwrap_or(1);
            }
            current_line.push(Span::styled(remaining[..split_byte].to_string(), style));
            current_width += cols;
            remaining = &remaining[split_byte..];
            if !remaining.is_empty() {
                result.push(std::mem::take(&mut current_line));
                current_width = 0;
            }
        }
    }
    if !current_line.is_empty() {
        result.push(current_line);
    }
    if result.is_empty() {
        result.push(Vec::new());
    }
    result
}
