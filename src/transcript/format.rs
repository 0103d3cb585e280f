//! Formatting policy for block content.
//!
//! While a reply streams, block text is shown verbatim. Once it is final the
//! text is classified line by line into block-level markdown lines, and the
//! inline runs of each line come from `pulldown-cmark`. Classification is pure
//! so the same content always yields the same lines and the same code snippet
//! numbering.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

use super::reply::BlockRef;

/// How a block's content is turned into display lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum RenderMode {
    /// Verbatim text, no markup interpretation.
    #[default]
    Literal,
    /// Markdown formatting plus copy affordances on code blocks.
    Formatted,
}

/// A fenced code block of a finished reply, addressable by `/copy <number>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CodeSnippet {
    pub(crate) number: usize,
    pub(crate) lang: String,
    pub(crate) code: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum MdLine<'a> {
    Blank,
    /// Opening fence; `snippet` is the 1-based copy number.
    FenceOpen { lang: &'a str, snippet: usize },
    FenceClose,
    Code(&'a str),
    Heading { level: usize, text: &'a str },
    Bullet { indent: usize, text: &'a str },
    Numbered { indent: usize, marker: &'a str, text: &'a str },
    Quote(&'a str),
    Text(&'a str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Inline {
    Text(String),
    Bold(String),
    Italic(String),
    BoldItalic(String),
    Code(String),
    Link { text: String, url: String },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Weight {
    Plain,
    Bold,
    Italic,
    BoldItalic,
}

impl Inline {
    fn weighted(weight: Weight, text: String) -> Self {
        match weight {
            Weight::Plain => Inline::Text(text),
            Weight::Bold => Inline::Bold(text),
            Weight::Italic => Inline::Italic(text),
            Weight::BoldItalic => Inline::BoldItalic(text),
        }
    }

    /// Text of a run with exactly this weight, so adjacent events merge.
    fn weighted_text_mut(&mut self, weight: Weight) -> Option<&mut String> {
        match (self, weight) {
            (Inline::Text(text), Weight::Plain)
            | (Inline::Bold(text), Weight::Bold)
            | (Inline::Italic(text), Weight::Italic)
            | (Inline::BoldItalic(text), Weight::BoldItalic) => Some(text),
            _ => None,
        }
    }
}

/// Accumulates inline runs while walking parser events.
#[derive(Default)]
struct InlineRuns {
    runs: Vec<Inline>,
    strong: usize,
    emphasis: usize,
    /// Label and destination of the link being read.
    link: Option<(String, String)>,
}

impl InlineRuns {
    fn weight(&self) -> Weight {
        match (self.strong > 0, self.emphasis > 0) {
            (false, false) => Weight::Plain,
            (true, false) => Weight::Bold,
            (false, true) => Weight::Italic,
            (true, true) => Weight::BoldItalic,
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some((label, _)) = self.link.as_mut() {
            label.push_str(text);
            return;
        }
        let weight = self.weight();
        if let Some(buf) = self.runs.last_mut().and_then(|run| run.weighted_text_mut(weight)) {
            buf.push_str(text);
            return;
        }
        self.runs.push(Inline::weighted(weight, text.to_string()));
    }

    fn push_code(&mut self, code: &str) {
        match self.link.as_mut() {
            Some((label, _)) => label.push_str(code),
            None => self.runs.push(Inline::Code(code.to_string())),
        }
    }

    fn close_link(&mut self) {
        if let Some((text, url)) = self.link.take() {
            self.runs.push(Inline::Link { text, url });
        }
    }
}

/// Classify `text` into markdown lines. `next_snippet` carries fence
/// numbering across the blocks of one reply.
pub(crate) fn classify_lines<'a>(text: &'a str, next_snippet: &mut usize) -> Vec<MdLine<'a>> {
    let mut out = Vec::new();
    let mut in_code_block = false;

    for line in text.split('\n') {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            if in_code_block {
                out.push(MdLine::FenceClose);
            } else {
                *next_snippet += 1;
                out.push(MdLine::FenceOpen {
                    lang: trimmed.trim_start_matches('`').trim(),
                    snippet: *next_snippet,
                });
            }
            in_code_block = !in_code_block;
            continue;
        }

        if in_code_block {
            out.push(MdLine::Code(line));
            continue;
        }

        if trimmed.is_empty() {
            out.push(MdLine::Blank);
            continue;
        }

        if trimmed.starts_with('#') {
            let level = trimmed.chars().take_while(|c| *c == '#').count();
            let rest = &trimmed[level..];
            if rest.is_empty() || rest.starts_with(' ') {
                out.push(MdLine::Heading {
                    level,
                    text: rest.trim_start(),
                });
                continue;
            }
        }

        let indent = line.len() - line.trim_start().len();
        if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .or_else(|| trimmed.strip_prefix("+ "))
        {
            out.push(MdLine::Bullet { indent, text: rest });
            continue;
        }

        if let Some((marker, rest)) = split_numbered(trimmed) {
            out.push(MdLine::Numbered {
                indent,
                marker,
                text: rest,
            });
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('>') {
            out.push(MdLine::Quote(rest.trim_start()));
            continue;
        }

        out.push(MdLine::Text(line));
    }

    out
}

fn split_numbered(trimmed: &str) -> Option<(&str, &str)> {
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 3 {
        return None;
    }
    let after = &trimmed[digits..];
    let rest = after
        .strip_prefix(". ")
        .or_else(|| after.strip_prefix(") "))?;
    Some((&trimmed[..digits + 1], rest))
}

/// Parse the inline markdown of one classified line: strong and emphasis
/// (nesting included), code spans and links. Text that the parser reads as
/// block structure, such as a rule or an over-long list number, is kept
/// verbatim.
pub(crate) fn parse_inline(text: &str) -> Vec<Inline> {
    let body = text.trim_start();
    let mut runs = InlineRuns::default();
    let lead = &text[..text.len() - body.len()];
    if !lead.is_empty() {
        runs.push_text(lead);
    }

    for event in Parser::new(body) {
        match event {
            Event::Start(Tag::Paragraph) | Event::End(TagEnd::Paragraph) => {}
            Event::Start(Tag::Strong) => runs.strong += 1,
            Event::End(TagEnd::Strong) => runs.strong = runs.strong.saturating_sub(1),
            Event::Start(Tag::Emphasis) => runs.emphasis += 1,
            Event::End(TagEnd::Emphasis) => runs.emphasis = runs.emphasis.saturating_sub(1),
            Event::Start(Tag::Link { dest_url, .. }) | Event::Start(Tag::Image { dest_url, .. }) => {
                runs.link = Some((String::new(), dest_url.to_string()));
            }
            Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => runs.close_link(),
            Event::Text(t) | Event::InlineHtml(t) => runs.push_text(&t),
            Event::Code(code) => runs.push_code(&code),
            Event::SoftBreak | Event::HardBreak => runs.push_text(" "),
            _ => return vec![Inline::Text(text.to_string())],
        }
    }

    runs.runs
}

/// Collect every fenced code block of the given blocks, numbered in display order.
pub(crate) fn extract_code_snippets<'a>(
    blocks: impl Iterator<Item = BlockRef<'a>>,
) -> Vec<CodeSnippet> {
    let mut snippets: Vec<CodeSnippet> = Vec::new();
    let mut counter = 0usize;
    for block in blocks {
        let text = match block {
            BlockRef::Plain(text) => text,
            BlockRef::Agent(agent) => agent.content.as_str(),
        };
        let mut open: Option<CodeSnippet> = None;
        for line in classify_lines(text, &mut counter) {
            match line {
                MdLine::FenceOpen { lang, snippet } => {
                    open = Some(CodeSnippet {
                        number: snippet,
                        lang: lang.to_string(),
                        code: String::new(),
                    });
                }
                MdLine::Code(code) => {
                    if let Some(current) = open.as_mut() {
                        if !current.code.is_empty() {
                            current.code.push('\n');
                        }
                        current.code.push_str(code);
                    }
                }
                MdLine::FenceClose => snippets.extend(open.take()),
                _ => {}
            }
        }
        snippets.extend(open.take());
    }
    snippets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Reply;

    #[test]
    fn fences_are_numbered_across_calls() {
        let mut counter = 0;
        let first = classify_lines("```rust\nfn a() {}\n```", &mut counter);
        let second = classify_lines("```\nx\n```", &mut counter);
        assert_eq!(
            first[0],
            MdLine::FenceOpen {
                lang: "rust",
                snippet: 1
            }
        );
        assert_eq!(first[1], MdLine::Code("fn a() {}"));
        assert_eq!(first[2], MdLine::FenceClose);
        assert_eq!(second[0], MdLine::FenceOpen { lang: "", snippet: 2 });
    }

    #[test]
    fn markdown_inside_code_is_not_interpreted() {
        let mut counter = 0;
        let lines = classify_lines("```\n# not a heading\n- nor a bullet\n```", &mut counter);
        assert_eq!(lines[1], MdLine::Code("# not a heading"));
        assert_eq!(lines[2], MdLine::Code("- nor a bullet"));
    }

    #[test]
    fn block_level_lines_are_classified() {
        let mut counter = 0;
        let lines = classify_lines("## Title\n- item\n  2. second\n> quoted\n\nplain", &mut counter);
        assert_eq!(
            lines,
            vec![
                MdLine::Heading {
                    level: 2,
                    text: "Title"
                },
                MdLine::Bullet {
                    indent: 0,
                    text: "item"
                },
                MdLine::Numbered {
                    indent: 2,
                    marker: "2.",
                    text: "second"
                },
                MdLine::Quote("quoted"),
                MdLine::Blank,
                MdLine::Text("plain"),
            ]
        );
    }

    #[test]
    fn hash_without_space_is_not_a_heading() {
        let mut counter = 0;
        assert_eq!(classify_lines("#hashtag", &mut counter), vec![MdLine::Text("#hashtag")]);
    }

    #[test]
    fn inline_markers_become_styled_runs() {
        assert_eq!(
            parse_inline("a **b** *c* `d`"),
            vec![
                Inline::Text("a ".to_string()),
                Inline::Bold("b".to_string()),
                Inline::Text(" ".to_string()),
                Inline::Italic("c".to_string()),
                Inline::Text(" ".to_string()),
                Inline::Code("d".to_string()),
            ]
        );
    }

    #[test]
    fn unterminated_inline_markers_stay_literal() {
        assert_eq!(
            parse_inline("2 * 3 and **open"),
            vec![Inline::Text("2 * 3 and **open".to_string())]
        );
        assert_eq!(
            parse_inline("snake_case_name"),
            vec![Inline::Text("snake_case_name".to_string())]
        );
    }

    #[test]
    fn underscore_strong_is_bold() {
        assert_eq!(parse_inline("__bold__"), vec![Inline::Bold("bold".to_string())]);
    }

    #[test]
    fn emphasis_nests_inside_strong() {
        assert_eq!(
            parse_inline("**a *b* c**"),
            vec![
                Inline::Bold("a ".to_string()),
                Inline::BoldItalic("b".to_string()),
                Inline::Bold(" c".to_string()),
            ]
        );
    }

    #[test]
    fn links_keep_label_and_destination() {
        assert_eq!(
            parse_inline("see [docs](http://x) or <https://y.dev>"),
            vec![
                Inline::Text("see ".to_string()),
                Inline::Link {
                    text: "docs".to_string(),
                    url: "http://x".to_string()
                },
                Inline::Text(" or ".to_string()),
                Inline::Link {
                    text: "https://y.dev".to_string(),
                    url: "https://y.dev".to_string()
                },
            ]
        );
    }

    #[test]
    fn leading_indent_is_kept_as_text() {
        assert_eq!(
            parse_inline("      deep **x**"),
            vec![
                Inline::Text("      deep ".to_string()),
                Inline::Bold("x".to_string()),
            ]
        );
    }

    #[test]
    fn block_syntax_inside_a_line_stays_verbatim() {
        assert_eq!(parse_inline("---"), vec![Inline::Text("---".to_string())]);
        assert_eq!(
            parse_inline("20240101. was a date"),
            vec![Inline::Text("20240101. was a date".to_string())]
        );
    }

    #[test]
    fn snippets_are_collected_from_every_block_in_order() {
        let mut reply = Reply::new();
        reply.push_chunk(
            "see below\n```sh\nls\n```\n#### Generation Agent:\n```rust\nfn main() {}\nfn b() {}\n```",
        );
        reply.finish();
        let snippets = reply.snippets();
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].number, 1);
        assert_eq!(snippets[0].lang, "sh");
        assert_eq!(snippets[0].code, "ls");
        assert_eq!(snippets[1].number, 2);
        assert_eq!(snippets[1].code, "fn main() {}\nfn b() {}");
    }

    #[test]
    fn unterminated_fence_still_yields_a_snippet() {
        let reply = Reply::complete("```py\nprint(1)");
        assert_eq!(reply.snippets().len(), 1);
        assert_eq!(reply.snippets()[0].code, "print(1)");
    }

    #[test]
    fn streaming_replies_have_no_snippets() {
        let mut reply = Reply::new();
        reply.push_chunk("```\ncode\n```");
        assert!(reply.snippets().is_empty());
    }
}
