use std::sync::LazyLock;

use regex::Regex;

use super::AgentId;

/// `#### <Agent> Agent:` as emitted by the backend between pipeline stages.
static AGENT_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)####\s+(reasoner|planner|generation|reviewer)\s+agent:")
        .expect("agent header pattern")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SegmentKind {
    Plain,
    Agent(AgentId),
}

/// One typed slice of the reply buffer, valid for a single parse pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Segment<'a> {
    pub(crate) kind: SegmentKind,
    pub(crate) text: &'a str,
}

impl<'a> Segment<'a> {
    pub(crate) fn plain(text: &'a str) -> Self {
        Self {
            kind: SegmentKind::Plain,
            text,
        }
    }

    pub(crate) fn agent(agent: AgentId, text: &'a str) -> Self {
        Self {
            kind: SegmentKind::Agent(agent),
            text,
        }
    }
}

/// Split the whole accumulated buffer into ordered segments.
///
/// The result depends only on `buffer`, so calling this again with a longer
/// buffer after every chunk is always consistent with the final pass, even
/// when a header marker was split across chunks.
pub(crate) fn segment(buffer: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let headers: Vec<(AgentId, usize, usize)> = AGENT_HEADER
        .captures_iter(buffer)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let agent = AgentId::parse(caps.get(1)?.as_str())?;
            Some((agent, whole.start(), whole.end()))
        })
        .collect();

    let intro_end = headers.first().map(|(_, start, _)| *start).unwrap_or(buffer.len());
    let intro = buffer[..intro_end].trim();
    if !intro.is_empty() && !is_bare_agent_name(intro) {
        segments.push(Segment::plain(intro));
    }

    for (i, (agent, _, content_start)) in headers.iter().enumerate() {
        let content_end = headers
            .get(i + 1)
            .map(|(_, next_start, _)| *next_start)
            .unwrap_or(buffer.len());
        let text = buffer[*content_start..content_end].trim();
        if !text.is_empty() {
            segments.push(Segment::agent(*agent, text));
        }
    }

    segments
}

fn is_bare_agent_name(text: &str) -> bool {
    AgentId::parse(text).is_some()
}
