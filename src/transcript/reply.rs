use std::collections::HashMap;

use super::format::{extract_code_snippets, CodeSnippet, RenderMode};
use super::segment::{segment, Segment, SegmentKind};
use super::AgentId;

/// Separator placed between the texts of repeated headers of one agent.
const MERGE_SEPARATOR: &str = "\n\n";

/// A collapsible per-agent section. Identity is its agent id within one reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AgentBlock {
    pub(crate) agent: AgentId,
    pub(crate) content: String,
    pub(crate) collapsed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Slot {
    Plain(String),
    Agent(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlockRef<'a> {
    Plain(&'a str),
    Agent(&'a AgentBlock),
}

/// Ordered blocks of one reply: plain blocks are rebuilt on every pass,
/// agent blocks persist and are addressed through `agent_index`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct BlockTree {
    agents: Vec<AgentBlock>,
    agent_index: HashMap<AgentId, usize>,
    layout: Vec<Slot>,
    mode: RenderMode,
}

impl BlockTree {
    pub(crate) fn blocks(&self) -> impl Iterator<Item = BlockRef<'_>> + '_ {
        self.layout.iter().map(|slot| match slot {
            Slot::Plain(text) => BlockRef::Plain(text.as_str()),
            Slot::Agent(idx) => BlockRef::Agent(&self.agents[*idx]),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.layout.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    pub(crate) fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Agent ids in first-seen order.
    pub(crate) fn agent_keys(&self) -> Vec<AgentId> {
        self.agents.iter().map(|block| block.agent).collect()
    }

    #[cfg(test)]
    pub(crate) fn agent(&self, agent: AgentId) -> Option<&AgentBlock> {
        self.agent_index.get(&agent).map(|&idx| &self.agents[idx])
    }

    /// Position of the agent block in the persistent agent list.
    #[cfg(test)]
    pub(crate) fn agent_position(&self, agent: AgentId) -> Option<usize> {
        self.agent_index.get(&agent).copied()
    }

    pub(crate) fn set_collapsed(&mut self, agent: AgentId, collapsed: bool) -> bool {
        match self.agent_index.get(&agent) {
            Some(&idx) => {
                self.agents[idx].collapsed = collapsed;
                true
            }
            None => false,
        }
    }

    /// Flip the collapsed flag; returns the new value.
    pub(crate) fn toggle(&mut self, agent: AgentId) -> Option<bool> {
        let idx = *self.agent_index.get(&agent)?;
        let block = &mut self.agents[idx];
        block.collapsed = !block.collapsed;
        Some(block.collapsed)
    }

    fn plain_only(text: &str, mode: RenderMode) -> Self {
        let trimmed = text.trim();
        let layout = if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![Slot::Plain(trimmed.to_string())]
        };
        Self {
            layout,
            mode,
            ..Self::default()
        }
    }

    fn lookup_or_create(&mut self, agent: AgentId) -> usize {
        if let Some(&idx) = self.agent_index.get(&agent) {
            return idx;
        }
        let idx = self.agents.len();
        self.agents.push(AgentBlock {
            agent,
            content: String::new(),
            collapsed: false,
        });
        self.agent_index.insert(agent, idx);
        idx
    }
}

/// Map one pass worth of segments onto the tree.
///
/// Plain blocks are rebuilt from scratch. Agent blocks are looked up by id
/// and created on first sight; an existing block keeps its collapsed flag and
/// its relative position. Blocks are never removed: an agent that produced no
/// segment in this pass keeps its slot with empty content.
pub(crate) fn reconcile(tree: &mut BlockTree, segments: &[Segment<'_>], is_final: bool) {
    let mut layout = Vec::with_capacity(segments.len());
    let mut seen: HashMap<usize, String> = HashMap::new();

    for seg in segments {
        match seg.kind {
            SegmentKind::Plain => layout.push(Slot::Plain(seg.text.to_string())),
            SegmentKind::Agent(agent) => {
                let idx = tree.lookup_or_create(agent);
                match seen.get_mut(&idx) {
                    Some(text) => {
                        text.push_str(MERGE_SEPARATOR);
                        text.push_str(seg.text);
                    }
                    None => {
                        seen.insert(idx, seg.text.to_string());
                        layout.push(Slot::Agent(idx));
                    }
                }
            }
        }
    }

    for idx in 0..tree.agents.len() {
        match seen.remove(&idx) {
            Some(text) => tree.agents[idx].content = text,
            None => {
                tree.agents[idx].content.clear();
                let at = idx
                    .checked_sub(1)
                    .and_then(|prev| slot_position(&layout, prev))
                    .map(|pos| pos + 1)
                    .or_else(|| {
                        (idx + 1..tree.agents.len()).find_map(|next| slot_position(&layout, next))
                    })
                    .unwrap_or(layout.len());
                layout.insert(at, Slot::Agent(idx));
            }
        }
    }

    tree.layout = layout;
    tree.mode = if is_final {
        RenderMode::Formatted
    } else {
        RenderMode::Literal
    };
}

fn slot_position(layout: &[Slot], agent_idx: usize) -> Option<usize> {
    layout.iter().position(|slot| *slot == Slot::Agent(agent_idx))
}

/// One streamed (or directly delivered) bot turn.
#[derive(Clone, Debug, Default)]
pub(crate) struct Reply {
    buffer: String,
    tree: BlockTree,
    is_final: bool,
    aborted: bool,
    snippets: Vec<CodeSnippet>,
}

impl Reply {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A complete, non-streamed message: one final plain block, no agent parsing.
    pub(crate) fn complete(text: &str) -> Self {
        let mut reply = Self {
            buffer: text.to_string(),
            tree: BlockTree::plain_only(text, RenderMode::Formatted),
            is_final: true,
            ..Self::default()
        };
        reply.snippets = extract_code_snippets(reply.tree.blocks());
        reply
    }

    pub(crate) fn push_chunk(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
        self.reparse(false);
    }

    /// Terminal pass: rich formatting plus the copy post-pass.
    pub(crate) fn finish(&mut self) {
        self.reparse(true);
        self.is_final = true;
        self.snippets = extract_code_snippets(self.tree.blocks());
    }

    pub(crate) fn abort(&mut self) {
        self.aborted = true;
    }

    fn reparse(&mut self, is_final: bool) {
        let segments = segment(&self.buffer);
        reconcile(&mut self.tree, &segments, is_final);
    }

    #[cfg(test)]
    pub(crate) fn buffer(&self) -> &str {
        &self.buffer
    }

    pub(crate) fn tree(&self) -> &BlockTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut BlockTree {
        &mut self.tree
    }

    pub(crate) fn is_final(&self) -> bool {
        self.is_final
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub(crate) fn snippets(&self) -> &[CodeSnippet] {
        &self.snippets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_texts(tree: &BlockTree) -> Vec<String> {
        tree.blocks()
            .map(|block| match block {
                BlockRef::Plain(text) => format!("plain:{text}"),
                BlockRef::Agent(a) => format!("{}:{}", a.agent.as_str(), a.content),
            })
            .collect()
    }

    #[test]
    fn blocks_follow_segment_order() {
        let mut reply = Reply::new();
        reply.push_chunk("intro #### Planner Agent: plan text #### Reviewer Agent: review text");
        assert_eq!(
            plain_texts(reply.tree()),
            vec!["plain:intro", "planner:plan text", "reviewer:review text"]
        );
    }

    #[test]
    fn repeated_growth_keeps_the_same_agent_block() {
        let mut reply = Reply::new();
        reply.push_chunk("#### Reasoner Agent: a");
        let before = reply.tree().agent_position(AgentId::Reasoner);
        reply.push_chunk(" more");

        assert_eq!(reply.tree().agent_position(AgentId::Reasoner), before);
        assert_eq!(reply.tree().agent_keys(), vec![AgentId::Reasoner]);
        assert_eq!(
            reply.tree().agent(AgentId::Reasoner).map(|b| b.content.as_str()),
            Some("a more")
        );
    }

    #[test]
    fn collapse_state_survives_new_chunks() {
        let mut reply = Reply::new();
        reply.push_chunk("#### Planner Agent: step one");
        assert_eq!(reply.tree_mut().toggle(AgentId::Planner), Some(true));

        reply.push_chunk("\nstep two");
        let block = reply.tree().agent(AgentId::Planner).expect("planner block");
        assert!(block.collapsed);
        assert_eq!(block.content, "step one\nstep two");

        reply.finish();
        assert!(reply.tree().agent(AgentId::Planner).expect("planner").collapsed);
    }

    #[test]
    fn agent_key_set_never_shrinks_while_streaming() {
        let full = "lead #### Reasoner Agent: r1 r2 #### Planner Agent: p #### Reviewer Agent: ok";
        let mut reply = Reply::new();
        let mut last_len = 0usize;
        let mut consumed = 0usize;
        for (idx, ch) in full.char_indices() {
            let end = idx + ch.len_utf8();
            reply.push_chunk(&full[consumed..end]);
            consumed = end;
            let keys = reply.tree().agent_keys();
            assert!(keys.len() >= last_len, "agent set shrank at byte {end}");
            last_len = keys.len();
        }
        assert_eq!(
            reply.tree().agent_keys(),
            vec![AgentId::Reasoner, AgentId::Planner, AgentId::Reviewer]
        );
    }

    #[test]
    fn unknown_agent_header_creates_no_agent_block() {
        let mut reply = Reply::new();
        reply.push_chunk("#### Validator Agent: x");
        reply.finish();
        assert!(reply.tree().agent_keys().is_empty());
        assert_eq!(plain_texts(reply.tree()), vec!["plain:#### Validator Agent: x"]);
    }

    #[test]
    fn repeated_headers_merge_into_one_section() {
        let mut reply = Reply::new();
        reply.push_chunk("#### Reasoner Agent: a #### Planner Agent: p #### Reasoner Agent: b");
        assert_eq!(
            plain_texts(reply.tree()),
            vec!["reasoner:a\n\nb", "planner:p"]
        );
    }

    #[test]
    fn vanished_agent_segment_keeps_its_block_in_place() {
        let mut tree = BlockTree::default();
        reconcile(
            &mut tree,
            &[
                Segment::plain("lead"),
                Segment::agent(AgentId::Reasoner, "#### Plan"),
            ],
            false,
        );
        reconcile(
            &mut tree,
            &[
                Segment::plain("lead"),
                Segment::agent(AgentId::Planner, "p"),
            ],
            false,
        );
        assert_eq!(plain_texts(&tree), vec!["plain:lead", "reasoner:", "planner:p"]);
        assert_eq!(tree.agent_keys(), vec![AgentId::Reasoner, AgentId::Planner]);
    }

    #[test]
    fn render_mode_tracks_finality() {
        let mut reply = Reply::new();
        reply.push_chunk("hello");
        assert_eq!(reply.tree().mode(), RenderMode::Literal);
        reply.finish();
        assert_eq!(reply.tree().mode(), RenderMode::Formatted);
        assert!(reply.is_final());
    }

    #[test]
    fn final_pass_is_idempotent() {
        let mut reply = Reply::new();
        reply.push_chunk("x #### Generation Agent: ```rust\nfn a() {}\n```");
        reply.finish();
        let first = reply.tree().clone();
        let first_snippets = reply.snippets().to_vec();
        reply.finish();
        assert_eq!(reply.tree(), &first);
        assert_eq!(reply.snippets(), first_snippets.as_slice());
    }

    #[test]
    fn complete_message_is_a_single_final_plain_block() {
        let reply = Reply::complete("**Hello!** #### Planner Agent: not parsed");
        assert!(reply.is_final());
        assert_eq!(reply.tree().len(), 1);
        assert!(reply.tree().agent_keys().is_empty());
        assert_eq!(reply.tree().mode(), RenderMode::Formatted);
    }

    #[test]
    fn blank_complete_message_has_no_blocks() {
        assert!(Reply::complete("  \n").tree().is_empty());
    }

    #[test]
    fn toggling_unknown_agent_is_a_no_op() {
        let mut reply = Reply::new();
        reply.push_chunk("plain only");
        assert_eq!(reply.tree_mut().toggle(AgentId::Reviewer), None);
        assert!(!reply.tree_mut().set_collapsed(AgentId::Reviewer, true));
    }

    #[test]
    fn block_contents_reconstruct_the_buffer_modulo_markers() {
        let buffer = "lead\n#### Reasoner Agent: why\n#### Generation Agent: code";
        let mut reply = Reply::new();
        reply.push_chunk(buffer);
        let joined: String = reply
            .tree()
            .blocks()
            .map(|block| match block {
                BlockRef::Plain(text) => text.to_string(),
                BlockRef::Agent(a) => a.content.clone(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(joined, "lead why code");
    }
}
