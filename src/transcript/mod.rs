//! UI-free core: segmentation of the streamed reply buffer, reconciliation
//! against the persistent block tree, the formatting policy and the turn
//! lifecycle.

mod agent;
mod conversation;
mod format;
mod reply;
mod segment;

pub(crate) use agent::AgentId;
#[cfg(test)]
pub(crate) use conversation::TurnState;
pub(crate) use conversation::{Conversation, Message, RelayMessage, SubmitRejected};
pub(crate) use format::{classify_lines, parse_inline, Inline, MdLine, RenderMode};
pub(crate) use reply::{BlockRef, Reply};
