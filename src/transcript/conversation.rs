use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Reply;

/// How long a transient notice stays visible.
pub(crate) const NOTICE_TTL: Duration = Duration::from_secs(3);

/// Inbound messages from the transport relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum RelayMessage {
    BotMessageStart,
    BotMessageChunk { text: String },
    BotMessageEnd,
    BotMessage { text: String },
    Error { text: String },
    ContextUpdate { text: String },
}

#[derive(Clone, Debug)]
pub(crate) enum Message {
    User(String),
    Bot(Reply),
    System(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TurnState {
    Idle,
    /// Index of the streaming reply in `messages`.
    Streaming { reply: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Notice {
    pub(crate) text: String,
    pub(crate) raised_at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SubmitRejected {
    Empty,
    Busy,
}

/// Transcript plus the turn lifecycle. Mutated only by message handlers that
/// run to completion one at a time.
#[derive(Debug)]
pub(crate) struct Conversation {
    messages: Vec<Message>,
    turn: TurnState,
    typing: bool,
    busy: bool,
    notice: Option<Notice>,
    context_file: Option<String>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub(crate) fn new() -> Self {
        Self {
            messages: Vec::new(),
            turn: TurnState::Idle,
            typing: false,
            busy: false,
            notice: None,
            context_file: None,
        }
    }

    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[cfg(test)]
    pub(crate) fn turn(&self) -> TurnState {
        self.turn
    }

    pub(crate) fn is_streaming(&self) -> bool {
        matches!(self.turn, TurnState::Streaming { .. })
    }

    pub(crate) fn is_typing(&self) -> bool {
        self.typing
    }

    /// True while the input control must stay disabled.
    pub(crate) fn is_busy(&self) -> bool {
        self.busy
    }

    pub(crate) fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub(crate) fn context_file(&self) -> Option<&str> {
        self.context_file.as_deref()
    }

    /// Record a user message and put the input into its busy state.
    pub(crate) fn submit(&mut self, text: &str) -> Result<String, SubmitRejected> {
        if self.busy {
            return Err(SubmitRejected::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitRejected::Empty);
        }
        self.messages.push(Message::User(text.to_string()));
        self.typing = true;
        self.busy = true;
        Ok(text.to_string())
    }

    pub(crate) fn push_system(&mut self, text: impl Into<String>) {
        self.messages.push(Message::System(text.into()));
    }

    /// Apply one inbound message.
    pub(crate) fn handle(&mut self, msg: RelayMessage, now: Instant) {
        match msg {
            RelayMessage::BotMessageStart => {
                if let TurnState::Streaming { reply } = self.turn {
                    warn!(reply, "start while streaming; abandoning unfinished reply");
                    self.abort_reply(reply);
                }
                self.messages.push(Message::Bot(Reply::new()));
                self.turn = TurnState::Streaming {
                    reply: self.messages.len() - 1,
                };
                self.typing = true;
                self.busy = true;
                debug!("reply started");
            }
            RelayMessage::BotMessageChunk { text } => match self.streaming_reply_mut() {
                Some(reply) => reply.push_chunk(&text),
                None => warn!(len = text.len(), "chunk without an active reply; ignored"),
            },
            RelayMessage::BotMessageEnd => {
                match self.turn {
                    TurnState::Streaming { .. } => {
                        if let Some(reply) = self.streaming_reply_mut() {
                            reply.finish();
                            debug!(
                                blocks = reply.tree().len(),
                                agents = reply.tree().agent_keys().len(),
                                "reply finished"
                            );
                        }
                    }
                    TurnState::Idle => warn!("end without an active reply"),
                }
                self.finish_turn();
            }
            RelayMessage::BotMessage { text } => {
                self.messages.push(Message::Bot(Reply::complete(&text)));
                if self.is_streaming() {
                    warn!("complete message while streaming; reply keeps the input busy");
                } else {
                    self.typing = false;
                    self.busy = false;
                }
            }
            RelayMessage::Error { text } => {
                if let TurnState::Streaming { reply } = self.turn {
                    self.abort_reply(reply);
                }
                self.notice = Some(Notice {
                    text,
                    raised_at: now,
                });
                self.finish_turn();
            }
            RelayMessage::ContextUpdate { text } => {
                let name = text.trim();
                self.context_file = if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                };
            }
        }
    }

    /// Drop the notice once it has been visible for `NOTICE_TTL`.
    pub(crate) fn expire_notice(&mut self, now: Instant) -> bool {
        let expired = self
            .notice
            .as_ref()
            .is_some_and(|notice| now.saturating_duration_since(notice.raised_at) >= NOTICE_TTL);
        if expired {
            self.notice = None;
        }
        expired
    }

    pub(crate) fn dismiss_notice(&mut self) -> bool {
        self.notice.take().is_some()
    }

    /// Clear the transcript. Refused while a reply is streaming.
    pub(crate) fn clear(&mut self) -> bool {
        if self.is_streaming() {
            return false;
        }
        self.messages.clear();
        true
    }

    /// Index of the reply that section commands act on: the streaming one,
    /// else the newest.
    pub(crate) fn section_reply_index(&self) -> Option<usize> {
        match self.turn {
            TurnState::Streaming { reply } => Some(reply),
            TurnState::Idle => self
                .messages
                .iter()
                .rposition(|msg| matches!(msg, Message::Bot(_))),
        }
    }

    pub(crate) fn latest_reply_mut(&mut self) -> Option<&mut Reply> {
        let idx = self.section_reply_index()?;
        match self.messages.get_mut(idx) {
            Some(Message::Bot(reply)) => Some(reply),
            _ => None,
        }
    }

    pub(crate) fn latest_reply(&self) -> Option<&Reply> {
        match self.messages.get(self.section_reply_index()?) {
            Some(Message::Bot(reply)) => Some(reply),
            _ => None,
        }
    }

    /// Index of the newest finished reply, the one `/copy` reads.
    pub(crate) fn latest_final_reply_index(&self) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|msg| matches!(msg, Message::Bot(reply) if reply.is_final()))
    }

    pub(crate) fn latest_final_reply(&self) -> Option<&Reply> {
        match self.messages.get(self.latest_final_reply_index()?) {
            Some(Message::Bot(reply)) => Some(reply),
            _ => None,
        }
    }

    fn streaming_reply_mut(&mut self) -> Option<&mut Reply> {
        let TurnState::Streaming { reply } = self.turn else {
            return None;
        };
        match self.messages.get_mut(reply) {
            Some(Message::Bot(reply)) => Some(reply),
            _ => None,
        }
    }

    fn abort_reply(&mut self, idx: usize) {
        if let Some(Message::Bot(reply)) = self.messages.get_mut(idx) {
            reply.abort();
        }
    }

    fn finish_turn(&mut self) {
        self.turn = TurnState::Idle;
        self.typing = false;
        self.busy = false;
    }
}
