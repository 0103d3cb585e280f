use super::*;

impl App {
    /// Drain pending worker events into the conversation. Returns true when
    /// anything visible changed.
    pub(super) fn poll_worker(&mut self) -> bool {
        let rx = self.rx.clone();
        let now = Instant::now();
        let mut changed = false;

        while let Ok(event) = rx.try_recv() {
            changed = true;
            match event {
                WorkerEvent::Relay(msg) => self.apply_relay_message(msg, now),
                WorkerEvent::Health(Ok(status)) => {
                    self.backend_status = status.describe();
                    self.push_system(self.backend_status.clone());
                }
                WorkerEvent::Health(Err(err)) => {
                    warn!(error = %err, "backend health check failed");
                    self.backend_status = "backend unreachable".to_string();
                    self.push_system(format!("backend health check failed: {err}"));
                }
                WorkerEvent::ContextLoaded { name, result } => match result {
                    Ok(content) => self.attach_context(name, content),
                    Err(err) => {
                        self.last_status = "context not loaded".to_string();
                        self.push_system(format!("context: cannot load {name}: {err}"));
                    }
                },
            }
        }

        if self.conversation.expire_notice(now) {
            changed = true;
        }
        if changed {
            self.follow_scroll();
        }
        changed
    }

    fn apply_relay_message(&mut self, msg: RelayMessage, now: Instant) {
        let msg = match msg {
            RelayMessage::BotMessageStart => {
                self.chunk_filter.reset();
                self.focus = None;
                self.last_status = "receiving".to_string();
                RelayMessage::BotMessageStart
            }
            RelayMessage::BotMessageChunk { text } => RelayMessage::BotMessageChunk {
                text: self.chunk_filter.push(&text),
            },
            RelayMessage::BotMessage { text } => RelayMessage::BotMessage {
                text: RuntimeTextFilter::default().push(&text),
            },
            RelayMessage::BotMessageEnd => {
                self.last_status = "ready".to_string();
                RelayMessage::BotMessageEnd
            }
            RelayMessage::Error { text } => {
                self.last_status = "error".to_string();
                RelayMessage::Error { text }
            }
            other => other,
        };
        self.conversation.handle(msg, now);
    }
}
