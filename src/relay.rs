//! Transport relay: turns a user submission into the inbound message
//! sequence the conversation consumes (`botMessageStart`, chunks, then
//! `botMessageEnd` or an `error` in its place).

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::Sender;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::app::WorkerEvent;
use crate::config::Config;
use crate::transcript::RelayMessage;

const READ_BUF_BYTES: usize = 4096;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const CONTEXT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_CHARS: usize = 200;

pub(crate) const GREETING: &str = "**Hello!** I'm your local coding assistant.\n\n\
I can help you explain, refactor, or generate code without leaving the terminal.\n\n\
How can I help you today?";

#[derive(Debug, Error)]
pub(crate) enum RelayError {
    #[error("invalid backend url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("error communicating with local agent: {0}. Ensure the backend is running.")]
    Connect(#[source] reqwest::Error),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("error receiving response from local agent: {0}")]
    Body(#[source] std::io::Error),
    #[error("invalid response from backend: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    context_code: &'a str,
}

#[derive(Debug, Serialize)]
struct ContextFileRequest<'a> {
    filename: &'a str,
}

#[derive(Debug, Deserialize)]
struct ContextFileResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BackendStatus {
    Ready,
    Initializing,
    Other(String),
    Replay(PathBuf),
}

impl BackendStatus {
    pub(crate) fn describe(&self) -> String {
        match self {
            BackendStatus::Ready => "backend ready".to_string(),
            BackendStatus::Initializing => "backend initializing (model still loading)".to_string(),
            BackendStatus::Other(status) => format!("backend status: {status}"),
            BackendStatus::Replay(path) => format!("replaying {}", path.display()),
        }
    }
}

/// Where replies come from.
#[derive(Clone, Debug)]
pub(crate) enum Transport {
    Http(HttpRelay),
    Replay { path: PathBuf, delay: Duration },
}

impl Transport {
    pub(crate) fn from_config(config: &Config) -> Result<Self, RelayError> {
        match &config.replay {
            Some(path) => Ok(Transport::Replay {
                path: path.clone(),
                delay: config.replay_delay,
            }),
            None => Ok(Transport::Http(HttpRelay::new(
                &config.backend_url,
                config.request_timeout,
            )?)),
        }
    }

    /// Forward one user submission on a worker thread.
    pub(crate) fn submit(&self, text: String, context_code: String, tx: Sender<WorkerEvent>) {
        let transport = self.clone();
        std::thread::spawn(move || {
            let mut emit = |msg: RelayMessage| {
                let _ = tx.send(WorkerEvent::Relay(msg));
            };
            match &transport {
                Transport::Http(relay) => relay.stream_chat(&text, &context_code, &mut emit),
                Transport::Replay { path, delay } => replay_file(path, *delay, &mut emit),
            }
        });
    }

    pub(crate) fn spawn_health_check(&self, tx: Sender<WorkerEvent>) {
        let transport = self.clone();
        std::thread::spawn(move || {
            let result = match &transport {
                Transport::Http(relay) => relay.health().map_err(|err| err.to_string()),
                Transport::Replay { path, .. } => Ok(BackendStatus::Replay(path.clone())),
            };
            let _ = tx.send(WorkerEvent::Health(result));
        });
    }

    /// Ask the backend for a file from its project directory. Returns false
    /// when the transport has no backend to ask.
    pub(crate) fn spawn_context_fetch(&self, filename: String, tx: Sender<WorkerEvent>) -> bool {
        let Transport::Http(relay) = self else {
            return false;
        };
        let relay = relay.clone();
        std::thread::spawn(move || {
            let result = relay
                .fetch_context_file(&filename)
                .map_err(|err| err.to_string());
            let _ = tx.send(WorkerEvent::ContextLoaded {
                name: filename,
                result,
            });
        });
        true
    }
}

#[derive(Clone, Debug)]
pub(crate) struct HttpRelay {
    client: Client,
    base_url: String,
}

impl HttpRelay {
    pub(crate) fn new(base_url: &str, request_timeout: Duration) -> Result<Self, RelayError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|err| RelayError::InvalidUrl {
            url: base_url.clone(),
            reason: err.to_string(),
        })?;
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .map_err(RelayError::Connect)?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST the message and relay the streamed body. Always emits exactly one
    /// start and then either one end or one error.
    pub(crate) fn stream_chat(
        &self,
        message: &str,
        context_code: &str,
        emit: &mut dyn FnMut(RelayMessage),
    ) {
        emit(RelayMessage::BotMessageStart);
        match self.pump_chat(message, context_code, emit) {
            Ok(bytes) => {
                debug!(bytes, "chat stream complete");
                emit(RelayMessage::BotMessageEnd);
            }
            Err(err) => {
                error!(error = %err, "chat stream failed");
                emit(RelayMessage::Error {
                    text: err.to_string(),
                });
            }
        }
    }

    fn pump_chat(
        &self,
        message: &str,
        context_code: &str,
        emit: &mut dyn FnMut(RelayMessage),
    ) -> Result<usize, RelayError> {
        let mut response = self
            .client
            .post(self.endpoint("/chat"))
            .json(&ChatRequest {
                message,
                context_code,
            })
            .send()
            .map_err(RelayError::Connect)?;
        check_status(&mut response)?;

        let mut decoder = Utf8Decoder::default();
        let mut buf = [0u8; READ_BUF_BYTES];
        let mut total = 0usize;
        loop {
            let n = response.read(&mut buf).map_err(RelayError::Body)?;
            if n == 0 {
                break;
            }
            total += n;
            let text = decoder.push(&buf[..n]);
            if !text.is_empty() {
                emit(RelayMessage::BotMessageChunk { text });
            }
        }
        let tail = decoder.finish();
        if !tail.is_empty() {
            emit(RelayMessage::BotMessageChunk { text: tail });
        }
        Ok(total)
    }

    pub(crate) fn health(&self) -> Result<BackendStatus, RelayError> {
        let mut response = self
            .client
            .get(self.endpoint("/health"))
            .timeout(CONNECT_TIMEOUT)
            .send()
            .map_err(RelayError::Connect)?;
        check_status(&mut response)?;
        let body: HealthBody = response.json().map_err(RelayError::Decode)?;
        let status = match body.status.as_str() {
            "ready" => BackendStatus::Ready,
            "initializing" => BackendStatus::Initializing,
            other => BackendStatus::Other(other.to_string()),
        };
        info!(status = ?status, "backend health");
        Ok(status)
    }

    pub(crate) fn fetch_context_file(&self, filename: &str) -> Result<String, RelayError> {
        let mut response = self
            .client
            .post(self.endpoint("/add_file_to_context"))
            .timeout(CONTEXT_FETCH_TIMEOUT)
            .json(&ContextFileRequest { filename })
            .send()
            .map_err(RelayError::Connect)?;
        check_status(&mut response)?;
        let body: ContextFileResponse = response.json().map_err(RelayError::Decode)?;
        Ok(body.content)
    }
}

fn check_status(response: &mut reqwest::blocking::Response) -> Result<(), RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let mut raw = String::new();
    let _ = response.read_to_string(&mut raw);
    Err(RelayError::Status {
        status: status.as_u16(),
        message: error_message_from_body(&raw),
    })
}

fn error_message_from_body(raw: &str) -> String {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(raw) {
        return body.error;
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "no details".to_string();
    }
    crate::truncate(trimmed, MAX_ERROR_BODY_CHARS)
}

/// Play a JSON-lines file of relay messages as if it came from the backend.
pub(crate) fn replay_file(path: &Path, delay: Duration, emit: &mut dyn FnMut(RelayMessage)) {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            error!(path = %path.display(), error = %err, "replay file unreadable");
            emit(RelayMessage::Error {
                text: format!("replay {}: {err}", path.display()),
            });
            return;
        }
    };
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let msg = serde_json::from_str::<RelayMessage>(line).unwrap_or_else(|err| {
            RelayMessage::Error {
                text: format!("replay line {}: {err}", idx + 1),
            }
        });
        let stop = matches!(msg, RelayMessage::Error { .. });
        emit(msg);
        if stop {
            return;
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Incremental UTF-8 decoding: a character split across network reads is
/// held back until its remaining bytes arrive.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
