//! Pure state machine over one conversation.
//!
//! No I/O happens here: [`ChatSession::submit`] hands back the request to send
//! and [`ChatSession::apply`] folds stream events into the message list.
//! Events carry the request id they belong to, so anything arriving for an
//! aborted request is ignored.

use std::fmt;

use crate::chat::error::ErrorBody;
use crate::chat::{ChatRequest, Greeting, Message, MessageId, MessagePart, Role};

/// Where the session is in its request cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SessionStatus {
    /// Ready for input.
    #[default]
    Idle,
    /// Request sent, nothing received yet.
    Submitted,
    /// Receiving deltas.
    Streaming,
}

/// Category of a failed exchange, as seen by the client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// The proxy could not be reached.
    Network,
    /// The proxy rejected the payload.
    InvalidRequest,
    /// The proxy has no backend credentials.
    NotConfigured,
    /// The completion backend failed.
    Upstream,
    /// The stream stopped before completing.
    Interrupted,
}

/// A failed exchange.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Failure {
    /// Category.
    pub kind: FailureKind,
    /// Diagnostic text from the error or the proxy.
    pub detail: String,
}

impl Failure {
    /// Build a failure.
    #[must_use]
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// The stream completed without any reply text.
    #[must_use]
    pub fn empty_reply() -> Self {
        Self::new(FailureKind::Upstream, "reply finished without any text")
    }

    /// Interpret a non-success proxy response.
    #[must_use]
    pub fn from_response(status: u16, body: Option<ErrorBody>) -> Self {
        let Some(body) = body else {
            let kind = if status < 500 {
                FailureKind::InvalidRequest
            } else {
                FailureKind::Upstream
            };
            return Self::new(kind, format!("HTTP {status}"));
        };

        let kind = match body.code.as_str() {
            "invalid_request" => FailureKind::InvalidRequest,
            "not_configured" => FailureKind::NotConfigured,
            "transport_abort" => FailureKind::Interrupted,
            _ if status < 500 => FailureKind::InvalidRequest,
            _ => FailureKind::Upstream,
        };
        let detail = if body.detail.is_empty() {
            body.error
        } else {
            body.detail
        };
        Self::new(kind, detail)
    }

    /// Plain-language explanation appended to the conversation.
    #[must_use]
    pub fn user_message(&self) -> String {
        let lead = match self.kind {
            FailureKind::Network => {
                "抱歉，网络好像不太顺畅，老师没有收到您的消息。请检查网络后再发一次试试。"
            }
            FailureKind::InvalidRequest => "抱歉，消息没有发送成功，请重新输入后再试。",
            FailureKind::NotConfigured => {
                "抱歉，AI 老师暂时还没有准备好（服务尚未配置），请联系管理员设置后再试。"
            }
            FailureKind::Upstream => "抱歉，AI 老师这会儿有点忙，没能回答您。请稍后再发一次试试。",
            FailureKind::Interrupted => "抱歉，老师的回答被打断了。请再发一次试试。",
        };
        if self.detail.trim().is_empty() {
            lead.to_string()
        } else {
            format!("{lead}（详情：{}）", self.detail.trim())
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

/// One decoded unit of the proxy stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StreamEvent {
    /// The proxy announced the assistant message id.
    Started(MessageId),
    /// Incremental assistant text.
    Delta(String),
    /// The reply completed.
    Finished,
    /// The exchange failed.
    Failed(Failure),
}

/// A request the caller must send on the session's behalf.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Submission {
    /// Id that stream events for this request must carry.
    pub request_id: u64,
    /// Body for `POST /api/chat`.
    pub request: ChatRequest,
}

#[derive(Debug)]
struct PendingReply {
    request_id: u64,
    announced_id: Option<MessageId>,
    assistant_index: Option<usize>,
}

/// Conversation plus request status.
#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<Message>,
    status: SessionStatus,
    next_request_id: u64,
    pending: Option<PendingReply>,
    last_failure: Option<Failure>,
}

impl ChatSession {
    /// Start a conversation with the coach's greeting.
    #[must_use]
    pub fn new(greeting: Greeting) -> Self {
        Self::restore(vec![Message::assistant(greeting.text())])
    }

    /// Rebuild an idle session from an existing message list.
    #[must_use]
    pub fn restore(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Messages in insertion order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Whether a new message may be submitted.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.status, SessionStatus::Idle)
    }

    /// Wire form of the whole conversation.
    #[must_use]
    pub fn to_request(&self) -> ChatRequest {
        ChatRequest {
            messages: self.messages.clone(),
        }
    }

    /// Append a user message and move to `Submitted`.
    ///
    /// Returns `None`, changing nothing, for blank text or while a request is
    /// outstanding. Identical text is never deduplicated.
    pub fn submit(&mut self, text: &str) -> Option<Submission> {
        if text.trim().is_empty() {
            return None;
        }
        if !self.is_idle() {
            tracing::debug!(status = ?self.status, "ignoring submission while a reply is outstanding");
            return None;
        }

        self.messages.push(Message::user(text));
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.pending = Some(PendingReply {
            request_id,
            announced_id: None,
            assistant_index: None,
        });
        self.status = SessionStatus::Submitted;

        Some(Submission {
            request_id,
            request: self.to_request(),
        })
    }

    /// Fold one stream event into the conversation.
    ///
    /// Returns `false` when the event belongs to no outstanding request.
    pub fn apply(&mut self, request_id: u64, event: StreamEvent) -> bool {
        let Some(pending) = self
            .pending
            .as_mut()
            .filter(|pending| pending.request_id == request_id)
        else {
            tracing::debug!(request_id, "dropping event for a request that is no longer outstanding");
            return false;
        };

        match event {
            StreamEvent::Started(id) => {
                if pending.assistant_index.is_none() {
                    pending.announced_id = Some(id);
                }
            }
            StreamEvent::Delta(delta) => {
                if delta.is_empty() {
                    return true;
                }
                match pending.assistant_index.and_then(|index| self.messages.get_mut(index)) {
                    Some(message) => message.push_text(&delta),
                    None => {
                        self.messages.push(Message {
                            id: pending.announced_id.take().unwrap_or_else(MessageId::generate),
                            role: Role::Assistant,
                            parts: vec![MessagePart::Text { text: delta }],
                        });
                        pending.assistant_index = Some(self.messages.len() - 1);
                    }
                }
                self.status = SessionStatus::Streaming;
            }
            StreamEvent::Finished => {
                let replied = pending.assistant_index.is_some();
                self.finish_request();
                if replied {
                    self.last_failure = None;
                } else {
                    self.report_failure(Failure::empty_reply());
                }
            }
            StreamEvent::Failed(failure) => {
                self.finish_request();
                self.report_failure(failure);
            }
        }
        true
    }

    /// Whether the outstanding request `request_id` has started its reply.
    #[must_use]
    pub fn has_reply(&self, request_id: u64) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| pending.request_id == request_id && pending.assistant_index.is_some())
    }

    /// Abandon the outstanding request only if it is `request_id`.
    ///
    /// Returns `false` when that request is no longer outstanding.
    pub fn abort_request(&mut self, request_id: u64) -> bool {
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.request_id == request_id)
        {
            self.abort()
        } else {
            false
        }
    }

    /// Abandon the outstanding request, keeping any partial reply.
    ///
    /// Returns `false` when nothing was outstanding.
    pub fn abort(&mut self) -> bool {
        if self.pending.is_none() {
            return false;
        }
        tracing::debug!("aborting outstanding chat request");
        self.finish_request();
        true
    }

    fn finish_request(&mut self) {
        self.pending = None;
        self.status = SessionStatus::Idle;
    }

    fn report_failure(&mut self, failure: Failure) {
        if self.last_failure.as_ref() == Some(&failure) {
            tracing::debug!(%failure, "same failure already reported, not repeating it");
            return;
        }
        tracing::warn!(%failure, "chat exchange failed");
        self.messages.push(Message::assistant(failure.user_message()));
        self.last_failure = Some(failure);
    }
}
