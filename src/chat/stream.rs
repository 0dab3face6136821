//! Wire framing of the proxy's response stream and the relay that produces it.
//!
//! Every frame is one `data:` line carrying a JSON event; the stream always
//! ends with `data: [DONE]`:
//!
//! ```text
//! data: {"type":"start","messageId":"…"}
//! data: {"type":"text-start","id":"…"}
//! data: {"type":"text-delta","id":"…","delta":"深呼吸"}
//! data: {"type":"text-end","id":"…"}
//! data: {"type":"finish"}
//! data: [DONE]
//! ```

use axum::response::sse::Event;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::error::{ChatError, UpstreamFailureKind, error_chain};
use super::message::MessageId;
use super::sse::{DONE_SENTINEL, data_payload};
use super::upstream::DeltaStream;

/// One JSON event of the response stream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiStreamEvent {
    /// A new assistant message begins.
    Start {
        /// Id of the assistant message.
        #[serde(rename = "messageId")]
        message_id: MessageId,
    },
    /// A text part begins.
    TextStart {
        /// Id of the text part.
        id: MessageId,
    },
    /// Incremental text.
    TextDelta {
        /// Id of the text part.
        id: MessageId,
        /// The text fragment.
        delta: String,
    },
    /// The text part is complete.
    TextEnd {
        /// Id of the text part.
        id: MessageId,
    },
    /// The response completed successfully.
    Finish,
    /// The response failed after streaming began.
    Error {
        /// Diagnostic text.
        #[serde(rename = "errorText")]
        error_text: String,
    },
}

/// A frame on the wire: an event or the end sentinel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    /// A JSON event.
    Event(UiStreamEvent),
    /// `[DONE]`.
    Done,
}

impl Frame {
    fn payload(&self) -> String {
        match self {
            Self::Event(event) => serde_json::to_string(event).unwrap_or_else(|err| {
                tracing::error!("failed to encode stream event: {err}");
                r#"{"type":"error","errorText":"encoding failure"}"#.to_string()
            }),
            Self::Done => DONE_SENTINEL.to_string(),
        }
    }

    /// Render as an axum SSE event.
    #[must_use]
    pub fn to_sse(&self) -> Event {
        Event::default().data(self.payload())
    }

    /// Render as raw SSE text (`data: …\n\n`).
    #[must_use]
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }

    /// Parse one line of the stream. Non-`data:` and blank lines yield `None`.
    ///
    /// # Errors
    /// Returns the JSON error if a `data:` payload is not a known event.
    pub fn decode_line(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let Some(payload) = data_payload(line.trim()) else {
            return Ok(None);
        };
        if payload == DONE_SENTINEL {
            return Ok(Some(Self::Done));
        }
        if payload.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(payload).map(|event| Some(Self::Event(event)))
    }
}

/// Logs when a relay is dropped before reaching `[DONE]`.
struct RelayGuard {
    message_id: MessageId,
    completed: bool,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if !self.completed {
            tracing::info!(
                message_id = %self.message_id,
                reason = %ChatError::TransportAbort,
                "client went away mid-stream, dropping upstream call"
            );
        }
    }
}

enum Step {
    Delta(String),
    Failed(ChatError),
    Finished,
    TimedOut,
}

/// Relay upstream deltas as wire frames until they end or `deadline` passes.
///
/// The relay owns `deltas`, so dropping the returned stream (client
/// disconnect) drops the upstream connection with it.
pub fn relay(
    mut deltas: DeltaStream,
    message_id: MessageId,
    deadline: Instant,
) -> BoxStream<'static, Frame> {
    Box::pin(async_stream::stream! {
        let mut guard = RelayGuard {
            message_id: message_id.clone(),
            completed: false,
        };
        let text_id = MessageId::generate();

        yield Frame::Event(UiStreamEvent::Start { message_id: message_id.clone() });
        yield Frame::Event(UiStreamEvent::TextStart { id: text_id.clone() });

        let timeout = tokio::time::sleep_until(deadline);
        tokio::pin!(timeout);

        let mut delta_count: usize = 0;
        loop {
            let step = tokio::select! {
                next = deltas.next() => match next {
                    Some(Ok(delta)) => Step::Delta(delta),
                    Some(Err(err)) => Step::Failed(err),
                    None => Step::Finished,
                },
                () = &mut timeout => Step::TimedOut,
            };

            match step {
                Step::Delta(delta) => {
                    delta_count += 1;
                    yield Frame::Event(UiStreamEvent::TextDelta { id: text_id.clone(), delta });
                }
                Step::Finished if delta_count == 0 => {
                    let err = ChatError::upstream(
                        UpstreamFailureKind::MalformedStream,
                        "backend finished without any reply text",
                    );
                    tracing::warn!(message_id = %message_id, "chat stream finished empty");
                    yield Frame::Event(UiStreamEvent::Error { error_text: err.to_string() });
                    break;
                }
                Step::Finished => {
                    tracing::info!(message_id = %message_id, deltas = delta_count, "chat stream finished");
                    yield Frame::Event(UiStreamEvent::TextEnd { id: text_id.clone() });
                    yield Frame::Event(UiStreamEvent::Finish);
                    break;
                }
                Step::Failed(err) => {
                    tracing::error!(
                        message_id = %message_id,
                        code = err.code(),
                        "chat stream failed: {}",
                        error_chain(&err)
                    );
                    yield Frame::Event(UiStreamEvent::Error { error_text: err.to_string() });
                    break;
                }
                Step::TimedOut => {
                    let err = ChatError::upstream(
                        UpstreamFailureKind::Timeout,
                        "response exceeded the request time limit",
                    );
                    tracing::warn!(message_id = %message_id, "chat stream timed out");
                    yield Frame::Event(UiStreamEvent::Error { error_text: err.to_string() });
                    break;
                }
            }
        }

        guard.completed = true;
        yield Frame::Done;
    })
}
