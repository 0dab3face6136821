//! OpenAI-compatible completion backend.
//!
//! The proxy talks to the backend through [`CompletionBackend`] so the HTTP
//! handlers can be exercised against scripted backends.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{BoxStream, Stream};
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::config::ChatConfig;
use super::error::{ChatError, UpstreamFailureKind};
use super::message::Message;
use super::sse::{LineBuffer, UpstreamLine, extract_error_summary, parse_upstream_line};

/// Connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body excerpt kept for diagnostics.
const MAX_ERROR_EXCERPT: usize = 300;

/// Ordered text deltas of one completion; ends after the last delta or the first error.
pub type DeltaStream = BoxStream<'static, Result<String, ChatError>>;

/// One message in the backend's expected shape.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct UpstreamMessage {
    /// `system`, `user` or `assistant`.
    pub role: &'static str,
    /// Flattened text content.
    pub content: String,
}

/// Streaming chat-completion request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Persona prompt followed by the conversation.
    pub messages: Vec<UpstreamMessage>,
    /// Always `true`.
    pub stream: bool,
}

impl CompletionRequest {
    /// Prepend the persona prompt to a client conversation.
    #[must_use]
    pub fn from_conversation(config: &ChatConfig, conversation: &[Message]) -> Self {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(UpstreamMessage {
            role: "system",
            content: config.system_prompt().to_string(),
        });
        messages.extend(conversation.iter().map(|message| UpstreamMessage {
            role: message.role.as_str(),
            content: message.text(),
        }));

        Self {
            model: config.model().to_string(),
            messages,
            stream: true,
        }
    }
}

/// A chat-completion service able to stream deltas.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Open a streamed completion.
    ///
    /// Resolves once the backend accepted the request; failures before the
    /// first byte are returned here, later ones inside the stream. Dropping
    /// the stream cancels the upstream call.
    async fn stream_completion(&self, request: CompletionRequest) -> Result<DeltaStream, ChatError>;
}

/// Backend speaking the OpenAI `chat/completions` protocol.
pub struct OpenAiBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    /// Build a backend from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: completions_url(config.base_url()),
            api_key: config.api_key().map(str::to_string),
        })
    }

    /// Full URL of the completions endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<DeltaStream, ChatError> {
        let api_key = self.api_key.as_deref().ok_or(ChatError::NotConfigured)?;

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "opening upstream completion stream"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let bytes = response.bytes_stream().map(|chunk| chunk.map_err(ChatError::from));
        Ok(parse_delta_stream(bytes))
    }
}

/// Join a base URL and the completions path.
#[must_use]
pub fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn status_error(status: StatusCode, body: &str) -> ChatError {
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamFailureKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => UpstreamFailureKind::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => UpstreamFailureKind::Timeout,
        other => UpstreamFailureKind::BadStatus(other.as_u16()),
    };

    let summary = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .unwrap_or_else(|| body.trim().chars().take(MAX_ERROR_EXCERPT).collect());

    let detail = if summary.is_empty() {
        format!("backend returned {status}")
    } else {
        format!("backend returned {status}: {summary}")
    };
    ChatError::upstream(kind, detail)
}

/// Detail reported when the backend closes a stream that carried nothing.
const NO_REPLY_DETAIL: &str = "backend closed the stream without a reply";

/// Turn a raw completion byte stream into ordered text deltas.
///
/// A stream closing without `[DONE]` after at least one delta simply ends.
/// One closing with neither, such as an empty or non-streaming body, yields
/// a `MalformedStream` error. An in-band error payload or a transport error
/// yields one `Err` and ends the stream.
pub fn parse_delta_stream<S, B>(bytes: S) -> DeltaStream
where
    S: Stream<Item = Result<B, ChatError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut lines = LineBuffer::default();
        let mut saw_delta = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            for line in lines.push(chunk.as_ref()) {
                match parse_upstream_line(&line) {
                    UpstreamLine::Delta(delta) => {
                        saw_delta = true;
                        yield Ok(delta);
                    }
                    UpstreamLine::Done => return,
                    UpstreamLine::Error(detail) => {
                        yield Err(ChatError::upstream(UpstreamFailureKind::MalformedStream, detail));
                        return;
                    }
                    UpstreamLine::Skip => {}
                }
            }
        }

        if let Some(line) = lines.finish() {
            match parse_upstream_line(&line) {
                UpstreamLine::Delta(delta) => {
                    saw_delta = true;
                    yield Ok(delta);
                }
                UpstreamLine::Error(detail) => {
                    yield Err(ChatError::upstream(UpstreamFailureKind::MalformedStream, detail));
                    return;
                }
                UpstreamLine::Done => return,
                UpstreamLine::Skip => {}
            }
        }

        if !saw_delta {
            tracing::warn!("upstream stream ended without any delta or [DONE]");
            yield Err(ChatError::upstream(UpstreamFailureKind::MalformedStream, NO_REPLY_DETAIL));
        }
    })
}
