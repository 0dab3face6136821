//! Async driver that connects a [`ChatSession`] to the proxy over HTTP.

use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::{BoxStream, Stream};
use reqwest::Client;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::chat::error::{ErrorBody, error_chain};
use crate::chat::sse::LineBuffer;
use crate::chat::{ChatRequest, Frame, Greeting, Message, UiStreamEvent};

use super::state::{ChatSession, Failure, FailureKind, SessionStatus, StreamEvent, Submission};

/// Client-side ceiling used by [`ProxyClient::new`].
///
/// Must stay above the proxy's own request ceiling (`VOCAL_COACH_TIMEOUT_SECS`,
/// 60 s by default), otherwise the client cuts replies off first. Proxies
/// running with a longer ceiling need [`ProxyClient::with_timeout`].
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(65);

/// Errors building a proxy client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The proxy URL is invalid.
    #[error("invalid proxy url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// HTTP client for `POST /api/chat`.
#[derive(Clone, Debug)]
pub struct ProxyClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl ProxyClient {
    /// Build a client for the proxy served at `base_url`, e.g. `http://127.0.0.1:3000`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_CLIENT_TIMEOUT)
    }

    /// Build a client with an explicit per-exchange ceiling.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let endpoint = Url::parse(base_url)?.join("api/chat")?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    /// Chat endpoint URL.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Ceiling applied to one exchange.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a conversation and return its decoded event stream.
    ///
    /// The stream always ends with exactly one `Finished` or `Failed` event.
    /// Dropping it closes the connection.
    ///
    /// # Errors
    /// Returns the failure when the proxy is unreachable or answers with an error status.
    pub async fn open(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, StreamEvent>, Failure> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|err| Failure::new(FailureKind::Network, error_chain(&err)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.ok();
            return Err(Failure::from_response(status.as_u16(), body));
        }

        Ok(decode_events(response.bytes_stream()))
    }
}

enum LineAction {
    Emit(StreamEvent),
    Terminal(StreamEvent),
    Done,
}

fn classify(line: &str) -> Option<LineAction> {
    let frame = match Frame::decode_line(line) {
        Ok(frame) => frame?,
        Err(err) => {
            tracing::warn!("skipping unrecognised stream line: {err}");
            return None;
        }
    };

    match frame {
        Frame::Done => Some(LineAction::Done),
        Frame::Event(UiStreamEvent::Start { message_id }) => {
            Some(LineAction::Emit(StreamEvent::Started(message_id)))
        }
        Frame::Event(UiStreamEvent::TextDelta { delta, .. }) => {
            Some(LineAction::Emit(StreamEvent::Delta(delta)))
        }
        Frame::Event(UiStreamEvent::Finish) => Some(LineAction::Terminal(StreamEvent::Finished)),
        Frame::Event(UiStreamEvent::Error { error_text }) => Some(LineAction::Terminal(
            StreamEvent::Failed(Failure::new(FailureKind::Upstream, error_text)),
        )),
        Frame::Event(UiStreamEvent::TextStart { .. } | UiStreamEvent::TextEnd { .. }) => None,
    }
}

/// Decode the proxy's framing into session events.
///
/// Ends with exactly one terminal event: the announced finish or error at
/// `[DONE]`, or `Interrupted` if the body stops early.
pub fn decode_events<S, B, E>(bytes: S) -> BoxStream<'static, StreamEvent>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut lines = LineBuffer::default();
        let mut terminal: Option<StreamEvent> = None;
        let mut transport_error: Option<String> = None;

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    transport_error = Some(err.to_string());
                    break;
                }
            };

            for line in lines.push(chunk.as_ref()) {
                match classify(&line) {
                    Some(LineAction::Emit(event)) => {
                        yield event;
                    }
                    Some(LineAction::Terminal(event)) => {
                        if terminal.is_none() {
                            terminal = Some(event);
                        }
                    }
                    Some(LineAction::Done) => {
                        yield terminal.take().unwrap_or(StreamEvent::Finished);
                        return;
                    }
                    None => {}
                }
            }
        }

        if transport_error.is_none() {
            if let Some(line) = lines.finish() {
                match classify(&line) {
                    Some(LineAction::Emit(event)) => {
                        yield event;
                    }
                    Some(LineAction::Terminal(event)) => {
                        if terminal.is_none() {
                            terminal = Some(event);
                        }
                    }
                    Some(LineAction::Done) => {
                        yield terminal.take().unwrap_or(StreamEvent::Finished);
                        return;
                    }
                    None => {}
                }
            }
        }

        yield match terminal {
            Some(event) => event,
            None => StreamEvent::Failed(Failure::new(
                FailureKind::Interrupted,
                transport_error.unwrap_or_else(|| "stream ended before completion".to_string()),
            )),
        };
    })
}

/// How a `send_message` call ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    /// The reply streamed to completion.
    Completed,
    /// Nothing was sent: blank text, a reply already in flight, or a closed session.
    Rejected,
    /// The exchange failed; an explanation was appended unless it repeats the previous one.
    Failed(Failure),
    /// The request was aborted.
    Cancelled,
}

/// Cancel handle of the outstanding request, tagged with its request id.
type InflightSlot = Option<(u64, CancellationToken)>;

/// Drives one chat session against the proxy.
///
/// Session state sits behind a mutex that is never held across an await, so
/// a UI can read [`SessionController::messages`] while a reply streams in.
/// When both locks are needed, the session lock is taken first.
pub struct SessionController {
    session: Mutex<ChatSession>,
    client: ProxyClient,
    shutdown: CancellationToken,
    inflight: Mutex<InflightSlot>,
}

impl SessionController {
    /// Start a fresh session with the given greeting.
    #[must_use]
    pub fn new(client: ProxyClient, greeting: Greeting) -> Self {
        Self::with_session(client, ChatSession::new(greeting))
    }

    /// Drive an existing session.
    #[must_use]
    pub fn with_session(client: ProxyClient, session: ChatSession) -> Self {
        Self {
            session: Mutex::new(session),
            client,
            shutdown: CancellationToken::new(),
            inflight: Mutex::new(None),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, ChatSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_inflight(&self) -> MutexGuard<'_, InflightSlot> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the conversation, partial reply included.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.lock_session().messages().to_vec()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.lock_session().status()
    }

    /// Send a user turn and stream the reply into the conversation.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let Some((submission, token)) = self.begin(text) else {
            return SendOutcome::Rejected;
        };

        let request_id = submission.request_id;
        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => SendOutcome::Cancelled,
            outcome = self.drive(submission, &token) => outcome,
        };

        if outcome == SendOutcome::Cancelled {
            tracing::debug!(request_id, "chat request cancelled");
            self.lock_session().abort_request(request_id);
        }
        self.release(request_id);
        outcome
    }

    /// Submit the text and register its cancel handle in one critical section.
    fn begin(&self, text: &str) -> Option<(Submission, CancellationToken)> {
        let mut session = self.lock_session();
        if self.shutdown.is_cancelled() {
            return None;
        }
        let submission = session.submit(text)?;
        let token = self.shutdown.child_token();
        *self.lock_inflight() = Some((submission.request_id, token.clone()));
        Some((submission, token))
    }

    /// Forget the cancel handle of `request_id`, leaving a newer one in place.
    fn release(&self, request_id: u64) {
        let mut slot = self.lock_inflight();
        if slot.as_ref().is_some_and(|(id, _)| *id == request_id) {
            *slot = None;
        }
    }

    async fn drive(&self, submission: Submission, token: &CancellationToken) -> SendOutcome {
        let Submission {
            request_id,
            request,
        } = submission;

        if token.is_cancelled() {
            return SendOutcome::Cancelled;
        }

        let mut events = match self.client.open(&request).await {
            Ok(events) => events,
            Err(failure) => {
                self.lock_session()
                    .apply(request_id, StreamEvent::Failed(failure.clone()));
                return SendOutcome::Failed(failure);
            }
        };

        while let Some(event) = events.next().await {
            let (applied, outcome) = {
                let mut session = self.lock_session();
                let outcome = match &event {
                    StreamEvent::Finished if session.has_reply(request_id) => {
                        Some(SendOutcome::Completed)
                    }
                    StreamEvent::Finished => Some(SendOutcome::Failed(Failure::empty_reply())),
                    StreamEvent::Failed(failure) => Some(SendOutcome::Failed(failure.clone())),
                    StreamEvent::Started(_) | StreamEvent::Delta(_) => None,
                };
                (session.apply(request_id, event), outcome)
            };
            if !applied {
                return SendOutcome::Cancelled;
            }
            if let Some(outcome) = outcome {
                return outcome;
            }
        }
        SendOutcome::Completed
    }

    /// Abort the in-flight request, if any. Its remaining events are discarded.
    pub fn abort(&self) -> bool {
        let mut session = self.lock_session();
        if let Some((request_id, token)) = self.lock_inflight().take() {
            tracing::debug!(request_id, "cancelling in-flight chat request");
            token.cancel();
        }
        session.abort()
    }

    /// Close the session: abort the in-flight request and reject further sends.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::stream;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::chat::ChatConfig;
    use crate::chat::testing::{Script, ScriptedBackend};
    use crate::chat::{MessageId, Role};
    use crate::server::{AppState, create_router};

    async fn spawn_proxy(config: ChatConfig, backend: Arc<ScriptedBackend>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(AppState::with_backend(config, backend));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn configured() -> ChatConfig {
        ChatConfig::default().with_api_key("sk-test")
    }

    fn frames_body(frames: &[Frame]) -> String {
        frames.iter().map(Frame::encode).collect()
    }

    async fn decode_all(chunks: Vec<Result<String, String>>) -> Vec<StreamEvent> {
        decode_events(stream::iter(chunks)).collect().await
    }

    fn count_containing(controller: &SessionController, needle: &str) -> usize {
        controller
            .messages()
            .iter()
            .filter(|message| message.role == Role::Assistant && message.text().contains(needle))
            .count()
    }

    #[test]
    fn test_endpoint_join() {
        let client = ProxyClient::new("http://127.0.0.1:3000").unwrap();
        assert_eq!(client.endpoint().as_str(), "http://127.0.0.1:3000/api/chat");
        assert!(ProxyClient::new("not a url").is_err());
    }

    #[test]
    fn test_client_timeout_is_configurable() {
        let client = ProxyClient::new("http://127.0.0.1:3000").unwrap();
        assert_eq!(client.timeout(), DEFAULT_CLIENT_TIMEOUT);

        let patient =
            ProxyClient::with_timeout("http://127.0.0.1:3000", Duration::from_secs(180)).unwrap();
        assert_eq!(patient.timeout(), Duration::from_secs(180));
        assert_eq!(patient.endpoint(), client.endpoint());
    }

    #[test]
    fn test_finished_request_does_not_clear_newer_cancel_handle() {
        let controller = SessionController::new(
            ProxyClient::new("http://127.0.0.1:9").unwrap(),
            Greeting::Default,
        );

        let (first, first_token) = controller.begin("第一个问题").unwrap();
        assert!(
            controller
                .lock_session()
                .apply(first.request_id, StreamEvent::Delta("好".to_string()))
        );
        assert!(controller.lock_session().apply(first.request_id, StreamEvent::Finished));

        // A second send slips in before the first call releases its handle.
        let (second, second_token) = controller.begin("第二个问题").unwrap();
        controller.release(first.request_id);

        assert!(controller.abort());
        assert!(second_token.is_cancelled());
        assert!(!first_token.is_cancelled());
        assert_eq!(controller.status(), SessionStatus::Idle);

        controller.release(second.request_id);
        assert!(controller.lock_inflight().is_none());
    }

    #[tokio::test]
    async fn test_abort_before_open_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let controller =
            SessionController::new(ProxyClient::new(&server.uri()).unwrap(), Greeting::Default);
        let (submission, token) = controller.begin("你好").unwrap();
        assert!(controller.abort());
        assert!(token.is_cancelled());

        assert_eq!(controller.drive(submission, &token).await, SendOutcome::Cancelled);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_is_reported() {
        let backend = ScriptedBackend::new(Script::Deltas(Vec::new()));
        let base = spawn_proxy(configured(), backend.clone()).await;
        let controller =
            SessionController::new(ProxyClient::new(&base).unwrap(), Greeting::Default);

        match controller.send_message("老师好").await {
            SendOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Upstream),
            other => panic!("expected failure, got {other:?}"),
        }

        let messages = controller.messages();
        assert_eq!(messages.len(), 3);
        let last = messages.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.text().contains("有点忙"));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_decode_events_success() {
        let body = frames_body(&[
            Frame::Event(UiStreamEvent::Start {
                message_id: MessageId::from("m1"),
            }),
            Frame::Event(UiStreamEvent::TextStart {
                id: MessageId::from("t1"),
            }),
            Frame::Event(UiStreamEvent::TextDelta {
                id: MessageId::from("t1"),
                delta: "放松".to_string(),
            }),
            Frame::Event(UiStreamEvent::TextEnd {
                id: MessageId::from("t1"),
            }),
            Frame::Event(UiStreamEvent::Finish),
            Frame::Done,
        ]);
        let (head, tail) = body.split_at(body.len() / 2);
        let events = decode_all(vec![Ok(head.to_string()), Ok(tail.to_string())]).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Started(MessageId::from("m1")),
                StreamEvent::Delta("放松".to_string()),
                StreamEvent::Finished,
            ]
        );
    }

    #[tokio::test]
    async fn test_decode_events_error_and_interruption() {
        let body = frames_body(&[
            Frame::Event(UiStreamEvent::Error {
                error_text: "upstream timed out".to_string(),
            }),
            Frame::Done,
        ]);
        let events = decode_all(vec![Ok(body)]).await;
        assert_eq!(
            events,
            vec![StreamEvent::Failed(Failure::new(
                FailureKind::Upstream,
                "upstream timed out"
            ))]
        );

        let cut = frames_body(&[Frame::Event(UiStreamEvent::TextDelta {
            id: MessageId::from("t1"),
            delta: "一半".to_string(),
        })]);
        let events = decode_all(vec![Ok(cut), Err("connection reset".to_string())]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            StreamEvent::Failed(Failure::new(FailureKind::Interrupted, "connection reset"))
        );
    }

    #[tokio::test]
    async fn test_end_to_end_reply() {
        let backend = ScriptedBackend::new(Script::Deltas(vec!["每天", "练习", "五分钟"]));
        let base = spawn_proxy(configured(), backend.clone()).await;
        let controller =
            SessionController::new(ProxyClient::new(&base).unwrap(), Greeting::Default);

        assert_eq!(controller.send_message("怎么练气息？").await, SendOutcome::Completed);

        let messages = controller.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[2].text(), "每天练习五分钟");
        assert_eq!(controller.status(), SessionStatus::Idle);

        let forwarded = backend.last_request().unwrap();
        assert_eq!(forwarded.messages.len(), 3);
        assert_eq!(forwarded.messages[1].content, Greeting::Default.text());
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let backend = ScriptedBackend::new(Script::Deltas(vec!["unused"]));
        let base = spawn_proxy(configured(), backend.clone()).await;
        let controller =
            SessionController::new(ProxyClient::new(&base).unwrap(), Greeting::Default);

        assert_eq!(controller.send_message("  ").await, SendOutcome::Rejected);
        assert_eq!(controller.messages().len(), 1);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_not_configured_reported_once() {
        let backend = ScriptedBackend::new(Script::Deltas(vec!["unused"]));
        let base = spawn_proxy(ChatConfig::default(), backend.clone()).await;
        let controller =
            SessionController::new(ProxyClient::new(&base).unwrap(), Greeting::Default);

        for _ in 0..3 {
            match controller.send_message("老师在吗").await {
                SendOutcome::Failed(failure) => {
                    assert_eq!(failure.kind, FailureKind::NotConfigured);
                }
                other => panic!("expected failure, got {other:?}"),
            }
        }

        assert_eq!(count_containing(&controller, "尚未配置"), 1);
        let users = controller
            .messages()
            .iter()
            .filter(|message| message.role == Role::User)
            .count();
        assert_eq!(users, 3);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_proxy_is_network_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let controller = SessionController::new(
            ProxyClient::new(&format!("http://{addr}")).unwrap(),
            Greeting::AfterEvaluation,
        );
        match controller.send_message("你好").await {
            SendOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Network),
            other => panic!("expected network failure, got {other:?}"),
        }
        assert_eq!(count_containing(&controller, "网络"), 1);
        assert!(controller.status() == SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_midstream_error_from_proxy() {
        let server = MockServer::start().await;
        let body = frames_body(&[
            Frame::Event(UiStreamEvent::Start {
                message_id: MessageId::from("m1"),
            }),
            Frame::Event(UiStreamEvent::TextDelta {
                id: MessageId::from("t1"),
                delta: "先".to_string(),
            }),
            Frame::Event(UiStreamEvent::Error {
                error_text: "upstream network error: reset".to_string(),
            }),
            Frame::Done,
        ]);
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let controller =
            SessionController::new(ProxyClient::new(&server.uri()).unwrap(), Greeting::Default);
        for _ in 0..2 {
            assert!(matches!(
                controller.send_message("继续").await,
                SendOutcome::Failed(Failure {
                    kind: FailureKind::Upstream,
                    ..
                })
            ));
        }

        assert_eq!(count_containing(&controller, "有点忙"), 1);
        let partials = controller
            .messages()
            .iter()
            .filter(|message| message.text() == "先")
            .count();
        assert_eq!(partials, 2);
    }

    #[tokio::test]
    async fn test_error_status_from_proxy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": "AI 服务调用失败",
                "code": "upstream_failure",
                "detail": "upstream rate limited: backend returned 429",
                "hint": "check configuration"
            })))
            .mount(&server)
            .await;

        let controller =
            SessionController::new(ProxyClient::new(&server.uri()).unwrap(), Greeting::Default);
        match controller.send_message("你好").await {
            SendOutcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::Upstream);
                assert!(failure.detail.contains("429"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(count_containing(&controller, "429"), 1);
    }

    #[tokio::test]
    async fn test_busy_session_rejects_and_abort_cancels() {
        let backend = ScriptedBackend::new(Script::Hang(vec!["第一句"]));
        let base = spawn_proxy(configured(), backend.clone()).await;
        let controller = Arc::new(SessionController::new(
            ProxyClient::new(&base).unwrap(),
            Greeting::Default,
        ));

        let first = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.send_message("第一个问题").await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while controller.status() != SessionStatus::Streaming {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(controller.send_message("第二个问题").await, SendOutcome::Rejected);

        assert!(controller.abort());
        assert_eq!(first.await.unwrap(), SendOutcome::Cancelled);
        assert_eq!(controller.status(), SessionStatus::Idle);

        let texts: Vec<String> = controller.messages().iter().map(Message::text).collect();
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[1], "第一个问题");
        assert_eq!(texts[2], "第一句");

        tokio::time::timeout(Duration::from_secs(5), async {
            while !backend.stream_dropped() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_sends() {
        let backend = ScriptedBackend::new(Script::Deltas(vec!["unused"]));
        let base = spawn_proxy(configured(), backend.clone()).await;
        let controller =
            SessionController::new(ProxyClient::new(&base).unwrap(), Greeting::Default);

        controller.close();
        assert_eq!(controller.send_message("还在吗").await, SendOutcome::Rejected);
        assert_eq!(backend.calls(), 0);
    }
}
