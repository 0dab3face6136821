//! HTTP route handlers for the chat proxy.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use tokio::time::Instant;

use crate::chat::error::{UpstreamFailureKind, error_chain};
use crate::chat::{ChatError, ChatRequest, CompletionRequest, MessageId, relay};

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_stream))
        .route("/api/chat/config", get(chat_config))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "vocal-coach",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Configuration diagnostic; never exposes the key.
async fn chat_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.report())
}

/// Log a rejected chat request and hand the error back for the response.
fn rejected(err: ChatError) -> ChatError {
    match &err {
        ChatError::InvalidRequest(_) => tracing::warn!("rejected chat request: {err}"),
        ChatError::NotConfigured => {
            tracing::warn!("chat request refused, backend not configured: {err}");
        }
        ChatError::Upstream { .. } | ChatError::TransportAbort => {
            tracing::error!(code = err.code(), "chat request failed: {}", error_chain(&err));
        }
    }
    err
}

/// Proxy a conversation to the completion backend and stream the reply.
async fn chat_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ChatError> {
    let Json(request) =
        payload.map_err(|rejection| rejected(ChatError::InvalidRequest(rejection.body_text())))?;

    if request.messages.is_empty() {
        return Err(rejected(ChatError::InvalidRequest(
            "messages must be a non-empty list".to_string(),
        )));
    }
    if !state.config.is_configured() {
        return Err(rejected(ChatError::NotConfigured));
    }

    let completion = CompletionRequest::from_conversation(&state.config, &request.messages);
    let deadline = Instant::now() + state.config.request_timeout();
    tracing::info!(
        messages = request.messages.len(),
        model = state.config.model(),
        "forwarding chat request"
    );

    let deltas = tokio::time::timeout_at(deadline, state.backend.stream_completion(completion))
        .await
        .unwrap_or_else(|_| {
            Err(ChatError::upstream(
                UpstreamFailureKind::Timeout,
                "backend did not respond within the request time limit",
            ))
        })
        .map_err(rejected)?;

    let frames = relay(deltas, MessageId::generate(), deadline)
        .map(|frame| Ok::<_, Infallible>(frame.to_sse()));
    Ok(Sse::new(frames).into_response())
}
