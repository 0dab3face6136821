//! Error types for the chat proxy.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hint shown when the backend has no API key.
pub const NOT_CONFIGURED_HINT: &str =
    "请在项目根目录 .env 中设置 OPENAI_API_KEY，保存后重启服务";

/// Hint shown when the upstream backend call fails.
pub const UPSTREAM_HINT: &str =
    "请检查 OPENAI_API_KEY 与 OPENAI_API_BASE 配置是否正确，或稍后再试";

/// What went wrong while talking to the upstream backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpstreamFailureKind {
    /// Connection could not be established or broke mid-flight.
    Network,
    /// The backend rejected the credentials (401/403).
    Auth,
    /// The backend is rate limiting us (429).
    RateLimited,
    /// The request exceeded the configured ceiling.
    Timeout,
    /// Any other non-success status.
    BadStatus(u16),
    /// The backend sent something that is not a completion stream.
    MalformedStream,
}

impl fmt::Display for UpstreamFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::Auth => write!(f, "authentication rejected"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Timeout => write!(f, "timed out"),
            Self::BadStatus(status) => write!(f, "status {status}"),
            Self::MalformedStream => write!(f, "malformed stream"),
        }
    }
}

/// Errors produced by the chat proxy.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The client payload is missing, malformed or empty.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No API key is configured for the upstream backend.
    #[error("chat backend is not configured: OPENAI_API_KEY is missing")]
    NotConfigured,

    /// The upstream completion backend failed.
    #[error("upstream {kind}: {detail}")]
    Upstream {
        /// Failure category.
        kind: UpstreamFailureKind,
        /// Diagnostic text, never containing credentials.
        detail: String,
    },

    /// The stream was cancelled by either side.
    #[error("stream aborted")]
    TransportAbort,
}

impl ChatError {
    /// Build an upstream failure.
    #[must_use]
    pub fn upstream(kind: UpstreamFailureKind, detail: impl Into<String>) -> Self {
        Self::Upstream {
            kind,
            detail: detail.into(),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotConfigured | Self::Upstream { .. } | Self::TransportAbort => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotConfigured => "not_configured",
            Self::Upstream { .. } => "upstream_failure",
            Self::TransportAbort => "transport_abort",
        }
    }

    /// Human-readable category label shown to users.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "请求格式错误",
            Self::NotConfigured => "AI 服务未配置",
            Self::Upstream { .. } => "AI 服务调用失败",
            Self::TransportAbort => "连接已中断",
        }
    }

    /// Remediation hint, when one applies.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotConfigured => Some(NOT_CONFIGURED_HINT),
            Self::Upstream { .. } => Some(UPSTREAM_HINT),
            Self::InvalidRequest(_) | Self::TransportAbort => None,
        }
    }

    /// Structured payload returned to clients.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.label().to_string(),
            code: self.code().to_string(),
            detail: self.to_string(),
            hint: self.hint().map(str::to_string),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            UpstreamFailureKind::Timeout
        } else if err.is_decode() || err.is_body() {
            UpstreamFailureKind::MalformedStream
        } else {
            UpstreamFailureKind::Network
        };
        Self::upstream(kind, error_chain(&err))
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_body())).into_response()
    }
}

/// JSON error payload: `{ error, code, detail, hint? }`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Category label.
    pub error: String,
    /// Machine-readable code.
    #[serde(default)]
    pub code: String,
    /// Diagnostic detail.
    #[serde(default)]
    pub detail: String,
    /// Remediation hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Render an error with its source chain, e.g. `error sending request: connection refused`.
#[must_use]
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ChatError::InvalidRequest("empty".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ChatError::NotConfigured.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ChatError::upstream(UpstreamFailureKind::RateLimited, "slow down").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_configured_body() {
        let body = ChatError::NotConfigured.to_body();
        assert_eq!(body.error, "AI 服务未配置");
        assert_eq!(body.code, "not_configured");
        assert_eq!(body.hint.as_deref(), Some(NOT_CONFIGURED_HINT));
        assert!(body.detail.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_invalid_request_has_no_hint() {
        let body = ChatError::InvalidRequest("messages must not be empty".to_string()).to_body();
        assert!(body.hint.is_none());
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("hint").is_none());
        assert_eq!(json["detail"], "invalid request: messages must not be empty");
    }

    #[test]
    fn test_upstream_display() {
        let err = ChatError::upstream(UpstreamFailureKind::BadStatus(502), "bad gateway");
        assert_eq!(err.to_string(), "upstream status 502: bad gateway");
    }

    #[test]
    fn test_error_chain_includes_causes() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(error_chain(&io), "refused");
    }
}
