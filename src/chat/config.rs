//! Configuration for the chat proxy.
//!
//! Resolved once at startup and injected into the handlers through
//! [`crate::server::AppState`]. Nothing reads the environment after that.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use super::persona::SYSTEM_PROMPT;

/// Environment variable holding the backend base URL.
pub const BASE_URL_ENV: &str = "OPENAI_API_BASE";
/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable holding the model identifier.
pub const MODEL_ENV: &str = "OPENAI_CHAT_MODEL";
/// Environment variable overriding the request ceiling in seconds.
pub const TIMEOUT_ENV: &str = "VOCAL_COACH_TIMEOUT_SECS";

/// Public OpenAI-compatible endpoint used when no base URL is set.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Model used when none is set.
pub const DEFAULT_MODEL: &str = "gpt-4o";
/// Hard ceiling for one request, stream included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The base URL is not a valid URL.
    #[error("invalid OPENAI_API_BASE: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    /// A numeric setting could not be parsed or is out of range.
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// Setting name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Upstream chat backend configuration.
#[derive(Clone)]
pub struct ChatConfig {
    base_url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    request_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ChatConfig {
    /// Resolve configuration from the process environment.
    ///
    /// # Errors
    /// Returns an error if a value is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve configuration through an arbitrary lookup.
    ///
    /// Blank values count as unset.
    ///
    /// # Errors
    /// Returns an error if a value is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(base_url) = read(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        config.api_key = read(API_KEY_ENV);
        if let Some(model) = read(MODEL_ENV) {
            config.model = model;
        }
        if let Some(raw) = read(TIMEOUT_ENV) {
            let secs = raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: TIMEOUT_ENV,
                    value: raw,
                })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if the base URL does not parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url)?;
        Ok(())
    }

    /// Set the backend base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    /// Set the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the request ceiling.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Backend base URL, e.g. `https://api.openai.com/v1`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// API key, if configured.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Persona system prompt.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Hard ceiling for one request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Whether an API key is present.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Diagnostic summary that never carries the secret.
    #[must_use]
    pub fn report(&self) -> ConfigReport {
        ConfigReport {
            configured: self.is_configured(),
            has_api_key: self.api_key.is_some(),
            has_base_url: !self.base_url.is_empty(),
            model: self.model.clone(),
            hint: (!self.is_configured()).then(|| {
                format!("请在项目根目录 .env 中设置 {API_KEY_ENV}，保存后重启服务")
            }),
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Body of `GET /api/chat/config`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReport {
    /// Whether chat requests can be served.
    pub configured: bool,
    /// Whether an API key is set.
    pub has_api_key: bool,
    /// Whether a base URL is set.
    pub has_base_url: bool,
    /// Model in use.
    pub model: String,
    /// Setup hint when unconfigured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}
