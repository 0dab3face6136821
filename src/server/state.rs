//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::{ChatConfig, ChatError, CompletionBackend, OpenAiBackend};

/// Shared application state.
///
/// Immutable after startup; every request gets its own upstream call.
pub struct AppState {
    /// Resolved chat configuration.
    pub config: ChatConfig,
    /// Completion backend the proxy forwards to.
    pub backend: Arc<dyn CompletionBackend>,
}

impl AppState {
    /// Create the state with the OpenAI-compatible backend.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: ChatConfig) -> Result<Arc<Self>, ChatError> {
        let backend = OpenAiBackend::new(&config)?;
        tracing::info!(
            endpoint = backend.endpoint(),
            model = config.model(),
            configured = config.is_configured(),
            "chat backend ready"
        );
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Create the state around an arbitrary backend.
    #[must_use]
    pub fn with_backend(config: ChatConfig, backend: Arc<dyn CompletionBackend>) -> Arc<Self> {
        Arc::new(Self { config, backend })
    }
}
