//! Streaming chat proxy: configuration, persona, wire types and the upstream backend.
//!
//! - `config`: explicit backend configuration resolved once at startup
//! - `error`: error taxonomy and the JSON error body
//! - `message`: conversation messages and the request body
//! - `persona`: system prompt and session greetings
//! - `sse`: line buffering and upstream event parsing
//! - `stream`: response framing and the delta relay
//! - `upstream`: the OpenAI-compatible completion backend

pub mod config;
pub mod error;
pub mod message;
pub mod persona;
pub mod sse;
pub mod stream;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ChatConfig, ConfigError, ConfigReport};
pub use error::{ChatError, ErrorBody, UpstreamFailureKind};
pub use message::{ChatRequest, Message, MessageId, MessagePart, Role};
pub use persona::{Greeting, SYSTEM_PROMPT};
pub use stream::{Frame, UiStreamEvent, relay};
pub use upstream::{CompletionBackend, CompletionRequest, DeltaStream, OpenAiBackend};
