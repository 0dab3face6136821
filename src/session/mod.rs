//! Client side of a chat: the conversation state and the driver that talks to
//! the proxy.
//!
//! [`ChatSession`] is a pure state machine. [`SessionController`] owns one,
//! sends its submissions through a [`ProxyClient`] and folds the decoded
//! stream back in, with abort and close support.

pub mod controller;
pub mod state;

pub use controller::{
    ClientError, DEFAULT_CLIENT_TIMEOUT, ProxyClient, SendOutcome, SessionController, decode_events,
};
pub use state::{ChatSession, Failure, FailureKind, SessionStatus, StreamEvent, Submission};
