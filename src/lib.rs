//! Streaming chat proxy and client session for an AI vocal coach.
//!
//! The server forwards a conversation to an OpenAI-compatible backend and
//! relays the reply as an event stream; the session module drives a
//! conversation against that server.

// Discipline stricte: les warnings sont des erreurs
#![deny(warnings)]
#![deny(unsafe_code)]
#![deny(missing_docs)] // Tout élément public doit être documenté
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(unused_variables)]
#![deny(unused_must_use)] // Les Result et Option doivent être traités
#![deny(nonstandard_style)]
#![forbid(unsafe_op_in_unsafe_fn)]

// Clippy
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)] // Pas de unwrap() hors des tests
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::print_stdout)] // Les logs passent par tracing
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::cognitive_complexity)]
#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

/// Chat proxy core: configuration, wire types, upstream backend and relay.
#[allow(clippy::module_name_repetitions)]
pub mod chat;
/// HTTP server and API routes.
#[allow(clippy::missing_errors_doc, clippy::unused_async)]
pub mod server;
/// Client-side conversation state and its async driver.
pub mod session;
/// Entry helpers to start the vocal coach server.
pub mod start_vocal_coach;
