//! Gateway API for the Pandemos contagion service.
//!
//! Exposes the core components over HTTP and `WebSocket`: snapshot and
//! history queries, idempotent action submission, and a live stream of
//! committed tick diffs. The API holds shared handles into
//! `pandemos-core`; it owns no state of its own.
//!
//! # Modules
//!
//! - [`state`] -- Shared [`AppState`](state::AppState) behind Axum's `State` extractor
//! - [`handlers`] -- REST endpoint handlers
//! - [`ws`] -- `WebSocket` tick diff stream
//! - [`router`] -- Route assembly and middleware
//! - [`server`] -- TCP bind and serve lifecycle
//! - [`error`] -- HTTP error mapping

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
