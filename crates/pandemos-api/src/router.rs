//! Axum router construction for the gateway API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the gateway server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /health` -- liveness probe
/// - `GET /ws/diffs` -- `WebSocket` tick diff stream
/// - `GET /api/snapshot` -- full world snapshot
/// - `POST /api/actions` -- submit an intervention
/// - `GET /api/actions/:ref_id` -- stored action record
/// - `GET /api/ticks` -- recent committed ticks
///
/// CORS is configured to allow any origin for development. In
/// production this should be restricted.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        // WebSocket
        .route("/ws/diffs", get(ws::ws_diffs))
        // REST API
        .route("/api/snapshot", get(handlers::get_snapshot))
        .route("/api/actions", post(handlers::submit_action))
        .route("/api/actions/{ref_id}", get(handlers::get_action))
        .route("/api/ticks", get(handlers::list_ticks))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
