//! REST API endpoint handlers for the gateway server.
//!
//! All handlers serve from the live core components via the shared
//! [`AppState`]. Submissions go through the evaluator, which owns
//! validation, cooldowns, and idempotent replay.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/health` | Liveness probe |
//! | `GET` | `/api/snapshot` | Full world snapshot |
//! | `POST` | `/api/actions` | Submit an intervention |
//! | `GET` | `/api/actions/:ref_id` | Stored action record |
//! | `GET` | `/api/ticks` | Recent committed ticks |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};

use pandemos_types::{ActionReceipt, ActionRecord, ActionRequest, TickRecord, WorldSnapshot};

use crate::error::ApiError;
use crate::state::AppState;

/// Default number of ticks returned by `GET /api/ticks`.
const DEFAULT_TICK_LIMIT: usize = 20;

/// Query parameters for the `GET /api/ticks` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct TicksQuery {
    /// Maximum number of ticks to return, newest last (default 20).
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing server status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tick = state.audit.last_tick_id().await;
    let region_count = state.store.len();
    let subscriber_count = state.broadcaster.subscriber_count();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Pandemos Gateway</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        a:hover {{ text-decoration: underline; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        .status {{ color: #3fb950; font-weight: bold; }}
        hr {{ border: none; border-top: 1px solid #30363d; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>Pandemos Gateway</h1>
    <p class="subtitle">Contagion state service</p>

    <p>Status: <span class="status">RUNNING</span></p>

    <div>
        <div class="metric">
            <div class="label">Tick</div>
            <div class="value">{tick}</div>
        </div>
        <div class="metric">
            <div class="label">Regions</div>
            <div class="value">{region_count}</div>
        </div>
        <div class="metric">
            <div class="label">Diff subscribers</div>
            <div class="value">{subscriber_count}</div>
        </div>
    </div>

    <hr>

    <h2>API Endpoints</h2>
    <ul>
        <li>GET <a href="/api/snapshot">/api/snapshot</a> -- Full world snapshot</li>
        <li>POST /api/actions -- Submit an intervention</li>
        <li>GET /api/actions/:ref_id -- Stored action record</li>
        <li>GET <a href="/api/ticks">/api/ticks</a> -- Recent committed ticks (?limit=N)</li>
        <li>GET <a href="/health">/health</a> -- Liveness probe</li>
    </ul>

    <h2>WebSocket</h2>
    <ul>
        <li style="list-style:none;"><code>ws://host:port/ws/diffs</code> -- Live tick diff stream</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness probe reporting the last committed tick.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tick = state.audit.last_tick_id().await;
    Json(serde_json::json!({
        "status": "ok",
        "tick_id": tick,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/snapshot
// ---------------------------------------------------------------------------

/// Return the full world snapshot: one infection level per region plus
/// the last committed tick id.
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<WorldSnapshot> {
    Json(state.world_snapshot().await)
}

// ---------------------------------------------------------------------------
// POST /api/actions
// ---------------------------------------------------------------------------

/// Submit an intervention for evaluation.
///
/// Retries carrying a `ref_id` already in the history receive the
/// stored receipt without re-evaluation, regardless of the rest of the
/// payload.
pub async fn submit_action(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionReceipt>, ApiError> {
    let receipt = state.evaluator.submit(request).await?;
    Ok(Json(receipt))
}

// ---------------------------------------------------------------------------
// GET /api/actions/:ref_id
// ---------------------------------------------------------------------------

/// Fetch the stored record for one evaluated action.
pub async fn get_action(
    State(state): State<Arc<AppState>>,
    Path(ref_id): Path<String>,
) -> Result<Json<ActionRecord>, ApiError> {
    match state.audit.find_action(&ref_id).await {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::NotFound(format!("no action with ref_id {ref_id}"))),
    }
}

// ---------------------------------------------------------------------------
// GET /api/ticks
// ---------------------------------------------------------------------------

/// Return the most recent committed tick records, oldest first.
pub async fn list_ticks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TicksQuery>,
) -> Json<Vec<TickRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_TICK_LIMIT);
    Json(state.audit.recent_ticks(limit).await)
}
