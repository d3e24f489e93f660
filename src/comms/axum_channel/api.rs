//! Axum handlers for `/api/*` routes.
//!
//! Each handler receives [`AxumState`] via [`axum::extract::State`] and
//! returns an axum [`Response`].

use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::explorer::{IgnoreReason, SubmitOutcome};
use crate::graph::GraphData;
use crate::graph::svg::render_svg;

use super::AxumState;

/// Upper bound on how long a client waits for an answer. The submit itself
/// keeps running after this fires.
const ASK_TIMEOUT: Duration = Duration::from_secs(180);

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct AskRequest {
    query: String,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /api/health
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    let body = json!({
        "status": "ok",
        "provider": state.comms.provider_name(),
        "busy": state.comms.is_busy(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// POST /api/ask
pub(super) async fn ask(State(state): State<AxumState>, Json(req): Json<AskRequest>) -> Response {
    match tokio::time::timeout(ASK_TIMEOUT, state.comms.submit(&state.channel_id, req.query)).await {
        Ok(Ok(SubmitOutcome::Answered { reply, graph })) => {
            (StatusCode::OK, Json(json!({ "reply": reply, "graph": graph }))).into_response()
        }
        Ok(Ok(SubmitOutcome::Failed { reply })) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": "llm_failed", "message": reply.content, "reply": reply })),
        )
            .into_response(),
        Ok(Ok(SubmitOutcome::Ignored(IgnoreReason::Empty))) => {
            (StatusCode::BAD_REQUEST, json_error("empty_query", "query must not be empty")).into_response()
        }
        Ok(Ok(SubmitOutcome::Ignored(IgnoreReason::Busy))) => {
            (StatusCode::CONFLICT, json_error("busy", "another query is in flight")).into_response()
        }
        Ok(Err(e)) => {
            warn!(channel_id = %state.channel_id, "submit failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, json_error("internal", e)).into_response()
        }
        Err(_) => (
            StatusCode::GATEWAY_TIMEOUT,
            json_error("timeout", "LLM request timed out"),
        )
            .into_response(),
    }
}

/// GET /api/messages
pub(super) async fn messages(State(state): State<AxumState>) -> Response {
    let snapshot = state.comms.snapshot().await;
    let body = json!({ "messages": snapshot.messages, "busy": snapshot.busy });
    (StatusCode::OK, Json(body)).into_response()
}

/// GET /api/graph — the current graph, or an empty one before the first answer.
pub(super) async fn graph(State(state): State<AxumState>) -> Response {
    let graph = state.comms.graph().await.unwrap_or_default();
    (StatusCode::OK, Json(graph)).into_response()
}

/// GET /api/graph.svg
pub(super) async fn graph_svg(State(state): State<AxumState>) -> Response {
    let graph: GraphData = state.comms.graph().await.unwrap_or_default();
    let svg = render_svg(&graph, state.comms.svg_options());
    (StatusCode::OK, [(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response()
}

// ── Tests ────────────────────────────────────────────────────────────────────
