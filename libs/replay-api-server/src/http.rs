use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use replay_api::SourceError;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  REST: GET /  и  GET /api/health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_root() -> impl IntoResponse {
    axum::Json(json!({ "message": "telemetry replay server running" }))
}

pub(crate) async fn handle_health() -> impl IntoResponse {
    axum::Json(json!({ "ok": true }))
}

// ═══════════════════════════════════════════════════════════════
//  REST: GET /api/sessions
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.source().sessions().await {
        Ok(ids) => axum::Json(ids).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "list sessions failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {e}")).into_response()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  REST: GET /api/sessions/{id}
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.scheduler.source().load_session(&id).await {
        Ok(log) => axum::Json(log.records).into_response(),
        Err(e @ SourceError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, format!("error: {e}")).into_response()
        }
        Err(e) => {
            tracing::error!(session = %id, error = %e, "load session failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {e}")).into_response()
        }
    }
}
