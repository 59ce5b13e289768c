//! Age-based cleanup sweep handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CleanupResponse {
    pub deleted: usize,
}

/// `GET /cleanup` and `POST /cleanup` — delete files older than the
/// retention threshold; individual failures are skipped, not fatal.
pub async fn run_cleanup(State(state): State<AppState>) -> ApiResult<Json<CleanupResponse>> {
    let retention = state.config.retention;
    let store = state.store.clone();

    // The sweep is blocking filesystem work.
    let deleted = tokio::task::spawn_blocking(move || store.cleanup_older_than(retention))
        .await
        .unwrap_or(0);

    if deleted > 0 {
        info!(deleted, "Cleanup sweep removed expired downloads");
    }
    Ok(Json(CleanupResponse { deleted }))
}
