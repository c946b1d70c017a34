// SPDX-License-Identifier: MIT

//! Task handler routes invoked by the external scheduler.
//!
//! These endpoints are called by Cloud Scheduler / cron, not by
//! members; `middleware::tasks_auth` gates them in routes/mod.rs.

use crate::services::sweep::SweepOutcome;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Task handler routes (called by the scheduler).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/auto-checkout", post(auto_checkout))
}

#[derive(Serialize)]
pub struct SweepResponse {
    #[serde(flatten)]
    pub outcome: SweepOutcome,
    pub completed_at: String,
}

/// Run one auto-checkout sweep cycle.
///
/// A fatal store failure returns 500 so the scheduler retries the
/// cycle; already-applied closes from a partial cycle stand and the
/// remainder is picked up on the next run.
async fn auto_checkout(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, StatusCode> {
    match state.sweep.run().await {
        Ok(outcome) => Ok(Json(SweepResponse {
            outcome,
            completed_at: format_utc_rfc3339(chrono::Utc::now()),
        })),
        Err(err) => {
            tracing::error!(error = %err, "Auto-checkout sweep failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
