// SPDX-License-Identifier: MIT

//! Scheduler authentication middleware for `/tasks/*` routes.
//!
//! The sweep endpoint is called by an external scheduler (Cloud
//! Scheduler, cron), never by members. The scheduler presents a
//! static bearer token configured at deploy time.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Require the scheduler bearer token on `/tasks/*` routes.
pub async fn require_tasks_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == state.config.sweep_auth_token => Ok(next.run(request).await),
        _ => {
            tracing::warn!("Blocked tasks request without valid scheduler token");
            Err(StatusCode::FORBIDDEN)
        }
    }
}
