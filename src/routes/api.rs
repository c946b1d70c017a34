// SPDX-License-Identifier: MIT

//! API routes for authenticated members.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{AttendanceRecord, LocationFix, LocationReport, PermissionStatus};
use crate::services::membership::{membership_days_left, membership_status, MembershipStatus};
use crate::services::proximity::{ProximityVerification, VerificationStage};
use crate::services::scan::{RejectReason, ScanOutcome};
use crate::time_utils::{format_duration_hm, format_utc_rfc3339};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const MAX_SESSIONS_PER_PAGE: u32 = 100;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/scan", post(scan))
        .route("/api/location", post(report_location))
        .route("/api/me", get(get_me))
        .route("/api/occupancy", get(get_occupancy))
        .route("/api/sessions", get(get_sessions))
}

// ─── Scan ────────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct ScanRequest {
    /// Raw QR payload
    #[validate(length(min = 1, max = 256))]
    pub code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanResult {
    CheckedIn,
    CheckedOut,
    Rejected,
    Ignored,
}

#[derive(Serialize)]
pub struct RejectionBody {
    #[serde(flatten)]
    pub reason: RejectReason,
    pub message: String,
    pub retryable: bool,
}

#[derive(Serialize)]
pub struct ScanResponse {
    pub result: ScanResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<AttendanceRecord>,
    /// Session duration as "Xh Ym", present on checkout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<ProximityVerification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionBody>,
    /// Verification stages that ran, in emission order
    pub stages: Vec<VerificationStage>,
}

/// Process a scanned QR payload for the authenticated member.
///
/// All domain outcomes (including rejections) are 200 responses; a
/// re-entrant scan returns 409 and touches nothing.
async fn scan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ScanRequest>,
) -> Result<(StatusCode, Json<ScanResponse>)> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut stages: Vec<VerificationStage> = Vec::new();
    let outcome = state
        .scan
        .process_scan(
            &user.member_id,
            &payload.code,
            state.locations.as_ref(),
            &mut |stage| stages.push(stage),
        )
        .await;

    let (status, response) = match outcome {
        ScanOutcome::CheckedIn {
            record,
            verification,
        } => (
            StatusCode::OK,
            ScanResponse {
                result: ScanResult::CheckedIn,
                record: Some(record),
                duration: None,
                verification,
                rejection: None,
                stages,
            },
        ),
        ScanOutcome::CheckedOut {
            record,
            duration,
            verification,
        } => (
            StatusCode::OK,
            ScanResponse {
                result: ScanResult::CheckedOut,
                record: Some(record),
                duration: Some(format_duration_hm(duration)),
                verification,
                rejection: None,
                stages,
            },
        ),
        ScanOutcome::Rejected { reason } => (
            StatusCode::OK,
            ScanResponse {
                result: ScanResult::Rejected,
                record: None,
                duration: None,
                verification: None,
                rejection: Some(RejectionBody {
                    message: reason.message(),
                    retryable: reason.retryable(),
                    reason,
                }),
                stages,
            },
        ),
        ScanOutcome::Ignored => (
            StatusCode::CONFLICT,
            ScanResponse {
                result: ScanResult::Ignored,
                record: None,
                duration: None,
                verification: None,
                rejection: None,
                stages,
            },
        ),
    };

    Ok((status, Json(response)))
}

// ─── Device Location Feed ────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct LocationReportRequest {
    pub permission: PermissionStatus,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[validate(range(min = 0.0))]
    pub accuracy_meters: Option<f64>,
}

#[derive(Serialize)]
pub struct LocationReportResponse {
    pub recorded: bool,
}

/// Record the device's latest position and permission state.
async fn report_location(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<LocationReportRequest>,
) -> Result<Json<LocationReportResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let fix = match (payload.latitude, payload.longitude) {
        (Some(latitude), Some(longitude)) => Some(LocationFix {
            latitude,
            longitude,
            accuracy_meters: payload.accuracy_meters,
        }),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "latitude and longitude must be provided together".to_string(),
            ))
        }
    };

    let report = LocationReport {
        member_id: user.member_id.clone(),
        permission: payload.permission,
        fix,
        reported_at: chrono::Utc::now(),
    };

    state.db.record_location(&report).await?;

    tracing::debug!(member_id = %user.member_id, "Device location recorded");

    Ok(Json(LocationReportResponse { recorded: true }))
}

// ─── Member Profile & Membership ─────────────────────────────

#[derive(Serialize)]
pub struct MeResponse {
    pub member_id: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub membership_end: chrono::NaiveDate,
    pub membership_days_left: i64,
    pub membership_status: MembershipStatus,
}

/// Current member profile with membership expiry status.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let member = state
        .db
        .get_member(&user.member_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Member {} not found", user.member_id)))?;

    let today = chrono::Utc::now().date_naive();
    let days_left = membership_days_left(member.membership_end, today);

    Ok(Json(MeResponse {
        member_id: member.id,
        full_name: member.full_name,
        avatar_url: member.avatar_url,
        membership_end: member.membership_end,
        membership_days_left: days_left,
        membership_status: membership_status(days_left),
    }))
}

// ─── Occupancy ───────────────────────────────────────────────

#[derive(Serialize)]
pub struct OccupancyResponse {
    /// Number of members currently inside
    pub active_count: usize,
}

/// Live occupancy: how many members are currently checked in.
async fn get_occupancy(State(state): State<Arc<AppState>>) -> Result<Json<OccupancyResponse>> {
    let active_count = state.db.count_open_sessions().await?;
    Ok(Json(OccupancyResponse { active_count }))
}

// ─── Session History ─────────────────────────────────────────

#[derive(Deserialize)]
struct SessionsQuery {
    #[serde(default = "default_sessions_limit")]
    limit: u32,
}

fn default_sessions_limit() -> u32 {
    20
}

#[derive(Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub entry_time: String,
    pub exit_time: Option<String>,
    pub status: crate::models::AttendanceStatus,
    /// "Xh Ym", present once the session is completed
    pub duration: Option<String>,
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

/// The member's most recent attendance records, newest first.
async fn get_sessions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<SessionsQuery>,
) -> Result<Json<SessionsResponse>> {
    let limit = params.limit.min(MAX_SESSIONS_PER_PAGE);
    let records = state.db.list_member_sessions(&user.member_id, limit).await?;

    let sessions = records
        .into_iter()
        .map(|record| SessionSummary {
            duration: record.duration().map(format_duration_hm),
            id: record.id,
            entry_time: format_utc_rfc3339(record.entry_time),
            exit_time: record.exit_time.map(format_utc_rfc3339),
            status: record.status,
        })
        .collect();

    Ok(Json(SessionsResponse { sessions }))
}
