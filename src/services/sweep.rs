// SPDX-License-Identifier: MIT

//! Background auto-checkout sweep.
//!
//! Safety net for members who leave without scanning out: every open
//! session older than the time threshold whose owner is measurably
//! away from the gym is force-closed. The sweep is invoked by an
//! external scheduler (Cloud Scheduler, cron) on a best-effort
//! interval; it owns no timing of its own, is idempotent, and is safe
//! to skip, delay, or re-invoke.

use crate::config::GymZoneConfig;
use crate::db::Store;
use crate::error::AppError;
use crate::models::AttendanceRecord;
use crate::services::geofence::{haversine_distance_meters, round_tenths};
use crate::services::location::LocationProvider;
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Bound on concurrent per-record location reads within one cycle.
const MAX_CONCURRENT_RECORDS: usize = 8;

/// Sweep thresholds.
#[derive(Debug, Clone)]
pub struct AutoCheckoutConfig {
    /// Minimum session age before a record may be force-closed
    pub max_session: chrono::Duration,
    /// Distance beyond which an eligible session is force-closed
    pub max_distance_meters: f64,
    /// Per-record bound on the location sample; slower reads skip the
    /// record rather than stall the whole cycle
    pub location_timeout: Duration,
}

impl Default for AutoCheckoutConfig {
    fn default() -> Self {
        Self {
            max_session: chrono::Duration::hours(3),
            max_distance_meters: 100.0,
            location_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of one sweep invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    /// No open sessions existed.
    NoOpenSessions,
    /// Open sessions were evaluated but none qualified for closing.
    NoneClosed { evaluated: usize },
    /// `closed` sessions were force-closed out of `evaluated`.
    Closed { closed: usize, evaluated: usize },
    /// A previous invocation is still running; nothing was done.
    AlreadyRunning,
}

/// Periodic reconciliation of abandoned sessions.
pub struct AutoCheckoutSweep {
    store: Arc<dyn Store>,
    provider: Arc<dyn LocationProvider>,
    zone: GymZoneConfig,
    config: AutoCheckoutConfig,
    /// Run-in-progress guard for hosts that overlap invocations
    running: tokio::sync::Mutex<()>,
}

impl AutoCheckoutSweep {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn LocationProvider>,
        zone: GymZoneConfig,
        config: AutoCheckoutConfig,
    ) -> Self {
        Self {
            store,
            provider,
            zone,
            config,
            running: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one sweep cycle.
    ///
    /// A store failure while listing open sessions is fatal for the
    /// cycle (`Err`); per-record failures are logged and skipped so
    /// one member's problem never blocks the others. A record whose
    /// location cannot be sampled is left open: absence of evidence
    /// is not evidence of absence.
    pub async fn run(&self) -> Result<SweepOutcome, AppError> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Sweep invocation overlapped a running cycle, skipping");
                return Ok(SweepOutcome::AlreadyRunning);
            }
        };

        let open = self.store.list_open_sessions().await?;
        if open.is_empty() {
            tracing::debug!("Sweep: no open sessions");
            return Ok(SweepOutcome::NoOpenSessions);
        }

        let now = Utc::now();
        let evaluated = open.len();

        // Each record's outcome depends only on its own entry time and
        // location sample, so records are processed independently; one
        // member's failure never blocks the others.
        let closed = stream::iter(open)
            .map(|record| async move {
                match self.process_record(&record, now).await {
                    Ok(closed) => closed,
                    Err(err) => {
                        tracing::error!(
                            member_id = %record.member_id,
                            record_id = %record.id,
                            error = %err,
                            "Sweep failed to process record"
                        );
                        false
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_RECORDS)
            .filter(|closed| futures_util::future::ready(*closed))
            .count()
            .await;

        tracing::info!(evaluated, closed, "Sweep cycle complete");

        if closed > 0 {
            Ok(SweepOutcome::Closed { closed, evaluated })
        } else {
            Ok(SweepOutcome::NoneClosed { evaluated })
        }
    }

    /// Evaluate one open session; returns whether it was force-closed.
    async fn process_record(
        &self,
        record: &AttendanceRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let elapsed = now - record.entry_time;
        if elapsed < self.config.max_session {
            tracing::debug!(
                member_id = %record.member_id,
                elapsed_minutes = elapsed.num_minutes(),
                "Sweep: session below age threshold, skipping"
            );
            return Ok(false);
        }

        let fix = match tokio::time::timeout(
            self.config.location_timeout,
            self.provider.current_position(&record.member_id),
        )
        .await
        {
            Ok(Ok(fix)) => fix,
            Ok(Err(err)) => {
                tracing::debug!(
                    member_id = %record.member_id,
                    error = %err,
                    "Sweep: location unavailable, leaving session open"
                );
                return Ok(false);
            }
            Err(_elapsed) => {
                tracing::debug!(
                    member_id = %record.member_id,
                    "Sweep: location sample timed out, leaving session open"
                );
                return Ok(false);
            }
        };

        let distance = haversine_distance_meters(fix.coordinates(), self.zone.coordinates());

        if distance > self.config.max_distance_meters {
            self.store.close_session(&record.id, now).await?;
            tracing::info!(
                member_id = %record.member_id,
                record_id = %record.id,
                distance_meters = round_tenths(distance),
                elapsed_minutes = elapsed.num_minutes(),
                "Sweep: force-closed abandoned session"
            );
            Ok(true)
        } else {
            tracing::debug!(
                member_id = %record.member_id,
                distance_meters = round_tenths(distance),
                "Sweep: member still near gym, keeping session open"
            );
            Ok(false)
        }
    }
}
