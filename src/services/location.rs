// SPDX-License-Identifier: MIT

//! Geolocation provider seam.
//!
//! The device owns the GPS hardware; this service only ever sees what
//! the device reports. `ReportedLocationProvider` answers permission
//! queries from the member's latest report and resolves
//! `current_position` by polling the store for a fresh fix. Callers
//! bound the wait themselves (`tokio::time::timeout`), which is how
//! "acquire position with bounded wait" is realized server-side.

use crate::db::Store;
use crate::models::{LocationFix, PermissionStatus};
use std::sync::Arc;
use std::time::Duration;

/// Errors from position acquisition.
#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    /// The device reported a permission denial or produced no fix.
    #[error("location unavailable: {0}")]
    Unavailable(String),

    /// The location feed itself failed (store error).
    #[error("location backend error: {0}")]
    Backend(String),
}

/// Source of device positions and permission state, keyed by member.
#[async_trait::async_trait]
pub trait LocationProvider: Send + Sync {
    /// Current foreground location permission state.
    async fn has_permission(&self, member_id: &str) -> Result<PermissionStatus, LocationError>;

    /// Ask for permission. A server cannot prompt the device, so the
    /// production implementation returns the last reported decision;
    /// the prompt itself happens client-side.
    async fn request_permission(&self, member_id: &str)
        -> Result<PermissionStatus, LocationError>;

    /// Resolve the member's current position. May suspend while a
    /// fresh sample is awaited; callers race this against a timeout.
    async fn current_position(&self, member_id: &str) -> Result<LocationFix, LocationError>;
}

/// `LocationProvider` backed by the device location feed in the store.
pub struct ReportedLocationProvider {
    store: Arc<dyn Store>,
    /// How recent a report must be to stand in for a live sample
    freshness: chrono::Duration,
    /// Delay between store polls while waiting for a fresh fix
    poll_interval: Duration,
}

impl ReportedLocationProvider {
    pub fn new(store: Arc<dyn Store>, freshness_secs: u64) -> Self {
        Self {
            store,
            freshness: chrono::Duration::seconds(freshness_secs as i64),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Override the poll interval (tests use a short one).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait::async_trait]
impl LocationProvider for ReportedLocationProvider {
    async fn has_permission(&self, member_id: &str) -> Result<PermissionStatus, LocationError> {
        let report = self
            .store
            .latest_location(member_id)
            .await
            .map_err(|e| LocationError::Backend(e.to_string()))?;

        // A member whose device has never reported is treated as
        // denied: there is no feed to sample from.
        Ok(report
            .map(|r| r.permission)
            .unwrap_or(PermissionStatus::Denied))
    }

    async fn request_permission(
        &self,
        member_id: &str,
    ) -> Result<PermissionStatus, LocationError> {
        self.has_permission(member_id).await
    }

    async fn current_position(&self, member_id: &str) -> Result<LocationFix, LocationError> {
        loop {
            let report = self
                .store
                .latest_location(member_id)
                .await
                .map_err(|e| LocationError::Backend(e.to_string()))?;

            if let Some(report) = report {
                if report.permission == PermissionStatus::Denied {
                    return Err(LocationError::Unavailable(
                        "device denied location permission".to_string(),
                    ));
                }

                if report.is_fresh(chrono::Utc::now(), self.freshness) {
                    match report.fix {
                        Some(fix) => return Ok(fix),
                        // Fresh report without a fix: the device tried
                        // and failed, no point waiting out the timeout.
                        None => {
                            return Err(LocationError::Unavailable(
                                "device reported no position fix".to_string(),
                            ))
                        }
                    }
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
