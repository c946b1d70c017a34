// SPDX-License-Identifier: MIT

//! Device location feed models.
//!
//! The mobile client periodically reports its position and permission
//! state; the latest report per member is stored as a single document
//! keyed by member ID.

use crate::services::geofence::Coordinates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Foreground location permission state as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// A single sampled device position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported GPS accuracy in meters, if the device provides one
    pub accuracy_meters: Option<f64>,
}

impl LocationFix {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Latest device report for a member (document ID = `member_id`).
///
/// `fix` is absent when the device granted permission but could not
/// produce a position (hardware/driver failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationReport {
    pub member_id: String,
    pub permission: PermissionStatus,
    pub fix: Option<LocationFix>,
    pub reported_at: DateTime<Utc>,
}

impl LocationReport {
    /// Whether the report is recent enough to stand in for a live sample.
    pub fn is_fresh(&self, now: DateTime<Utc>, freshness: chrono::Duration) -> bool {
        now - self.reported_at <= freshness
    }
}
