// SPDX-License-Identifier: MIT

//! Attendance record model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an attendance record.
///
/// Exactly one `Inside` record may exist per member at a time; the
/// scan processor enforces this with a point query before insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Inside,
    Completed,
}

impl AttendanceStatus {
    /// Stored string form, used in Firestore query filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Inside => "inside",
            AttendanceStatus::Completed => "completed",
        }
    }
}

/// Stored attendance record (document ID = `id`).
///
/// `exit_time` is present if and only if `status` is `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Record ID, generated on creation
    pub id: String,
    /// Owning member (hosted-auth user ID)
    pub member_id: String,
    /// Check-in time
    pub entry_time: DateTime<Utc>,
    /// Check-out time, absent while the member is inside
    pub exit_time: Option<DateTime<Utc>>,
    /// Current lifecycle state
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    /// Create a fresh check-in record.
    pub fn check_in(member_id: &str, entry_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            member_id: member_id.to_string(),
            entry_time,
            exit_time: None,
            status: AttendanceStatus::Inside,
        }
    }

    /// Close the record at `exit_time`.
    pub fn close(&mut self, exit_time: DateTime<Utc>) {
        self.exit_time = Some(exit_time);
        self.status = AttendanceStatus::Completed;
    }

    /// Session duration, available once the record is completed.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.exit_time.map(|exit| exit - self.entry_time)
    }
}
