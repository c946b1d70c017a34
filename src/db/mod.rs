// SPDX-License-Identifier: MIT

//! Database layer: the `Store` trait plus its Firestore and in-memory
//! implementations.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{AttendanceRecord, LocationReport, Member};
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const MEMBERS: &str = "members";
    pub const ATTENDANCE: &str = "attendance";
    /// Latest device location report per member (keyed by member ID)
    pub const LOCATION_REPORTS: &str = "location_reports";
}

/// Persistence operations the engine depends on.
///
/// The "at most one `Inside` record per member" invariant is enforced
/// by callers with a fresh `find_open_session` immediately before
/// `insert_session`. This is a check-then-act sequence: two truly
/// concurrent check-ins from separate devices could both pass the
/// check. A store with partial unique indexes could close that gap;
/// Firestore has none, so the limitation is accepted (a member holds
/// one device) and documented here.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Fetch a member profile.
    async fn get_member(&self, member_id: &str) -> Result<Option<Member>, AppError>;

    /// Most recent record with `status = Inside` for a member, if any.
    async fn find_open_session(&self, member_id: &str)
        -> Result<Option<AttendanceRecord>, AppError>;

    /// Persist a freshly created check-in record.
    async fn insert_session(&self, record: &AttendanceRecord) -> Result<(), AppError>;

    /// Complete a record: set `exit_time` and `status = Completed`.
    ///
    /// The update is by record ID and therefore atomic at row level.
    async fn close_session(
        &self,
        record_id: &str,
        exit_time: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError>;

    /// All records currently `Inside` (consumed by the sweep).
    async fn list_open_sessions(&self) -> Result<Vec<AttendanceRecord>, AppError>;

    /// Number of records currently `Inside` (live occupancy).
    async fn count_open_sessions(&self) -> Result<usize, AppError>;

    /// A member's most recent records, newest first.
    async fn list_member_sessions(
        &self,
        member_id: &str,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, AppError>;

    /// Latest device location report for a member.
    async fn latest_location(&self, member_id: &str)
        -> Result<Option<LocationReport>, AppError>;

    /// Record (replace) a member's latest device location report.
    async fn record_location(&self, report: &LocationReport) -> Result<(), AppError>;
}
