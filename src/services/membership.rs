// SPDX-License-Identifier: MIT

//! Membership expiry reporting.

use chrono::NaiveDate;
use serde::Serialize;

/// Days before expiry at which the membership is flagged as expiring.
pub const MEMBERSHIP_WARNING_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    ExpiringSoon,
    Expired,
}

/// Whole days remaining until the membership end date (inclusive).
/// Negative once expired.
pub fn membership_days_left(membership_end: NaiveDate, today: NaiveDate) -> i64 {
    (membership_end - today).num_days()
}

pub fn membership_status(days_left: i64) -> MembershipStatus {
    if days_left < 0 {
        MembershipStatus::Expired
    } else if days_left <= MEMBERSHIP_WARNING_DAYS {
        MembershipStatus::ExpiringSoon
    } else {
        MembershipStatus::Active
    }
}
