// SPDX-License-Identifier: MIT

//! Member profile model.
//!
//! Profiles are owned by the hosted auth/CRM side of the system; this
//! service only reads them for membership-expiry reporting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stored member profile (document ID = `id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Hosted-auth user ID
    pub id: String,
    pub full_name: String,
    /// First day of the current membership period
    pub membership_start: NaiveDate,
    /// Last day of the current membership period (inclusive)
    pub membership_end: NaiveDate,
    pub avatar_url: Option<String>,
}
