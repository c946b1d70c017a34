// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod attendance;
pub mod location;
pub mod member;

pub use attendance::{AttendanceRecord, AttendanceStatus};
pub use location::{LocationFix, LocationReport, PermissionStatus};
pub use member::Member;
