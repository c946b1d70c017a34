// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod geofence;
pub mod location;
pub mod membership;
pub mod proximity;
pub mod scan;
pub mod sweep;

pub use location::{LocationProvider, ReportedLocationProvider};
pub use proximity::{ProximityVerification, ProximityVerifier, VerificationStage};
pub use scan::{RejectReason, ScanOutcome, ScanProcessor};
pub use sweep::{AutoCheckoutConfig, AutoCheckoutSweep, SweepOutcome};
