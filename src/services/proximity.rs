// SPDX-License-Identifier: MIT

//! Gym-zone proximity verification.
//!
//! Answers "is this member currently within the gym zone?" as a single
//! outcome, reporting each stage transition to an observer so the UI
//! can show progress while the check runs.

use crate::config::GymZoneConfig;
use crate::services::geofence::{haversine_distance_meters, round_tenths};
use crate::services::location::{LocationError, LocationProvider};
use crate::models::PermissionStatus;
use serde::Serialize;

/// Synthetic accuracy reported when the dev bypass is active.
const DEV_BYPASS_ACCURACY_METERS: f64 = 5.0;

/// Progress stages emitted during a verification attempt, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStage {
    RequestingPermission,
    AcquiringSignal,
    CalculatingDistance,
    VerifyingZone,
}

/// Outcome of a successful verification attempt. Transient: produced
/// fresh per scan, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ProximityVerification {
    /// Whether the sampled position is within the configured radius
    pub verified: bool,
    /// Distance to the gym, rounded to one decimal
    pub distance_meters: f64,
    /// Reported GPS accuracy, rounded to one decimal, if available
    pub accuracy_meters: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Terminal error conditions of a verification attempt. Each is
/// distinct and retryable; `OutOfZone` is not an error but a
/// `verified = false` result.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("No GPS fix within the timeout")]
    SignalTimeout,

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),
}

/// Verifies member proximity against the configured gym zone.
#[derive(Clone)]
pub struct ProximityVerifier {
    zone: GymZoneConfig,
}

impl ProximityVerifier {
    pub fn new(zone: GymZoneConfig) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> &GymZoneConfig {
        &self.zone
    }

    /// Run the verification protocol for one member.
    ///
    /// Stages are reported through `on_stage` as they begin. The
    /// position acquisition is raced against the configured GPS
    /// timeout; timing out aborts only this check.
    pub async fn verify(
        &self,
        member_id: &str,
        provider: &dyn LocationProvider,
        on_stage: &mut (dyn FnMut(VerificationStage) + Send),
    ) -> Result<ProximityVerification, VerificationError> {
        if self.zone.dev_bypass {
            tracing::warn!(member_id, "Dev bypass active, skipping location verification");
            return Ok(ProximityVerification {
                verified: true,
                distance_meters: 0.0,
                accuracy_meters: Some(DEV_BYPASS_ACCURACY_METERS),
                latitude: self.zone.latitude,
                longitude: self.zone.longitude,
            });
        }

        on_stage(VerificationStage::RequestingPermission);
        let mut permission = self
            .provider_permission(provider.has_permission(member_id).await)?;
        if permission == PermissionStatus::Denied {
            permission =
                self.provider_permission(provider.request_permission(member_id).await)?;
        }
        if permission == PermissionStatus::Denied {
            return Err(VerificationError::PermissionDenied);
        }

        on_stage(VerificationStage::AcquiringSignal);
        let fix = match tokio::time::timeout(
            self.zone.gps_timeout(),
            provider.current_position(member_id),
        )
        .await
        {
            Err(_elapsed) => return Err(VerificationError::SignalTimeout),
            Ok(Err(e)) => return Err(VerificationError::LocationUnavailable(e.to_string())),
            Ok(Ok(fix)) => fix,
        };

        on_stage(VerificationStage::CalculatingDistance);
        let distance = haversine_distance_meters(fix.coordinates(), self.zone.coordinates());

        on_stage(VerificationStage::VerifyingZone);
        let verified = distance <= self.zone.radius_meters;

        tracing::debug!(
            member_id,
            distance_meters = round_tenths(distance),
            radius_meters = self.zone.radius_meters,
            verified,
            "Proximity verification complete"
        );

        Ok(ProximityVerification {
            verified,
            distance_meters: round_tenths(distance),
            accuracy_meters: fix.accuracy_meters.map(round_tenths),
            latitude: fix.latitude,
            longitude: fix.longitude,
        })
    }

    fn provider_permission(
        &self,
        result: Result<PermissionStatus, LocationError>,
    ) -> Result<PermissionStatus, VerificationError> {
        result.map_err(|e| VerificationError::LocationUnavailable(e.to_string()))
    }
}
