// SPDX-License-Identifier: MIT

//! QR scan processing: the session state machine.
//!
//! One scan event drives a member's attendance record through
//! `ValidatingCode → VerifyingLocation → Deciding → {CheckingIn,
//! CheckingOut}`. Every failure maps to a rejection that is local to
//! the attempt and retryable; nothing here escalates beyond one scan.

use crate::db::Store;
use crate::models::AttendanceRecord;
use crate::services::proximity::{
    ProximityVerification, ProximityVerifier, VerificationError, VerificationStage,
};
use crate::services::location::LocationProvider;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

/// Internal processing states. `Idle` is implicit: a member is idle
/// whenever no entry for them exists in the in-flight guard map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    ValidatingCode,
    VerifyingLocation,
    Deciding,
    CheckingIn,
    CheckingOut,
}

impl ScanState {
    fn as_str(&self) -> &'static str {
        match self {
            ScanState::ValidatingCode => "validating_code",
            ScanState::VerifyingLocation => "verifying_location",
            ScanState::Deciding => "deciding",
            ScanState::CheckingIn => "checking_in",
            ScanState::CheckingOut => "checking_out",
        }
    }
}

/// Why a scan was rejected. All reasons allow immediate retry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    InvalidCode,
    PermissionDenied,
    SignalTimeout,
    LocationUnavailable { message: String },
    OutOfZone {
        distance_meters: f64,
        radius_meters: f64,
    },
    PersistenceFailure { message: String },
    Unknown { message: String },
}

impl RejectReason {
    /// User-facing guidance for the rejection.
    pub fn message(&self) -> String {
        match self {
            RejectReason::InvalidCode => {
                "The scanned code is not valid for this gym. Scan the code at the entrance.".to_string()
            }
            RejectReason::PermissionDenied => {
                "Location permission is denied. Enable location access in system settings and try again.".to_string()
            }
            RejectReason::SignalTimeout => {
                "Could not get a GPS fix in time. Move closer to a window or outside and retry.".to_string()
            }
            RejectReason::LocationUnavailable { .. } => {
                "Your location could not be determined. Check that location services are on and retry.".to_string()
            }
            RejectReason::OutOfZone {
                distance_meters,
                radius_meters,
            } => format!(
                "You are {:.1} m from the gym; scans are accepted within {:.0} m.",
                distance_meters, radius_meters
            ),
            RejectReason::PersistenceFailure { .. } => {
                "Your scan could not be saved. Please try again.".to_string()
            }
            RejectReason::Unknown { .. } => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// Every rejection is local to one attempt and retryable.
    pub fn retryable(&self) -> bool {
        true
    }
}

/// Terminal outcome of one scan event.
#[derive(Debug)]
pub enum ScanOutcome {
    /// A new session was opened.
    CheckedIn {
        record: AttendanceRecord,
        verification: Option<ProximityVerification>,
    },
    /// The open session was completed.
    CheckedOut {
        record: AttendanceRecord,
        duration: chrono::Duration,
        verification: Option<ProximityVerification>,
    },
    /// The scan was refused; see the reason.
    Rejected { reason: RejectReason },
    /// A scan for this member was already in flight; this event was
    /// dropped without touching the store (re-entrancy guard).
    Ignored,
}

/// Drives one member's session through a scan event.
pub struct ScanProcessor {
    store: Arc<dyn Store>,
    verifier: ProximityVerifier,
    access_code: String,
    /// Members with a scan currently in flight
    in_flight: DashMap<String, ()>,
}

impl ScanProcessor {
    pub fn new(store: Arc<dyn Store>, verifier: ProximityVerifier, access_code: String) -> Self {
        Self {
            store,
            verifier,
            access_code,
            in_flight: DashMap::new(),
        }
    }

    /// Process a scanned QR payload for a member.
    ///
    /// Re-entrant events (a scan arriving while the member's previous
    /// scan is still processing) return `Ignored` without any store
    /// interaction. Any unexpected failure is caught and mapped to a
    /// retryable `Unknown` rejection so a scan can never wedge the
    /// scanning flow.
    pub async fn process_scan(
        &self,
        member_id: &str,
        payload: &str,
        provider: &dyn LocationProvider,
        on_stage: &mut (dyn FnMut(VerificationStage) + Send),
    ) -> ScanOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, member_id) else {
            tracing::debug!(member_id, "Scan ignored: previous scan still processing");
            return ScanOutcome::Ignored;
        };

        match self.run(member_id, payload, provider, on_stage).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(member_id, error = %err, "Unhandled scan failure");
                ScanOutcome::Rejected {
                    reason: RejectReason::Unknown {
                        message: err.to_string(),
                    },
                }
            }
        }
    }

    async fn run(
        &self,
        member_id: &str,
        payload: &str,
        provider: &dyn LocationProvider,
        on_stage: &mut (dyn FnMut(VerificationStage) + Send),
    ) -> crate::error::Result<ScanOutcome> {
        self.enter(member_id, ScanState::ValidatingCode);
        if payload.trim() != self.access_code {
            tracing::info!(member_id, "Scan rejected: invalid code");
            return Ok(ScanOutcome::Rejected {
                reason: RejectReason::InvalidCode,
            });
        }

        self.enter(member_id, ScanState::VerifyingLocation);
        let verification = match self.verifier.verify(member_id, provider, on_stage).await {
            Ok(v) => v,
            Err(VerificationError::PermissionDenied) => {
                return Ok(ScanOutcome::Rejected {
                    reason: RejectReason::PermissionDenied,
                })
            }
            Err(VerificationError::SignalTimeout) => {
                return Ok(ScanOutcome::Rejected {
                    reason: RejectReason::SignalTimeout,
                })
            }
            Err(VerificationError::LocationUnavailable(message)) => {
                return Ok(ScanOutcome::Rejected {
                    reason: RejectReason::LocationUnavailable { message },
                })
            }
        };

        if !verification.verified {
            tracing::info!(
                member_id,
                distance_meters = verification.distance_meters,
                radius_meters = self.verifier.zone().radius_meters,
                "Scan rejected: out of zone"
            );
            return Ok(ScanOutcome::Rejected {
                reason: RejectReason::OutOfZone {
                    distance_meters: verification.distance_meters,
                    radius_meters: self.verifier.zone().radius_meters,
                },
            });
        }

        self.enter(member_id, ScanState::Deciding);
        let open = match self.store.find_open_session(member_id).await {
            Ok(open) => open,
            Err(err) => return Ok(Self::persistence_rejection(member_id, err)),
        };

        let now = chrono::Utc::now();
        match open {
            None => {
                self.enter(member_id, ScanState::CheckingIn);
                let record = AttendanceRecord::check_in(member_id, now);
                if let Err(err) = self.store.insert_session(&record).await {
                    return Ok(Self::persistence_rejection(member_id, err));
                }

                tracing::info!(member_id, record_id = %record.id, "Member checked in");
                Ok(ScanOutcome::CheckedIn {
                    record,
                    verification: Some(verification),
                })
            }
            Some(open) => {
                self.enter(member_id, ScanState::CheckingOut);
                let record = match self.store.close_session(&open.id, now).await {
                    Ok(record) => record,
                    Err(err) => return Ok(Self::persistence_rejection(member_id, err)),
                };

                let duration = record.duration().unwrap_or_else(chrono::Duration::zero);
                tracing::info!(
                    member_id,
                    record_id = %record.id,
                    duration_minutes = duration.num_minutes(),
                    "Member checked out"
                );
                Ok(ScanOutcome::CheckedOut {
                    record,
                    duration,
                    verification: Some(verification),
                })
            }
        }
    }

    fn enter(&self, member_id: &str, state: ScanState) {
        tracing::debug!(member_id, state = state.as_str(), "Scan state");
    }

    fn persistence_rejection(member_id: &str, err: crate::error::AppError) -> ScanOutcome {
        tracing::error!(member_id, error = %err, "Scan store operation failed");
        ScanOutcome::Rejected {
            reason: RejectReason::PersistenceFailure {
                message: err.to_string(),
            },
        }
    }
}

/// RAII entry in the in-flight map; removal happens on drop so the
/// guard is released even if processing panics.
struct InFlightGuard<'a> {
    map: &'a DashMap<String, ()>,
    key: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(map: &'a DashMap<String, ()>, key: &str) -> Option<Self> {
        use dashmap::mapref::entry::Entry;

        match map.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(());
                Some(Self {
                    map,
                    key: key.to_string(),
                })
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}
