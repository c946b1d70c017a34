// SPDX-License-Identifier: MIT

//! Shared test helpers: in-memory app wiring and a scripted location
//! provider.

use chrono::Utc;
use gymgate::config::Config;
use gymgate::db::{MemoryStore, Store};
use gymgate::models::{LocationFix, LocationReport, Member, PermissionStatus};
use gymgate::routes::create_router;
use gymgate::services::location::{LocationError, LocationProvider};
use gymgate::services::{
    AutoCheckoutConfig, AutoCheckoutSweep, ProximityVerifier, ReportedLocationProvider,
    ScanProcessor,
};
use gymgate::AppState;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// One member's scripted device behavior.
#[derive(Clone)]
pub struct Script {
    pub permission: PermissionStatus,
    pub fix: Option<LocationFix>,
    /// Simulated GPS acquisition time
    pub delay: Duration,
}

/// `LocationProvider` driven by per-member scripts. Members without a
/// script behave like devices that never reported (permission denied,
/// no position).
#[derive(Default)]
pub struct ScriptedLocationProvider {
    scripts: RwLock<HashMap<String, Script>>,
}

#[allow(dead_code)]
impl ScriptedLocationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, member_id: &str, script: Script) {
        self.scripts
            .write()
            .unwrap()
            .insert(member_id.to_string(), script);
    }

    /// Permission granted, instant fix at the given position.
    pub fn grant(&self, member_id: &str, latitude: f64, longitude: f64) {
        self.grant_with_delay(member_id, latitude, longitude, Duration::ZERO);
    }

    /// Permission granted, fix arrives after `delay`.
    pub fn grant_with_delay(
        &self,
        member_id: &str,
        latitude: f64,
        longitude: f64,
        delay: Duration,
    ) {
        self.script(
            member_id,
            Script {
                permission: PermissionStatus::Granted,
                fix: Some(LocationFix {
                    latitude,
                    longitude,
                    accuracy_meters: Some(8.0),
                }),
                delay,
            },
        );
    }

    /// Permission granted but the hardware produces no position.
    pub fn grant_without_fix(&self, member_id: &str) {
        self.script(
            member_id,
            Script {
                permission: PermissionStatus::Granted,
                fix: None,
                delay: Duration::ZERO,
            },
        );
    }

    /// Permission denied; re-requesting does not change the answer.
    pub fn deny(&self, member_id: &str) {
        self.script(
            member_id,
            Script {
                permission: PermissionStatus::Denied,
                fix: None,
                delay: Duration::ZERO,
            },
        );
    }
}

#[async_trait::async_trait]
impl LocationProvider for ScriptedLocationProvider {
    async fn has_permission(&self, member_id: &str) -> Result<PermissionStatus, LocationError> {
        Ok(self
            .scripts
            .read()
            .unwrap()
            .get(member_id)
            .map(|s| s.permission)
            .unwrap_or(PermissionStatus::Denied))
    }

    async fn request_permission(
        &self,
        member_id: &str,
    ) -> Result<PermissionStatus, LocationError> {
        self.has_permission(member_id).await
    }

    async fn current_position(&self, member_id: &str) -> Result<LocationFix, LocationError> {
        let script = self.scripts.read().unwrap().get(member_id).cloned();
        let Some(script) = script else {
            return Err(LocationError::Unavailable(
                "no scripted report".to_string(),
            ));
        };

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        match script.fix {
            Some(fix) if script.permission == PermissionStatus::Granted => Ok(fix),
            _ => Err(LocationError::Unavailable(
                "scripted device has no fix".to_string(),
            )),
        }
    }
}

/// Member with a membership running well past today.
#[allow(dead_code)]
pub fn test_member(id: &str) -> Member {
    let today = Utc::now().date_naive();
    Member {
        id: id.to_string(),
        full_name: "Test Member".to_string(),
        membership_start: today - chrono::Duration::days(30),
        membership_end: today + chrono::Duration::days(90),
        avatar_url: None,
    }
}

/// Write a fresh granted device report straight into the store.
#[allow(dead_code)]
pub async fn report_position(
    store: &MemoryStore,
    member_id: &str,
    latitude: f64,
    longitude: f64,
) {
    store
        .record_location(&LocationReport {
            member_id: member_id.to_string(),
            permission: PermissionStatus::Granted,
            fix: Some(LocationFix {
                latitude,
                longitude,
                accuracy_meters: Some(8.0),
            }),
            reported_at: Utc::now(),
        })
        .await
        .expect("record_location");
}

/// Create a test app over an in-memory store with the default test
/// config. Returns the router, the shared state, and the store (for
/// seeding and inspection).
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MemoryStore>) {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(
    config: Config,
) -> (axum::Router, Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let db: Arc<dyn Store> = store.clone();

    // Short poll interval so freshly seeded reports resolve quickly
    let locations: Arc<dyn LocationProvider> = Arc::new(
        ReportedLocationProvider::new(db.clone(), config.location_freshness_secs)
            .with_poll_interval(Duration::from_millis(10)),
    );

    let verifier = ProximityVerifier::new(config.zone.clone());
    let scan = ScanProcessor::new(db.clone(), verifier, config.access_code.clone());

    let sweep = AutoCheckoutSweep::new(
        db.clone(),
        locations.clone(),
        config.zone.clone(),
        AutoCheckoutConfig {
            max_session: chrono::Duration::minutes(config.auto_checkout_after_minutes),
            max_distance_meters: config.auto_checkout_max_distance_meters,
            location_timeout: Duration::from_millis(200),
        },
    );

    let state = Arc::new(AppState {
        config,
        db,
        locations,
        scan,
        sweep,
    });

    (create_router(state.clone()), state, store)
}

/// Mint a JWT accepted by the test app's auth middleware.
#[allow(dead_code)]
pub fn auth_token(member_id: &str) -> String {
    gymgate::middleware::auth::create_jwt(member_id, &Config::test_default().jwt_signing_key)
        .expect("create_jwt")
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse body as JSON")
}
