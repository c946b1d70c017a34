// SPDX-License-Identifier: MIT

//! Gymgate API Server
//!
//! Gym check-in/check-out via QR scan, gated by GPS proximity
//! verification, with a scheduler-driven auto-checkout sweep.

use gymgate::{
    config::Config,
    db::{FirestoreDb, Store},
    services::{
        AutoCheckoutConfig, AutoCheckoutSweep, LocationProvider, ProximityVerifier,
        ReportedLocationProvider, ScanProcessor,
    },
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Gymgate API");

    if config.zone.dev_bypass {
        tracing::warn!("DEV_BYPASS is set: location verification is disabled");
    }

    // Initialize Firestore database
    let db: Arc<dyn Store> = Arc::new(
        FirestoreDb::new(&config.gcp_project_id)
            .await
            .expect("Failed to connect to Firestore"),
    );

    // Location provider backed by the device report feed
    let locations: Arc<dyn LocationProvider> =
        Arc::new(ReportedLocationProvider::new(db.clone(), config.location_freshness_secs));

    // Scan processor (session state machine)
    let verifier = ProximityVerifier::new(config.zone.clone());
    let scan = ScanProcessor::new(db.clone(), verifier, config.access_code.clone());
    tracing::info!(
        radius_meters = config.zone.radius_meters,
        gps_timeout_ms = config.zone.gps_timeout_ms,
        "Proximity verification configured"
    );

    // Auto-checkout sweep (invoked by the external scheduler)
    let sweep = AutoCheckoutSweep::new(
        db.clone(),
        locations.clone(),
        config.zone.clone(),
        AutoCheckoutConfig {
            max_session: chrono::Duration::minutes(config.auto_checkout_after_minutes),
            max_distance_meters: config.auto_checkout_max_distance_meters,
            location_timeout: Duration::from_secs(10),
        },
    );
    tracing::info!(
        after_minutes = config.auto_checkout_after_minutes,
        max_distance_meters = config.auto_checkout_max_distance_meters,
        "Auto-checkout sweep configured"
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        locations,
        scan,
        sweep,
    });

    // Build router
    let app = gymgate::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gymgate=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
