// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup into an immutable struct and
//! passed explicitly into the services that need it, so tests can
//! construct synthetic zones and thresholds.

use crate::services::geofence::Coordinates;
use std::env;
use std::time::Duration;

/// Gym zone parameters consumed by the proximity verifier and sweep.
#[derive(Debug, Clone)]
pub struct GymZoneConfig {
    /// Gym latitude
    pub latitude: f64,
    /// Gym longitude
    pub longitude: f64,
    /// Maximum allowed distance in meters for a verified result
    pub radius_meters: f64,
    /// GPS acquisition timeout in milliseconds
    pub gps_timeout_ms: u64,
    /// Bypass location verification entirely (never in production)
    pub dev_bypass: bool,
}

impl GymZoneConfig {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn gps_timeout(&self) -> Duration {
        Duration::from_millis(self.gps_timeout_ms)
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Service ---
    /// Server port
    pub port: u16,
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,

    // --- Secrets ---
    /// JWT signing key for member session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// The single valid QR access code
    pub access_code: String,
    /// Bearer token the external scheduler must present on /tasks/*
    pub sweep_auth_token: String,

    // --- Geofence ---
    pub zone: GymZoneConfig,

    // --- Auto checkout sweep ---
    /// Minimum session age before a record is eligible for force-close
    pub auto_checkout_after_minutes: i64,
    /// Distance beyond which an eligible session is force-closed
    pub auto_checkout_max_distance_meters: f64,

    // --- Device location feed ---
    /// How recent a device report must be to count as a live sample
    pub location_freshness_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            access_code: env::var("ACCESS_CODE")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("ACCESS_CODE"))?,
            sweep_auth_token: env::var("SWEEP_AUTH_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SWEEP_AUTH_TOKEN"))?,

            zone: GymZoneConfig {
                latitude: require_parsed("GYM_LATITUDE")?,
                longitude: require_parsed("GYM_LONGITUDE")?,
                radius_meters: parsed_or("GYM_RADIUS_METERS", 100.0)?,
                gps_timeout_ms: parsed_or("GPS_TIMEOUT_MS", 15_000)?,
                dev_bypass: flag("DEV_BYPASS"),
            },

            auto_checkout_after_minutes: parsed_or("AUTO_CHECKOUT_AFTER_MINUTES", 180)?,
            auto_checkout_max_distance_meters: parsed_or(
                "AUTO_CHECKOUT_MAX_DISTANCE_METERS",
                100.0,
            )?,
            location_freshness_secs: parsed_or("LOCATION_FRESHNESS_SECS", 30)?,
        })
    }

    /// Default config for tests: gym at the equator origin, tight GPS
    /// timeout so timeout paths run quickly.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            access_code: "GYMGATE-TEST-CODE".to_string(),
            sweep_auth_token: "test_sweep_token".to_string(),
            zone: GymZoneConfig {
                latitude: 0.0,
                longitude: 0.0,
                radius_meters: 100.0,
                gps_timeout_ms: 250,
                dev_bypass: false,
            },
            auto_checkout_after_minutes: 180,
            auto_checkout_max_distance_meters: 100.0,
            location_freshness_secs: 30,
        }
    }
}

fn require_parsed<T: std::str::FromStr>(name: &'static str) -> Result<T, ConfigError> {
    env::var(name)
        .map_err(|_| ConfigError::Missing(name))?
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(name))
}

fn parsed_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            v == "1" || v == "true" || v == "yes"
        })
        .unwrap_or(false)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
