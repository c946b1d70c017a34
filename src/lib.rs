// SPDX-License-Identifier: MIT

//! Gymgate: QR check-in/check-out with geofenced attendance
//! verification.
//!
//! This crate provides the session lifecycle engine for a gym-access
//! app: the scan state machine, gym-zone proximity verification, and
//! the background auto-checkout sweep, served over an axum API.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::{AutoCheckoutSweep, LocationProvider, ScanProcessor};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Store>,
    pub locations: Arc<dyn LocationProvider>,
    pub scan: ScanProcessor,
    pub sweep: AutoCheckoutSweep,
}
