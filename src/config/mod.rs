//! GridSense Configuration Module
//!
//! Deployment configuration loaded from TOML, replacing hardcoded pipeline
//! constants with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `GRIDSENSE_CONFIG` environment variable (path to TOML file)
//! 2. `gridsense.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! `main` loads the config once and hands each component the section it
//! needs. There is no global handle.
//!
//! ```ignore
//! let cfg = GridSenseConfig::load();
//! let engine = ForecastEngine::from_load(&forecast_load, cfg.forecast.clone());
//! ```

mod gridsense_config;
pub mod defaults;
pub mod validation;

pub use gridsense_config::*;
