//! GridSense Configuration - pipeline tunables as TOML values
//!
//! Each section implements `Default` with the values in [`super::defaults`],
//! so a missing file or a missing section changes nothing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "GRIDSENSE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "gridsense.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a GridSense deployment.
///
/// Load with `GridSenseConfig::load()` which searches:
/// 1. `$GRIDSENSE_CONFIG` env var
/// 2. `./gridsense.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GridSenseConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Reading store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Model artifact locations
    #[serde(default)]
    pub models: ModelConfig,

    /// Ingestion pipeline windows
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Anomaly scoring
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Energy forecasting
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Live feed
    #[serde(default)]
    pub live: LiveConfig,

    /// Analytics query defaults
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl GridSenseConfig {
    /// Load configuration using the standard search order:
    /// 1. `$GRIDSENSE_CONFIG` environment variable
    /// 2. `./gridsense.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./gridsense.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for unknown in super::validation::find_unknown_keys(contents) {
            warn!("{unknown}");
        }
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all values for internal consistency.
    ///
    /// Collects every violation instead of stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.addr.trim().is_empty() {
            errors.push("server.addr must not be empty".to_string());
        }
        if self.ingest.scoring_window < defaults::MIN_READINGS_FOR_SCORING {
            errors.push(format!(
                "ingest.scoring_window must be >= {} (got {})",
                defaults::MIN_READINGS_FOR_SCORING,
                self.ingest.scoring_window
            ));
        }
        if !(0..=defaults::MAX_CLOCK_SKEW_LIMIT_SECS).contains(&self.ingest.max_clock_skew_secs) {
            errors.push(format!(
                "ingest.max_clock_skew_secs must be in 0..={} (got {})",
                defaults::MAX_CLOCK_SKEW_LIMIT_SECS,
                self.ingest.max_clock_skew_secs
            ));
        }
        if self.anomaly.inference_timeout_ms == 0 {
            errors.push("anomaly.inference_timeout_ms must be > 0".to_string());
        }

        let f = &self.forecast;
        if f.default_steps == 0 {
            errors.push("forecast.default_steps must be > 0".to_string());
        }
        if f.max_steps < f.default_steps {
            errors.push(format!(
                "forecast.max_steps ({}) must be >= forecast.default_steps ({})",
                f.max_steps, f.default_steps
            ));
        }
        if i64::try_from(f.max_steps).map_or(true, |n| n > defaults::FORECAST_HOURS_LIMIT) {
            errors.push(format!(
                "forecast.max_steps must be <= {} (got {})",
                defaults::FORECAST_HOURS_LIMIT,
                f.max_steps
            ));
        }
        if !(1..=defaults::FORECAST_HOURS_LIMIT).contains(&f.history_hours) {
            errors.push(format!(
                "forecast.history_hours must be in 1..={} (got {})",
                defaults::FORECAST_HOURS_LIMIT,
                f.history_hours
            ));
        }
        if f.baseline_lookback == 0 {
            errors.push("forecast.baseline_lookback must be > 0".to_string());
        }
        if f.rolling_window == 0 {
            errors.push("forecast.rolling_window must be > 0".to_string());
        }

        if self.live.interval_secs == 0 {
            errors.push("live.interval_secs must be > 0".to_string());
        }
        if !(1..=defaults::LIVE_WINDOW_LIMIT_SECS).contains(&self.live.window_secs) {
            errors.push(format!(
                "live.window_secs must be in 1..={} (got {})",
                defaults::LIVE_WINDOW_LIMIT_SECS,
                self.live.window_secs
            ));
        }

        // NaN/Inf comparisons silently pass, so check finiteness explicitly
        if !self.analytics.peak_threshold_w.is_finite() {
            errors.push(format!(
                "analytics.peak_threshold_w must be finite (got {})",
                self.analytics.peak_threshold_w
            ));
        }
        if self.analytics.anomaly_limit == 0 {
            errors.push("analytics.anomaly_limit must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Configuration load/validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({0:?}): {1}")]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({0:?}): {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub addr: String,
    /// Allowed CORS origins; empty means same-origin only
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
            cors_origins: Vec::new(),
        }
    }
}

/// Reading store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the sled database
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
        }
    }
}

impl StorageConfig {
    /// Path of the readings database inside the data directory.
    pub fn readings_db_path(&self) -> PathBuf {
        self.data_dir.join("readings.db")
    }
}

/// Model artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub dir: PathBuf,
    pub anomaly_file: String,
    pub forecast_file: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(defaults::MODEL_DIR),
            anomaly_file: defaults::ANOMALY_MODEL_FILE.to_string(),
            forecast_file: defaults::FORECAST_MODEL_FILE.to_string(),
        }
    }
}

impl ModelConfig {
    pub fn anomaly_path(&self) -> PathBuf {
        self.dir.join(&self.anomaly_file)
    }

    pub fn forecast_path(&self) -> PathBuf {
        self.dir.join(&self.forecast_file)
    }
}

/// Ingestion pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Most recent readings read back to build the scoring window
    pub scoring_window: usize,
    /// Tolerance for client timestamps ahead of the server clock (seconds)
    pub max_clock_skew_secs: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            scoring_window: defaults::SCORING_WINDOW_READINGS,
            max_clock_skew_secs: defaults::MAX_CLOCK_SKEW_SECS,
        }
    }
}

impl IngestConfig {
    pub fn max_clock_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_clock_skew_secs)
    }
}

/// Anomaly scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Per-reading inference budget (ms)
    pub inference_timeout_ms: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            inference_timeout_ms: defaults::INFERENCE_TIMEOUT_MS,
        }
    }
}

impl AnomalyConfig {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}

/// Energy forecast settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForecastConfig {
    /// Horizon when the caller gives none (hours)
    pub default_steps: usize,
    /// Largest accepted horizon (hours)
    pub max_steps: usize,
    /// History window read from the store (hours)
    pub history_hours: i64,
    /// Trailing rows averaged in baseline mode
    pub baseline_lookback: usize,
    /// Rolling window over hourly buckets
    pub rolling_window: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            default_steps: defaults::DEFAULT_FORECAST_STEPS,
            max_steps: defaults::MAX_FORECAST_STEPS,
            history_hours: defaults::FORECAST_HISTORY_HOURS,
            baseline_lookback: defaults::BASELINE_LOOKBACK_ROWS,
            rolling_window: defaults::FORECAST_ROLLING_WINDOW,
        }
    }
}

/// Live feed settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LiveConfig {
    pub interval_secs: u64,
    /// Trailing window summarised per snapshot (seconds)
    pub window_secs: i64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::LIVE_INTERVAL_SECS,
            window_secs: defaults::LIVE_WINDOW_SECS,
        }
    }
}

impl LiveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Analytics query defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub peak_threshold_w: f64,
    pub anomaly_limit: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            peak_threshold_w: defaults::DEFAULT_PEAK_THRESHOLD_W,
            anomaly_limit: defaults::DEFAULT_ANOMALY_LIMIT,
        }
    }
}
