//! System-wide default constants.
//!
//! Centralises the fixed numbers of the ingestion and scoring pipeline.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Readings
// ============================================================================

/// Watts per kilowatt.
pub const WATTS_PER_KILOWATT: f64 = 1_000.0;

/// Samples per hour assumed by the energy derivation.
///
/// Every reading is taken to cover one minute, so a sample's energy is
/// `power / 1000 / 60` kWh. Streams sampled at any other rate need a
/// different constant; this one must not be reused for them.
pub const SAMPLES_PER_HOUR: f64 = 60.0;

/// Stream name used when an ingest payload does not name one.
pub const DEFAULT_STREAM: &str = "default";

/// Maximum stream name length (bytes).
pub const MAX_STREAM_NAME_LEN: usize = 64;

// ============================================================================
// Anomaly Path
// ============================================================================

/// Rolling window length for the anomaly features.
pub const ANOMALY_ROLLING_WINDOW: usize = 5;

/// Minimum readings in a stream before scoring is attempted.
///
/// Five for the rolling window plus one for the delta.
pub const MIN_READINGS_FOR_SCORING: usize = ANOMALY_ROLLING_WINDOW + 1;

/// Readings read back from the store to build the scoring window.
pub const SCORING_WINDOW_READINGS: usize = 50;

/// Model label that marks an anomaly.
pub const ANOMALY_LABEL: f64 = -1.0;

/// How far ahead of the server clock a client timestamp may be (seconds).
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Largest accepted `ingest.max_clock_skew_secs` (one day).
pub const MAX_CLOCK_SKEW_LIMIT_SECS: i64 = 86_400;

/// Upper bound on one inference call before the reading is left unscored (ms).
pub const INFERENCE_TIMEOUT_MS: u64 = 250;

// ============================================================================
// Forecast
// ============================================================================

/// Forecast horizon when the caller does not give one (hours).
pub const DEFAULT_FORECAST_STEPS: usize = 6;

/// Largest horizon the API accepts (hours).
pub const MAX_FORECAST_STEPS: usize = 168;

/// Trailing rows averaged by the baseline forecast.
pub const BASELINE_LOOKBACK_ROWS: usize = 10;

/// Rolling window (hourly buckets) for the forecast features.
pub const FORECAST_ROLLING_WINDOW: usize = 6;

/// History fed to the forecast engine (hours).
pub const FORECAST_HISTORY_HOURS: i64 = 168;

/// Largest accepted `forecast.history_hours` and `forecast.max_steps`
/// (one leap year of hourly buckets).
pub const FORECAST_HOURS_LIMIT: i64 = 24 * 366;

/// Decimal places kept on forecast energies.
pub const FORECAST_ENERGY_DECIMALS: i32 = 5;

// ============================================================================
// Analytics & Live Feed
// ============================================================================

/// Power above which a reading counts as a peak load (W).
pub const DEFAULT_PEAK_THRESHOLD_W: f64 = 1_500.0;

/// Live feed snapshot interval (seconds).
pub const LIVE_INTERVAL_SECS: u64 = 5;

/// Trailing window summarised by the live snapshot (seconds).
pub const LIVE_WINDOW_SECS: i64 = 3_600;

/// Largest accepted `live.window_secs` (one week).
pub const LIVE_WINDOW_LIMIT_SECS: i64 = 7 * 86_400;

/// Default row limit on the anomalies listing.
pub const DEFAULT_ANOMALY_LIMIT: usize = 500;

// ============================================================================
// Model Artifacts
// ============================================================================

/// Current on-disk model artifact format version.
pub const MODEL_ARTIFACT_VERSION: u32 = 1;

/// Anomaly model artifact file name, relative to the model directory.
pub const ANOMALY_MODEL_FILE: &str = "anomaly.v1.json";

/// Forecast model artifact file name, relative to the model directory.
pub const FORECAST_MODEL_FILE: &str = "forecast.v1.json";

// ============================================================================
// Server & Storage
// ============================================================================

/// HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8000";

/// Data directory holding the sled database.
pub const DATA_DIR: &str = "./data";

/// Model artifact directory.
pub const MODEL_DIR: &str = "./models";
