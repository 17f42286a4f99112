//! Unknown-key detection for config files.
//!
//! The TOML is first read as a plain `toml::Value` tree and every dotted
//! key path is checked against the fields of [`GridSenseConfig`]. Unknown
//! keys are warnings with a closest-match suggestion; serde ignores them,
//! so a typo otherwise silently falls back to the default.
//!
//! [`GridSenseConfig`]: super::GridSenseConfig

use std::collections::BTreeSet;

/// A non-fatal config warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKey {
    pub key: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for UnknownKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown config key '{}'", self.key)?;
        if let Some(s) = &self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

/// Every valid dotted key path. Kept in step with `gridsense_config.rs`.
const KNOWN_KEYS: &[&str] = &[
    "server",
    "server.addr",
    "server.cors_origins",
    "storage",
    "storage.data_dir",
    "models",
    "models.dir",
    "models.anomaly_file",
    "models.forecast_file",
    "ingest",
    "ingest.scoring_window",
    "ingest.max_clock_skew_secs",
    "anomaly",
    "anomaly.inference_timeout_ms",
    "forecast",
    "forecast.default_steps",
    "forecast.max_steps",
    "forecast.history_hours",
    "forecast.baseline_lookback",
    "forecast.rolling_window",
    "live",
    "live.interval_secs",
    "live.window_secs",
    "analytics",
    "analytics.peak_threshold_w",
    "analytics.anomaly_limit",
];

/// Largest edit distance still offered as a suggestion.
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Collect all dotted key paths of a TOML tree, tables included.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let Some(table) = value.as_table() else {
        return Vec::new();
    };
    table
        .iter()
        .flat_map(|(k, v)| {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            let nested = walk_toml_keys(v, &path);
            std::iter::once(path).chain(nested)
        })
        .collect()
}

/// Edit distance over chars, two-row dynamic programming.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Closest known key within [`MAX_SUGGESTION_DISTANCE`] edits.
pub fn suggest_correction(unknown: &str) -> Option<&'static str> {
    KNOWN_KEYS
        .iter()
        .map(|&k| (k, edit_distance(unknown, k)))
        .filter(|&(_, d)| d <= MAX_SUGGESTION_DISTANCE)
        .min_by_key(|&(_, d)| d)
        .map(|(k, _)| k)
}

/// Unknown keys in a raw TOML document. Parse errors yield nothing here;
/// serde reports them.
pub fn find_unknown_keys(raw_toml: &str) -> Vec<UnknownKey> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };
    let known: BTreeSet<&str> = KNOWN_KEYS.iter().copied().collect();

    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|k| !known.contains(k.as_str()))
        .map(|key| UnknownKey {
            suggestion: suggest_correction(&key).map(str::to_string),
            key,
        })
        .collect()
}
