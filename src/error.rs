use std::path::PathBuf;

use thiserror::Error;

/// Invalid configuration detected at startup. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("oversold level {oversold} must be below overbought level {overbought}")]
    InvalidThresholds { oversold: f64, overbought: f64 },

    #[error("position size bounds are inverted: min {min} > max {max}")]
    InvalidPositionBounds { min: f64, max: f64 },

    #[error("{name} must be within (0, 1], got {value}")]
    InvalidPercentage { name: &'static str, value: f64 },

    #[error("timezone offset {0} hours is out of range (-12..=14)")]
    InvalidTimezoneOffset(i32),

    #[error("{name} must be greater than zero")]
    InvalidDuration { name: &'static str },

    #[error("no assets configured")]
    NoAssets,

    #[error("failed to read configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Broker gateway failures. Transient variants are retried inside the
/// client; a failure that escapes skips the affected operation for the
/// current cycle.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("broker rejected request: {0}")]
    Broker(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("malformed broker response: {0}")]
    Malformed(String),
}

/// State snapshot failures. A save failure mid-run is survivable; a
/// corrupt file at startup is not.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state file i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file {path} exists but cannot be decoded: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode state: {0}")]
    Encode(serde_json::Error),
}
