use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::strategy::Polarity;

/// Runtime configuration, loaded from an optional file plus
/// `OPTIONBOT_`-prefixed environment variables. Every knob has a default
/// so a bare paper-mode run works out of the box.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Assets evaluated each cycle, in this order
    pub assets: Vec<String>,

    // Indicator
    pub rsi_period: usize,
    pub candle_timeframe_secs: u32,

    // Signal thresholds
    pub oversold_level: f64,
    pub overbought_level: f64,
    pub polarity: Polarity,

    // Contract parameters
    pub expiry_minutes: u32,

    // Position sizing
    pub position_size_pct: f64,
    pub min_position_size: f64,
    pub max_position_size: f64,

    // Account guards
    pub absolute_stop_loss_pct: f64,
    pub monthly_stop_loss_pct: f64,
    /// Daily realized profit beyond which no further signals are admitted
    pub profit_lock_threshold: f64,
    pub warmup_secs: u64,
    /// Fixed UTC offset used for day and month boundaries
    pub timezone_offset_hours: i32,

    // Per-asset guards
    pub min_secs_between_signals: u64,
    pub max_consecutive_losses: u32,
    pub lock_duration_secs: u64,

    // Order verification
    pub verification_grace_secs: u64,
    pub verification_window_secs: u64,
    pub max_verification_attempts: u32,

    // Control loop
    pub cycle_secs: u64,
    pub save_every_cycles: u64,
    pub refresh_assets_every_cycles: u64,

    // Persistence
    pub state_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            assets: vec![
                "EURUSD".to_string(),
                "GBPUSD".to_string(),
                "EURJPY".to_string(),
                "AUDCHF".to_string(),
            ],
            rsi_period: 14,
            candle_timeframe_secs: 300,
            oversold_level: 35.0,
            overbought_level: 65.0,
            polarity: Polarity::Inverted,
            expiry_minutes: 2,
            position_size_pct: 0.025,
            min_position_size: 1.0,
            max_position_size: 500.0,
            absolute_stop_loss_pct: 0.75,
            monthly_stop_loss_pct: 0.40,
            profit_lock_threshold: 0.0,
            warmup_secs: 3600,
            timezone_offset_hours: 0,
            min_secs_between_signals: 3600,
            max_consecutive_losses: 3,
            lock_duration_secs: 6 * 3600,
            verification_grace_secs: 15,
            verification_window_secs: 120,
            max_verification_attempts: 8,
            cycle_secs: 15,
            save_every_cycles: 30,
            refresh_assets_every_cycles: 100,
            state_file: PathBuf::from("optionbot_state.json"),
        }
    }
}

impl Settings {
    /// Load settings from an optional config file layered under
    /// environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(config::File::with_name("optionbot").required(false));
        }

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix("OPTIONBOT")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("assets"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assets.is_empty() {
            return Err(ConfigError::NoAssets);
        }
        if self.oversold_level >= self.overbought_level {
            return Err(ConfigError::InvalidThresholds {
                oversold: self.oversold_level,
                overbought: self.overbought_level,
            });
        }
        if self.min_position_size > self.max_position_size {
            return Err(ConfigError::InvalidPositionBounds {
                min: self.min_position_size,
                max: self.max_position_size,
            });
        }
        for (name, value) in [
            ("position_size_pct", self.position_size_pct),
            ("absolute_stop_loss_pct", self.absolute_stop_loss_pct),
            ("monthly_stop_loss_pct", self.monthly_stop_loss_pct),
        ] {
            if value <= 0.0 || value > 1.0 {
                return Err(ConfigError::InvalidPercentage { name, value });
            }
        }
        if !(-12..=14).contains(&self.timezone_offset_hours) {
            return Err(ConfigError::InvalidTimezoneOffset(self.timezone_offset_hours));
        }
        for (name, value) in [
            ("expiry_minutes", self.expiry_minutes as u64),
            ("cycle_secs", self.cycle_secs),
            ("save_every_cycles", self.save_every_cycles),
            ("refresh_assets_every_cycles", self.refresh_assets_every_cycles),
            ("min_secs_between_signals", self.min_secs_between_signals),
            ("lock_duration_secs", self.lock_duration_secs),
            ("verification_window_secs", self.verification_window_secs),
            ("max_verification_attempts", self.max_verification_attempts as u64),
            ("rsi_period", self.rsi_period as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidDuration { name });
            }
        }
        Ok(())
    }

    /// Fixed offset for day/month boundary arithmetic
    pub fn fixed_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.timezone_offset_hours * 3600)
            .expect("offset validated at load")
    }
}
