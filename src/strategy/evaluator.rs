use serde::{Deserialize, Serialize};

use crate::models::Signal;

/// Which direction a threshold breach maps to.
///
/// `Standard` is the classic mean-reversion reading: oversold → CALL
/// (expect a bounce), overbought → PUT. `Inverted` trades with the move
/// instead: oversold → PUT, overbought → CALL. Both are legitimate
/// deployments of the same mechanism, so the mapping is configuration
/// rather than code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Standard,
    Inverted,
}

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub oversold_level: f64,
    pub overbought_level: f64,
    pub polarity: Polarity,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            oversold_level: 35.0,
            overbought_level: 65.0,
            polarity: Polarity::Inverted,
        }
    }
}

/// Threshold classifier over a bounded indicator reading.
///
/// Pure: no clock, no state, same reading always yields the same signal.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    config: EvaluatorConfig,
}

impl SignalEvaluator {
    /// `oversold_level < overbought_level` must already hold; settings
    /// validation rejects anything else before an evaluator is built.
    pub fn new(config: EvaluatorConfig) -> Self {
        debug_assert!(config.oversold_level < config.overbought_level);
        Self { config }
    }

    pub fn evaluate(&self, reading: f64) -> Signal {
        if reading <= self.config.oversold_level {
            match self.config.polarity {
                Polarity::Inverted => Signal::Put,
                Polarity::Standard => Signal::Call,
            }
        } else if reading >= self.config.overbought_level {
            match self.config.polarity {
                Polarity::Inverted => Signal::Call,
                Polarity::Standard => Signal::Put,
            }
        } else {
            Signal::Hold
        }
    }
}
