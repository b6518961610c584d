#[derive(Debug, Clone)]
pub struct SizingConfig {
    /// Fraction of the current balance staked per trade
    pub position_size_pct: f64,
    pub min_position_size: f64,
    pub max_position_size: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            position_size_pct: 0.025,
            min_position_size: 1.0,
            max_position_size: 500.0,
        }
    }
}

/// Stake for the next trade: a percentage of the current balance clamped
/// to the configured bounds, rounded to cents. `None` when even the
/// clamped stake exceeds the balance.
pub fn stake_for(balance: f64, config: &SizingConfig) -> Option<f64> {
    let raw = balance * config.position_size_pct;
    let stake = raw.clamp(config.min_position_size, config.max_position_size);
    let stake = (stake * 100.0).round() / 100.0;

    if stake > balance || stake <= 0.0 {
        return None;
    }
    Some(stake)
}
