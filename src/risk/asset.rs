use chrono::{DateTime, Duration, Utc};

use crate::models::{AssetState, Outcome};
use crate::risk::Denial;

#[derive(Debug, Clone)]
pub struct AssetGuardConfig {
    pub min_time_between_signals: Duration,
    pub max_consecutive_losses: u32,
    pub lock_duration: Duration,
}

impl Default for AssetGuardConfig {
    fn default() -> Self {
        Self {
            min_time_between_signals: Duration::minutes(60),
            max_consecutive_losses: 3,
            lock_duration: Duration::hours(6),
        }
    }
}

/// Per-asset admission control: signal cool-down plus consecutive-loss
/// lockout.
///
/// `check` never consumes the cool-down: `commit_signal` is called by
/// the control loop only after an order was actually placed, so repeated
/// queries of a denied asset do not starve it.
#[derive(Debug, Clone)]
pub struct AssetGuard {
    config: AssetGuardConfig,
}

impl AssetGuard {
    pub fn new(config: AssetGuardConfig) -> Self {
        Self { config }
    }

    pub fn check(&self, state: &mut AssetState, now: DateTime<Utc>) -> Result<(), Denial> {
        // An expired lock clears on the next query and the loss streak
        // starts over.
        if let Some(until) = state.locked_until {
            if now >= until {
                tracing::info!(
                    "{}: loss lock expired, resetting {} consecutive losses",
                    state.asset,
                    state.consecutive_losses
                );
                state.locked_until = None;
                state.consecutive_losses = 0;
            }
        }

        if let Some(last) = state.last_signal_at {
            if now - last < self.config.min_time_between_signals {
                return Err(Denial::SignalCooldown);
            }
        }

        if let Some(until) = state.locked_until {
            if now < until {
                return Err(Denial::LossLock);
            }
        }

        Ok(())
    }

    /// Record that a signal for this asset was committed to an order.
    pub fn commit_signal(&self, state: &mut AssetState, now: DateTime<Utc>) {
        state.last_signal_at = Some(now);
    }

    /// Fold a settled outcome into the asset statistics. A win or a tie
    /// breaks the loss streak; reaching the configured streak engages
    /// the lock.
    pub fn record_outcome(
        &self,
        state: &mut AssetState,
        outcome: Outcome,
        pnl: f64,
        now: DateTime<Utc>,
    ) {
        state.net_pnl += pnl;
        match outcome {
            Outcome::Win => {
                state.wins += 1;
                state.consecutive_losses = 0;
            }
            Outcome::Tie => {
                state.ties += 1;
                state.consecutive_losses = 0;
            }
            Outcome::Loss => {
                state.losses += 1;
                state.consecutive_losses += 1;
                tracing::info!(
                    "{}: consecutive losses now {}",
                    state.asset,
                    state.consecutive_losses
                );
                if state.consecutive_losses >= self.config.max_consecutive_losses
                    && state.locked_until.is_none()
                {
                    let until = now + self.config.lock_duration;
                    state.locked_until = Some(until);
                    tracing::warn!(
                        "{}: locked until {} after {} consecutive losses",
                        state.asset,
                        until.format("%Y-%m-%d %H:%M:%S"),
                        state.consecutive_losses
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn guard() -> AssetGuard {
        AssetGuard::new(AssetGuardConfig::default())
    }

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, hour, min, 0).unwrap()
    }

    #[test]
    fn test_cooldown_denies_then_admits() {
        let guard = guard();
        let mut state = AssetState::new("EURUSD");

        assert!(guard.check(&mut state, at(10, 0)).is_ok());
        guard.commit_signal(&mut state, at(10, 0));

        assert_eq!(
            guard.check(&mut state, at(10, 30)),
            Err(Denial::SignalCooldown)
        );
        assert!(guard.check(&mut state, at(11, 1)).is_ok());
    }

    #[test]
    fn test_query_does_not_consume_cooldown() {
        let guard = guard();
        let mut state = AssetState::new("EURUSD");

        for _ in 0..5 {
            assert!(guard.check(&mut state, at(10, 0)).is_ok());
        }
        assert!(state.last_signal_at.is_none());
    }

    #[test]
    fn test_three_losses_engage_lock() {
        let guard = guard();
        let mut state = AssetState::new("EURUSD");
        let now = at(10, 0);

        guard.record_outcome(&mut state, Outcome::Loss, -10.0, now);
        assert_eq!(state.consecutive_losses, 1);
        guard.record_outcome(&mut state, Outcome::Loss, -10.0, now);
        guard.record_outcome(&mut state, Outcome::Loss, -10.0, now);

        assert_eq!(state.consecutive_losses, 3);
        assert_eq!(state.locked_until, Some(now + Duration::hours(6)));
        assert_eq!(guard.check(&mut state, at(11, 0)), Err(Denial::LossLock));
    }

    #[test]
    fn test_win_before_threshold_resets_streak() {
        let guard = guard();
        let mut state = AssetState::new("EURUSD");
        let now = at(10, 0);

        guard.record_outcome(&mut state, Outcome::Loss, -10.0, now);
        guard.record_outcome(&mut state, Outcome::Loss, -10.0, now);
        guard.record_outcome(&mut state, Outcome::Win, 8.0, now);

        assert_eq!(state.consecutive_losses, 0);
        assert!(state.locked_until.is_none());
    }

    #[test]
    fn test_tie_resets_streak() {
        let guard = guard();
        let mut state = AssetState::new("EURUSD");
        let now = at(10, 0);

        guard.record_outcome(&mut state, Outcome::Loss, -10.0, now);
        guard.record_outcome(&mut state, Outcome::Tie, 0.0, now);

        assert_eq!(state.consecutive_losses, 0);
        assert_eq!(state.ties, 1);
    }

    #[test]
    fn test_expired_lock_clears_and_admits() {
        let guard = guard();
        let mut state = AssetState::new("EURUSD");
        let now = at(10, 0);

        for _ in 0..3 {
            guard.record_outcome(&mut state, Outcome::Loss, -10.0, now);
        }
        assert!(state.locked_until.is_some());

        let after_lock = now + Duration::hours(6) + Duration::seconds(1);
        assert!(guard.check(&mut state, after_lock).is_ok());
        assert_eq!(state.consecutive_losses, 0);
        assert!(state.locked_until.is_none());
    }

    #[test]
    fn test_cooldown_reported_before_lock() {
        let guard = guard();
        let mut state = AssetState::new("EURUSD");
        let now = at(10, 0);

        guard.commit_signal(&mut state, now);
        for _ in 0..3 {
            guard.record_outcome(&mut state, Outcome::Loss, -10.0, now);
        }

        assert_eq!(
            guard.check(&mut state, at(10, 30)),
            Err(Denial::SignalCooldown)
        );
    }
}
