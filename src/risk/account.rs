use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::models::{month_key, AccountState, MonthlyRecord};
use crate::risk::Denial;

#[derive(Debug, Clone)]
pub struct AccountGuardConfig {
    pub warmup: Duration,
    pub absolute_stop_loss_pct: f64,
    pub monthly_stop_loss_pct: f64,
    pub profit_lock_threshold: f64,
    /// Offset defining the trading-day and month boundaries
    pub offset: FixedOffset,
}

impl Default for AccountGuardConfig {
    fn default() -> Self {
        Self {
            warmup: Duration::hours(1),
            absolute_stop_loss_pct: 0.75, // -75% of initial capital
            monthly_stop_loss_pct: 0.40,  // -40% within one month
            profit_lock_threshold: 0.0,   // any positive day locks in the gain
            offset: FixedOffset::east_opt(0).unwrap(),
        }
    }
}

/// Account-wide admission control.
///
/// Four independent checks in fixed order: warm-up, absolute stop,
/// monthly stop, daily profit lock. The first denial wins. Calendar
/// rollovers (day and month, in the configured offset) are processed
/// before the checks so a stale lock never outlives its period.
#[derive(Debug, Clone)]
pub struct AccountGuard {
    config: AccountGuardConfig,
}

impl AccountGuard {
    pub fn new(config: AccountGuardConfig) -> Self {
        Self { config }
    }

    pub fn check(
        &self,
        account: &mut AccountState,
        months: &mut Vec<MonthlyRecord>,
        now: DateTime<Utc>,
    ) -> Result<(), Denial> {
        self.roll_calendar(account, months, now);

        if now - account.warmup_started_at < self.config.warmup {
            return Err(Denial::WarmUp);
        }

        if account.absolute_stop_triggered
            || account.drawdown() >= self.config.absolute_stop_loss_pct
        {
            if !account.absolute_stop_triggered {
                account.absolute_stop_triggered = true;
                tracing::error!(
                    "absolute stop loss triggered: balance {:.2} is down {:.1}% from initial {:.2}",
                    account.balance,
                    account.drawdown() * 100.0,
                    account.initial_capital
                );
            }
            return Err(Denial::AbsoluteStopLoss);
        }

        if account.monthly_stop_triggered
            || account.monthly_drawdown() >= self.config.monthly_stop_loss_pct
        {
            if !account.monthly_stop_triggered {
                account.monthly_stop_triggered = true;
                tracing::error!(
                    "monthly stop loss triggered in {}: balance {:.2} is down {:.1}% from month start {:.2}",
                    account.current_month,
                    account.balance,
                    account.monthly_drawdown() * 100.0,
                    account.month_start_balance
                );
            }
            return Err(Denial::MonthlyStopLoss);
        }

        if account.profit_lock_active || account.daily_pnl > self.config.profit_lock_threshold {
            if !account.profit_lock_active {
                account.profit_lock_active = true;
                tracing::info!(
                    "daily profit lock engaged at {:+.2}; no more signals until tomorrow",
                    account.daily_pnl
                );
            }
            return Err(Denial::ProfitLock);
        }

        Ok(())
    }

    /// Process day and month boundaries. A day change clears the profit
    /// lock and the daily P&L; a month change finalizes the outgoing
    /// MonthlyRecord, rebases the month-start balance, and clears the
    /// monthly stop. The absolute stop never clears.
    fn roll_calendar(
        &self,
        account: &mut AccountState,
        months: &mut Vec<MonthlyRecord>,
        now: DateTime<Utc>,
    ) {
        let local_day = now.with_timezone(&self.config.offset).date_naive();
        if local_day == account.current_day {
            return;
        }

        tracing::info!("new trading day: {}", local_day);
        if account.profit_lock_active {
            tracing::info!(
                "releasing profit lock from previous day ({:+.2})",
                account.daily_pnl
            );
        }
        account.profit_lock_active = false;
        account.daily_pnl = 0.0;
        account.current_day = local_day;

        let month = month_key(local_day);
        if month != account.current_month {
            if let Some(record) = months
                .iter_mut()
                .find(|m| m.month == account.current_month)
            {
                record.update_balance(account.balance);
                record.closed = true;
                tracing::info!(
                    "closed month {} at {:.2} ({:+.2}%)",
                    record.month,
                    record.ending_balance,
                    record.pnl_pct
                );
            }

            account.current_month = month.clone();
            account.month_start_balance = account.balance;
            if account.monthly_stop_triggered {
                tracing::info!("monthly stop loss cleared on rollover to {}", month);
                account.monthly_stop_triggered = false;
            }
            if !months.iter().any(|m| m.month == month) {
                months.push(MonthlyRecord::open(month, account.balance));
            }
        }
    }
}
