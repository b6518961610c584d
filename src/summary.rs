use crate::models::BotState;

/// Win/loss/tie totals across every asset
pub fn totals(state: &BotState) -> (u32, u32, u32) {
    state.assets.values().fold((0, 0, 0), |(w, l, t), a| {
        (w + a.wins, l + a.losses, t + a.ties)
    })
}

/// Log the operator-facing session summary: everything here is derived
/// from the tracked asset and monthly statistics.
pub fn log_summary(state: &BotState) {
    let account = &state.account;
    let (wins, losses, ties) = totals(state);
    let total_trades = wins + losses + ties;

    tracing::info!("================ session summary ================");
    tracing::info!("initial capital: {:.2}", account.initial_capital);
    tracing::info!("final balance:   {:.2}", account.balance);

    if account.initial_capital > 0.0 {
        let total_return =
            (account.balance - account.initial_capital) / account.initial_capital * 100.0;
        tracing::info!("total return:    {:+.2}%", total_return);
    }
    tracing::info!("net profit:      {:+.2}", account.total_pnl);

    tracing::info!("total trades:    {}", total_trades);
    if total_trades > 0 {
        let decided = wins + losses;
        let win_rate = if decided > 0 {
            wins as f64 / decided as f64 * 100.0
        } else {
            0.0
        };
        tracing::info!(
            "outcomes:        {} won / {} lost / {} tied ({:.1}% success excluding ties)",
            wins,
            losses,
            ties,
            win_rate
        );
    }

    if account.absolute_stop_triggered {
        tracing::warn!("absolute stop loss: TRIGGERED");
    }
    if account.monthly_stop_triggered {
        tracing::warn!("monthly stop loss: TRIGGERED in {}", account.current_month);
    }
    if account.profit_lock_active {
        tracing::info!("daily profit lock: active ({:+.2} today)", account.daily_pnl);
    }

    let traded: Vec<_> = state
        .assets
        .values()
        .filter(|a| a.total_trades() > 0)
        .collect();
    if !traded.is_empty() {
        tracing::info!("per-asset:");
        for asset in traded {
            tracing::info!(
                "  {}: {} trades | {}W/{}L/{}T | {:.1}% success | net {:+.2} | streak {}",
                asset.asset,
                asset.total_trades(),
                asset.wins,
                asset.losses,
                asset.ties,
                asset.win_rate(),
                asset.net_pnl,
                asset.consecutive_losses
            );
        }
    }

    if !state.months.is_empty() {
        tracing::info!("per-month:");
        for month in &state.months {
            let marker = if account.monthly_stop_triggered && month.month == account.current_month
            {
                " (monthly stop)"
            } else {
                ""
            };
            tracing::info!(
                "  {}: {:.2} -> {:.2} ({:+.2}%){}",
                month.month,
                month.starting_balance,
                month.ending_balance,
                month.pnl_pct,
                marker
            );
        }
    }
    tracing::info!("=================================================");
}
