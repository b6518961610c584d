use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::api::BrokerGateway;
use crate::config::Settings;
use crate::execution::{LifecycleConfig, OrderLifecycle, SizingConfig};
use crate::indicators::RsiReader;
use crate::models::{month_key, AccountState, BotState, Direction, Signal};
use crate::persistence::StateStore;
use crate::risk::{AccountGuard, AccountGuardConfig, AssetGuard, AssetGuardConfig};
use crate::strategy::{EvaluatorConfig, SignalEvaluator};

/// The control loop: one pass over every configured asset per cycle,
/// with order verification polled independently of signal generation.
///
/// Owns the full `BotState`; no other task mutates it.
pub struct Engine<G> {
    gateway: G,
    evaluator: SignalEvaluator,
    reader: RsiReader,
    account_guard: AccountGuard,
    asset_guard: AssetGuard,
    lifecycle: OrderLifecycle,
    store: StateStore,
    state: BotState,
    configured_assets: Vec<String>,
    active_assets: Vec<String>,
    cycle_interval: std::time::Duration,
    save_every_cycles: u64,
    refresh_assets_every_cycles: u64,
    cycles: u64,
}

impl<G: BrokerGateway> Engine<G> {
    /// Assemble an engine around an already-built state. `bootstrap` is
    /// the entry point for normal startup; this one exists so tests can
    /// inject a prepared state.
    pub fn new(settings: &Settings, gateway: G, store: StateStore, state: BotState) -> Self {
        let evaluator = SignalEvaluator::new(EvaluatorConfig {
            oversold_level: settings.oversold_level,
            overbought_level: settings.overbought_level,
            polarity: settings.polarity,
        });
        let reader = RsiReader::new(settings.rsi_period, settings.candle_timeframe_secs);
        let account_guard = AccountGuard::new(AccountGuardConfig {
            warmup: Duration::seconds(settings.warmup_secs as i64),
            absolute_stop_loss_pct: settings.absolute_stop_loss_pct,
            monthly_stop_loss_pct: settings.monthly_stop_loss_pct,
            profit_lock_threshold: settings.profit_lock_threshold,
            offset: settings.fixed_offset(),
        });
        let asset_guard = AssetGuard::new(AssetGuardConfig {
            min_time_between_signals: Duration::seconds(settings.min_secs_between_signals as i64),
            max_consecutive_losses: settings.max_consecutive_losses,
            lock_duration: Duration::seconds(settings.lock_duration_secs as i64),
        });
        let lifecycle = OrderLifecycle::new(LifecycleConfig {
            expiry_minutes: settings.expiry_minutes,
            verification_grace: Duration::seconds(settings.verification_grace_secs as i64),
            verification_window: Duration::seconds(settings.verification_window_secs as i64),
            max_verification_attempts: settings.max_verification_attempts,
            sizing: SizingConfig {
                position_size_pct: settings.position_size_pct,
                min_position_size: settings.min_position_size,
                max_position_size: settings.max_position_size,
            },
        });

        Self {
            gateway,
            evaluator,
            reader,
            account_guard,
            asset_guard,
            lifecycle,
            store,
            state,
            configured_assets: settings.assets.clone(),
            active_assets: settings.assets.clone(),
            cycle_interval: std::time::Duration::from_secs(settings.cycle_secs),
            save_every_cycles: settings.save_every_cycles,
            refresh_assets_every_cycles: settings.refresh_assets_every_cycles,
            cycles: 0,
        }
    }

    /// Normal startup: restore the snapshot (or seed fresh state from
    /// the broker balance), restart the warm-up clock, resynchronize any
    /// recovered pending orders against the current time, and validate
    /// the tradable asset list.
    pub async fn bootstrap(settings: &Settings, gateway: G) -> crate::Result<Self> {
        let store = StateStore::new(&settings.state_file);
        let now = Utc::now();
        let offset = settings.fixed_offset();

        let state = match store.load().await? {
            Some(mut state) => {
                // Warm-up is a per-process quiet period
                state.account.warmup_started_at = now;
                state
            }
            None => {
                let balance = gateway.get_balance().await?;
                tracing::info!("starting fresh with balance {:.2}", balance);
                let local_day = now.with_timezone(&offset).date_naive();
                BotState::new(AccountState::new(
                    balance,
                    now,
                    local_day,
                    month_key(local_day),
                ))
            }
        };

        let mut engine = Self::new(settings, gateway, store, state);

        // Recovered orders may already be past their verification
        // window; resolve them before the loop starts.
        if !engine.state.pending.is_empty() {
            tracing::info!(
                "resynchronizing {} recovered pending orders",
                engine.state.pending.len()
            );
            let settled = engine
                .lifecycle
                .poll(&engine.gateway, &mut engine.state, &engine.asset_guard, now)
                .await;
            if settled > 0 {
                tracing::info!("{} recovered orders resolved during resync", settled);
            }
        }

        engine.refresh_assets().await;
        Ok(engine)
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    /// One full evaluation cycle at the given instant.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) {
        self.cycles += 1;

        // Verification first, decoupled from signal generation: pending
        // orders settle even when no new signal appears all day.
        let settled = self
            .lifecycle
            .poll(&self.gateway, &mut self.state, &self.asset_guard, now)
            .await;
        if settled > 0 {
            // Balances just moved; snapshot outside the regular cadence
            self.save_best_effort().await;
        }

        for asset in self.active_assets.clone() {
            if self.state.has_open_order(&asset) {
                continue;
            }

            let reading = match self.reader.read(&self.gateway, &asset).await {
                Ok(Some(reading)) => reading,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("{}: indicator read failed, skipping cycle: {}", asset, e);
                    continue;
                }
            };

            let direction = match self.evaluator.evaluate(reading) {
                Signal::Call => Direction::Call,
                Signal::Put => Direction::Put,
                Signal::Hold => continue,
            };
            tracing::info!("{}: reading {:.2} -> {} signal", asset, reading, direction);

            if let Err(denial) =
                self.account_guard
                    .check(&mut self.state.account, &mut self.state.months, now)
            {
                tracing::info!("{}: denied: {}", asset, denial);
                continue;
            }
            let asset_state = self.state.asset_mut(&asset);
            if let Err(denial) = self.asset_guard.check(asset_state, now) {
                tracing::info!("{}: denied: {}", asset, denial);
                continue;
            }

            match self
                .lifecycle
                .place(&self.gateway, &mut self.state, &asset, direction, now)
                .await
            {
                Ok(Some(_)) => {
                    let asset_state = self.state.asset_mut(&asset);
                    self.asset_guard.commit_signal(asset_state, now);
                }
                Ok(None) => {}
                Err(e) => {
                    // Terminal for this cycle's signal; never retried
                    tracing::error!("{}: placement failed: {:#}", asset, e);
                }
            }
        }

        if self.cycles % self.save_every_cycles == 0 {
            self.save_best_effort().await;
        }
        if self.cycles % self.refresh_assets_every_cycles == 0 {
            self.refresh_assets().await;
        }
    }

    /// Run until the shutdown channel fires, then persist and return.
    /// The in-flight cycle always completes before the loop exits.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> crate::Result<()> {
        let mut ticker = tokio::time::interval(self.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "control loop starting: {} assets, cycle every {:?}",
            self.active_assets.len(),
            self.cycle_interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    tracing::info!("shutdown requested, persisting state");
                    break;
                }
            }
        }

        // A failed save on shutdown is the one persistence error that
        // must reach the operator.
        self.store.save(&self.state).await?;
        Ok(())
    }

    /// Mid-run persistence never takes the loop down.
    async fn save_best_effort(&self) {
        if let Err(e) = self.store.save(&self.state).await {
            tracing::error!("state snapshot failed, continuing: {}", e);
        }
    }

    /// Keep the evaluation list to configured assets the broker reports
    /// open, preserving the configured order.
    async fn refresh_assets(&mut self) {
        match self.gateway.list_assets().await {
            Ok(open) => {
                let active: Vec<String> = self
                    .configured_assets
                    .iter()
                    .filter(|a| open.iter().any(|o| o == *a))
                    .cloned()
                    .collect();

                for asset in &self.configured_assets {
                    if !active.contains(asset) {
                        tracing::warn!("{}: not open at the broker, skipping", asset);
                    }
                }
                if active.is_empty() {
                    tracing::warn!("broker reports no configured asset open");
                }
                self.active_assets = active;
            }
            Err(e) => {
                tracing::warn!(
                    "asset list refresh failed ({}), keeping {} active assets",
                    e,
                    self.active_assets.len()
                );
            }
        }
    }
}
