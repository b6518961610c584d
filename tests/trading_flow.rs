//! End-to-end control-loop scenarios against a scripted broker gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use optionbot::api::{BrokerGateway, OrderRequest, OrderResult};
use optionbot::config::Settings;
use optionbot::engine::Engine;
use optionbot::error::GatewayError;
use optionbot::models::*;
use optionbot::persistence::StateStore;

/// Broker stand-in with programmable candles and outcomes
struct ScenarioGateway {
    balance: f64,
    closes: Mutex<HashMap<String, Vec<f64>>>,
    outcome: Mutex<OrderResult>,
    next_id: AtomicU64,
}

impl ScenarioGateway {
    fn new(balance: f64) -> Self {
        Self {
            balance,
            closes: Mutex::new(HashMap::new()),
            outcome: Mutex::new(OrderResult::Pending),
            next_id: AtomicU64::new(1),
        }
    }

    fn set_closes(&self, asset: &str, closes: Vec<f64>) {
        self.closes.lock().unwrap().insert(asset.to_string(), closes);
    }

    fn set_outcome(&self, outcome: OrderResult) {
        *self.outcome.lock().unwrap() = outcome;
    }
}

#[async_trait]
impl BrokerGateway for ScenarioGateway {
    async fn get_balance(&self) -> Result<f64, GatewayError> {
        Ok(self.balance)
    }

    async fn list_assets(&self) -> Result<Vec<String>, GatewayError> {
        Ok(self.closes.lock().unwrap().keys().cloned().collect())
    }

    async fn get_candles(
        &self,
        asset: &str,
        timeframe_secs: u32,
        _count: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let closes = self
            .closes
            .lock()
            .unwrap()
            .get(asset)
            .cloned()
            .unwrap_or_default();

        let now = Utc::now();
        let step = Duration::seconds(timeframe_secs as i64);
        Ok(closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                asset: asset.to_string(),
                timestamp: now - step * (closes.len() - i) as i32,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect())
    }

    async fn place_order(&self, _request: &OrderRequest) -> Result<String, GatewayError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }

    async fn order_result(&self, _id: &str) -> Result<OrderResult, GatewayError> {
        Ok(*self.outcome.lock().unwrap())
    }
}

/// Steadily falling closes produce a deeply oversold reading
fn falling_closes(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 - i as f64 * 0.5).collect()
}

/// Alternating up/down ticks keep the reading near 50
fn neutral_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| if i % 2 == 0 { 100.0 } else { 100.1 })
        .collect()
}

fn test_settings(state_file: std::path::PathBuf) -> Settings {
    Settings {
        assets: vec!["EURUSD".to_string(), "GBPUSD".to_string()],
        state_file,
        ..Settings::default()
    }
}

fn warmed_state(balance: f64, now: DateTime<Utc>) -> BotState {
    let started = now - Duration::hours(2);
    let day = now.date_naive();
    let mut account = AccountState::new(balance, started, day, month_key(day));
    account.current_day = day;
    BotState::new(account)
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, h, m, s).unwrap()
}

#[tokio::test]
async fn test_oversold_reading_places_put() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path().join("state.json"));

    let gateway = ScenarioGateway::new(1000.0);
    gateway.set_closes("EURUSD", falling_closes(30));
    gateway.set_closes("GBPUSD", neutral_closes(30));

    let store = StateStore::new(&settings.state_file);
    let t0 = at(10, 0, 0);
    let mut engine = Engine::new(&settings, gateway, store, warmed_state(1000.0, t0));

    engine.run_cycle(t0).await;

    // Oversold + inverted polarity: one PUT on EURUSD, nothing on the
    // neutral asset
    let state = engine.state();
    assert_eq!(state.pending.len(), 1);
    let order = &state.pending[0];
    assert_eq!(order.asset, "EURUSD");
    assert_eq!(order.direction, Direction::Put);
    assert_eq!(order.stake, 25.0);
    assert_eq!(order.expires_at, t0 + Duration::minutes(2));
    // Balance untouched until settlement
    assert_eq!(state.account.balance, 1000.0);
    assert_eq!(state.assets["EURUSD"].last_signal_at, Some(t0));
}

#[tokio::test]
async fn test_win_settlement_updates_account() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path().join("state.json"));

    let gateway = ScenarioGateway::new(1000.0);
    gateway.set_closes("EURUSD", falling_closes(30));
    gateway.set_closes("GBPUSD", neutral_closes(30));
    gateway.set_outcome(OrderResult::Win { payout: 45.0 });

    let store = StateStore::new(&settings.state_file);
    let t0 = at(10, 0, 0);
    let mut engine = Engine::new(&settings, gateway, store, warmed_state(1000.0, t0));

    engine.run_cycle(t0).await;
    assert_eq!(engine.state().pending.len(), 1);

    engine.run_cycle(at(10, 6, 0)).await;

    let state = engine.state();
    assert!(state.pending.is_empty());
    assert_eq!(state.account.balance, 1020.0);
    assert_eq!(state.account.daily_pnl, 20.0);

    let asset = &state.assets["EURUSD"];
    assert_eq!(asset.wins, 1);
    assert_eq!(asset.consecutive_losses, 0);

    // Profit lock engages on the next admission attempt: the winning
    // day blocks further signals
    engine.run_cycle(at(11, 30, 0)).await;
    assert!(engine.state().pending.is_empty());
    assert!(engine.state().account.profit_lock_active);
}

#[tokio::test]
async fn test_losses_lock_asset_and_lock_expires() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path().join("state.json"));

    let gateway = ScenarioGateway::new(1000.0);
    gateway.set_closes("EURUSD", falling_closes(30));
    gateway.set_closes("GBPUSD", neutral_closes(30));
    gateway.set_outcome(OrderResult::Loss);

    let store = StateStore::new(&settings.state_file);
    let t0 = at(8, 0, 0);
    let mut engine = Engine::new(&settings, gateway, store, warmed_state(1000.0, t0));

    // Three place-and-lose rounds, spaced past the 1 hour cooldown
    let mut t = t0;
    for expected_losses in 1..=3u32 {
        engine.run_cycle(t).await;
        assert_eq!(engine.state().pending.len(), 1, "round {}", expected_losses);

        engine.run_cycle(t + Duration::minutes(5)).await;
        assert!(engine.state().pending.is_empty());
        assert_eq!(
            engine.state().assets["EURUSD"].consecutive_losses,
            expected_losses
        );
        t += Duration::minutes(61);
    }

    let locked_until = engine.state().assets["EURUSD"].locked_until;
    assert!(locked_until.is_some());

    // Still inside the lock: a fresh signal is denied
    engine.run_cycle(t).await;
    assert!(engine.state().pending.is_empty());

    // After the lock expires the streak is cleared and trading resumes
    let after_lock = locked_until.unwrap() + Duration::seconds(1);
    engine.run_cycle(after_lock).await;
    let state = engine.state();
    assert_eq!(state.pending.len(), 1);
    assert_eq!(state.assets["EURUSD"].consecutive_losses, 0);
}

#[tokio::test]
async fn test_absolute_stop_blocks_all_placements() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path().join("state.json"));

    let gateway = ScenarioGateway::new(1000.0);
    gateway.set_closes("EURUSD", falling_closes(30));
    gateway.set_closes("GBPUSD", falling_closes(30));

    let t0 = at(10, 0, 0);
    let mut state = warmed_state(1000.0, t0);
    state.account.balance = 250.0; // exactly -75%
    state.account.total_pnl = -750.0;

    let store = StateStore::new(&settings.state_file);
    let mut engine = Engine::new(&settings, gateway, store, state);

    engine.run_cycle(t0).await;

    assert!(engine.state().pending.is_empty());
    assert!(engine.state().account.absolute_stop_triggered);
}

#[tokio::test]
async fn test_pending_order_blocks_new_signal_for_same_asset() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path().join("state.json"));

    let gateway = ScenarioGateway::new(1000.0);
    gateway.set_closes("EURUSD", falling_closes(30));
    gateway.set_closes("GBPUSD", neutral_closes(30));

    let store = StateStore::new(&settings.state_file);
    let t0 = at(10, 0, 0);
    let mut engine = Engine::new(&settings, gateway, store, warmed_state(1000.0, t0));

    engine.run_cycle(t0).await;
    // Before expiry: the open order suppresses re-evaluation entirely
    engine.run_cycle(at(10, 1, 0)).await;

    assert_eq!(engine.state().pending.len(), 1);
}

#[tokio::test]
async fn test_restart_resynchronizes_recovered_order() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path().join("state.json"));

    // A snapshot holding an order far past its verification window
    let placed_at = Utc::now() - Duration::hours(3);
    let mut state = warmed_state(1000.0, placed_at);
    state.pending.push(PendingOrder {
        id: uuid::Uuid::new_v4(),
        broker_order_id: "77".to_string(),
        asset: "EURUSD".to_string(),
        direction: Direction::Put,
        stake: 25.0,
        placed_at,
        expires_at: placed_at + Duration::minutes(2),
        verify_attempts: 0,
        status: OrderStatus::AwaitingExpiry,
    });
    StateStore::new(&settings.state_file)
        .save(&state)
        .await
        .unwrap();

    // Broker still cannot answer for it: the stake is written off
    let gateway = ScenarioGateway::new(1000.0);
    gateway.set_closes("EURUSD", neutral_closes(30));

    let engine = Engine::bootstrap(&settings, gateway).await.unwrap();
    let state = engine.state();

    assert!(state.pending.is_empty());
    assert_eq!(state.account.balance, 975.0);
    assert_eq!(state.assets["EURUSD"].losses, 1);
}

#[tokio::test]
async fn test_restart_settles_recovered_order_with_late_result() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path().join("state.json"));

    let placed_at = Utc::now() - Duration::hours(3);
    let mut state = warmed_state(1000.0, placed_at);
    state.pending.push(PendingOrder {
        id: uuid::Uuid::new_v4(),
        broker_order_id: "78".to_string(),
        asset: "EURUSD".to_string(),
        direction: Direction::Call,
        stake: 25.0,
        placed_at,
        expires_at: placed_at + Duration::minutes(2),
        verify_attempts: 0,
        status: OrderStatus::Verifying,
    });
    StateStore::new(&settings.state_file)
        .save(&state)
        .await
        .unwrap();

    // The broker does remember the outcome: settle it properly
    let gateway = ScenarioGateway::new(1000.0);
    gateway.set_closes("EURUSD", neutral_closes(30));
    gateway.set_outcome(OrderResult::Win { payout: 45.0 });

    let engine = Engine::bootstrap(&settings, gateway).await.unwrap();
    let state = engine.state();

    assert!(state.pending.is_empty());
    assert_eq!(state.account.balance, 1020.0);
    assert_eq!(state.assets["EURUSD"].wins, 1);
}

#[tokio::test]
async fn test_engine_snapshot_round_trips_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path().join("state.json"));

    let gateway = ScenarioGateway::new(1000.0);
    gateway.set_closes("EURUSD", falling_closes(30));
    gateway.set_closes("GBPUSD", neutral_closes(30));
    gateway.set_outcome(OrderResult::Loss);

    let store = StateStore::new(&settings.state_file);
    let t0 = at(10, 0, 0);
    let mut engine = Engine::new(&settings, gateway, store, warmed_state(1000.0, t0));

    engine.run_cycle(t0).await;
    engine.run_cycle(at(10, 6, 0)).await; // settles, snapshots

    let reloaded = StateStore::new(&settings.state_file)
        .load()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reloaded, engine.state());
}

#[tokio::test]
async fn test_closed_broker_asset_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path().join("state.json"));

    // Broker only knows GBPUSD; EURUSD is configured but not open
    let gateway = ScenarioGateway::new(1000.0);
    gateway.set_closes("GBPUSD", falling_closes(30));

    let mut engine = Engine::bootstrap(&settings, gateway).await.unwrap();
    engine.run_cycle(Utc::now()).await;

    // Warm-up denies placement (fresh bootstrap), but the point here is
    // that the closed asset never produced an indicator read or order
    assert!(engine.state().pending.is_empty());
    assert!(!engine.state().assets.contains_key("EURUSD"));
}
