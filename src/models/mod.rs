use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Direction of a binary option contract
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Call,
    Put,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Call => write!(f, "CALL"),
            Direction::Put => write!(f, "PUT"),
        }
    }
}

/// Trading signal produced by the evaluator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Call,
    Put,
    Hold,
}

/// Final outcome of a settled contract
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
    Tie,
}

/// OHLCV candlestick data from the broker feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub asset: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Lifecycle status of an order.
///
/// Placed → AwaitingExpiry → Verifying → Settled | Unverifiable
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Placed,
    AwaitingExpiry,
    Verifying,
    Settled,
    Unverifiable,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Settled | OrderStatus::Unverifiable)
    }
}

/// An order that has been placed but not yet settled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingOrder {
    pub id: Uuid,
    pub broker_order_id: String,
    pub asset: String,
    pub direction: Direction,
    pub stake: f64,
    pub placed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub verify_attempts: u32,
    pub status: OrderStatus,
}

/// Per-asset trading state, created at first reference and kept for the
/// lifetime of the deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetState {
    pub asset: String,
    pub last_signal_at: Option<DateTime<Utc>>,
    pub consecutive_losses: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub net_pnl: f64,
}

impl AssetState {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            last_signal_at: None,
            consecutive_losses: 0,
            locked_until: None,
            wins: 0,
            losses: 0,
            ties: 0,
            net_pnl: 0.0,
        }
    }

    pub fn total_trades(&self) -> u32 {
        self.wins + self.losses + self.ties
    }

    /// Success rate excluding ties, as a percentage
    pub fn win_rate(&self) -> f64 {
        let decided = self.wins + self.losses;
        if decided == 0 {
            return 0.0;
        }
        self.wins as f64 / decided as f64 * 100.0
    }
}

/// Account-wide capital and guard state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountState {
    pub initial_capital: f64,
    pub balance: f64,
    pub month_start_balance: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub warmup_started_at: DateTime<Utc>,
    pub profit_lock_active: bool,
    pub absolute_stop_triggered: bool,
    pub monthly_stop_triggered: bool,
    pub current_month: String,
    pub current_day: NaiveDate,
}

impl AccountState {
    pub fn new(initial_capital: f64, now: DateTime<Utc>, day: NaiveDate, month: String) -> Self {
        Self {
            initial_capital,
            balance: initial_capital,
            month_start_balance: initial_capital,
            total_pnl: 0.0,
            daily_pnl: 0.0,
            warmup_started_at: now,
            profit_lock_active: false,
            absolute_stop_triggered: false,
            monthly_stop_triggered: false,
            current_month: month,
            current_day: day,
        }
    }

    /// Drawdown against initial capital, as a fraction in [0, 1]
    pub fn drawdown(&self) -> f64 {
        if self.initial_capital <= 0.0 {
            return 0.0;
        }
        ((self.initial_capital - self.balance) / self.initial_capital).max(0.0)
    }

    /// Drawdown against the month-start balance, as a fraction in [0, 1]
    pub fn monthly_drawdown(&self) -> f64 {
        if self.month_start_balance <= 0.0 {
            return 0.0;
        }
        ((self.month_start_balance - self.balance) / self.month_start_balance).max(0.0)
    }
}

/// One calendar month of account performance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyRecord {
    pub month: String,
    pub starting_balance: f64,
    pub ending_balance: f64,
    pub pnl_pct: f64,
    pub closed: bool,
}

impl MonthlyRecord {
    pub fn open(month: String, starting_balance: f64) -> Self {
        Self {
            month,
            starting_balance,
            ending_balance: starting_balance,
            pnl_pct: 0.0,
            closed: false,
        }
    }

    pub fn update_balance(&mut self, balance: f64) {
        self.ending_balance = balance;
        self.pnl_pct = if self.starting_balance > 0.0 {
            (balance - self.starting_balance) / self.starting_balance * 100.0
        } else {
            0.0
        };
    }
}

/// Month key in `YYYY-MM` form
pub fn month_key(day: NaiveDate) -> String {
    day.format("%Y-%m").to_string()
}

/// The full mutable context threaded through every component call and
/// serialized wholesale by the state store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotState {
    pub account: AccountState,
    pub assets: BTreeMap<String, AssetState>,
    pub pending: Vec<PendingOrder>,
    pub months: Vec<MonthlyRecord>,
}

impl BotState {
    pub fn new(account: AccountState) -> Self {
        let month = MonthlyRecord::open(account.current_month.clone(), account.balance);
        Self {
            account,
            assets: BTreeMap::new(),
            pending: Vec::new(),
            months: vec![month],
        }
    }

    /// Per-asset state, created on first reference
    pub fn asset_mut(&mut self, asset: &str) -> &mut AssetState {
        self.assets
            .entry(asset.to_string())
            .or_insert_with(|| AssetState::new(asset))
    }

    /// True while the asset has an order that is not yet settled or
    /// written off. At most one such order may exist per asset.
    pub fn has_open_order(&self, asset: &str) -> bool {
        self.pending
            .iter()
            .any(|o| o.asset == asset && !o.status.is_terminal())
    }

    /// The record for the account's current month, created if missing
    pub fn current_month_mut(&mut self) -> &mut MonthlyRecord {
        let month = self.account.current_month.clone();
        let balance = self.account.balance;
        if !self.months.iter().any(|m| m.month == month) {
            self.months.push(MonthlyRecord::open(month.clone(), balance));
        }
        self.months
            .iter_mut()
            .find(|m| m.month == month)
            .expect("record just inserted")
    }
}
