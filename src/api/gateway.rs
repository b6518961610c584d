use async_trait::async_trait;

use crate::error::GatewayError;
use crate::models::{Candle, Direction};

/// Order placement parameters sent to the broker
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub asset: String,
    pub direction: Direction,
    pub stake: f64,
    pub expiry_minutes: u32,
}

/// Outcome of an order as reported by the broker.
///
/// `Win::payout` is the total amount returned, stake included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderResult {
    Win { payout: f64 },
    Loss,
    Tie,
    Pending,
}

/// Everything the control loop needs from a broker.
///
/// Implementations are internally synchronized; the loop holds a single
/// instance and never retries `place_order` on failure (a duplicate
/// stake is worse than a missed signal).
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn get_balance(&self) -> Result<f64, GatewayError>;

    /// Assets currently open for trading
    async fn list_assets(&self) -> Result<Vec<String>, GatewayError>;

    /// Most recent candles, oldest first
    async fn get_candles(
        &self,
        asset: &str,
        timeframe_secs: u32,
        count: usize,
    ) -> Result<Vec<Candle>, GatewayError>;

    /// Returns the broker-side order id
    async fn place_order(&self, request: &OrderRequest) -> Result<String, GatewayError>;

    async fn order_result(&self, broker_order_id: &str) -> Result<OrderResult, GatewayError>;
}
