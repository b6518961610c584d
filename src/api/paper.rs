use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tokio::sync::Mutex;

use crate::api::{BrokerGateway, OrderRequest, OrderResult};
use crate::error::GatewayError;
use crate::models::Candle;

const PAYOUT_RATE: f64 = 0.85;
const WIN_PROBABILITY: f64 = 0.48;
const TIE_PROBABILITY: f64 = 0.02;

struct PaperOrder {
    stake: f64,
    expires_at: DateTime<Utc>,
    result: Option<OrderResult>,
}

struct PaperInner {
    balance: f64,
    prices: HashMap<String, f64>,
    orders: HashMap<String, PaperOrder>,
    next_id: u64,
}

/// Simulated broker for practice runs: random-walk candles, realistic
/// payouts, outcomes drawn at expiry. No network, no real money.
pub struct PaperBroker {
    assets: Vec<String>,
    inner: Mutex<PaperInner>,
}

impl PaperBroker {
    pub fn new(assets: Vec<String>, starting_balance: f64) -> Self {
        let prices = assets.iter().map(|a| (a.clone(), 1.0)).collect();
        Self {
            assets,
            inner: Mutex::new(PaperInner {
                balance: starting_balance,
                prices,
                orders: HashMap::new(),
                next_id: 1,
            }),
        }
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn get_balance(&self) -> Result<f64, GatewayError> {
        Ok(self.inner.lock().await.balance)
    }

    async fn list_assets(&self) -> Result<Vec<String>, GatewayError> {
        Ok(self.assets.clone())
    }

    async fn get_candles(
        &self,
        asset: &str,
        timeframe_secs: u32,
        count: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let mut inner = self.inner.lock().await;
        let last = *inner.prices.get(asset).unwrap_or(&1.0);

        // Drift the quote a little on every fetch, then walk backwards
        // from it and emit oldest-first
        let mut rng = rand::thread_rng();
        let current = last * (1.0 + rng.gen_range(-0.001..0.001));
        inner.prices.insert(asset.to_string(), current);

        let mut closes = Vec::with_capacity(count);
        let mut price = current;
        for _ in 0..count {
            closes.push(price);
            price *= 1.0 + rng.gen_range(-0.002..0.002);
        }
        closes.reverse();

        let now = Utc::now();
        let step = Duration::seconds(timeframe_secs as i64);
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let timestamp = now - step * (count - i) as i32;
                Candle {
                    asset: asset.to_string(),
                    timestamp,
                    open: close,
                    high: close * 1.0005,
                    low: close * 0.9995,
                    close,
                    volume: rng.gen_range(500.0..2000.0),
                }
            })
            .collect();

        Ok(candles)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<String, GatewayError> {
        let mut inner = self.inner.lock().await;
        if request.stake > inner.balance {
            return Err(GatewayError::Broker("insufficient funds".to_string()));
        }

        inner.balance -= request.stake;
        let id = inner.next_id.to_string();
        inner.next_id += 1;
        inner.orders.insert(
            id.clone(),
            PaperOrder {
                stake: request.stake,
                expires_at: Utc::now() + Duration::minutes(request.expiry_minutes as i64),
                result: None,
            },
        );

        tracing::debug!(
            "paper broker: accepted {} {} for {:.2} as order {}",
            request.direction,
            request.asset,
            request.stake,
            id
        );
        Ok(id)
    }

    async fn order_result(&self, broker_order_id: &str) -> Result<OrderResult, GatewayError> {
        let mut inner = self.inner.lock().await;
        let order = inner
            .orders
            .get_mut(broker_order_id)
            .ok_or_else(|| GatewayError::Broker(format!("unknown order {}", broker_order_id)))?;

        if Utc::now() < order.expires_at {
            return Ok(OrderResult::Pending);
        }

        // Draw the outcome once; the balance is credited at that moment
        // and re-queries just replay the remembered result.
        if let Some(result) = order.result {
            return Ok(result);
        }

        let mut rng = rand::thread_rng();
        let roll: f64 = rng.gen();
        let result = if roll < WIN_PROBABILITY {
            OrderResult::Win {
                payout: order.stake * (1.0 + PAYOUT_RATE),
            }
        } else if roll < WIN_PROBABILITY + TIE_PROBABILITY {
            OrderResult::Tie
        } else {
            OrderResult::Loss
        };
        order.result = Some(result);

        let credit = match result {
            OrderResult::Win { payout } => payout,
            OrderResult::Tie => order.stake,
            _ => 0.0,
        };
        inner.balance += credit;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;

    fn broker() -> PaperBroker {
        PaperBroker::new(vec!["EURUSD".to_string()], 1000.0)
    }

    #[tokio::test]
    async fn test_candles_are_oldest_first() {
        let broker = broker();
        let candles = broker.get_candles("EURUSD", 300, 50).await.unwrap();

        assert_eq!(candles.len(), 50);
        for pair in candles.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_placement_reserves_stake() {
        let broker = broker();
        let id = broker
            .place_order(&OrderRequest {
                asset: "EURUSD".to_string(),
                direction: Direction::Put,
                stake: 25.0,
                expiry_minutes: 2,
            })
            .await
            .unwrap();

        assert_eq!(id, "1");
        assert_eq!(broker.get_balance().await.unwrap(), 975.0);
    }

    #[tokio::test]
    async fn test_result_pending_before_expiry() {
        let broker = broker();
        let id = broker
            .place_order(&OrderRequest {
                asset: "EURUSD".to_string(),
                direction: Direction::Put,
                stake: 25.0,
                expiry_minutes: 5,
            })
            .await
            .unwrap();

        assert_eq!(
            broker.order_result(&id).await.unwrap(),
            OrderResult::Pending
        );
    }

    #[tokio::test]
    async fn test_oversized_stake_rejected() {
        let broker = broker();
        let result = broker
            .place_order(&OrderRequest {
                asset: "EURUSD".to_string(),
                direction: Direction::Call,
                stake: 5000.0,
                expiry_minutes: 2,
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Broker(_))));
    }

    #[tokio::test]
    async fn test_unknown_order_is_an_error() {
        let broker = broker();
        assert!(broker.order_result("missing").await.is_err());
    }
}
