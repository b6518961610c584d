use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::api::{BrokerGateway, OrderRequest, OrderResult};
use crate::error::GatewayError;
use crate::models::Candle;

const RATE_LIMIT_RPM: u32 = 60;
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 10;

// Type alias for the rate limiter to simplify signatures
type BrokerRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

// ============== Wire Types ==============

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: f64,
}

#[derive(Debug, Deserialize)]
struct AssetsResponse {
    assets: Vec<AssetEntry>,
}

#[derive(Debug, Deserialize)]
struct AssetEntry {
    symbol: String,
    open: bool,
}

#[derive(Debug, Deserialize)]
struct CandleRaw {
    /// Unix seconds
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

#[derive(Debug, Serialize)]
struct PlaceOrderBody<'a> {
    asset: &'a str,
    direction: &'a str,
    stake: f64,
    expiry_minutes: u32,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderResponse {
    order_id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OrderResultResponse {
    status: String,
    #[serde(default)]
    payout: Option<f64>,
}

// ============== Implementation ==============

/// JSON/REST broker client with rate limiting and bounded retries.
///
/// Reads (balance, assets, candles, outcome queries) are retried with
/// exponential backoff on 429/5xx/network errors. Order placement is a
/// single attempt: a retried POST could double a stake.
#[derive(Clone)]
pub struct RestBrokerClient {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<BrokerRateLimiter>,
}

impl RestBrokerClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Rate-limited GET with retry on transient failures
    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response, GatewayError> {
        let mut last_error = String::new();

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self
                .client
                .get(url)
                .header("X-API-KEY", &self.api_key)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_error = format!("status {}", status);
                        if attempt < MAX_RETRIES {
                            let backoff_secs = 2u64.pow(attempt);
                            tracing::warn!(
                                "broker returned {}, retrying in {}s (attempt {}/{})",
                                status,
                                backoff_secs,
                                attempt,
                                MAX_RETRIES
                            );
                            tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        }
                        continue;
                    }

                    // Other 4xx: the broker meant it
                    let body = response.text().await.unwrap_or_default();
                    return Err(GatewayError::Broker(format!("{}: {}", status, body)));
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    last_error = e.to_string();
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => return Err(GatewayError::Http(e)),
            }
        }

        Err(GatewayError::Exhausted {
            attempts: MAX_RETRIES,
            last: last_error,
        })
    }
}

#[async_trait]
impl BrokerGateway for RestBrokerClient {
    async fn get_balance(&self) -> Result<f64, GatewayError> {
        let url = format!("{}/v1/account/balance", self.base_url);
        let response: BalanceResponse = self.get_with_retry(&url).await?.json().await?;
        Ok(response.balance)
    }

    async fn list_assets(&self) -> Result<Vec<String>, GatewayError> {
        let url = format!("{}/v1/assets", self.base_url);
        let response: AssetsResponse = self.get_with_retry(&url).await?.json().await?;
        Ok(response
            .assets
            .into_iter()
            .filter(|a| a.open)
            .map(|a| a.symbol)
            .collect())
    }

    async fn get_candles(
        &self,
        asset: &str,
        timeframe_secs: u32,
        count: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let url = format!(
            "{}/v1/candles?asset={}&timeframe={}&count={}",
            self.base_url, asset, timeframe_secs, count
        );
        let raw: Vec<CandleRaw> = self.get_with_retry(&url).await?.json().await?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            let timestamp = DateTime::<Utc>::from_timestamp(entry.timestamp, 0).ok_or_else(|| {
                GatewayError::Malformed(format!("candle timestamp {}", entry.timestamp))
            })?;
            candles.push(Candle {
                asset: asset.to_string(),
                timestamp,
                open: entry.open,
                high: entry.high,
                low: entry.low,
                close: entry.close,
                volume: entry.volume,
            });
        }
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<String, GatewayError> {
        let url = format!("{}/v1/orders", self.base_url);
        let direction = match request.direction {
            crate::models::Direction::Call => "call",
            crate::models::Direction::Put => "put",
        };
        let body = PlaceOrderBody {
            asset: &request.asset,
            direction,
            stake: request.stake,
            expiry_minutes: request.expiry_minutes,
        };

        // Single attempt only
        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Broker(format!("{}: {}", status, body)));
        }

        let placed: PlaceOrderResponse = response.json().await?;
        match placed.order_id {
            serde_json::Value::String(id) => Ok(id),
            serde_json::Value::Number(id) => Ok(id.to_string()),
            other => Err(GatewayError::Malformed(format!("order_id {}", other))),
        }
    }

    async fn order_result(&self, broker_order_id: &str) -> Result<OrderResult, GatewayError> {
        let url = format!("{}/v1/orders/{}", self.base_url, broker_order_id);
        let response: OrderResultResponse = self.get_with_retry(&url).await?.json().await?;

        match response.status.as_str() {
            "win" => {
                let payout = response.payout.ok_or_else(|| {
                    GatewayError::Malformed("win result without payout".to_string())
                })?;
                Ok(OrderResult::Win { payout })
            }
            "loss" | "loose" => Ok(OrderResult::Loss),
            "tie" | "equal" => Ok(OrderResult::Tie),
            "pending" | "open" => Ok(OrderResult::Pending),
            other => Err(GatewayError::Malformed(format!("order status {:?}", other))),
        }
    }
}
