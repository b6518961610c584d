use crate::api::BrokerGateway;
use crate::error::GatewayError;
use crate::indicators::calculate_rsi;

const CANDLE_FETCH_COUNT: usize = 100;

/// Produces the bounded indicator reading for an asset by pulling recent
/// candles from the broker and running RSI over the closes.
#[derive(Debug, Clone)]
pub struct RsiReader {
    period: usize,
    timeframe_secs: u32,
}

impl RsiReader {
    pub fn new(period: usize, timeframe_secs: u32) -> Self {
        Self {
            period,
            timeframe_secs,
        }
    }

    /// `Ok(None)` means the feed had too little history this cycle; the
    /// caller skips the asset rather than treating it as a fault.
    pub async fn read<G: BrokerGateway + ?Sized>(
        &self,
        gateway: &G,
        asset: &str,
    ) -> Result<Option<f64>, GatewayError> {
        let candles = gateway
            .get_candles(asset, self.timeframe_secs, CANDLE_FETCH_COUNT)
            .await?;

        if candles.len() < self.period + 1 {
            tracing::debug!(
                "{}: only {} candles available, need {}",
                asset,
                candles.len(),
                self.period + 1
            );
            return Ok(None);
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        Ok(calculate_rsi(&closes, self.period))
    }
}
