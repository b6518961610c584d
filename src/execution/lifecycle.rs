use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::api::{BrokerGateway, OrderRequest, OrderResult};
use crate::execution::sizing::{stake_for, SizingConfig};
use crate::models::{BotState, Direction, Outcome, OrderStatus, PendingOrder};
use crate::risk::AssetGuard;

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub expiry_minutes: u32,
    /// Quiet period after expiry before the first outcome query
    pub verification_grace: Duration,
    /// Total time past expiry before an unverified order is written off
    pub verification_window: Duration,
    pub max_verification_attempts: u32,
    pub sizing: SizingConfig,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: 2,
            verification_grace: Duration::seconds(15),
            verification_window: Duration::seconds(120),
            max_verification_attempts: 8,
            sizing: SizingConfig::default(),
        }
    }
}

/// Drives orders through
/// Placed → AwaitingExpiry → Verifying → Settled | Unverifiable.
///
/// Every order reaches a terminal status in bounded time: either the
/// broker reports an outcome, or the verification window runs out and
/// the order is written off as a loss. The balance moves only here.
#[derive(Debug, Clone)]
pub struct OrderLifecycle {
    config: LifecycleConfig,
}

impl OrderLifecycle {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    /// Place a new order for an admitted signal. Returns `Ok(None)` when
    /// the account cannot cover the minimum stake. A broker rejection is
    /// terminal for this cycle's signal; placement is never retried.
    pub async fn place<G: BrokerGateway + ?Sized>(
        &self,
        gateway: &G,
        state: &mut BotState,
        asset: &str,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Uuid>> {
        let Some(stake) = stake_for(state.account.balance, &self.config.sizing) else {
            tracing::warn!(
                "{}: balance {:.2} cannot cover the minimum stake, skipping signal",
                asset,
                state.account.balance
            );
            return Ok(None);
        };

        let request = OrderRequest {
            asset: asset.to_string(),
            direction,
            stake,
            expiry_minutes: self.config.expiry_minutes,
        };

        let broker_order_id = gateway
            .place_order(&request)
            .await
            .with_context(|| format!("placing {} {} for {:.2}", direction, asset, stake))?;

        let order = PendingOrder {
            id: Uuid::new_v4(),
            broker_order_id,
            asset: asset.to_string(),
            direction,
            stake,
            placed_at: now,
            expires_at: now + Duration::minutes(self.config.expiry_minutes as i64),
            verify_attempts: 0,
            status: OrderStatus::Placed,
        };

        tracing::info!(
            "{}: placed {} for {:.2}, expires {}",
            asset,
            direction,
            stake,
            order.expires_at.format("%H:%M:%S")
        );

        let id = order.id;
        state.pending.push(order);
        Ok(Some(id))
    }

    /// Drive every non-terminal order one step. Terminal orders are
    /// removed from the active set. Returns how many orders settled
    /// (written-off ones included).
    pub async fn poll<G: BrokerGateway + ?Sized>(
        &self,
        gateway: &G,
        state: &mut BotState,
        asset_guard: &AssetGuard,
        now: DateTime<Utc>,
    ) -> usize {
        let ids: Vec<Uuid> = state
            .pending
            .iter()
            .filter(|o| !o.status.is_terminal())
            .map(|o| o.id)
            .collect();

        let mut settled = 0;
        for id in ids {
            if self.step_order(gateway, state, asset_guard, id, now).await {
                settled += 1;
            }
        }

        state.pending.retain(|o| !o.status.is_terminal());
        settled
    }

    /// Advance one order; true when it reached a terminal status.
    async fn step_order<G: BrokerGateway + ?Sized>(
        &self,
        gateway: &G,
        state: &mut BotState,
        asset_guard: &AssetGuard,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(order) = state.pending.iter_mut().find(|o| o.id == id) else {
            return false;
        };

        if order.status == OrderStatus::Placed {
            order.status = OrderStatus::AwaitingExpiry;
        }

        // The outcome is undefined until expiry plus a grace period.
        if now < order.expires_at + self.config.verification_grace {
            return false;
        }
        order.status = OrderStatus::Verifying;

        let (asset, direction, stake) = (order.asset.clone(), order.direction, order.stake);
        let broker_order_id = order.broker_order_id.clone();

        let outcome = match gateway.order_result(&broker_order_id).await {
            Ok(OrderResult::Win { payout }) => Some((Outcome::Win, payout - stake)),
            Ok(OrderResult::Loss) => Some((Outcome::Loss, -stake)),
            Ok(OrderResult::Tie) => Some((Outcome::Tie, 0.0)),
            Ok(OrderResult::Pending) => {
                order.verify_attempts += 1;
                tracing::debug!(
                    "{}: order {} still pending at broker (attempt {})",
                    asset,
                    broker_order_id,
                    order.verify_attempts
                );
                None
            }
            Err(e) => {
                order.verify_attempts += 1;
                tracing::warn!(
                    "{}: outcome query for order {} failed (attempt {}): {}",
                    asset,
                    broker_order_id,
                    order.verify_attempts,
                    e
                );
                None
            }
        };

        match outcome {
            Some((outcome, pnl)) => {
                order.status = OrderStatus::Settled;
                tracing::info!(
                    "{}: {} settled {:?} ({:+.2})",
                    asset,
                    direction,
                    outcome,
                    pnl
                );
                self.apply_outcome(state, asset_guard, &asset, outcome, pnl, now);
                true
            }
            None => {
                let window_exhausted = now >= order.expires_at + self.config.verification_window;
                let attempts_exhausted =
                    order.verify_attempts >= self.config.max_verification_attempts;

                if window_exhausted || attempts_exhausted {
                    order.status = OrderStatus::Unverifiable;
                    tracing::error!(
                        "{}: order {} unverifiable after {} attempts, writing off stake {:.2} as a loss",
                        asset,
                        broker_order_id,
                        order.verify_attempts,
                        stake
                    );
                    self.apply_outcome(state, asset_guard, &asset, Outcome::Loss, -stake, now);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Fold a finalized outcome into account, asset, and monthly
    /// statistics. The only place the balance changes.
    fn apply_outcome(
        &self,
        state: &mut BotState,
        asset_guard: &AssetGuard,
        asset: &str,
        outcome: Outcome,
        pnl: f64,
        now: DateTime<Utc>,
    ) {
        state.account.balance += pnl;
        state.account.total_pnl += pnl;
        state.account.daily_pnl += pnl;

        let asset_state = state.asset_mut(asset);
        asset_guard.record_outcome(asset_state, outcome, pnl, now);

        let balance = state.account.balance;
        state.current_month_mut().update_balance(balance);
    }
}
