// Capital preservation module
pub mod account;
pub mod asset;

pub use account::{AccountGuard, AccountGuardConfig};
pub use asset::{AssetGuard, AssetGuardConfig};

/// Reason a signal was not admitted. These are ordinary control-flow
/// outcomes, not errors; callers log exactly the reason returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    WarmUp,
    AbsoluteStopLoss,
    MonthlyStopLoss,
    ProfitLock,
    SignalCooldown,
    LossLock,
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::WarmUp => write!(f, "warm-up period active"),
            Denial::AbsoluteStopLoss => write!(f, "absolute stop loss triggered"),
            Denial::MonthlyStopLoss => write!(f, "monthly stop loss triggered"),
            Denial::ProfitLock => write!(f, "daily profit lock active"),
            Denial::SignalCooldown => write!(f, "minimum time between signals not elapsed"),
            Denial::LossLock => write!(f, "consecutive-loss lock active"),
        }
    }
}
