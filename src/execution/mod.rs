// Order execution module
pub mod lifecycle;
pub mod sizing;

pub use lifecycle::{LifecycleConfig, OrderLifecycle};
pub use sizing::{stake_for, SizingConfig};
