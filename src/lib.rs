// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod strategy;
pub mod summary;

// Re-export commonly used types
pub use api::{BrokerGateway, OrderRequest, OrderResult};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
