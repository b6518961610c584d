// Broker connectivity module
pub mod gateway;
pub mod paper;
pub mod rest;

pub use gateway::{BrokerGateway, OrderRequest, OrderResult};
pub use paper::PaperBroker;
pub use rest::RestBrokerClient;
