pub mod client;
pub mod error;
pub mod model;

pub use client::BrokerClient;
pub use error::BrokerError;
pub use model::{Account, BrokerPosition, Clock, OrderRequest, OrderResponse, OrderSide, StopLoss, TakeProfit};
