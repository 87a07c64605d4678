//! Broker port
//!
//! Everything the engine needs from an execution venue. The engine only
//! sees this trait; the paper simulator is one implementation.

pub mod paper;

pub use paper::{PaperBroker, PaperBrokerConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{AccountInfo, Credentials, OpenPositionParams, Position, Price};

/// Faults reported by a broker implementation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("unsupported symbol: {0}")]
    UnsupportedSymbol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Account, market data and order entry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    async fn get_account_info(&self, credentials: &Credentials) -> Result<AccountInfo, BrokerError>;

    /// Latest quote for `symbol`
    async fn get_price(&self, symbol: &str) -> Result<Price, BrokerError>;

    async fn get_open_positions(&self, credentials: &Credentials)
        -> Result<Vec<Position>, BrokerError>;

    /// Submit a market order; the returned position carries the fill price
    async fn open_position(&self, params: OpenPositionParams) -> Result<Position, BrokerError>;
}
