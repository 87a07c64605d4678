//! Trading configuration handed to the engine
//!
//! These are the immutable per-run values the strategy and risk gates read.
//! They are built from [`super::AppConfig`] or constructed directly in tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Breakout buffer used when the strategy config leaves it unset (price units)
pub const DEFAULT_BREAKOUT_BUFFER: f64 = 0.5;
/// Take-profit distance as a multiple of stop distance when unset
pub const DEFAULT_RISK_REWARD_RATIO: f64 = 2.0;

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must be at least 1")]
    ZeroLimit { field: &'static str },

    #[error("strategy symbol is empty")]
    EmptySymbol,
}

/// Strategy parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Traded instrument (e.g. "XAUUSD")
    pub symbol: String,
    /// Lot suggested with every actionable signal
    pub max_lot_per_trade: f64,
    /// Distance beyond the previous candle's range that counts as a breakout
    #[serde(default)]
    pub breakout_buffer: Option<f64>,
    /// Take-profit distance / stop distance
    #[serde(default)]
    pub risk_reward_ratio: Option<f64>,
}

impl StrategyConfig {
    pub fn new(symbol: impl Into<String>, max_lot_per_trade: f64) -> Self {
        Self {
            symbol: symbol.into(),
            max_lot_per_trade,
            breakout_buffer: None,
            risk_reward_ratio: None,
        }
    }

    pub fn buffer(&self) -> f64 {
        self.breakout_buffer.unwrap_or(DEFAULT_BREAKOUT_BUFFER)
    }

    pub fn rr(&self) -> f64 {
        self.risk_reward_ratio.unwrap_or(DEFAULT_RISK_REWARD_RATIO)
    }
}

/// Risk limits plus strategy parameters for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Daily drawdown (percent of start equity) that halts trading
    pub max_daily_loss_percent: f64,
    pub max_lot_per_trade: f64,
    pub max_open_positions: usize,
    pub max_trades_per_day: u32,
    pub strategy: StrategyConfig,
}

impl BotConfig {
    /// Reject values the risk gates cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_positive(self.max_daily_loss_percent) {
            return Err(ConfigError::NonPositive {
                field: "max_daily_loss_percent",
                value: self.max_daily_loss_percent,
            });
        }
        if !is_positive(self.max_lot_per_trade) {
            return Err(ConfigError::NonPositive {
                field: "max_lot_per_trade",
                value: self.max_lot_per_trade,
            });
        }
        if self.max_open_positions == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_open_positions",
            });
        }
        if self.max_trades_per_day == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_trades_per_day",
            });
        }
        if self.strategy.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        if let Some(buffer) = self.strategy.breakout_buffer {
            if buffer < 0.0 {
                return Err(ConfigError::Negative {
                    field: "strategy.breakout_buffer",
                    value: buffer,
                });
            }
        }
        if let Some(rr) = self.strategy.risk_reward_ratio {
            if !is_positive(rr) {
                return Err(ConfigError::NonPositive {
                    field: "strategy.risk_reward_ratio",
                    value: rr,
                });
            }
        }
        Ok(())
    }
}

fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// How daily risk counters are re-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyReset {
    /// Re-base on the first cycle of every UTC day
    #[default]
    Calendar,
    /// Only initialize once, when start equity is still zero
    BootstrapOnly,
}
