//! Core types used throughout GoldBot
//!
//! Defines the market, account, signal and trade structures shared by the
//! strategy, risk and engine modules.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction of an order or position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for longs, -1 for shorts
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Output class of the signal generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    None,
}

impl SignalType {
    /// Order side for actionable signals
    pub fn side(&self) -> Option<Side> {
        match self {
            SignalType::Buy => Some(Side::Buy),
            SignalType::Sell => Some(Side::Sell),
            SignalType::None => None,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Buy => write!(f, "BUY"),
            SignalType::Sell => write!(f, "SELL"),
            SignalType::None => write!(f, "NONE"),
        }
    }
}

/// OHLC candle. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl Candle {
    /// Flat candle built from a single quote, priced at the bid
    pub fn from_price(price: &Price) -> Self {
        Self {
            time: price.time,
            open: price.bid,
            high: price.bid,
            low: price.bid,
            close: price.bid,
            volume: None,
        }
    }
}

/// Account snapshot returned by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: f64,
    pub equity: f64,
    pub currency: String,
    pub account_id: String,
}

/// Top-of-book quote for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// Quote time in milliseconds
    pub time: i64,
}

impl Price {
    /// Price at which a position of `side` would be closed
    pub fn exit_price(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }

    /// Price at which a position of `side` would be opened
    pub fn entry_price(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.ask,
            Side::Sell => self.bid,
        }
    }
}

/// Open position as reported by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub open_price: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub timestamp: i64,
}

/// Order request sent to the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPositionParams {
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
}

/// Signal produced by the strategy for one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub signal_type: SignalType,
    pub entry_price: f64,
    pub sl_price: Option<f64>,
    pub tp_price: Option<f64>,
    /// Human-readable explanation
    pub reason: String,
    pub suggested_lot: Option<f64>,
}

impl TradeSignal {
    /// Non-actionable signal
    pub fn none(entry_price: f64, reason: &str) -> Self {
        Self {
            signal_type: SignalType::None,
            entry_price,
            sl_price: None,
            tp_price: None,
            reason: reason.to_string(),
            suggested_lot: None,
        }
    }
}

/// Per-day risk counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    /// Equity at the first valid snapshot of the trading day
    pub start_equity: f64,
    pub daily_pnl: f64,
    pub trades_today: u32,
    /// UTC date the counters belong to (None until bootstrapped)
    #[serde(default)]
    pub trading_day: Option<NaiveDate>,
}

impl DailyStats {
    /// Fresh counters anchored at `equity`
    pub fn starting(equity: f64, day: NaiveDate) -> Self {
        Self {
            start_equity: equity,
            daily_pnl: 0.0,
            trades_today: 0,
            trading_day: Some(day),
        }
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.start_equity != 0.0
    }
}

/// Trade opened by the bot. Only the close fields are ever updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub position_id: String,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub timestamp: i64,
    pub reason: String,
    pub closed_at: Option<i64>,
    pub close_price: Option<f64>,
    pub realized_pnl: Option<f64>,
}

impl TradeRecord {
    pub fn from_position(position: &Position, reason: &str) -> Self {
        Self {
            position_id: position.position_id.clone(),
            side: position.side,
            volume: position.volume,
            entry_price: position.open_price,
            sl: position.sl,
            tp: position.tp,
            timestamp: position.timestamp,
            reason: reason.to_string(),
            closed_at: None,
            close_price: None,
            realized_pnl: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// Broker login passed on account-scoped reads
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub account_id: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            account_id: account_id.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"***")
            .field("account_id", &self.account_id)
            .finish()
    }
}
