//! GoldBot Library
//!
//! Single-instrument XAUUSD breakout trading bot with pre-trade risk gating

pub mod broker;
pub mod config;
pub mod engine;
pub mod notify;
pub mod persistence;
pub mod risk;
pub mod strategy;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;

pub use broker::{Broker, BrokerError, PaperBroker, PaperBrokerConfig};
pub use config::{AppConfig, BotConfig, StrategyConfig};
pub use engine::{BotEngine, BotEngineState, BotStatus, EngineError, EngineSettings};
pub use notify::{LogNotifier, Notifier, SignalNotice, TelegramNotifier};
