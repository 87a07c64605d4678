//! Configuration management for GoldBot
//!
//! Loads from optional config files + environment variables via .env.
//! The trading limits end up in an immutable [`BotConfig`] handed to the
//! engine on start; everything else configures the runtime around it.

mod types;

pub use types::*;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::types::Credentials;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: RuntimeConfig,
    pub risk: RiskConfig,
    pub strategy: StrategyTuning,
    pub paper: PaperConfig,
    pub telegram: TelegramConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Traded instrument
    pub symbol: String,
    /// Transition to RUNNING right after startup
    pub autostart: bool,
    /// Seconds between trading steps
    pub step_interval_secs: u64,
    /// Seconds between position reconciliations
    pub reconcile_interval_secs: u64,
    /// Candles kept in the rolling window
    pub candle_capacity: usize,
    /// Upper bound for every broker / notifier call
    pub call_timeout_ms: u64,
    /// Daily counter reset policy
    pub daily_reset: DailyReset,
    /// Units per 1.0 lot (100 oz for XAUUSD)
    pub contract_size: f64,
    /// Broker account id
    pub account_id: String,
    /// Broker API key (never logged)
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Daily loss (percent of start equity) that pauses the bot
    pub max_daily_loss_percent: f64,
    /// Hard cap on order size in lots
    pub max_lot_per_trade: f64,
    /// Maximum simultaneously open positions on the symbol
    pub max_open_positions: usize,
    /// Maximum orders per trading day
    pub max_trades_per_day: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyTuning {
    /// Breakout buffer in price units
    pub breakout_buffer: f64,
    /// Take-profit / stop-loss distance ratio
    pub risk_reward_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperConfig {
    /// Starting balance and equity
    pub initial_equity: f64,
    /// Starting bid
    pub initial_price: f64,
    /// Ask minus bid
    pub spread: f64,
    /// Max bid move per price read (0 = frozen)
    pub volatility: f64,
    /// Seed for the random walk
    pub seed: Option<u64>,
    /// Account currency
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Send notifications to Telegram instead of the log
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    /// Bot API base URL
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    /// Append trade journal rows to CSV
    pub journal_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Port for the read-only status API
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (GOLDBOT__*)
            .add_source(Environment::with_prefix("GOLDBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.telegram.resolve_env();

        Ok(app_config)
    }

    /// Defaults only, no files or environment
    pub fn defaults() -> Result<Self> {
        let config = Self::builder()?
            .build()
            .context("Failed to build configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = Config::builder()
            // Runtime defaults
            .set_default("bot.symbol", "XAUUSD")?
            .set_default("bot.autostart", true)?
            .set_default("bot.step_interval_secs", 60)?
            .set_default("bot.reconcile_interval_secs", 15)?
            .set_default("bot.candle_capacity", 100)?
            .set_default("bot.call_timeout_ms", 5000)?
            .set_default("bot.daily_reset", "calendar")?
            .set_default("bot.contract_size", 100.0)?
            .set_default("bot.account_id", "paper-account-1")?
            // Risk defaults
            .set_default("risk.max_daily_loss_percent", 3.0)?
            .set_default("risk.max_lot_per_trade", 0.1)?
            .set_default("risk.max_open_positions", 1)?
            .set_default("risk.max_trades_per_day", 5)?
            // Strategy defaults
            .set_default("strategy.breakout_buffer", DEFAULT_BREAKOUT_BUFFER)?
            .set_default("strategy.risk_reward_ratio", DEFAULT_RISK_REWARD_RATIO)?
            // Paper broker defaults
            .set_default("paper.initial_equity", 10_000.0)?
            .set_default("paper.initial_price", 2650.5)?
            .set_default("paper.spread", 0.3)?
            .set_default("paper.volatility", 1.0)?
            .set_default("paper.currency", "USD")?
            // Telegram defaults
            .set_default("telegram.enabled", false)?
            .set_default("telegram.api_url", "https://api.telegram.org")?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.journal_enabled", true)?
            // Logging / dashboard
            .set_default("logging.json", false)?
            .set_default("dashboard.port", 8088)?;
        Ok(builder)
    }

    /// Immutable trading config for one run
    pub fn bot_config(&self) -> BotConfig {
        BotConfig {
            max_daily_loss_percent: self.risk.max_daily_loss_percent,
            max_lot_per_trade: self.risk.max_lot_per_trade,
            max_open_positions: self.risk.max_open_positions,
            max_trades_per_day: self.risk.max_trades_per_day,
            strategy: StrategyConfig {
                symbol: self.bot.symbol.clone(),
                max_lot_per_trade: self.risk.max_lot_per_trade,
                breakout_buffer: Some(self.strategy.breakout_buffer),
                risk_reward_ratio: Some(self.strategy.risk_reward_ratio),
            },
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            candle_capacity: self.bot.candle_capacity.max(3),
            call_timeout: Duration::from_millis(self.bot.call_timeout_ms),
            daily_reset: self.bot.daily_reset,
            contract_size: self.bot.contract_size,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.bot.api_key.clone(), self.bot.account_id.clone())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "symbol={} autostart={} step={}s reconcile={}s max_loss={:.2}% max_lot={:.2} max_pos={} max_trades={} buffer={} rr={} reset={:?} telegram={}",
            self.bot.symbol,
            self.bot.autostart,
            self.bot.step_interval_secs,
            self.bot.reconcile_interval_secs,
            self.risk.max_daily_loss_percent,
            self.risk.max_lot_per_trade,
            self.risk.max_open_positions,
            self.risk.max_trades_per_day,
            self.strategy.breakout_buffer,
            self.strategy.risk_reward_ratio,
            self.bot.daily_reset,
            self.telegram.is_configured(),
        )
    }
}

impl TelegramConfig {
    fn resolve_env(&mut self) {
        if self.bot_token.is_none() {
            self.bot_token = non_empty_env("TELEGRAM_BOT_TOKEN");
        }
        if self.chat_id.is_none() {
            self.chat_id = non_empty_env("TELEGRAM_CHAT_ID");
        }
    }

    /// Enabled with both a token and a chat id
    pub fn is_configured(&self) -> bool {
        self.enabled
            && self.bot_token.as_deref().is_some_and(|t| !t.trim().is_empty())
            && self.chat_id.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
