//! Bot Engine - trading cycle and state machine
//!
//! States:
//! - STOPPED: initial, cycles are no-ops
//! - RUNNING: normal operation
//! - PAUSED_DUE_TO_RISK: daily loss limit hit, only reconciliation runs
//!
//! Every operation takes a snapshot and returns the next one. The caller owns
//! the state and must not run `step` and `reconcile` concurrently against it.
//! Collaborator faults never escape a cycle; they come back as `last_error`
//! on the prior snapshot.

pub mod clock;
pub mod runner;

pub use clock::{Clock, ManualClock, SystemClock};
pub use runner::{run_cycles, CycleObserver, CycleTimers};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, BrokerError};
use crate::config::{BotConfig, DailyReset};
use crate::notify::{Notifier, SignalNotice};
use crate::risk::{cap_lot, check_risk, daily_pnl_percent};
use crate::strategy::generate_signal;
use crate::types::{
    Candle, Credentials, DailyStats, OpenPositionParams, Price, TradeRecord,
};

/// Reason attached to pauses raised by reconciliation
pub const REASON_DAILY_LOSS: &str = "daily loss limit reached";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotStatus {
    #[default]
    Stopped,
    Running,
    PausedDueToRisk,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotStatus::Stopped => write!(f, "STOPPED"),
            BotStatus::Running => write!(f, "RUNNING"),
            BotStatus::PausedDueToRisk => write!(f, "PAUSED_DUE_TO_RISK"),
        }
    }
}

/// Full engine snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotEngineState {
    pub bot_status: BotStatus,
    pub config: Option<BotConfig>,
    pub trades: Vec<TradeRecord>,
    pub daily_stats: DailyStats,
    /// Rolling synthetic candle window, oldest first
    pub candles: Vec<Candle>,
    pub last_error: Option<String>,
}

impl BotEngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.trades.iter().filter(|t| t.is_open())
    }
}

/// Runtime knobs that are not part of the trading config
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub candle_capacity: usize,
    /// Upper bound for each broker / notifier call
    pub call_timeout: Duration,
    pub daily_reset: DailyReset,
    /// Units per 1.0 lot, used for realized P&L estimates
    pub contract_size: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            candle_capacity: 100,
            call_timeout: Duration::from_secs(5),
            daily_reset: DailyReset::Calendar,
            contract_size: 100.0,
        }
    }
}

/// Faults raised inside a cycle
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("{call} timed out after {timeout_ms}ms")]
    Timeout { call: &'static str, timeout_ms: u64 },
}

pub struct BotEngine {
    broker: Arc<dyn Broker>,
    notifier: Arc<dyn Notifier>,
    credentials: Credentials,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
}

impl BotEngine {
    pub fn new(
        broker: Arc<dyn Broker>,
        notifier: Arc<dyn Notifier>,
        credentials: Credentials,
        settings: EngineSettings,
    ) -> Self {
        Self {
            broker,
            notifier,
            credentials,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// STOPPED -> RUNNING with a validated config
    pub fn start(&self, state: &BotEngineState, config: BotConfig) -> BotEngineState {
        let mut next = state.clone();
        if state.bot_status != BotStatus::Stopped {
            warn!(status = %state.bot_status, "Start ignored, bot is not stopped");
            next.last_error = Some(format!("cannot start while {}", state.bot_status));
            return next;
        }
        if let Err(e) = config.validate() {
            warn!(error = %e, "Start rejected");
            next.last_error = Some(format!("invalid config: {}", e));
            return next;
        }

        info!(
            symbol = %config.strategy.symbol,
            max_daily_loss_percent = config.max_daily_loss_percent,
            max_lot_per_trade = config.max_lot_per_trade,
            "Bot started"
        );
        next.bot_status = BotStatus::Running;
        next.config = Some(config);
        next.last_error = None;
        next
    }

    /// Any status -> STOPPED
    pub fn stop(&self, state: &BotEngineState) -> BotEngineState {
        if state.bot_status != BotStatus::Stopped {
            info!(from = %state.bot_status, "Bot stopped");
        }
        BotEngineState {
            bot_status: BotStatus::Stopped,
            ..state.clone()
        }
    }

    /// One trading cycle. No-op unless RUNNING with a config.
    pub async fn step(&self, state: &BotEngineState) -> BotEngineState {
        let config = match (&state.bot_status, &state.config) {
            (BotStatus::Running, Some(config)) => config.clone(),
            _ => return state.clone(),
        };

        match self.try_step(state, &config).await {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, "Step failed");
                BotEngineState {
                    last_error: Some(e.to_string()),
                    ..state.clone()
                }
            }
        }
    }

    async fn try_step(
        &self,
        state: &BotEngineState,
        config: &BotConfig,
    ) -> Result<BotEngineState, EngineError> {
        let mut next = state.clone();
        next.last_error = None;

        let symbol = config.strategy.symbol.as_str();
        let (account, price, positions) = tokio::try_join!(
            self.call("get_account_info", self.broker.get_account_info(&self.credentials)),
            self.call("get_price", self.broker.get_price(symbol)),
            self.call("get_open_positions", self.broker.get_open_positions(&self.credentials)),
        )?;

        self.push_candle(&mut next.candles, &price);
        next.daily_stats = self.rebase_daily(&next.daily_stats, account.equity, true);

        let signal = generate_signal(&next.candles, &config.strategy);
        let Some(side) = signal.signal_type.side() else {
            debug!(
                candles = next.candles.len(),
                close = signal.entry_price,
                reason = %signal.reason,
                "No signal"
            );
            return Ok(next);
        };

        let proposed_lot = signal.suggested_lot.unwrap_or(config.max_lot_per_trade);
        let risk = check_risk(&account, &positions, &next.daily_stats, config, proposed_lot);

        if !risk.allowed {
            let reason = risk
                .reason
                .clone()
                .unwrap_or_else(|| "risk check failed".to_string());
            warn!(signal = %signal.signal_type, reason = %reason, "Trade blocked by risk");
            next.last_error = Some(reason.clone());
            self.deliver("trade_blocked", self.notifier.notify_trade_blocked(&reason))
                .await;

            if risk.denial.as_ref().is_some_and(|d| d.pauses_trading()) {
                next.bot_status = BotStatus::PausedDueToRisk;
                warn!(reason = %reason, "Bot paused for the day");
                self.deliver("risk_paused", self.notifier.notify_risk_paused(&reason))
                    .await;
            }
            return Ok(next);
        }

        let lot = cap_lot(proposed_lot, config);
        let notice = SignalNotice {
            direction: side,
            symbol: symbol.to_string(),
            lot,
            entry: signal.entry_price,
            sl: signal.sl_price,
            tp: signal.tp_price,
            reason: signal.reason.clone(),
            daily_pnl_percent: daily_pnl_percent(&next.daily_stats),
            max_daily_loss_percent: config.max_daily_loss_percent,
        };
        self.deliver("signal", self.notifier.notify_signal(&notice)).await;

        let params = OpenPositionParams {
            symbol: symbol.to_string(),
            side,
            volume: lot,
            sl: signal.sl_price,
            tp: signal.tp_price,
        };
        let position = self
            .call("open_position", self.broker.open_position(params))
            .await?;

        info!(
            position_id = %position.position_id,
            side = %position.side,
            volume = position.volume,
            price = position.open_price,
            sl = ?position.sl,
            tp = ?position.tp,
            "Position opened"
        );
        next.trades
            .push(TradeRecord::from_position(&position, &signal.reason));
        next.daily_stats.trades_today += 1;
        Ok(next)
    }

    /// Detect closed positions and refresh daily P&L. Runs in every status.
    pub async fn reconcile(&self, state: &BotEngineState) -> BotEngineState {
        match self.try_reconcile(state).await {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, "Reconcile failed");
                BotEngineState {
                    last_error: Some(e.to_string()),
                    ..state.clone()
                }
            }
        }
    }

    async fn try_reconcile(&self, state: &BotEngineState) -> Result<BotEngineState, EngineError> {
        let symbol = state.config.as_ref().map(|c| c.strategy.symbol.as_str());
        // The quote only prices closures; the account read alone drives P&L and the pause.
        let quote = async {
            let symbol = symbol?;
            match self.call("get_price", self.broker.get_price(symbol)).await {
                Ok(price) => Some(price),
                Err(e) => {
                    warn!(error = %e, "Quote unavailable, closures recorded without a price");
                    None
                }
            }
        };
        let reads = async {
            tokio::try_join!(
                self.call("get_account_info", self.broker.get_account_info(&self.credentials)),
                self.call("get_open_positions", self.broker.get_open_positions(&self.credentials)),
            )
        };
        let (reads, price) = tokio::join!(reads, quote);
        let (account, positions) = reads?;

        let mut next = state.clone();
        let open_ids: HashSet<&str> = positions.iter().map(|p| p.position_id.as_str()).collect();
        let now_ms = self.clock.now().timestamp_millis();

        for trade in next.trades.iter_mut() {
            if !trade.is_open() || open_ids.contains(trade.position_id.as_str()) {
                continue;
            }
            self.mark_closed(trade, now_ms, price.as_ref());
        }

        next.daily_stats = self.rebase_daily(&next.daily_stats, account.equity, false);
        next.daily_stats.daily_pnl = account.equity - next.daily_stats.start_equity;

        if let Some(config) = &next.config {
            let pnl_percent = daily_pnl_percent(&next.daily_stats);
            let breached = next.daily_stats.start_equity > 0.0
                && pnl_percent <= -config.max_daily_loss_percent;
            if breached && next.bot_status == BotStatus::Running {
                warn!(
                    daily_pnl = next.daily_stats.daily_pnl,
                    pnl_percent,
                    limit = config.max_daily_loss_percent,
                    "Daily loss limit reached, pausing"
                );
                next.bot_status = BotStatus::PausedDueToRisk;
                self.deliver("risk_paused", self.notifier.notify_risk_paused(REASON_DAILY_LOSS))
                    .await;
            }
        }

        debug!(
            equity = account.equity,
            daily_pnl = next.daily_stats.daily_pnl,
            open_positions = positions.len(),
            "Reconciled"
        );
        Ok(next)
    }

    fn mark_closed(&self, trade: &mut TradeRecord, now_ms: i64, price: Option<&Price>) {
        let close_price = price.map(|p| p.exit_price(trade.side));
        trade.closed_at = Some(now_ms);
        trade.close_price = close_price;
        trade.realized_pnl = close_price.map(|close| {
            (close - trade.entry_price) * trade.side.sign() * trade.volume * self.settings.contract_size
        });
        info!(
            position_id = %trade.position_id,
            side = %trade.side,
            close_price = ?trade.close_price,
            realized_pnl = ?trade.realized_pnl,
            "Position closed"
        );
    }

    fn push_candle(&self, candles: &mut Vec<Candle>, price: &Price) {
        candles.push(Candle::from_price(price));
        let capacity = self.settings.candle_capacity.max(1);
        if candles.len() > capacity {
            let excess = candles.len() - capacity;
            candles.drain(..excess);
        }
    }

    /// Bootstrap or roll the daily counters over to today
    fn rebase_daily(&self, stats: &DailyStats, equity: f64, allow_bootstrap: bool) -> DailyStats {
        let today = self.clock.today();
        if !stats.is_bootstrapped() {
            if allow_bootstrap {
                info!(start_equity = equity, day = %today, "Daily stats initialized");
                return DailyStats::starting(equity, today);
            }
            return stats.clone();
        }
        if self.settings.daily_reset == DailyReset::Calendar
            && stats.trading_day.is_some_and(|day| day != today)
        {
            info!(
                start_equity = equity,
                previous_pnl = stats.daily_pnl,
                trades = stats.trades_today,
                day = %today,
                "New trading day, daily stats reset"
            );
            return DailyStats::starting(equity, today);
        }
        stats.clone()
    }

    async fn call<T, F>(&self, call: &'static str, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, BrokerError>>,
    {
        match timeout(self.settings.call_timeout, fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::Timeout {
                call,
                timeout_ms: self.settings.call_timeout.as_millis() as u64,
            }),
        }
    }

    /// Send a notification; failures are logged, never propagated
    async fn deliver<F>(&self, kind: &'static str, fut: F) -> bool
    where
        F: Future<Output = bool>,
    {
        match timeout(self.settings.call_timeout, fut).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(kind, "Notification not delivered");
                false
            }
            Err(_) => {
                warn!(kind, timeout_ms = self.settings.call_timeout.as_millis() as u64, "Notification timed out");
                false
            }
        }
    }
}
