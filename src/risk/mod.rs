//! Risk Manager - Pre-trade gating and lot clamping
//!
//! Gates run in a fixed order and the first failure wins:
//! 1. Start equity must be positive
//! 2. Daily loss limit (percent of start equity)
//! 3. Open positions on the traded symbol
//! 4. Trades per day
//! 5. Effective lot size
//!
//! `cap_lot` is the only place order size gets clamped; callers apply it
//! again after an approval before submitting.

use serde::Serialize;
use thiserror::Error;

use crate::config::BotConfig;
use crate::types::{AccountInfo, DailyStats, Position};

/// Why a trade was refused. The Display text is the reason shown to users.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum RiskDenial {
    #[error("invalid start equity")]
    InvalidStartEquity,

    #[error("daily loss limit reached ({loss_percent:.2}% <= -{limit_percent:.2}%)")]
    DailyLoss {
        loss_percent: f64,
        limit_percent: f64,
    },

    #[error("max open positions reached ({current}/{limit})")]
    MaxOpenPositions { current: usize, limit: usize },

    #[error("max trades per day reached ({current}/{limit})")]
    MaxTradesPerDay { current: u32, limit: u32 },

    #[error("invalid lot size")]
    InvalidLot,
}

impl RiskDenial {
    /// Only the daily loss gate halts the bot for the day
    pub fn pauses_trading(&self) -> bool {
        matches!(self, RiskDenial::DailyLoss { .. })
    }
}

/// Outcome of a risk check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskCheckResult {
    pub allowed: bool,
    pub reason: Option<String>,
    #[serde(skip)]
    pub denial: Option<RiskDenial>,
}

impl RiskCheckResult {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            denial: None,
        }
    }

    pub fn deny(denial: RiskDenial) -> Self {
        Self {
            allowed: false,
            reason: Some(denial.to_string()),
            denial: Some(denial),
        }
    }
}

/// Daily P&L as a percentage of start equity (0 when not bootstrapped)
pub fn daily_pnl_percent(stats: &DailyStats) -> f64 {
    if stats.start_equity > 0.0 {
        stats.daily_pnl / stats.start_equity * 100.0
    } else {
        0.0
    }
}

/// Clamp a lot to the configured per-trade maximum
pub fn cap_lot(lot: f64, config: &BotConfig) -> f64 {
    lot.min(config.max_lot_per_trade)
}

/// Run all gates for a proposed order
pub fn check_risk(
    _account: &AccountInfo,
    open_positions: &[Position],
    stats: &DailyStats,
    config: &BotConfig,
    proposed_lot: f64,
) -> RiskCheckResult {
    match evaluate(open_positions, stats, config, proposed_lot) {
        Ok(()) => RiskCheckResult::allow(),
        Err(denial) => RiskCheckResult::deny(denial),
    }
}

fn evaluate(
    open_positions: &[Position],
    stats: &DailyStats,
    config: &BotConfig,
    proposed_lot: f64,
) -> Result<(), RiskDenial> {
    if stats.start_equity <= 0.0 {
        return Err(RiskDenial::InvalidStartEquity);
    }

    let loss_percent = daily_pnl_percent(stats);
    if loss_percent <= -config.max_daily_loss_percent {
        return Err(RiskDenial::DailyLoss {
            loss_percent,
            limit_percent: config.max_daily_loss_percent,
        });
    }

    let symbol = config.strategy.symbol.as_str();
    let open_on_symbol = open_positions.iter().filter(|p| p.symbol == symbol).count();
    if open_on_symbol >= config.max_open_positions {
        return Err(RiskDenial::MaxOpenPositions {
            current: open_on_symbol,
            limit: config.max_open_positions,
        });
    }

    if stats.trades_today >= config.max_trades_per_day {
        return Err(RiskDenial::MaxTradesPerDay {
            current: stats.trades_today,
            limit: config.max_trades_per_day,
        });
    }

    // f64::min drops NaN, so check the raw lot before capping
    if proposed_lot.is_nan() || proposed_lot <= 0.0 {
        return Err(RiskDenial::InvalidLot);
    }

    Ok(())
}
