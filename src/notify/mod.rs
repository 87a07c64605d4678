//! Outbound notifications
//!
//! The engine reports three events: an approved signal, a blocked trade and
//! a risk pause. Delivery is best effort; every method answers whether the
//! message went out and never fails the caller.

pub mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::types::Side;

/// Payload of an approved-signal notification
#[derive(Debug, Clone, PartialEq)]
pub struct SignalNotice {
    pub direction: Side,
    pub symbol: String,
    pub lot: f64,
    pub entry: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub reason: String,
    pub daily_pnl_percent: f64,
    pub max_daily_loss_percent: f64,
}

/// Notification channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_signal(&self, notice: &SignalNotice) -> bool;

    async fn notify_risk_paused(&self, reason: &str) -> bool;

    async fn notify_trade_blocked(&self, reason: &str) -> bool;

    /// Whether messages reach a remote chat
    fn is_connected(&self) -> bool;
}

/// Build the notifier the config asks for, falling back to the log
pub fn from_config(config: &TelegramConfig) -> Arc<dyn Notifier> {
    if !config.enabled {
        return Arc::new(LogNotifier);
    }
    match (config.bot_token.as_deref(), config.chat_id.as_deref()) {
        (Some(token), Some(chat_id)) if config.is_configured() => {
            match TelegramNotifier::new(token, chat_id, &config.api_url) {
                Ok(notifier) => Arc::new(notifier),
                Err(e) => {
                    warn!(error = %e, "Telegram client unavailable, notifications go to the log");
                    Arc::new(LogNotifier)
                }
            }
        }
        _ => {
            warn!("Telegram enabled but token or chat id missing, notifications go to the log");
            Arc::new(LogNotifier)
        }
    }
}

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn signal_message(notice: &SignalNotice) -> String {
    let mut lines = vec![
        "📈 <b>GOLD SIGNAL – CONDITIONS MET</b>".to_string(),
        String::new(),
        format!("Symbol: {}", escape_html(&notice.symbol)),
        format!("Direction: {}", notice.direction),
        format!("Lot: {:.2}", notice.lot),
        format!("Entry: {:.2}", notice.entry),
    ];
    if let (Some(sl), Some(tp)) = (notice.sl, notice.tp) {
        lines.push(format!("SL: {:.2}", sl));
        lines.push(format!("TP: {:.2}", tp));
    }
    lines.push(format!("Reason: {}", escape_html(&notice.reason)));
    lines.push(format!(
        "Daily PnL now: {:.2}% (Limit: -{:.2}%)",
        notice.daily_pnl_percent, notice.max_daily_loss_percent
    ));
    lines.join("\n")
}

pub fn risk_paused_message(reason: &str) -> String {
    format!("⚠️ <b>Bot paused</b> – risk limit: {}", escape_html(reason))
}

pub fn trade_blocked_message(reason: &str) -> String {
    format!("⚠ <b>Trade blocked</b> – risk limit hit: {}", escape_html(reason))
}

/// Writes notifications to the tracing log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_signal(&self, notice: &SignalNotice) -> bool {
        info!(
            direction = %notice.direction,
            symbol = %notice.symbol,
            lot = notice.lot,
            entry = notice.entry,
            sl = ?notice.sl,
            tp = ?notice.tp,
            reason = %notice.reason,
            "[notify] signal approved"
        );
        true
    }

    async fn notify_risk_paused(&self, reason: &str) -> bool {
        info!(reason = %reason, "[notify] bot paused");
        true
    }

    async fn notify_trade_blocked(&self, reason: &str) -> bool {
        info!(reason = %reason, "[notify] trade blocked");
        true
    }

    fn is_connected(&self) -> bool {
        false
    }
}
