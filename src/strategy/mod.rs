//! H1 breakout strategy
//!
//! Looks only at the last two candles of the window:
//! - BUY when the latest close clears the previous high by more than the buffer
//! - SELL when it drops below the previous low by more than the buffer
//! - Stop goes on the opposite extreme of the previous candle, target at `rr` times the risk
//!
//! Pure function, no I/O. Sizing sanity is left to the risk gates.

use crate::config::StrategyConfig;
use crate::types::{Candle, SignalType, TradeSignal};

/// Candles needed before a breakout can be evaluated
pub const MIN_CANDLES: usize = 3;

pub const REASON_INSUFFICIENT_HISTORY: &str = "insufficient history";
pub const REASON_NO_BREAKOUT: &str = "no breakout";
pub const REASON_BREAKOUT_UP: &str = "H1 breakout above previous high";
pub const REASON_BREAKOUT_DOWN: &str = "H1 breakout below previous low";

/// Evaluate the candle window and produce a signal
pub fn generate_signal(candles: &[Candle], config: &StrategyConfig) -> TradeSignal {
    let (prev, last) = match candles {
        [.., prev, last] if candles.len() >= MIN_CANDLES => (prev, last),
        _ => return TradeSignal::none(0.0, REASON_INSUFFICIENT_HISTORY),
    };

    let buffer = config.buffer();
    let rr = config.rr();
    let close = last.close;

    if close > prev.high + buffer {
        let sl = prev.low;
        let risk = close - sl;
        return TradeSignal {
            signal_type: SignalType::Buy,
            entry_price: close,
            sl_price: Some(sl),
            tp_price: Some(close + risk * rr),
            reason: REASON_BREAKOUT_UP.to_string(),
            suggested_lot: Some(config.max_lot_per_trade),
        };
    }

    if close < prev.low - buffer {
        let sl = prev.high;
        let risk = sl - close;
        return TradeSignal {
            signal_type: SignalType::Sell,
            entry_price: close,
            sl_price: Some(sl),
            tp_price: Some(close - risk * rr),
            reason: REASON_BREAKOUT_DOWN.to_string(),
            suggested_lot: Some(config.max_lot_per_trade),
        };
    }

    TradeSignal::none(close, REASON_NO_BREAKOUT)
}
