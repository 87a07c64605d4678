//! Paper Broker
//!
//! In-memory execution simulator for a single instrument.
//!
//! - Bid/ask quote with a fixed spread, optionally random-walked on every read
//! - Positions fill at the ask (BUY) or bid (SELL)
//! - Equity = balance + open P&L, longs marked at the bid and shorts at the ask
//! - Stop-loss / take-profit levels crossed by a new quote are settled into balance
//! - Volumes are normalized to the 0.01 lot step

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Broker, BrokerError};
use crate::config::PaperConfig;
use crate::types::{AccountInfo, Credentials, OpenPositionParams, Position, Price, Side};

/// Smallest tradable lot increment
const LOT_STEP: Decimal = dec!(0.01);

#[derive(Debug, Clone)]
pub struct PaperBrokerConfig {
    pub symbol: String,
    pub account_id: String,
    pub currency: String,
    pub initial_equity: f64,
    pub initial_price: f64,
    pub spread: f64,
    /// Max bid move per price read; 0 freezes the quote
    pub volatility: f64,
    pub seed: Option<u64>,
    /// Units per 1.0 lot
    pub contract_size: f64,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            symbol: "XAUUSD".to_string(),
            account_id: "paper-account-1".to_string(),
            currency: "USD".to_string(),
            initial_equity: 10_000.0,
            initial_price: 2650.5,
            spread: 0.3,
            volatility: 0.0,
            seed: None,
            contract_size: 100.0,
        }
    }
}

impl PaperBrokerConfig {
    pub fn from_app(paper: &PaperConfig, symbol: &str, account_id: &str, contract_size: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            account_id: account_id.to_string(),
            currency: paper.currency.clone(),
            initial_equity: paper.initial_equity,
            initial_price: paper.initial_price,
            spread: paper.spread,
            volatility: paper.volatility,
            seed: paper.seed,
            contract_size,
        }
    }
}

struct Book {
    bid: f64,
    ask: f64,
    quoted_at: i64,
    balance: f64,
    positions: Vec<Position>,
    rng: StdRng,
}

impl Book {
    fn quote(&self, symbol: &str) -> Price {
        Price {
            symbol: symbol.to_string(),
            bid: self.bid,
            ask: self.ask,
            time: self.quoted_at,
        }
    }
}

/// Simulated broker holding positions in memory
pub struct PaperBroker {
    config: PaperBrokerConfig,
    book: Mutex<Book>,
}

impl PaperBroker {
    pub fn new(config: PaperBrokerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let book = Book {
            bid: config.initial_price,
            ask: config.initial_price + config.spread,
            quoted_at: Utc::now().timestamp_millis(),
            balance: config.initial_equity,
            positions: Vec::new(),
            rng,
        };
        info!(
            symbol = %config.symbol,
            equity = config.initial_equity,
            bid = config.initial_price,
            "Paper broker ready"
        );
        Self {
            config,
            book: Mutex::new(book),
        }
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), BrokerError> {
        if symbol == self.config.symbol {
            Ok(())
        } else {
            Err(BrokerError::UnsupportedSymbol(symbol.to_string()))
        }
    }

    fn position_pnl(&self, position: &Position, book: &Book) -> f64 {
        let mark = match position.side {
            Side::Buy => book.bid,
            Side::Sell => book.ask,
        };
        (mark - position.open_price) * position.side.sign() * position.volume * self.config.contract_size
    }

    fn open_pnl(&self, book: &Book) -> f64 {
        book.positions
            .iter()
            .map(|p| self.position_pnl(p, book))
            .sum()
    }

    fn equity(&self, book: &Book) -> f64 {
        book.balance + self.open_pnl(book)
    }

    /// Move the quote; the ask follows at the configured spread
    pub fn set_price(&self, bid: f64) {
        self.set_quote(bid, bid + self.config.spread);
    }

    pub fn set_quote(&self, bid: f64, ask: f64) {
        let mut book = self.book();
        book.bid = bid;
        book.ask = ask;
        book.quoted_at = Utc::now().timestamp_millis();
        self.settle_triggered(&mut book);
    }

    /// Re-base the balance so current equity equals `equity`
    pub fn set_equity(&self, equity: f64) {
        let mut book = self.book();
        let open = self.open_pnl(&book);
        book.balance = equity - open;
    }

    /// Close one position at the current quote, returning realized P&L
    pub fn close_position(&self, position_id: &str) -> Option<f64> {
        let mut book = self.book();
        let idx = book.positions.iter().position(|p| p.position_id == position_id)?;
        let position = book.positions.remove(idx);
        let pnl = self.position_pnl(&position, &book);
        book.balance += pnl;
        info!(position_id = %position_id, pnl, "Paper position closed");
        Some(pnl)
    }

    /// Close every position on `symbol`, returning how many were closed
    pub fn close_all_for_symbol(&self, symbol: &str) -> usize {
        let mut book = self.book();
        let (closing, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut book.positions)
            .into_iter()
            .partition(|p| p.symbol == symbol);
        let realized: f64 = closing.iter().map(|p| self.position_pnl(p, &book)).sum();
        book.positions = keep;
        book.balance += realized;
        closing.len()
    }

    /// Account snapshot for a login check
    pub async fn test_connection(&self, credentials: &Credentials) -> Result<AccountInfo, BrokerError> {
        self.get_account_info(credentials).await
    }

    pub fn open_position_count(&self) -> usize {
        self.book().positions.len()
    }

    fn step_quote(&self, book: &mut Book) {
        let vol = self.config.volatility;
        if vol > 0.0 {
            let delta: f64 = book.rng.gen_range(-vol..=vol);
            book.bid = (book.bid + delta).max(0.01);
            book.ask = book.bid + self.config.spread;
        }
        book.quoted_at = Utc::now().timestamp_millis();
        self.settle_triggered(book);
    }

    fn settle_triggered(&self, book: &mut Book) {
        let (bid, ask) = (book.bid, book.ask);
        let (hit, open): (Vec<_>, Vec<_>) = std::mem::take(&mut book.positions)
            .into_iter()
            .partition(|p| stop_or_target_hit(p, bid, ask));
        book.positions = open;
        for position in hit {
            let pnl = self.position_pnl(&position, book);
            book.balance += pnl;
            debug!(
                position_id = %position.position_id,
                side = %position.side,
                pnl,
                "Paper position hit stop/target"
            );
        }
    }
}

fn stop_or_target_hit(position: &Position, bid: f64, ask: f64) -> bool {
    match position.side {
        Side::Buy => {
            position.sl.is_some_and(|sl| bid <= sl) || position.tp.is_some_and(|tp| bid >= tp)
        }
        Side::Sell => {
            position.sl.is_some_and(|sl| ask >= sl) || position.tp.is_some_and(|tp| ask <= tp)
        }
    }
}

/// Round a requested volume to the lot step
fn normalize_volume(volume: f64) -> Result<f64, BrokerError> {
    let lots = Decimal::from_f64(volume)
        .ok_or_else(|| BrokerError::Rejected(format!("invalid volume {}", volume)))?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if lots < LOT_STEP {
        return Err(BrokerError::Rejected(format!(
            "volume {} below minimum lot {}",
            volume, LOT_STEP
        )));
    }
    lots.to_f64()
        .ok_or_else(|| BrokerError::Rejected(format!("invalid volume {}", volume)))
}

#[async_trait]
impl Broker for PaperBroker {
    async fn get_account_info(&self, credentials: &Credentials) -> Result<AccountInfo, BrokerError> {
        let book = self.book();
        let account_id = if credentials.account_id.is_empty() {
            self.config.account_id.clone()
        } else {
            credentials.account_id.clone()
        };
        Ok(AccountInfo {
            balance: book.balance,
            equity: self.equity(&book),
            currency: self.config.currency.clone(),
            account_id,
        })
    }

    async fn get_price(&self, symbol: &str) -> Result<Price, BrokerError> {
        self.check_symbol(symbol)?;
        let mut book = self.book();
        self.step_quote(&mut book);
        Ok(book.quote(symbol))
    }

    async fn get_open_positions(&self, _credentials: &Credentials) -> Result<Vec<Position>, BrokerError> {
        Ok(self.book().positions.clone())
    }

    async fn open_position(&self, params: OpenPositionParams) -> Result<Position, BrokerError> {
        self.check_symbol(&params.symbol)?;
        let volume = normalize_volume(params.volume)?;

        let mut book = self.book();
        let position = Position {
            position_id: format!("paper-{}", Uuid::new_v4()),
            symbol: params.symbol,
            side: params.side,
            volume,
            open_price: book.quote(&self.config.symbol).entry_price(params.side),
            sl: params.sl,
            tp: params.tp,
            timestamp: Utc::now().timestamp_millis(),
        };
        book.positions.push(position.clone());

        info!(
            position_id = %position.position_id,
            side = %position.side,
            volume = position.volume,
            price = position.open_price,
            "Paper order filled"
        );
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> PaperBroker {
        PaperBroker::new(PaperBrokerConfig {
            seed: Some(7),
            ..PaperBrokerConfig::default()
        })
    }

    fn creds() -> Credentials {
        Credentials::new("key", "acc-9")
    }

    fn order(side: Side, volume: f64) -> OpenPositionParams {
        OpenPositionParams {
            symbol: "XAUUSD".to_string(),
            side,
            volume,
            sl: None,
            tp: None,
        }
    }

    #[tokio::test]
    async fn test_initial_quote_and_account() {
        let broker = broker();
        let price = broker.get_price("XAUUSD").await.unwrap();
        assert_eq!(price.bid, 2650.5);
        assert!((price.ask - 2650.8).abs() < 1e-9);

        let account = broker.get_account_info(&creds()).await.unwrap();
        assert_eq!(account.balance, 10_000.0);
        assert_eq!(account.equity, 10_000.0);
        assert_eq!(account.account_id, "acc-9");
    }

    #[tokio::test]
    async fn test_unsupported_symbol() {
        let broker = broker();
        let err = broker.get_price("EURUSD").await.unwrap_err();
        assert_eq!(err, BrokerError::UnsupportedSymbol("EURUSD".to_string()));

        let mut params = order(Side::Buy, 0.1);
        params.symbol = "BTCUSD".to_string();
        assert!(broker.open_position(params).await.is_err());
    }

    #[tokio::test]
    async fn test_buy_fills_at_ask_and_marks_at_bid() {
        let broker = broker();
        broker.set_price(2650.0);
        let position = broker.open_position(order(Side::Buy, 0.1)).await.unwrap();
        assert!((position.open_price - 2650.3).abs() < 1e-9);

        broker.set_price(2652.3);
        let account = broker.get_account_info(&creds()).await.unwrap();
        // (2652.3 - 2650.3) * 0.1 * 100
        assert!((account.equity - 10_020.0).abs() < 1e-6);
        assert_eq!(account.balance, 10_000.0);
    }

    #[tokio::test]
    async fn test_close_position_realizes_pnl() {
        let broker = broker();
        broker.set_price(2650.0);
        let position = broker.open_position(order(Side::Sell, 0.2)).await.unwrap();
        broker.set_price(2649.0);

        let pnl = broker.close_position(&position.position_id).unwrap();
        // sold at bid 2650.0, bought back at ask 2649.3
        assert!((pnl - 14.0).abs() < 1e-6);
        assert!(broker.close_position(&position.position_id).is_none());

        let positions = broker.get_open_positions(&creds()).await.unwrap();
        assert!(positions.is_empty());
        let account = broker.get_account_info(&creds()).await.unwrap();
        assert!((account.balance - 10_014.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_stop_loss_settles_position() {
        let broker = broker();
        broker.set_price(2650.0);
        let mut params = order(Side::Buy, 0.1);
        params.sl = Some(2648.0);
        params.tp = Some(2660.0);
        broker.open_position(params).await.unwrap();

        broker.set_price(2649.0);
        assert_eq!(broker.open_position_count(), 1);
        broker.set_price(2647.5);
        assert_eq!(broker.open_position_count(), 0);

        let account = broker.get_account_info(&creds()).await.unwrap();
        assert!(account.balance < 10_000.0);
    }

    #[tokio::test]
    async fn test_volume_normalized_to_lot_step() {
        let broker = broker();
        let position = broker.open_position(order(Side::Buy, 0.123)).await.unwrap();
        assert_eq!(position.volume, 0.12);

        let err = broker.open_position(order(Side::Buy, 0.001)).await.unwrap_err();
        assert!(matches!(err, BrokerError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_close_all_for_symbol_and_set_equity() {
        let broker = broker();
        broker.open_position(order(Side::Buy, 0.1)).await.unwrap();
        broker.open_position(order(Side::Sell, 0.1)).await.unwrap();
        assert_eq!(broker.close_all_for_symbol("EURUSD"), 0);
        assert_eq!(broker.close_all_for_symbol("XAUUSD"), 2);

        broker.set_equity(9_500.0);
        let account = broker.test_connection(&creds()).await.unwrap();
        assert_eq!(account.equity, 9_500.0);
    }

    #[tokio::test]
    async fn test_random_walk_is_seeded() {
        let config = PaperBrokerConfig {
            volatility: 1.0,
            seed: Some(42),
            ..PaperBrokerConfig::default()
        };
        let a = PaperBroker::new(config.clone());
        let b = PaperBroker::new(config);
        for _ in 0..5 {
            let pa = a.get_price("XAUUSD").await.unwrap();
            let pb = b.get_price("XAUUSD").await.unwrap();
            assert_eq!(pa.bid, pb.bid);
            assert!((pa.ask - pa.bid - 0.3).abs() < 1e-9);
        }
    }
}
