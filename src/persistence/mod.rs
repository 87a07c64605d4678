//! CSV Trade Journal
//!
//! Append-only audit trail of trades opened and closed by the engine. Rows
//! are derived by diffing two consecutive engine snapshots, so the journal
//! never needs to be told about individual events.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{info, warn};

use crate::engine::{BotEngineState, CycleObserver};
use crate::types::{Side, TradeRecord};

const JOURNAL_FILE: &str = "trade_journal.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalEvent {
    Opened,
    Closed,
}

/// One journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRow {
    /// When the row was written (ms)
    pub logged_at: i64,
    pub event: JournalEvent,
    pub position_id: String,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub opened_at: i64,
    pub closed_at: Option<i64>,
    pub close_price: Option<f64>,
    pub realized_pnl: Option<f64>,
    pub reason: String,
}

impl JournalRow {
    fn from_trade(event: JournalEvent, trade: &TradeRecord, logged_at: i64) -> Self {
        Self {
            logged_at,
            event,
            position_id: trade.position_id.clone(),
            side: trade.side,
            volume: trade.volume,
            entry_price: trade.entry_price,
            sl: trade.sl,
            tp: trade.tp,
            opened_at: trade.timestamp,
            closed_at: trade.closed_at,
            close_price: trade.close_price,
            realized_pnl: trade.realized_pnl,
            reason: trade.reason.clone(),
        }
    }
}

/// Rows describing what changed in the trade list between two snapshots
pub fn diff_trades(before: &BotEngineState, after: &BotEngineState, logged_at: i64) -> Vec<JournalRow> {
    let previous: HashMap<&str, &TradeRecord> = before
        .trades
        .iter()
        .map(|t| (t.position_id.as_str(), t))
        .collect();

    let mut rows = Vec::new();
    for trade in &after.trades {
        let prior = previous.get(trade.position_id.as_str());
        if prior.is_none() {
            rows.push(JournalRow::from_trade(JournalEvent::Opened, trade, logged_at));
        }
        let was_open = prior.map_or(true, |p| p.is_open());
        if was_open && !trade.is_open() {
            rows.push(JournalRow::from_trade(JournalEvent::Closed, trade, logged_at));
        }
    }
    rows
}

pub struct TradeJournal {
    path: PathBuf,
    writer: Arc<AsyncRwLock<csv::Writer<std::fs::File>>>,
}

impl TradeJournal {
    /// Open (or create) the journal under `data_dir/trades`
    pub fn new(data_dir: &str) -> Result<Self> {
        let dir = PathBuf::from(data_dir).join("trades");
        fs::create_dir_all(&dir).context("Failed to create journal directory")?;

        let path = dir.join(JOURNAL_FILE);
        let writer = Self::create_writer(&path)?;
        info!(path = %path.display(), "Trade journal ready");

        Ok(Self {
            path,
            writer: Arc::new(AsyncRwLock::new(writer)),
        })
    }

    fn create_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
        let file_has_data = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context("Failed to open journal file")?;

        Ok(WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file))
    }

    /// Append rows for trades opened or closed between two snapshots
    pub async fn record_changes(&self, before: &BotEngineState, after: &BotEngineState) -> Result<usize> {
        let rows = diff_trades(before, after, Utc::now().timestamp_millis());
        if rows.is_empty() {
            return Ok(0);
        }

        let mut writer = self.writer.write().await;
        for row in &rows {
            writer
                .serialize(row)
                .context("Failed to write journal row")?;
        }
        writer.flush().context("Failed to flush journal")?;
        Ok(rows.len())
    }

    /// Read every row written so far
    pub fn load(&self) -> Result<Vec<JournalRow>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .context("Failed to open journal for reading")?;

        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row.context("Failed to parse journal row")?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl CycleObserver for TradeJournal {
    async fn on_cycle(&self, before: &BotEngineState, after: &BotEngineState) {
        if let Err(e) = self.record_changes(before, after).await {
            warn!(error = %e, "Failed to write trade journal");
        }
    }
}
