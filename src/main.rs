//! GoldBot - XAUUSD breakout bot
//!
//! Wires the paper broker, notifier, journal and dashboard around the engine
//! and runs the timed cycle loop until Ctrl-C.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use goldbot::config::LoggingConfig;
use goldbot::persistence::TradeJournal;
use goldbot::engine::{run_cycles, CycleObserver, CycleTimers};
use goldbot::{notify, AppConfig, BotEngine, BotEngineState, PaperBroker, PaperBrokerConfig};

#[cfg(feature = "dashboard")]
use goldbot::dashboard::{self, DashboardMemory};

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,goldbot=debug"));
    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl-C handler unavailable, running until killed");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging);
    info!("GoldBot starting: {}", config);

    let credentials = config.credentials();
    let broker = Arc::new(PaperBroker::new(PaperBrokerConfig::from_app(
        &config.paper,
        &config.bot.symbol,
        &config.bot.account_id,
        config.bot.contract_size,
    )));
    let account = broker
        .test_connection(&credentials)
        .await
        .context("Broker connection check failed")?;
    info!(
        account_id = %account.account_id,
        equity = account.equity,
        currency = %account.currency,
        "Broker connected"
    );

    let notifier = notify::from_config(&config.telegram);
    info!(connected = notifier.is_connected(), "Notifier ready");

    let journal = if config.persistence.journal_enabled {
        Some(TradeJournal::new(&config.persistence.data_dir)?)
    } else {
        None
    };

    #[cfg(feature = "dashboard")]
    let memory = {
        let memory = Arc::new(DashboardMemory::new(notifier.is_connected()));
        let server_memory = memory.clone();
        let port = config.dashboard.port;
        tokio::spawn(async move {
            if let Err(e) = dashboard::start_server(server_memory, port).await {
                tracing::error!(error = %e, "Dashboard server stopped");
            }
        });
        memory
    };

    let engine = BotEngine::new(broker, notifier, credentials, config.engine_settings());

    let mut state = BotEngineState::new();
    if config.bot.autostart {
        state = engine.start(&state, config.bot_config());
        if let Some(err) = &state.last_error {
            bail!("Refusing to start: {}", err);
        }
    } else {
        info!("Autostart disabled, bot stays STOPPED");
    }

    let mut observers: Vec<&dyn CycleObserver> = Vec::new();
    if let Some(journal) = &journal {
        observers.push(journal);
    }
    #[cfg(feature = "dashboard")]
    observers.push(memory.as_ref());

    let timers = CycleTimers::from_secs(
        config.bot.step_interval_secs,
        config.bot.reconcile_interval_secs,
    );
    let state = run_cycles(&engine, state, timers, shutdown_signal(), &observers).await;

    let state = engine.stop(&state);
    #[cfg(feature = "dashboard")]
    memory.publish(&state).await;

    info!(
        trades = state.trades.len(),
        open = state.open_trades().count(),
        daily_pnl = state.daily_stats.daily_pnl,
        "GoldBot stopped"
    );
    Ok(())
}
