//! Timed run loop
//!
//! Drives `step` and `reconcile` on two intervals until shutdown. Cycles are
//! serialized: the loop awaits each one before it looks at the timers again.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{info, warn};

use super::{BotEngine, BotEngineState};

/// Receives every snapshot transition produced by a cycle
#[async_trait]
pub trait CycleObserver: Send + Sync {
    async fn on_cycle(&self, before: &BotEngineState, after: &BotEngineState);
}

#[derive(Debug, Clone, Copy)]
pub struct CycleTimers {
    pub step_every: Duration,
    pub reconcile_every: Duration,
}

impl CycleTimers {
    pub fn from_secs(step_secs: u64, reconcile_secs: u64) -> Self {
        Self {
            step_every: Duration::from_secs(step_secs.max(1)),
            reconcile_every: Duration::from_secs(reconcile_secs.max(1)),
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

/// Run cycles until `shutdown` resolves and return the last snapshot.
///
/// `shutdown` is polled across iterations, so a signal that arrives while a
/// cycle is in flight stops the loop right after that cycle.
pub async fn run_cycles<S>(
    engine: &BotEngine,
    mut state: BotEngineState,
    timers: CycleTimers,
    shutdown: S,
    observers: &[&dyn CycleObserver],
) -> BotEngineState
where
    S: Future<Output = ()>,
{
    let mut step_tick = ticker(timers.step_every);
    let mut reconcile_tick = ticker(timers.reconcile_every);
    tokio::pin!(shutdown);

    loop {
        let next = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            _ = step_tick.tick() => engine.step(&state).await,
            _ = reconcile_tick.tick() => engine.reconcile(&state).await,
        };

        if next.bot_status != state.bot_status {
            warn!(from = %state.bot_status, to = %next.bot_status, "Status changed");
        }
        for observer in observers {
            observer.on_cycle(&state, &next).await;
        }
        state = next;
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, BrokerError, PaperBroker, PaperBrokerConfig};
    use crate::config::{BotConfig, StrategyConfig};
    use crate::engine::EngineSettings;
    use crate::notify::LogNotifier;
    use crate::types::{AccountInfo, Credentials, OpenPositionParams, Position, Price};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    /// Paper broker whose account read takes a while
    struct SlowBroker(PaperBroker);

    #[async_trait]
    impl Broker for SlowBroker {
        async fn get_account_info(&self, c: &Credentials) -> Result<AccountInfo, BrokerError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.0.get_account_info(c).await
        }

        async fn get_price(&self, s: &str) -> Result<Price, BrokerError> {
            self.0.get_price(s).await
        }

        async fn get_open_positions(&self, c: &Credentials) -> Result<Vec<Position>, BrokerError> {
            self.0.get_open_positions(c).await
        }

        async fn open_position(&self, p: OpenPositionParams) -> Result<Position, BrokerError> {
            self.0.open_position(p).await
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        cycles: AtomicUsize,
    }

    #[async_trait]
    impl CycleObserver for CountingObserver {
        async fn on_cycle(&self, _: &BotEngineState, _: &BotEngineState) {
            self.cycles.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn engine() -> BotEngine {
        BotEngine::new(
            Arc::new(SlowBroker(PaperBroker::new(PaperBrokerConfig::default()))),
            Arc::new(LogNotifier),
            Credentials::default(),
            EngineSettings::default(),
        )
    }

    fn config() -> BotConfig {
        BotConfig {
            max_daily_loss_percent: 3.0,
            max_lot_per_trade: 0.1,
            max_open_positions: 1,
            max_trades_per_day: 5,
            strategy: StrategyConfig::new("XAUUSD", 0.1),
        }
    }

    #[test]
    fn test_timers_never_zero() {
        let timers = CycleTimers::from_secs(0, 15);
        assert_eq!(timers.step_every, Duration::from_secs(1));
        assert_eq!(timers.reconcile_every, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_shutdown_during_cycle_stops_after_it() {
        let engine = engine();
        let state = engine.start(&BotEngineState::new(), config());
        let observer = CountingObserver::default();

        // fires while the first step is still waiting on the account read
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(());
        });
        let shutdown = async {
            let _ = rx.await;
        };

        let timers = CycleTimers::from_secs(3600, 3600);
        let last = tokio::time::timeout(
            Duration::from_secs(5),
            run_cycles(&engine, state, timers, shutdown, &[&observer]),
        )
        .await
        .expect("loop should stop on shutdown");

        assert_eq!(observer.cycles.load(Ordering::SeqCst), 1);
        assert_eq!(last.candles.len(), 1);
    }

    #[tokio::test]
    async fn test_observers_see_each_transition() {
        let engine = engine();
        let state = engine.start(&BotEngineState::new(), config());
        let observer = CountingObserver::default();

        let shutdown = tokio::time::sleep(Duration::from_millis(2_500));
        let timers = CycleTimers::from_secs(3600, 1);
        let last = run_cycles(&engine, state, timers, shutdown, &[&observer]).await;

        // one step and one reconcile at start, then a reconcile per second
        assert!(observer.cycles.load(Ordering::SeqCst) >= 3);
        assert_eq!(last.candles.len(), 1);
    }
}
