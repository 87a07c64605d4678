//! End-to-end engine cycles against the paper broker

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use goldbot::config::StrategyConfig;
    use goldbot::persistence::{JournalEvent, TradeJournal};
    use goldbot::types::{AccountInfo, Credentials, OpenPositionParams, Position, Price, Side};
    use goldbot::{
        BotConfig, BotEngine, BotEngineState, BotStatus, Broker, BrokerError, EngineSettings,
        Notifier, PaperBroker, PaperBrokerConfig, SignalNotice,
    };

    // ============================================================================
    // Helpers
    // ============================================================================

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Signal(Side, f64),
        Blocked(String),
        Paused(String),
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn paused_count(&self) -> usize {
            self.sent()
                .iter()
                .filter(|s| matches!(s, Sent::Paused(_)))
                .count()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_signal(&self, notice: &SignalNotice) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Signal(notice.direction, notice.lot));
            true
        }

        async fn notify_risk_paused(&self, reason: &str) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Paused(reason.to_string()));
            true
        }

        async fn notify_trade_blocked(&self, reason: &str) -> bool {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Blocked(reason.to_string()));
            true
        }

        fn is_connected(&self) -> bool {
            false
        }
    }

    /// Broker whose every call fails
    struct DownBroker;

    #[async_trait]
    impl Broker for DownBroker {
        async fn get_account_info(&self, _: &Credentials) -> Result<AccountInfo, BrokerError> {
            Err(BrokerError::Transport("connection reset".to_string()))
        }

        async fn get_price(&self, _: &str) -> Result<Price, BrokerError> {
            Err(BrokerError::Transport("connection reset".to_string()))
        }

        async fn get_open_positions(&self, _: &Credentials) -> Result<Vec<Position>, BrokerError> {
            Err(BrokerError::Transport("connection reset".to_string()))
        }

        async fn open_position(&self, _: OpenPositionParams) -> Result<Position, BrokerError> {
            Err(BrokerError::Transport("connection reset".to_string()))
        }
    }

    /// Paper broker with a slow account endpoint
    struct SlowBroker(PaperBroker);

    #[async_trait]
    impl Broker for SlowBroker {
        async fn get_account_info(&self, c: &Credentials) -> Result<AccountInfo, BrokerError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
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

    fn bot_config() -> BotConfig {
        BotConfig {
            max_daily_loss_percent: 3.0,
            max_lot_per_trade: 0.1,
            max_open_positions: 1,
            max_trades_per_day: 5,
            strategy: StrategyConfig::new("XAUUSD", 0.1),
        }
    }

    struct Harness {
        broker: Arc<PaperBroker>,
        notifier: Arc<RecordingNotifier>,
        engine: BotEngine,
    }

    fn harness() -> Harness {
        let broker = Arc::new(PaperBroker::new(PaperBrokerConfig {
            seed: Some(1),
            ..PaperBrokerConfig::default()
        }));
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = BotEngine::new(
            broker.clone(),
            notifier.clone(),
            Credentials::new("key", "paper-account-1"),
            EngineSettings::default(),
        );
        Harness {
            broker,
            notifier,
            engine,
        }
    }

    /// Three steps at 2650, 2650, 2652: the last one breaks out upwards
    async fn run_breakout(h: &Harness) -> BotEngineState {
        let mut state = h.engine.start(&BotEngineState::new(), bot_config());
        assert_eq!(state.bot_status, BotStatus::Running);

        for bid in [2650.0, 2650.0, 2652.0] {
            h.broker.set_price(bid);
            state = h.engine.step(&state).await;
            assert!(state.last_error.is_none(), "{:?}", state.last_error);
        }
        state
    }

    // ============================================================================
    // Trading cycle
    // ============================================================================

    #[tokio::test]
    async fn test_breakout_opens_exactly_one_trade() {
        let h = harness();
        let state = run_breakout(&h).await;

        assert_eq!(state.candles.len(), 3);
        assert_eq!(state.trades.len(), 1);
        assert_eq!(state.daily_stats.trades_today, 1);
        assert_eq!(state.daily_stats.start_equity, 10_000.0);

        let trade = &state.trades[0];
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.volume, 0.1);
        assert_eq!(trade.sl, Some(2650.0));
        assert_eq!(trade.tp, Some(2656.0));
        assert!(trade.is_open());

        assert_eq!(h.notifier.sent(), vec![Sent::Signal(Side::Buy, 0.1)]);
        assert_eq!(h.broker.open_position_count(), 1);
    }

    #[tokio::test]
    async fn test_second_breakout_blocked_by_open_position() {
        let h = harness();
        let state = run_breakout(&h).await;

        h.broker.set_price(2653.0);
        let state = h.engine.step(&state).await;

        assert_eq!(state.trades.len(), 1);
        assert_eq!(state.bot_status, BotStatus::Running);
        assert_eq!(
            state.last_error.as_deref(),
            Some("max open positions reached (1/1)")
        );
        assert_eq!(
            h.notifier.sent().last(),
            Some(&Sent::Blocked("max open positions reached (1/1)".to_string()))
        );
    }

    // ============================================================================
    // Reconciliation
    // ============================================================================

    #[tokio::test]
    async fn test_reconcile_detects_closed_position() {
        let h = harness();
        let state = run_breakout(&h).await;
        let id = state.trades[0].position_id.clone();

        let untouched = h.engine.reconcile(&state).await;
        assert!(untouched.trades[0].is_open());

        h.broker.close_position(&id).unwrap();
        let state = h.engine.reconcile(&untouched).await;

        let trade = &state.trades[0];
        assert!(trade.closed_at.is_some());
        assert_eq!(trade.close_price, Some(2652.0));
        // filled at the ask 2652.3, closed at the bid 2652.0
        assert!((trade.realized_pnl.unwrap() + 3.0).abs() < 1e-6);
        assert!((state.daily_stats.daily_pnl + 3.0).abs() < 1e-6);
        assert_eq!(state.bot_status, BotStatus::Running);
    }

    #[tokio::test]
    async fn test_reconcile_pause_notifies_once() {
        let h = harness();
        let state = run_breakout(&h).await;

        h.broker.close_all_for_symbol("XAUUSD");
        h.broker.set_equity(9_650.0);

        let paused = h.engine.reconcile(&state).await;
        assert_eq!(paused.bot_status, BotStatus::PausedDueToRisk);
        assert_eq!(h.notifier.paused_count(), 1);

        let again = h.engine.reconcile(&paused).await;
        assert_eq!(again.bot_status, BotStatus::PausedDueToRisk);
        assert_eq!(h.notifier.paused_count(), 1);

        // paused engines take no new entries
        h.broker.set_price(2700.0);
        assert_eq!(h.engine.step(&again).await, again);

        // operator restart keeps today's loss, so the next signal pauses again
        let restarted = h.engine.start(&h.engine.stop(&again), bot_config());
        assert_eq!(restarted.bot_status, BotStatus::Running);
        let repaused = h.engine.step(&restarted).await;
        assert_eq!(repaused.bot_status, BotStatus::PausedDueToRisk);
        assert_eq!(h.notifier.paused_count(), 2);
        assert_eq!(repaused.trades.len(), 1);
    }

    // ============================================================================
    // Fault isolation
    // ============================================================================

    #[tokio::test]
    async fn test_faulting_broker_leaves_state_untouched() {
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = BotEngine::new(
            Arc::new(DownBroker),
            notifier.clone(),
            Credentials::default(),
            EngineSettings::default(),
        );
        let state = engine.start(&BotEngineState::new(), bot_config());

        let after_step = engine.step(&state).await;
        assert_eq!(after_step.trades, state.trades);
        assert_eq!(after_step.daily_stats, state.daily_stats);
        assert_eq!(after_step.candles, state.candles);
        assert_eq!(after_step.bot_status, BotStatus::Running);
        assert_eq!(
            after_step.last_error.as_deref(),
            Some("transport error: connection reset")
        );

        let after_reconcile = engine.reconcile(&state).await;
        assert_eq!(after_reconcile.daily_stats, state.daily_stats);
        assert!(after_reconcile.last_error.is_some());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let settings = EngineSettings {
            call_timeout: Duration::from_millis(20),
            ..EngineSettings::default()
        };
        let engine = BotEngine::new(
            Arc::new(SlowBroker(PaperBroker::new(PaperBrokerConfig::default()))),
            Arc::new(RecordingNotifier::default()),
            Credentials::default(),
            settings,
        );
        let state = engine.start(&BotEngineState::new(), bot_config());

        let next = engine.step(&state).await;
        assert_eq!(
            next.last_error.as_deref(),
            Some("get_account_info timed out after 20ms")
        );
        assert!(next.candles.is_empty());
    }

    // ============================================================================
    // Journal
    // ============================================================================

    #[tokio::test]
    async fn test_journal_follows_engine_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let journal = TradeJournal::new(dir.path().to_str().unwrap()).unwrap();

        let h = harness();
        let before = h.engine.start(&BotEngineState::new(), bot_config());
        let opened = run_breakout(&h).await;
        journal.record_changes(&before, &opened).await.unwrap();

        h.broker.close_position(&opened.trades[0].position_id).unwrap();
        let closed = h.engine.reconcile(&opened).await;
        journal.record_changes(&opened, &closed).await.unwrap();

        let rows = journal.load().unwrap();
        let events: Vec<_> = rows.iter().map(|r| r.event).collect();
        assert_eq!(events, vec![JournalEvent::Opened, JournalEvent::Closed]);
        assert_eq!(rows[1].position_id, opened.trades[0].position_id);
    }
}
