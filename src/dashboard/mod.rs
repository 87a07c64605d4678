//! Dashboard Module
//!
//! Read-only HTTP view of the bot for a local UI.
//! Only compiled when the `dashboard` feature is enabled.

mod api;
mod types;

pub use api::create_router;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::{BotEngineState, CycleObserver};

/// Latest snapshot shared between the run loop and the HTTP handlers
#[derive(Debug, Default)]
pub struct DashboardMemory {
    state: RwLock<BotEngineState>,
    telegram_connected: bool,
}

impl DashboardMemory {
    pub fn new(telegram_connected: bool) -> Self {
        Self {
            state: RwLock::new(BotEngineState::default()),
            telegram_connected,
        }
    }

    /// Replace the published snapshot
    pub async fn publish(&self, state: &BotEngineState) {
        *self.state.write().await = state.clone();
    }

    pub async fn snapshot(&self) -> BotEngineState {
        self.state.read().await.clone()
    }

    pub fn telegram_connected(&self) -> bool {
        self.telegram_connected
    }
}

#[async_trait]
impl CycleObserver for DashboardMemory {
    async fn on_cycle(&self, _before: &BotEngineState, after: &BotEngineState) {
        self.publish(after).await;
    }
}

/// Start the dashboard server
pub async fn start_server(memory: Arc<DashboardMemory>, port: u16) -> anyhow::Result<()> {
    let app = create_router(memory);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("Dashboard API starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
