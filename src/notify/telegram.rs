//! Telegram Bot API notifier

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::{risk_paused_message, signal_message, trade_blocked_message, Notifier, SignalNotice};

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram api error ({status}): {description}")]
    Api { status: u16, description: String },
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends HTML messages to one chat
pub struct TelegramNotifier {
    client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str, api_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            client,
            url: format!("{}/bot{}/sendMessage", api_url.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
        })
    }

    pub async fn send(&self, text: &str) -> Result<(), TelegramError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();
        let parsed: ApiResponse = resp.json().await?;

        if status.is_success() && parsed.ok {
            let preview: String = text.chars().take(80).collect();
            debug!("Telegram sent: {}", preview.replace('\n', " "));
            Ok(())
        } else {
            Err(TelegramError::Api {
                status: status.as_u16(),
                description: parsed.description.unwrap_or_default(),
            })
        }
    }

    async fn deliver(&self, text: String) -> bool {
        match self.send(&text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Telegram send failed");
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_signal(&self, notice: &SignalNotice) -> bool {
        self.deliver(signal_message(notice)).await
    }

    async fn notify_risk_paused(&self, reason: &str) -> bool {
        self.deliver(risk_paused_message(reason)).await
    }

    async fn notify_trade_blocked(&self, reason: &str) -> bool {
        self.deliver(trade_blocked_message(reason)).await
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_built_from_base_and_token() {
        let n = TelegramNotifier::new("123:abc", "42", "https://api.telegram.org/").unwrap();
        assert_eq!(n.url, "https://api.telegram.org/bot123:abc/sendMessage");
        assert!(n.is_connected());
    }

    #[tokio::test]
    async fn test_unreachable_api_is_not_delivered() {
        let n = TelegramNotifier::new("t", "42", "http://127.0.0.1:9").unwrap();
        assert!(!n.notify_trade_blocked("max trades per day reached (5/5)").await);
    }
}
