//! Operator notifications
//!
//! `TelegramNotifier` posts to the Bot API. `LogNotifier` is the fallback
//! when Telegram is not configured and only writes to the log.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ports::{NotificationKind, Notifier, NotifyError};

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http: Client,
    api_base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_base_url: TELEGRAM_API.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    /// Point at a different Bot API host (self-hosted or test server)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base_url, self.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, kind: NotificationKind, payload: &str) -> Result<(), NotifyError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: format_message(kind, payload),
            disable_web_page_preview: true,
        };

        let response = self
            .http
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let reply: TelegramReply = response
            .json()
            .await
            .map_err(|e| NotifyError::Transport(format!("HTTP {}: {}", status, e)))?;
        if !reply.ok {
            return Err(NotifyError::Rejected(
                reply.description.unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }
        Ok(())
    }
}

/// Writes notifications to the log only
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, kind: NotificationKind, payload: &str) -> Result<(), NotifyError> {
        match kind {
            NotificationKind::OpenFailed | NotificationKind::CloseFailed => {
                tracing::warn!(kind = %kind, "{}", payload)
            }
            _ => tracing::info!(kind = %kind, "{}", payload),
        }
        Ok(())
    }
}

fn format_message(kind: NotificationKind, payload: &str) -> String {
    let icon = match kind {
        NotificationKind::Opened => "🟢",
        NotificationKind::Closed => "🔴",
        NotificationKind::ThresholdUpdate => "📈",
        NotificationKind::OpenFailed | NotificationKind::CloseFailed => "⚠️",
        NotificationKind::PriceAlert => "🔔",
    };
    format!("{} {}", icon, payload)
}
