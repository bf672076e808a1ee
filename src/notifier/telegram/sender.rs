// notifier/telegram/sender.rs

use crate::model::NotifyError;
use crate::notifier::telegram::TelegramBot;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Sends a plain text message to `chat_id`.
pub async fn send_text(bot: &TelegramBot, chat_id: i64, text: &str) -> Result<(), NotifyError> {
    let url = bot.api_url("sendMessage");
    let params = [("chat_id", chat_id.to_string()), ("text", text.to_string())];

    let response = match timeout(Duration::from_secs(10), bot.client.post(&url).form(&params).send()).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            warn!("❌ Telegram send() failed: {:?}", e);
            return Err(NotifyError::ApiError(format!("Send failed: {}", e)));
        }
        Err(_) => {
            warn!("⏳ Telegram send() timed out");
            return Err(NotifyError::Unreachable);
        }
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_else(|_| "unknown".into());
    if !status.is_success() {
        warn!("❌ Telegram API responded [{}]: {}", status, body);
        return Err(NotifyError::ApiError(format!("HTTP {}: {}", status, body)));
    }
    info!("✅ Telegram message sent to chat {} [{}]", chat_id, status);
    Ok(())
}
