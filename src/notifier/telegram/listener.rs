// notifier/telegram/listener.rs

use crate::notifier::telegram::TelegramBot;
use crate::notifier::telegram::command_handler::handle_command;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::sleep;
use tracing::warn;

const LONG_POLL_SECS: u64 = 25;

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    from: Option<TelegramUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    first_name: String,
}

/// Polls for Telegram updates until shutdown and dispatches incoming commands.
pub async fn listen_for_commands(bot: Arc<TelegramBot>) {
    let url = bot.api_url("getUpdates");
    loop {
        let offset = bot.offset.load(Ordering::SeqCst);
        let request = bot
            .client
            .get(&url)
            .query(&[("offset", offset.to_string()), ("timeout", LONG_POLL_SECS.to_string())])
            .send();

        let response = tokio::select! {
            _ = bot.shutdown.cancelled() => break,
            response = request => response,
        };

        match response {
            Ok(resp) => match resp.json::<TelegramApiResponse>().await {
                Ok(api_response) => {
                    for update in api_response.result {
                        if let Some(message) = update.message {
                            if let Some(text) = message.text.as_deref() {
                                let first_name = message.from.as_ref().map(|u| u.first_name.as_str());
                                handle_command(&bot, message.chat.id, first_name, text).await;
                            }
                        }
                        bot.offset.store(update.update_id + 1, Ordering::SeqCst);
                    }
                }
                Err(e) => warn!("⚠️ Cannot decode getUpdates response: {:?}", e),
            },
            Err(e) => warn!("⚠️ getUpdates failed: {:?}", e),
        }

        tokio::select! {
            _ = bot.shutdown.cancelled() => break,
            _ = sleep(bot.poll_interval) => {}
        }
    }
}
