// notifier/telegram/command_handler.rs

use crate::model::AssetId;
use crate::notifier::telegram::TelegramBot;
use crate::notifier::telegram::render::{render_assets, render_error, render_forecast};
use std::sync::Arc;
use tracing::{info, warn};

pub const MAX_ASSETS_PER_REQUEST: usize = 5;

const HELP: &str = "📋 Available commands:\n\
    /analyze <coin> [coin...] — predict the price a few minutes ahead\n\
    /assets — assets with stored history\n\
    /ping — check connection\n\
    /uptime — service uptime\n\
    /help — command list";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Ping,
    Uptime,
    Assets,
    Analyze(Vec<String>),
    Unknown(String),
}

/// Splits `/cmd@BotName arg1 arg2` into a command and its arguments.
/// Returns `None` for plain text that is not a command.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    let name = head.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name).to_lowercase();
    let args: Vec<String> = parts.map(str::to_string).collect();

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "ping" => Command::Ping,
        "uptime" => Command::Uptime,
        "assets" => Command::Assets,
        "analyze" => Command::Analyze(args),
        _ => Command::Unknown(head.to_string()),
    };
    Some(command)
}

/// Normalizes, de-duplicates and caps the requested assets, keeping the user's order.
pub fn requested_assets(args: &[String]) -> Vec<AssetId> {
    let mut assets: Vec<AssetId> = Vec::new();
    for asset in args.iter().filter_map(|a| AssetId::parse(a)) {
        if !assets.contains(&asset) {
            assets.push(asset);
        }
    }
    assets.truncate(MAX_ASSETS_PER_REQUEST);
    assets
}

async fn reply(bot: &TelegramBot, chat_id: i64, text: &str) {
    if let Err(e) = bot.notify_text(chat_id, text).await {
        warn!("Reply to chat {} failed: {:?}", chat_id, e);
    }
}

/// Handles an incoming message and triggers the corresponding action.
pub async fn handle_command(bot: &Arc<TelegramBot>, chat_id: i64, first_name: Option<&str>, text: &str) {
    let Some(command) = parse_command(text) else {
        return;
    };
    info!("Handling command {:?} from chat {}", command, chat_id);

    match command {
        Command::Start => {
            let name = first_name.unwrap_or("there");
            let msg = format!("👋 Hi {}! Use /analyze <crypto> to get analysis.", name);
            reply(bot, chat_id, &msg).await;
        }
        Command::Help => reply(bot, chat_id, HELP).await,
        Command::Ping => reply(bot, chat_id, "✅ I am online!").await,
        Command::Uptime => {
            let uptime = bot.start_time.elapsed();
            let msg = format!(
                "⏱ Uptime: {:02}:{:02}:{:02}",
                uptime.as_secs() / 3600,
                (uptime.as_secs() % 3600) / 60,
                uptime.as_secs() % 60
            );
            reply(bot, chat_id, &msg).await;
        }
        Command::Assets => {
            let listing = bot.storage.lock().await.list_assets();
            match listing {
                Ok(summaries) => reply(bot, chat_id, &render_assets(&summaries)).await,
                Err(e) => {
                    warn!("/assets error: {:?}", e);
                    reply(bot, chat_id, "❌ Could not read stored history.").await;
                }
            }
        }
        Command::Analyze(args) => {
            let assets = requested_assets(&args);
            if assets.is_empty() {
                reply(bot, chat_id, "Please specify a cryptocurrency (e.g., /analyze bitcoin).").await;
                return;
            }
            spawn_analysis(bot.clone(), chat_id, assets);
        }
        Command::Unknown(name) => {
            let msg = format!("🤖 Unknown command {}. Type /help for a list of commands.", name);
            reply(bot, chat_id, &msg).await;
        }
    }
}

/// Runs the analysis off the listener task so one slow upstream call doesn't block other chats.
fn spawn_analysis(bot: Arc<TelegramBot>, chat_id: i64, assets: Vec<AssetId>) {
    tokio::spawn(async move {
        let names: Vec<&str> = assets.iter().map(AssetId::as_str).collect();
        reply(&bot, chat_id, &format!("🔎 Analyzing {}, please wait...", names.join(", "))).await;

        let cancel = bot.shutdown.child_token();
        let results = bot.pipeline.handle_many(&assets, &cancel, &bot.limiter).await;
        for (asset, result) in assets.iter().zip(results) {
            let msg = match result {
                Ok(forecast) => render_forecast(&forecast),
                Err(e) => render_error(asset, &e),
            };
            reply(&bot, chat_id, &msg).await;
        }
    });
}
