pub mod command_handler;
pub mod listener;
pub mod render;
pub mod sender;

use crate::model::NotifyError;
use crate::orchestrator::AnalysisPipeline;
use crate::storage::SharedStorage;
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Telegram front end: polls for commands and replies with forecasts.
pub struct TelegramBot {
    pub bot_token: String,
    pub client: Client,
    pub offset: AtomicI64,
    pub pipeline: Arc<AnalysisPipeline>,
    pub storage: SharedStorage,
    pub start_time: Instant,
    /// Caps how many single-asset analyses run at once across all chats.
    pub limiter: Arc<Semaphore>,
    pub poll_interval: Duration,
    pub shutdown: CancellationToken,
}

impl TelegramBot {
    pub fn new(
        bot_token: String,
        pipeline: Arc<AnalysisPipeline>,
        storage: SharedStorage,
        max_concurrent_requests: usize,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Result<Self, reqwest::Error> {
        // getUpdates long-polls for up to 25s, so the client timeout must exceed it.
        let client = Client::builder().timeout(Duration::from_secs(35)).build()?;
        Ok(Self {
            bot_token,
            client,
            offset: AtomicI64::new(0),
            pipeline,
            storage,
            start_time: Instant::now(),
            limiter: Arc::new(Semaphore::new(max_concurrent_requests)),
            poll_interval,
            shutdown,
        })
    }

    pub fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", TELEGRAM_API, self.bot_token, method)
    }

    pub async fn notify_text(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        sender::send_text(self, chat_id, text).await
    }

    pub async fn set_my_commands(&self) -> Result<(), reqwest::Error> {
        let commands = serde_json::json!({
            "commands": [
                { "command": "start", "description": "Greeting" },
                { "command": "analyze", "description": "Predict a price: /analyze <coin> [coin...]" },
                { "command": "assets", "description": "Assets with stored history" },
                { "command": "help", "description": "Command list" },
                { "command": "ping", "description": "Check connection" },
                { "command": "uptime", "description": "Service uptime" }
            ]
        });
        self.client
            .post(self.api_url("setMyCommands"))
            .json(&commands)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub fn spawn_listener(bot: Arc<TelegramBot>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("▶️ Starting Telegram listener...");
            listener::listen_for_commands(bot).await;
            tracing::info!("🛑 Telegram listener ended.");
        })
    }
}
