mod analyzer;
mod config;
mod fetcher;
mod model;
mod notifier;
mod orchestrator;
mod parser;
mod storage;

use analyzer::LinearTrendForecaster;
use config::{AppConfig, load_config};
use fetcher::{CircuitBreaker, CoinGeckoFetcher, PriceFetcher, ResilientFetcher, RetryPolicy};
use notifier::TelegramBot;
use orchestrator::{AnalysisPipeline, PipelineSettings};
use storage::{SharedStorage, SqliteStorage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Set panic hook to log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("😱 Panic occurred: {:?}", panic_info);
    }));

    // Load configuration from file
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    let config: AppConfig = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error ({}): {}", config_path, e);
            return;
        }
    };

    // Storage connection, opened once and shared by every request
    let storage: SharedStorage = match SqliteStorage::new(&config.database_path) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            return;
        }
    };

    // Market-data client with retries and a circuit breaker around it
    let upstream = match CoinGeckoFetcher::new(&config.market_data_base_url, config.http_timeout()) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to initialize market data client: {}", e);
            return;
        }
    };
    let fetcher: Arc<dyn PriceFetcher> = Arc::new(ResilientFetcher::new(
        Arc::new(upstream),
        RetryPolicy::from(&config.retry),
        CircuitBreaker::from(&config.circuit_breaker),
    ));

    let pipeline = Arc::new(AnalysisPipeline::new(
        fetcher,
        storage.clone(),
        Arc::new(LinearTrendForecaster::new()),
        PipelineSettings::from(&config),
    ));
    info!(
        "Pipeline ready: window {} days, horizon {} ms, timeout {:?}",
        pipeline.settings().window_days,
        pipeline.settings().horizon_ms,
        pipeline.settings().request_timeout
    );

    let shutdown = CancellationToken::new();
    let bot = match TelegramBot::new(
        config.telegram_bot_token.clone(),
        pipeline,
        storage,
        config.max_concurrent_requests,
        Duration::from_secs(config.poll_interval_secs),
        shutdown.clone(),
    ) {
        Ok(bot) => Arc::new(bot),
        Err(e) => {
            error!("Failed to create Telegram client: {}", e);
            return;
        }
    };

    if let Err(e) = bot.set_my_commands().await {
        warn!("setMyCommands failed: {:?}", e);
    }
    if let Some(chat_id) = config.telegram_admin_chat_id {
        info!("Sending startup message...");
        if let Err(e) = bot.notify_text(chat_id, "🚀 Coin forecaster started!").await {
            warn!("Startup notification failed: {:?}", e);
        }
    }

    let listener = TelegramBot::spawn_listener(bot);

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested, stopping listener..."),
        Err(e) => error!("Cannot listen for shutdown signal: {}", e),
    }
    shutdown.cancel();
    if let Err(e) = listener.await {
        warn!("Listener task ended abnormally: {:?}", e);
    }
    info!("Bye.");
}
