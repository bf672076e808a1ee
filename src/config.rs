use serde::Deserialize;
use std::fs;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub telegram_admin_chat_id: Option<i64>,
    pub database_path: String,
    pub market_data_base_url: String,
    pub window_days: u32,
    pub horizon_ms: i64,
    pub http_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub dedupe_history: bool,
    pub max_concurrent_requests: usize,
    pub poll_interval_secs: u64,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            telegram_admin_chat_id: None,
            database_path: "prices.db".to_string(),
            market_data_base_url: "https://api.coingecko.com/api/v3".to_string(),
            window_days: 30,
            horizon_ms: 600_000,
            http_timeout_secs: 15,
            request_timeout_secs: 60,
            dedupe_history: false,
            max_concurrent_requests: 4,
            poll_interval_secs: 1,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Longest a fetch can take with every attempt timing out and full jitter on each backoff.
    pub fn worst_case_fetch(&self) -> Duration {
        let attempts = self.retry.max_attempts.max(1);
        let backoff_ms: u64 = (1..attempts)
            .map(|attempt| {
                let factor = 2u64.saturating_pow(attempt - 1);
                let delay = self.retry.base_backoff_ms.saturating_mul(factor).min(self.retry.max_backoff_ms);
                delay.saturating_add(delay / 2)
            })
            .fold(0, u64::saturating_add);
        self.http_timeout()
            .saturating_mul(attempts)
            .saturating_add(Duration::from_millis(backoff_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "telegram_bot_token is empty (set it in the file or TELEGRAM_BOT_TOKEN)".into(),
            ));
        }
        if self.window_days == 0 {
            return Err(ConfigError::Invalid("window_days must be at least 1".into()));
        }
        if self.horizon_ms <= 0 {
            return Err(ConfigError::Invalid("horizon_ms must be positive".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_requests must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

pub fn parse_config(content: &str, token_override: Option<String>) -> Result<AppConfig, ConfigError> {
    let mut config: AppConfig = serde_json::from_str(content)?;
    if let Some(token) = token_override.filter(|t| !t.trim().is_empty()) {
        config.telegram_bot_token = token;
    }
    config.validate()?;
    if config.request_timeout() < config.worst_case_fetch() {
        warn!(
            "⚠️ request_timeout_secs ({:?}) is shorter than the worst-case fetch with retries ({:?})",
            config.request_timeout(),
            config.worst_case_fetch()
        );
    }
    Ok(config)
}

/// Reads the JSON config at `path`. `TELEGRAM_BOT_TOKEN` wins over the file's token.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content, std::env::var("TELEGRAM_BOT_TOKEN").ok())
}
