// Per-request pipeline: fetch -> store -> query -> predict
use crate::analyzer::Forecaster;
use crate::config::AppConfig;
use crate::fetcher::PriceFetcher;
use crate::model::{AnalysisError, AssetId, FetchError, Forecast, Stage};
use crate::storage::PriceStore;

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub window_days: u32,
    pub horizon_ms: i64,
    pub request_timeout: Duration,
    /// Drop repeated timestamps from the history before fitting.
    pub dedupe_history: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window_days: 30,
            horizon_ms: 600_000,
            request_timeout: Duration::from_secs(60),
            dedupe_history: false,
        }
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            window_days: cfg.window_days,
            horizon_ms: cfg.horizon_ms,
            request_timeout: cfg.request_timeout(),
            dedupe_history: cfg.dedupe_history,
        }
    }
}

/// Runs analysis requests against explicitly injected collaborators.
pub struct AnalysisPipeline {
    fetcher: Arc<dyn PriceFetcher>,
    store: Arc<dyn PriceStore>,
    forecaster: Arc<dyn Forecaster>,
    settings: PipelineSettings,
}

impl AnalysisPipeline {
    pub fn new(
        fetcher: Arc<dyn PriceFetcher>,
        store: Arc<dyn PriceStore>,
        forecaster: Arc<dyn Forecaster>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            forecaster,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn handle(&self, asset: &AssetId) -> Result<Forecast, AnalysisError> {
        self.handle_with_cancel(asset, &CancellationToken::new()).await
    }

    /// Runs one request to completion, bounded by the request timeout and `cancel`.
    /// Points written before a failure stay written.
    pub async fn handle_with_cancel(
        &self,
        asset: &AssetId,
        cancel: &CancellationToken,
    ) -> Result<Forecast, AnalysisError> {
        let stage = watch::Sender::new(Stage::Idle);

        let outcome = tokio::select! {
            result = timeout(self.settings.request_timeout, self.run(asset, &stage)) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(AnalysisError::TimedOut { stage: *stage.borrow() }),
            },
            _ = cancel.cancelled() => Err(AnalysisError::Cancelled { stage: *stage.borrow() }),
        };

        match &outcome {
            Ok(forecast) => info!(
                "🏁 {}: {:.4} predicted in {} ms from {} samples",
                asset, forecast.predicted_price, forecast.horizon_ms, forecast.samples
            ),
            Err(e) => {
                let failed_at = stage.send_replace(Stage::Failed);
                warn!("💥 Analysis of {} failed while {}: {}", asset, failed_at, e);
            }
        }

        outcome
    }

    /// Independent requests for several assets, run concurrently. Each request holds one
    /// `limiter` permit while it runs. Results keep input order.
    pub async fn handle_many(
        &self,
        assets: &[AssetId],
        cancel: &CancellationToken,
        limiter: &Semaphore,
    ) -> Vec<Result<Forecast, AnalysisError>> {
        join_all(assets.iter().map(|asset| async move {
            let _permit = tokio::select! {
                permit = limiter.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return Err(AnalysisError::Cancelled { stage: Stage::Idle }),
                },
                _ = cancel.cancelled() => return Err(AnalysisError::Cancelled { stage: Stage::Idle }),
            };
            self.handle_with_cancel(asset, cancel).await
        }))
        .await
    }

    async fn run(&self, asset: &AssetId, stage: &watch::Sender<Stage>) -> Result<Forecast, AnalysisError> {
        enter(stage, asset, Stage::Fetching);
        let samples = self.fetcher.fetch(asset, self.settings.window_days).await?;
        if samples.is_empty() {
            return Err(FetchError::Empty.into());
        }

        enter(stage, asset, Stage::Storing);
        let written = self.store.append(asset, &samples).await?;
        info!("💾 Stored {} points for {}", written, asset);

        enter(stage, asset, Stage::Querying);
        let mut series = self.store.query(asset).await?;
        if self.settings.dedupe_history {
            series = series.deduplicated();
        }
        let Some(last) = series.last().cloned() else {
            return Err(AnalysisError::NoHistory { asset: asset.clone() });
        };

        enter(stage, asset, Stage::Predicting);
        let predicted_price = self.forecaster.predict(&series, self.settings.horizon_ms)?;

        enter(stage, asset, Stage::Done);
        Ok(Forecast {
            asset: asset.clone(),
            horizon_ms: self.settings.horizon_ms,
            predicted_price,
            samples: series.len(),
            last_price: last.price,
            last_timestamp_ms: last.timestamp_ms,
        })
    }
}

fn enter(stage: &watch::Sender<Stage>, asset: &AssetId, next: Stage) {
    let previous = stage.send_replace(next);
    info!("➡️ {}: {} -> {}", asset, previous, next);
}
