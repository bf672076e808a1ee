use crate::fetcher::traits::PriceFetcher;
use crate::model::{AssetId, FetchError, Sample};
use crate::parser::parse_market_chart;

use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{info, warn};

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Single-attempt client for the CoinGecko `market_chart` endpoint.
pub struct CoinGeckoFetcher {
    client: Client,
    base_url: Url,
}

impl CoinGeckoFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("coin-forecaster/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("cannot build HTTP client: {}", e)))?;
        Self::with_client(client, base_url)
    }

    pub(crate) fn with_client(client: Client, base_url: &str) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::Transport(format!("invalid base url {}: {}", base_url, e)))?;

        Ok(Self { client, base_url })
    }

    fn build_url(&self, asset: &AssetId, window_days: u32) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport(format!("base url cannot hold a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["coins", asset.as_str(), "market_chart"]);
        url.query_pairs_mut()
            .append_pair("vs_currency", "usd")
            .append_pair("days", &window_days.to_string());
        Ok(url)
    }
}

#[async_trait::async_trait]
impl PriceFetcher for CoinGeckoFetcher {
    async fn fetch(&self, asset: &AssetId, window_days: u32) -> Result<Vec<Sample>, FetchError> {
        let url = self.build_url(asset, window_days)?;
        info!("🌐 GET {}", url);

        let response = self
            .client
            .get(url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!("❌ Market data error [{}] for {}", status, asset);
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let samples = parse_market_chart(&body)?;
        info!("✅ {} samples received for {}", samples.len(), asset);
        Ok(samples)
    }
}
