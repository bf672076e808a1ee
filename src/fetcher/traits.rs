use crate::model::{AssetId, FetchError, Sample};

/// Retrieves the trailing `window_days` of `(timestamp, price)` samples for one asset.
#[async_trait::async_trait]
pub trait PriceFetcher: Send + Sync {
    async fn fetch(&self, asset: &AssetId, window_days: u32) -> Result<Vec<Sample>, FetchError>;
}
