pub mod sqlite;

pub use sqlite::SqliteStorage;

use crate::model::{AssetId, HistoricalSeries, Sample, StoreError};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Process-wide handle to the SQLite store.
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Append-only price repository plus its history reader.
#[async_trait::async_trait]
pub trait PriceStore: Send + Sync {
    /// Writes each sample independently; no rollback on partial failure.
    async fn append(&self, asset: &AssetId, samples: &[Sample]) -> Result<usize, StoreError>;

    /// Every stored point for `asset`, ascending by timestamp.
    async fn query(&self, asset: &AssetId) -> Result<HistoricalSeries, StoreError>;
}

#[async_trait::async_trait]
impl PriceStore for Mutex<SqliteStorage> {
    async fn append(&self, asset: &AssetId, samples: &[Sample]) -> Result<usize, StoreError> {
        self.lock().await.append(asset, samples)
    }

    async fn query(&self, asset: &AssetId) -> Result<HistoricalSeries, StoreError> {
        self.lock().await.query(asset)
    }
}
