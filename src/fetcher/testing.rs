// Test doubles shared by the fetcher and orchestrator tests.
use crate::fetcher::traits::PriceFetcher;
use crate::model::{AssetId, FetchError, Sample};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replays a fixed list of outcomes, one per call. Fails with a transport error once exhausted.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<Vec<Sample>, FetchError>>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<Vec<Sample>, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PriceFetcher for ScriptedFetcher {
    async fn fetch(&self, _asset: &AssetId, _window_days: u32) -> Result<Vec<Sample>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Transport("script exhausted".into())))
    }
}

/// Never answers.
pub struct HangingFetcher;

#[async_trait::async_trait]
impl PriceFetcher for HangingFetcher {
    async fn fetch(&self, _asset: &AssetId, _window_days: u32) -> Result<Vec<Sample>, FetchError> {
        std::future::pending().await
    }
}

pub fn samples(pairs: &[(i64, f64)]) -> Vec<Sample> {
    pairs.iter().map(|&(ts, price)| Sample::new(ts, price)).collect()
}
