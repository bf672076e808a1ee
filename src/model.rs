// Core structs: AssetId, Sample, PricePoint, HistoricalSeries, Forecast and the error taxonomy
use std::fmt;
use thiserror::Error;

/// Instrument identifier, trimmed and lower-cased ("Bitcoin" and "bitcoin" are the same asset).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(String);

impl AssetId {
    /// Returns `None` for blank input. Anything else is passed through to the provider as-is.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `(timestamp, price)` observation as returned by the market-data source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub price: f64,
}

impl Sample {
    pub fn new(timestamp_ms: i64, price: f64) -> Self {
        Self { timestamp_ms, price }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub asset: AssetId,
    pub timestamp_ms: i64,
    pub price: f64,
}

/// Every stored point for one asset, ascending by timestamp. Duplicates are allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSeries {
    pub asset: AssetId,
    pub points: Vec<PricePoint>,
}

impl HistoricalSeries {
    pub fn new(asset: AssetId, points: Vec<PricePoint>) -> Self {
        Self { asset, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Keeps the first record of every timestamp. Relies on the series already being sorted.
    pub fn deduplicated(mut self) -> Self {
        self.points.dedup_by_key(|p| p.timestamp_ms);
        self
    }
}

/// Extrapolated price. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub asset: AssetId,
    pub horizon_ms: i64,
    pub predicted_price: f64,
    pub samples: usize,
    pub last_price: f64,
    pub last_timestamp_ms: i64,
}

impl Forecast {
    /// Relative change from the last observed price, in percent.
    pub fn change_pct(&self) -> Option<f64> {
        if self.last_price == 0.0 {
            return None;
        }
        Some((self.predicted_price - self.last_price) / self.last_price * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetSummary {
    pub asset: AssetId,
    pub samples: usize,
    pub first_timestamp_ms: i64,
    pub last_timestamp_ms: i64,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response body: {0}")]
    Malformed(String),
    #[error("upstream reported no samples")]
    Empty,
    #[error("circuit breaker open, upstream calls suspended")]
    CircuitOpen,
}

impl FetchError {
    /// Transport failures, rate limiting and server errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForecastError {
    #[error("insufficient data: {samples} samples, {distinct_timestamps} distinct timestamps")]
    InsufficientData {
        samples: usize,
        distinct_timestamps: usize,
    },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("telegram api error: {0}")]
    ApiError(String),
    #[error("telegram unreachable")]
    Unreachable,
}

/// Pipeline position, used for logging and to report where a timeout or cancellation hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Fetching,
    Storing,
    Querying,
    Predicting,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Fetching => "fetching",
            Stage::Storing => "storing",
            Stage::Querying => "querying",
            Stage::Predicting => "predicting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Store,
    NoHistory,
    InsufficientData,
    TimedOut,
    Cancelled,
}

/// Terminal outcome of a failed analysis request.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
    #[error("no stored history for {asset}")]
    NoHistory { asset: AssetId },
    #[error(transparent)]
    InsufficientData(#[from] ForecastError),
    #[error("request timed out while {stage}")]
    TimedOut { stage: Stage },
    #[error("request cancelled while {stage}")]
    Cancelled { stage: Stage },
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Fetch(_) => ErrorKind::Fetch,
            AnalysisError::Store(_) => ErrorKind::Store,
            AnalysisError::NoHistory { .. } => ErrorKind::NoHistory,
            AnalysisError::InsufficientData(_) => ErrorKind::InsufficientData,
            AnalysisError::TimedOut { .. } => ErrorKind::TimedOut,
            AnalysisError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(ts: i64, price: f64) -> PricePoint {
        PricePoint {
            asset: AssetId::parse("bitcoin").unwrap(),
            timestamp_ms: ts,
            price,
        }
    }

    #[test]
    fn asset_id_is_case_insensitive() {
        assert_eq!(AssetId::parse("  BitCoin ").unwrap().as_str(), "bitcoin");
        assert_eq!(AssetId::parse("ETHEREUM"), AssetId::parse("ethereum"));
        assert!(AssetId::parse("   ").is_none());
    }

    #[test]
    fn deduplicated_keeps_first_of_each_timestamp() {
        let series = HistoricalSeries::new(
            AssetId::parse("bitcoin").unwrap(),
            vec![point(1, 10.0), point(1, 11.0), point(2, 12.0), point(2, 12.0), point(3, 13.0)],
        );
        let deduped = series.deduplicated();
        let prices: Vec<f64> = deduped.points.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![10.0, 12.0, 13.0]);
    }

    #[test]
    fn transient_fetch_errors() {
        assert!(FetchError::Transport("reset".into()).is_transient());
        assert!(FetchError::Status { status: 503, body: String::new() }.is_transient());
        assert!(FetchError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!FetchError::Status { status: 404, body: String::new() }.is_transient());
        assert!(!FetchError::Malformed("x".into()).is_transient());
        assert!(!FetchError::CircuitOpen.is_transient());
    }

    #[test]
    fn error_kinds() {
        let err = AnalysisError::from(FetchError::Empty);
        assert_eq!(err.kind(), ErrorKind::Fetch);
        let err = AnalysisError::from(ForecastError::InsufficientData {
            samples: 1,
            distinct_timestamps: 1,
        });
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        let err = AnalysisError::TimedOut { stage: Stage::Fetching };
        assert_eq!(err.to_string(), "request timed out while fetching");
    }

    #[test]
    fn change_pct_relative_to_last_price() {
        let forecast = Forecast {
            asset: AssetId::parse("bitcoin").unwrap(),
            horizon_ms: 600_000,
            predicted_price: 110.0,
            samples: 3,
            last_price: 100.0,
            last_timestamp_ms: 0,
        };
        assert!((forecast.change_pct().unwrap() - 10.0).abs() < 1e-9);
    }
}
