use crate::model::{ForecastError, HistoricalSeries, PricePoint};
use tracing::debug;

/// Trait defining the interface for a price forecaster.
pub trait Forecaster: Send + Sync {
    /// Price expected `horizon_ms` after the last point of `series`.
    fn predict(&self, series: &HistoricalSeries, horizon_ms: i64) -> Result<f64, ForecastError>;
}

/// Ordinary-least-squares line `price = slope * (t - origin) + intercept`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendFit {
    /// Price change per millisecond.
    pub slope: f64,
    /// Fitted price at `origin`.
    pub intercept: f64,
    /// Smallest timestamp of the fitted series; timestamps are shifted by it before fitting.
    pub origin: i64,
    /// Squared Pearson correlation. `None` when prices are constant.
    pub r_squared: Option<f64>,
    pub samples: usize,
}

impl TrendFit {
    pub fn value_at(&self, timestamp_ms: i64) -> f64 {
        self.intercept + self.slope * offset(timestamp_ms, self.origin)
    }
}

/// Fits a straight line of price over time.
///
/// Epoch-millisecond timestamps are around 1.7e12, so they are shifted to start at zero
/// and centred on their mean before any products are formed.
pub fn fit_trend(points: &[PricePoint]) -> Result<TrendFit, ForecastError> {
    let mut timestamps: Vec<i64> = points.iter().map(|p| p.timestamp_ms).collect();
    timestamps.sort_unstable();
    timestamps.dedup();
    let distinct_timestamps = timestamps.len();

    let insufficient = ForecastError::InsufficientData {
        samples: points.len(),
        distinct_timestamps,
    };
    let Some(&origin) = timestamps.first() else {
        return Err(insufficient);
    };
    if points.len() < 2 || distinct_timestamps < 2 {
        return Err(insufficient);
    }

    let n = points.len() as f64;
    let xs: Vec<f64> = points.iter().map(|p| offset(p.timestamp_ms, origin)).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.price).collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let sxy: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    if sxx == 0.0 {
        return Err(insufficient);
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let r_squared = compute_correlation(&xs, &ys).map(|r| r * r);

    Ok(TrendFit {
        slope,
        intercept,
        origin,
        r_squared,
        samples: points.len(),
    })
}

// Widened so that any pair of i64 timestamps has a representable distance.
fn offset(timestamp_ms: i64, origin: i64) -> f64 {
    (i128::from(timestamp_ms) - i128::from(origin)) as f64
}

/// Calculates the Pearson correlation coefficient between two slices.
/// Returns None if slices have different lengths, are empty, or either has zero variance.
pub fn compute_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.is_empty() {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let numerator: f64 = x.iter().zip(y.iter()).map(|(xi, yi)| (xi - mean_x) * (yi - mean_y)).sum();
    let denominator_x: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();
    let denominator_y: f64 = y.iter().map(|yi| (yi - mean_y).powi(2)).sum();
    let denominator = (denominator_x * denominator_y).sqrt();
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

/// Linear-trend extrapolation over the whole series.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearTrendForecaster;

impl LinearTrendForecaster {
    pub fn new() -> Self {
        Self
    }
}

impl Forecaster for LinearTrendForecaster {
    fn predict(&self, series: &HistoricalSeries, horizon_ms: i64) -> Result<f64, ForecastError> {
        let fit = fit_trend(&series.points)?;
        debug!(
            "Trend for {}: {:.6} per hour, r² {:?}, {} samples",
            series.asset,
            fit.slope * 3_600_000.0,
            fit.r_squared,
            fit.samples
        );
        let last = series
            .points
            .iter()
            .map(|p| p.timestamp_ms)
            .max()
            .unwrap_or(fit.origin);
        Ok(fit.value_at(last.saturating_add(horizon_ms)))
    }
}
