// Analyzer module: trend fitting and extrapolation.

pub mod trend;

// Re-export the main Forecaster implementation for ease of use.
pub use trend::{Forecaster, LinearTrendForecaster};
