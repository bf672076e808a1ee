// User-facing wording for forecasts, errors and stored assets.
use crate::model::{AnalysisError, AssetId, AssetSummary, ErrorKind, Forecast};
use chrono::{DateTime, Utc};

/// "10 minutes", "1 hour", "90 seconds", "1500 ms".
pub fn format_horizon(ms: i64) -> String {
    let (value, unit) = if ms % 3_600_000 == 0 {
        (ms / 3_600_000, "hour")
    } else if ms % 60_000 == 0 {
        (ms / 60_000, "minute")
    } else if ms % 1_000 == 0 {
        (ms / 1_000, "second")
    } else {
        return format!("{} ms", ms);
    };
    if value == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

/// Two decimals as usual; more for sub-dollar coins so they don't all print as $0.00.
pub fn format_price(price: f64) -> String {
    if price.abs() < 1.0 {
        format!("${:.6}", price)
    } else {
        format!("${:.2}", price)
    }
}

fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

pub fn render_forecast(forecast: &Forecast) -> String {
    let mut msg = format!(
        "📈 Predicted price of {} after {}: {}",
        forecast.asset,
        format_horizon(forecast.horizon_ms),
        format_price(forecast.predicted_price)
    );
    if let Some(change) = forecast.change_pct() {
        msg.push_str(&format!(
            "\n💰 Last: {} ({:+.2}%)",
            format_price(forecast.last_price),
            change
        ));
    }
    msg.push_str(&format!(
        "\n📊 Based on {} samples up to {}",
        forecast.samples,
        format_timestamp(forecast.last_timestamp_ms)
    ));
    msg
}

pub fn render_error(asset: &AssetId, err: &AnalysisError) -> String {
    match err.kind() {
        ErrorKind::Fetch => format!(
            "❌ Failed to fetch data for {}. Please check the cryptocurrency name or try again later.",
            asset
        ),
        ErrorKind::Store => format!(
            "❌ Could not save market data for {}. Please try again later.",
            asset
        ),
        ErrorKind::NoHistory => format!("📭 No historical data available for {}.", asset),
        ErrorKind::InsufficientData => format!(
            "📉 Not enough price history for {} to fit a trend yet.",
            asset
        ),
        ErrorKind::TimedOut => format!("⏳ Analysis of {} timed out. Please try again later.", asset),
        ErrorKind::Cancelled => format!("🛑 Analysis of {} was cancelled.", asset),
    }
}

pub fn render_assets(summaries: &[AssetSummary]) -> String {
    if summaries.is_empty() {
        return "📭 No price history stored yet. Try /analyze bitcoin".to_string();
    }
    let mut msg = String::from("🗂 Stored history:\n");
    for s in summaries {
        msg.push_str(&format!(
            "🔹 {} — {} samples ({} → {})\n",
            s.asset,
            s.samples,
            format_timestamp(s.first_timestamp_ms),
            format_timestamp(s.last_timestamp_ms)
        ));
    }
    msg
}
