// Parser module: decodes upstream response bodies into samples.

pub mod market_chart;

pub use market_chart::parse_market_chart;
