// CoinGecko `market_chart` body parsing
use crate::model::{FetchError, Sample};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(i64, f64)>,
}

/// Decodes `{"prices": [[timestamp_ms, price_usd], ...], ...}`.
/// Other top-level keys are ignored; every pair must be exactly `[integer, number]`.
pub fn parse_market_chart(body: &str) -> Result<Vec<Sample>, FetchError> {
    let chart: MarketChart =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    Ok(chart
        .prices
        .into_iter()
        .map(|(timestamp_ms, price)| Sample::new(timestamp_ms, price))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_price_pairs_in_upstream_order() {
        let body = r#"{
            "prices": [[1711843200000, 70123.5], [1711846800000, 70200]],
            "market_caps": [[1711843200000, 1.0]],
            "total_volumes": []
        }"#;
        let samples = parse_market_chart(body).unwrap();
        assert_eq!(
            samples,
            vec![Sample::new(1711843200000, 70123.5), Sample::new(1711846800000, 70200.0)]
        );
    }

    #[test]
    fn empty_price_list_is_not_an_error() {
        let samples = parse_market_chart(r#"{"prices": []}"#).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn rejects_other_shapes() {
        let cases = [
            "",
            "not json",
            "[]",
            r#"{"error": "coin not found"}"#,
            r#"{"prices": {"a": 1}}"#,
            r#"{"prices": [[1711843200000]]}"#,
            r#"{"prices": [[1711843200000, 1.0, 2.0]]}"#,
            r#"{"prices": [["1711843200000", 1.0]]}"#,
            r#"{"prices": [[1711843200000.5, 1.0]]}"#,
            r#"{"prices": [[1711843200000, null]]}"#,
        ];
        for body in cases {
            assert!(
                matches!(parse_market_chart(body), Err(FetchError::Malformed(_))),
                "accepted: {body}"
            );
        }
    }
}
