//! Shared parsing helpers for upstream payloads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parses a decimal that upstreams deliver either as a string or a number.
pub(crate) fn parse_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// Parses a decimal from an optional string field.
pub(crate) fn decimal_from_str(value: Option<&str>) -> Option<Decimal> {
    value.and_then(|s| Decimal::from_str(s.trim()).ok())
}

/// Parses an RFC 3339 timestamp, tolerating the absence of the field.
pub(crate) fn parse_rfc3339(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.and_then(|s| {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    })
}

/// Retry-After header in milliseconds, defaulting to a full minute when
/// the header is absent or unparseable.
pub(crate) fn retry_after_ms(response: &reqwest::Response) -> u64 {
    retry_after_ms_from_header(
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    )
}

/// The header value is upstream-controlled; an absurd seconds count
/// saturates instead of overflowing.
pub(crate) fn retry_after_ms_from_header(value: Option<&str>) -> u64 {
    value
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map_or(60_000, |secs| secs.saturating_mul(1000))
}

/// Probability (0–100) from a unit-interval price.
pub(crate) fn probability_from_price(price: Decimal) -> Decimal {
    price * Decimal::from(100)
}
