//! Manifold Markets fetcher.
//!
//! `before`-cursor pagination: each page is requested with the id of the
//! previous page's last record. Volumes are in M$ (play money), kept in
//! their own currency bucket so they are never summed with USD.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{MarketOutcome, MarketStatus, Platform, UnifiedMarket};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

pub const MANIFOLD_API_URL: &str = "https://api.manifold.markets/v0";

pub struct ManifoldFetcher {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarket {
    id: Option<String>,
    question: Option<String>,
    outcome_type: Option<String>,
    probability: Option<f64>,
    volume: Option<f64>,
    volume_24_hours: Option<f64>,
    close_time: Option<i64>,
    is_resolved: Option<bool>,
    resolution: Option<String>,
    resolution_time: Option<i64>,
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

impl RawMarket {
    fn to_unified(&self) -> Option<UnifiedMarket> {
        let external_id = self.id.clone()?;
        let title = self.question.clone()?;

        // Only binary markets carry a single probability; other types
        // (free response, numeric) are normalized without prices.
        let is_binary = self.outcome_type.as_deref() == Some("BINARY");
        let yes_price = is_binary
            .then(|| self.probability.and_then(|p| Decimal::try_from(p).ok()))
            .flatten();
        let no_price = yes_price.map(|p| Decimal::ONE - p);

        let outcomes = match yes_price {
            Some(yes) => vec![
                MarketOutcome {
                    id: format!("{external_id}-yes"),
                    name: "Yes".to_string(),
                    probability: yes * Decimal::from(100),
                    odds: None,
                },
                MarketOutcome {
                    id: format!("{external_id}-no"),
                    name: "No".to_string(),
                    probability: (Decimal::ONE - yes) * Decimal::from(100),
                    odds: None,
                },
            ],
            None => Vec::new(),
        };

        let now_ms = Utc::now().timestamp_millis();
        let status = if self.is_resolved == Some(true) {
            MarketStatus::Resolved
        } else if self.close_time.is_some_and(|t| t < now_ms) {
            MarketStatus::Closed
        } else {
            MarketStatus::Open
        };

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Manifold, &external_id),
            platform: Platform::Manifold,
            external_id,
            title,
            description: None,
            category: self.outcome_type.clone(),
            outcomes,
            yes_price,
            no_price,
            volume: self.volume.and_then(|v| Decimal::try_from(v).ok()),
            volume_24h: self.volume_24_hours.and_then(|v| Decimal::try_from(v).ok()),
            liquidity: None,
            closes_at: self.close_time.and_then(millis_to_datetime),
            expires_at: self.close_time.and_then(millis_to_datetime),
            resolved_at: self.resolution_time.and_then(millis_to_datetime),
            winning_outcome: self.resolution.clone(),
            status,
            chain: None,
            currency: "MANA".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

impl ManifoldFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: MANIFOLD_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl Default for ManifoldFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for ManifoldFetcher {
    fn platform(&self) -> Platform {
        Platform::Manifold
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> Result<PageResult, FetchError> {
        let mut url = format!("{}/markets?limit={}", self.base_url, limit);
        match cursor {
            Some(Cursor::Token(before)) => {
                url.push_str(&format!("&before={before}"));
            }
            None => {}
            Some(other) => {
                return Err(FetchError::Configuration(format!(
                    "manifold expects token cursor, got {other:?}"
                )))
            }
        }
        tracing::debug!(limit, "GET {url}");

        let response = self.http.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            return Err(FetchError::rate_limited(crate::util::retry_after_ms(&response)));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }

        let raw: Vec<RawMarket> = response.json().await?;
        let fetched = raw.len();
        // The next cursor is the raw last record's id, even if that record
        // itself failed normalization.
        let next_before = raw.last().and_then(|m| m.id.clone());
        let markets: Vec<UnifiedMarket> = raw.iter().filter_map(RawMarket::to_unified).collect();

        let has_more = fetched as u32 >= limit && next_before.is_some();
        Ok(PageResult {
            markets,
            has_more,
            next_cursor: has_more.then(|| Cursor::Token(next_before.unwrap_or_default())),
            total_count: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_page_threads_before_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(query_param("before", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "m1",
                    "question": "Binary question?",
                    "outcomeType": "BINARY",
                    "probability": 0.72,
                    "volume": 1500.0
                },
                {
                    "id": "m2",
                    "question": "Another?",
                    "outcomeType": "FREE_RESPONSE"
                }
            ])))
            .mount(&server)
            .await;

        let fetcher = ManifoldFetcher::new().with_base_url(server.uri());
        let page = fetcher
            .fetch_page(Some(Cursor::Token("abc".into())), 2)
            .await
            .unwrap();

        assert_eq!(page.markets.len(), 2);
        assert_eq!(page.markets[0].yes_price, Some(dec!(0.72)));
        assert_eq!(page.markets[0].no_price, Some(dec!(0.28)));
        assert_eq!(page.markets[0].currency, "MANA");
        assert!(page.markets[1].yes_price.is_none());
        assert_eq!(page.next_cursor, Some(Cursor::Token("m2".into())));
    }

    #[tokio::test]
    async fn test_fetch_page_short_page_terminates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "m9", "question": "last?", "outcomeType": "BINARY", "probability": 0.5 }
            ])))
            .mount(&server)
            .await;

        let fetcher = ManifoldFetcher::new().with_base_url(server.uri());
        let page = fetcher.fetch_page(None, 100).await.unwrap();
        assert!(!page.has_more);
    }
}
