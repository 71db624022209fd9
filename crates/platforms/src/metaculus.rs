//! Metaculus fetcher.
//!
//! Offset pagination with a server-reported `count`. Metaculus is a
//! forecasting site rather than a money market, so markets carry the
//! community probability and no prices or volume.

use crate::util::parse_rfc3339;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{MarketOutcome, MarketStatus, Platform, UnifiedMarket};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

pub const METACULUS_API_URL: &str = "https://www.metaculus.com/api2";

pub struct MetaculusFetcher {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RawQuestionsPage {
    count: Option<u64>,
    #[serde(default)]
    results: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: Option<u64>,
    title: Option<String>,
    #[serde(rename = "type")]
    question_type: Option<String>,
    /// Community median probability in [0, 1].
    community_prediction: Option<f64>,
    close_time: Option<String>,
    resolve_time: Option<String>,
    /// 1.0 for yes, 0.0 for no, -1 ambiguous, null unresolved.
    resolution: Option<f64>,
    active_state: Option<String>,
}

impl RawQuestion {
    fn to_unified(&self) -> Option<UnifiedMarket> {
        let external_id = self.id?.to_string();
        let title = self.title.clone()?;

        let is_binary = self.question_type.as_deref() == Some("binary");
        let yes_price = is_binary
            .then(|| self.community_prediction.and_then(|p| Decimal::try_from(p).ok()))
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

        let status = match (self.resolution, self.active_state.as_deref()) {
            (Some(r), _) if r >= 0.0 => MarketStatus::Resolved,
            (Some(_), _) => MarketStatus::Cancelled,
            (None, Some("OPEN")) => MarketStatus::Open,
            _ => MarketStatus::Closed,
        };
        let winning_outcome = self.resolution.and_then(|r| {
            if r >= 0.99 {
                Some("Yes".to_string())
            } else if (0.0..=0.01).contains(&r) {
                Some("No".to_string())
            } else {
                None
            }
        });

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Metaculus, &external_id),
            platform: Platform::Metaculus,
            external_id,
            title,
            description: None,
            category: self.question_type.clone(),
            outcomes,
            yes_price,
            no_price,
            volume: None,
            volume_24h: None,
            liquidity: None,
            closes_at: parse_rfc3339(self.close_time.as_deref()),
            expires_at: parse_rfc3339(self.close_time.as_deref()),
            resolved_at: parse_rfc3339(self.resolve_time.as_deref()),
            winning_outcome,
            status,
            chain: None,
            currency: "POINTS".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

impl MetaculusFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: METACULUS_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl Default for MetaculusFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for MetaculusFetcher {
    fn platform(&self) -> Platform {
        Platform::Metaculus
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> Result<PageResult, FetchError> {
        let offset = match cursor {
            Some(Cursor::Offset(n)) => n,
            None => 0,
            Some(other) => {
                return Err(FetchError::Configuration(format!(
                    "metaculus expects offset cursor, got {other:?}"
                )))
            }
        };

        let url = format!(
            "{}/questions/?status=open&offset={}&limit={}",
            self.base_url, offset, limit
        );
        tracing::debug!(offset, limit, "GET {url}");

        let response = self.http.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            return Err(FetchError::rate_limited(crate::util::retry_after_ms(&response)));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }

        let raw: RawQuestionsPage = response.json().await?;
        let fetched = raw.results.len() as u64;
        let markets: Vec<UnifiedMarket> =
            raw.results.iter().filter_map(RawQuestion::to_unified).collect();

        let seen = offset + fetched;
        let has_more = match raw.count {
            Some(total) => seen < total,
            None => fetched >= u64::from(limit),
        };

        Ok(PageResult {
            markets,
            has_more,
            next_cursor: has_more.then_some(Cursor::Offset(seen)),
            total_count: raw.count,
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
    async fn test_fetch_page_reports_progress_against_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/questions/"))
            .and(query_param("offset", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 14,
                "results": [
                    {
                        "id": 12345,
                        "title": "Will fusion reach breakeven by 2030?",
                        "type": "binary",
                        "community_prediction": 0.34,
                        "active_state": "OPEN",
                        "close_time": "2030-01-01T00:00:00Z"
                    },
                    {
                        "id": 12346,
                        "title": "What year will X happen?",
                        "type": "numeric"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let fetcher = MetaculusFetcher::new().with_base_url(server.uri());
        let page = fetcher
            .fetch_page(Some(Cursor::Offset(10)), 2)
            .await
            .unwrap();

        assert_eq!(page.markets.len(), 2);
        assert_eq!(page.markets[0].yes_price, Some(dec!(0.34)));
        assert_eq!(page.markets[0].currency, "POINTS");
        assert!(page.markets[1].yes_price.is_none());
        // 12 of 14 seen.
        assert!(page.has_more);
        assert_eq!(page.next_cursor, Some(Cursor::Offset(12)));
        assert_eq!(page.total_count, Some(14));
    }

    #[tokio::test]
    async fn test_fetch_page_final_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/questions/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 3,
                "results": [
                    { "id": 3, "title": "last", "type": "binary", "community_prediction": 0.5 }
                ]
            })))
            .mount(&server)
            .await;

        let fetcher = MetaculusFetcher::new().with_base_url(server.uri());
        let page = fetcher
            .fetch_page(Some(Cursor::Offset(2)), 2)
            .await
            .unwrap();
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }
}
