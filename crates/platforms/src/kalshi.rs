//! Kalshi fetcher.
//!
//! Opaque-cursor pagination over the public markets endpoint. Prices are
//! quoted in cents (0–100) and normalized to the unit interval.

use crate::util::parse_rfc3339;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{MarketOutcome, MarketStatus, Platform, UnifiedMarket};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

pub const KALSHI_API_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";

pub struct KalshiFetcher {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RawMarketsResponse {
    #[serde(default)]
    markets: Vec<RawMarket>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMarket {
    ticker: Option<String>,
    title: Option<String>,
    subtitle: Option<String>,
    category: Option<String>,
    status: Option<String>,
    /// Last traded yes price in cents.
    last_price: Option<i64>,
    yes_bid: Option<i64>,
    yes_ask: Option<i64>,
    volume: Option<i64>,
    volume_24h: Option<i64>,
    liquidity: Option<i64>,
    close_time: Option<String>,
    expiration_time: Option<String>,
    result: Option<String>,
}

impl RawMarket {
    fn yes_price_cents(&self) -> Option<i64> {
        // Prefer the last trade, fall back to the bid/ask midpoint.
        self.last_price.filter(|p| *p > 0).or_else(|| {
            match (self.yes_bid, self.yes_ask) {
                (Some(bid), Some(ask)) if bid + ask > 0 => Some((bid + ask) / 2),
                _ => None,
            }
        })
    }

    fn to_unified(&self) -> Option<UnifiedMarket> {
        let external_id = self.ticker.clone()?;
        let title = self.title.clone()?;

        let yes_price = self
            .yes_price_cents()
            .map(|cents| Decimal::new(cents, 2));
        let no_price = yes_price.map(|p| Decimal::ONE - p);

        let outcomes = yes_price
            .map(|yes| {
                vec![
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
                ]
            })
            .unwrap_or_default();

        let status = match self.status.as_deref() {
            Some("active") | Some("open") => MarketStatus::Open,
            Some("settled") | Some("finalized") => MarketStatus::Resolved,
            _ => MarketStatus::Closed,
        };
        let winning_outcome = self.result.as_deref().and_then(|r| match r {
            "yes" => Some("Yes".to_string()),
            "no" => Some("No".to_string()),
            _ => None,
        });

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Kalshi, &external_id),
            platform: Platform::Kalshi,
            external_id,
            title,
            description: self.subtitle.clone(),
            category: self.category.clone(),
            outcomes,
            yes_price,
            no_price,
            volume: self.volume.map(Decimal::from),
            volume_24h: self.volume_24h.map(Decimal::from),
            liquidity: self.liquidity.map(|cents| Decimal::new(cents, 2)),
            closes_at: parse_rfc3339(self.close_time.as_deref()),
            expires_at: parse_rfc3339(self.expiration_time.as_deref()),
            resolved_at: None,
            winning_outcome,
            status,
            chain: None,
            currency: "USD".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

impl KalshiFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: KALSHI_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl Default for KalshiFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for KalshiFetcher {
    fn platform(&self) -> Platform {
        Platform::Kalshi
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> Result<PageResult, FetchError> {
        let mut url = format!("{}/markets?limit={}&status=open", self.base_url, limit);
        match cursor {
            Some(Cursor::Token(token)) => url.push_str(&format!("&cursor={token}")),
            None => {}
            Some(other) => {
                return Err(FetchError::Configuration(format!(
                    "kalshi expects token cursor, got {other:?}"
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

        let raw: RawMarketsResponse = response.json().await?;
        let markets: Vec<UnifiedMarket> =
            raw.markets.iter().filter_map(RawMarket::to_unified).collect();

        // An empty cursor string means the final page.
        let next = raw.cursor.filter(|c| !c.is_empty());
        let has_more = next.is_some() && !raw.markets.is_empty();

        Ok(PageResult {
            markets,
            has_more,
            next_cursor: next.map(Cursor::Token),
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
    async fn test_fetch_page_normalizes_cents_and_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "markets": [
                    {
                        "ticker": "KXBTC-26FEB02-B100000",
                        "title": "BTC above 100k on Feb 2?",
                        "status": "active",
                        "last_price": 62,
                        "volume": 15000,
                        "close_time": "2026-02-02T17:00:00Z"
                    },
                    {
                        "ticker": "KXETH-NOPRICES",
                        "title": "No trades yet",
                        "status": "active",
                        "yes_bid": 40,
                        "yes_ask": 44
                    }
                ],
                "cursor": "opaque-token-123"
            })))
            .mount(&server)
            .await;

        let fetcher = KalshiFetcher::new().with_base_url(server.uri());
        let page = fetcher.fetch_page(None, 100).await.unwrap();

        assert_eq!(page.markets.len(), 2);
        assert_eq!(page.markets[0].yes_price, Some(dec!(0.62)));
        assert_eq!(page.markets[0].no_price, Some(dec!(0.38)));
        assert_eq!(page.markets[1].yes_price, Some(dec!(0.42)));
        assert!(page.has_more);
        assert_eq!(
            page.next_cursor,
            Some(Cursor::Token("opaque-token-123".into()))
        );
    }

    #[tokio::test]
    async fn test_fetch_page_empty_cursor_ends_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(query_param("cursor", "tail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "markets": [],
                "cursor": ""
            })))
            .mount(&server)
            .await;

        let fetcher = KalshiFetcher::new().with_base_url(server.uri());
        let page = fetcher
            .fetch_page(Some(Cursor::Token("tail".into())), 100)
            .await
            .unwrap();

        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }
}
