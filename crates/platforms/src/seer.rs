//! Seer (Gnosis) fetcher.
//!
//! The public API has a history of outages, so transient failures fall
//! back to a curated static market list rather than emptying the slot.

use crate::util::{decimal_from_str, parse_rfc3339};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{MarketOutcome, MarketStatus, Platform, UnifiedMarket};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

pub const SEER_API_URL: &str = "https://app.seer.pm/api";

pub struct SeerFetcher {
    http: Client,
    base_url: String,
    /// Serve the curated list when the API fails instead of erroring.
    use_fallback: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarket {
    id: Option<String>,
    market_name: Option<String>,
    #[serde(default)]
    outcomes: Vec<String>,
    #[serde(default)]
    odds: Vec<serde_json::Value>,
    volume: Option<String>,
    opening_ts: Option<String>,
    resolved: Option<bool>,
}

impl RawMarket {
    fn to_unified(&self) -> Option<UnifiedMarket> {
        let external_id = self.id.clone()?;
        let title = self.market_name.clone()?;

        let outcomes: Vec<MarketOutcome> = self
            .outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                let probability = self.odds.get(i).and_then(crate::util::parse_decimal)?;
                Some(MarketOutcome {
                    id: format!("{external_id}-{i}"),
                    name: name.clone(),
                    probability,
                    odds: None,
                })
            })
            .collect();

        let (yes_price, no_price) = match outcomes.as_slice() {
            [a, b] => (
                Some(a.probability / Decimal::from(100)),
                Some(b.probability / Decimal::from(100)),
            ),
            _ => (None, None),
        };

        let status = if self.resolved == Some(true) {
            MarketStatus::Resolved
        } else {
            MarketStatus::Open
        };

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Seer, &external_id),
            platform: Platform::Seer,
            external_id,
            title,
            description: None,
            category: None,
            outcomes,
            yes_price,
            no_price,
            volume: decimal_from_str(self.volume.as_deref()),
            volume_24h: None,
            liquidity: None,
            closes_at: parse_rfc3339(self.opening_ts.as_deref()),
            expires_at: parse_rfc3339(self.opening_ts.as_deref()),
            resolved_at: None,
            winning_outcome: None,
            status,
            chain: Some("gnosis".to_string()),
            currency: "sDAI".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

/// Curated markets served when the API is down. Kept deliberately small;
/// these are long-lived markets that change slowly.
fn curated_fallback() -> Vec<UnifiedMarket> {
    let entries: &[(&str, &str)] = &[
        ("seer-static-eth-pos", "Will Ethereum remain proof-of-stake through 2026?"),
        ("seer-static-gnosis-chain", "Will Gnosis Chain process over 1M daily transactions in 2026?"),
    ];
    entries
        .iter()
        .map(|(id, title)| UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Seer, id),
            platform: Platform::Seer,
            external_id: (*id).to_string(),
            title: (*title).to_string(),
            description: None,
            category: None,
            outcomes: Vec::new(),
            yes_price: None,
            no_price: None,
            volume: None,
            volume_24h: None,
            liquidity: None,
            closes_at: None,
            expires_at: None,
            resolved_at: None,
            winning_outcome: None,
            status: MarketStatus::Open,
            chain: Some("gnosis".to_string()),
            currency: "sDAI".to_string(),
            fetched_at: Utc::now(),
            metadata: Some(serde_json::json!({ "curated": true })),
        })
        .collect()
}

impl SeerFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: SEER_API_URL.to_string(),
            use_fallback: true,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn without_fallback(mut self) -> Self {
        self.use_fallback = false;
        self
    }

    async fn fetch_live(&self) -> Result<Vec<UnifiedMarket>, FetchError> {
        let url = format!("{}/markets", self.base_url);
        let response = self.http.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            return Err(FetchError::rate_limited(crate::util::retry_after_ms(&response)));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }
        let raw: Vec<RawMarket> = response.json().await?;
        Ok(raw.iter().filter_map(RawMarket::to_unified).collect())
    }
}

impl Default for SeerFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for SeerFetcher {
    fn platform(&self) -> Platform {
        Platform::Seer
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        _limit: u32,
    ) -> Result<PageResult, FetchError> {
        if cursor.is_some() {
            return Ok(PageResult {
                markets: Vec::new(),
                has_more: false,
                next_cursor: None,
                total_count: None,
            });
        }

        let markets = match self.fetch_live().await {
            Ok(markets) => markets,
            Err(e) if self.use_fallback => {
                tracing::warn!(error = %e, "api unavailable, serving curated list");
                curated_fallback()
            }
            Err(e) => return Err(e),
        };

        let total = markets.len() as u64;
        Ok(PageResult {
            markets,
            has_more: false,
            next_cursor: None,
            total_count: Some(total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_page_live() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": "0xs1",
                    "marketName": "Will DAI keep its peg through 2026?",
                    "outcomes": ["Yes", "No"],
                    "odds": [91.0, 9.0],
                    "volume": "44000"
                }
            ])))
            .mount(&server)
            .await;

        let fetcher = SeerFetcher::new().with_base_url(server.uri());
        let page = fetcher.fetch_page(None, 100).await.unwrap();
        assert_eq!(page.markets.len(), 1);
        assert_eq!(page.markets[0].yes_price, Some(dec!(0.91)));
        assert_eq!(page.markets[0].currency, "sDAI");
    }

    #[tokio::test]
    async fn test_fetch_page_falls_back_when_api_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = SeerFetcher::new().with_base_url(server.uri());
        let page = fetcher.fetch_page(None, 100).await.unwrap();
        assert!(!page.markets.is_empty());
        assert!(page.markets.iter().all(|m| {
            m.metadata
                .as_ref()
                .is_some_and(|meta| meta["curated"] == serde_json::json!(true))
        }));
    }

    #[tokio::test]
    async fn test_fetch_page_without_fallback_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = SeerFetcher::new()
            .with_base_url(server.uri())
            .without_fallback();
        assert!(fetcher.fetch_page(None, 100).await.is_err());
    }
}
