//! Limitless Exchange fetcher.
//!
//! Page-number pagination; the API reports `totalMarketsCount` so
//! completion is detected against the running total rather than a short
//! page.

use crate::util::{decimal_from_str, parse_decimal, parse_rfc3339};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{MarketOutcome, MarketStatus, Platform, UnifiedMarket};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

pub const LIMITLESS_API_URL: &str = "https://api.limitless.exchange";

pub struct LimitlessFetcher {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarketsResponse {
    #[serde(default)]
    markets: Vec<RawMarket>,
    total_markets_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarket {
    address: Option<String>,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    /// Yes probability as a percentage number or string.
    #[serde(default)]
    prices: Vec<serde_json::Value>,
    volume_formatted: Option<String>,
    liquidity_formatted: Option<String>,
    deadline: Option<String>,
    expired: Option<bool>,
    winning_outcome_index: Option<u32>,
}

impl RawMarket {
    fn to_unified(&self) -> Option<UnifiedMarket> {
        let external_id = self.address.clone()?;
        let title = self.title.clone()?;

        // Limitless quotes binary markets as [yes%, no%].
        let yes_pct = self.prices.first().and_then(parse_decimal);
        let no_pct = self.prices.get(1).and_then(parse_decimal);
        let hundred = Decimal::from(100);
        let yes_price = yes_pct.map(|p| p / hundred);
        let no_price = no_pct.map(|p| p / hundred);

        let outcomes = [("Yes", yes_pct), ("No", no_pct)]
            .into_iter()
            .enumerate()
            .filter_map(|(i, (name, pct))| {
                Some(MarketOutcome {
                    id: format!("{external_id}-{i}"),
                    name: name.to_string(),
                    probability: pct?,
                    odds: None,
                })
            })
            .collect();

        let status = match (self.winning_outcome_index, self.expired) {
            (Some(_), _) => MarketStatus::Resolved,
            (None, Some(true)) => MarketStatus::Closed,
            _ => MarketStatus::Open,
        };
        let winning_outcome = self.winning_outcome_index.map(|i| {
            if i == 0 { "Yes" } else { "No" }.to_string()
        });

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Limitless, &external_id),
            platform: Platform::Limitless,
            external_id,
            title,
            description: self.description.clone(),
            category: self.category.clone(),
            outcomes,
            yes_price,
            no_price,
            volume: decimal_from_str(self.volume_formatted.as_deref()),
            volume_24h: None,
            liquidity: decimal_from_str(self.liquidity_formatted.as_deref()),
            closes_at: parse_rfc3339(self.deadline.as_deref()),
            expires_at: parse_rfc3339(self.deadline.as_deref()),
            resolved_at: None,
            winning_outcome,
            status,
            chain: Some("base".to_string()),
            currency: "USD".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

impl LimitlessFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: LIMITLESS_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl Default for LimitlessFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for LimitlessFetcher {
    fn platform(&self) -> Platform {
        Platform::Limitless
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> Result<PageResult, FetchError> {
        let page = match cursor {
            Some(Cursor::Page(p)) => p,
            None => 1,
            Some(other) => {
                return Err(FetchError::Configuration(format!(
                    "limitless expects page cursor, got {other:?}"
                )))
            }
        };

        let url = format!(
            "{}/markets/active?page={}&limit={}",
            self.base_url, page, limit
        );
        tracing::debug!(page, limit, "GET {url}");

        let response = self.http.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            return Err(FetchError::rate_limited(crate::util::retry_after_ms(&response)));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }

        let raw: RawMarketsResponse = response.json().await?;
        let fetched = raw.markets.len() as u64;
        let markets: Vec<UnifiedMarket> =
            raw.markets.iter().filter_map(RawMarket::to_unified).collect();

        // Completion against the server-reported total when available,
        // otherwise a short page ends the loop.
        let seen = (page - 1) * u64::from(limit) + fetched;
        let has_more = match raw.total_markets_count {
            Some(total) => seen < total,
            None => fetched >= u64::from(limit),
        };

        Ok(PageResult {
            markets,
            has_more,
            next_cursor: has_more.then_some(Cursor::Page(page + 1)),
            total_count: raw.total_markets_count,
        })
    }
}
