//! Drift fetcher.
//!
//! Drift's DLOB serves perpetual markets, not prediction markets; this
//! adapter derives synthetic binary "above oracle" markets from the mark
//! versus oracle price spread. There is no order book behind them and no
//! pagination.

use crate::util::decimal_from_str;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{MarketOutcome, MarketStatus, Platform, UnifiedMarket};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

pub const DRIFT_DLOB_URL: &str = "https://dlob.drift.trade";

pub struct DriftFetcher {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarketsResponse {
    #[serde(default)]
    markets: Vec<RawPerpMarket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPerpMarket {
    market_name: Option<String>,
    oracle_price: Option<String>,
    mark_price: Option<String>,
    base_volume_24h: Option<String>,
}

impl RawPerpMarket {
    /// Probability that the mark closes above the oracle, read off the
    /// current spread. Clamped away from 0 and 1 so the synthetic market
    /// always has two priced sides.
    fn above_probability(mark: Decimal, oracle: Decimal) -> Decimal {
        let half = Decimal::new(5, 1);
        if oracle <= Decimal::ZERO {
            return half;
        }
        // 1% of spread moves the probability by 0.25.
        let tilt = (mark - oracle) / oracle * Decimal::from(25);
        (half + tilt).clamp(Decimal::new(1, 2), Decimal::new(99, 2))
    }

    fn to_unified(&self) -> Option<UnifiedMarket> {
        let name = self.market_name.clone()?;
        let oracle = decimal_from_str(self.oracle_price.as_deref())?;
        if oracle <= Decimal::ZERO {
            return None;
        }
        let mark = decimal_from_str(self.mark_price.as_deref()).unwrap_or(oracle);

        let yes_price = Self::above_probability(mark, oracle);
        let no_price = Decimal::ONE - yes_price;
        let external_id = format!("{name}-above-oracle");

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Drift, &external_id),
            platform: Platform::Drift,
            external_id,
            title: format!("{name} above oracle price {oracle}?"),
            description: None,
            category: Some("perp-derived".to_string()),
            outcomes: vec![
                MarketOutcome {
                    id: format!("{name}-above"),
                    name: "Above".to_string(),
                    probability: yes_price * Decimal::from(100),
                    odds: None,
                },
                MarketOutcome {
                    id: format!("{name}-below"),
                    name: "Below".to_string(),
                    probability: no_price * Decimal::from(100),
                    odds: None,
                },
            ],
            yes_price: Some(yes_price),
            no_price: Some(no_price),
            volume: None,
            volume_24h: decimal_from_str(self.base_volume_24h.as_deref()),
            liquidity: None,
            closes_at: None,
            expires_at: None,
            resolved_at: None,
            winning_outcome: None,
            status: MarketStatus::Open,
            chain: Some("solana".to_string()),
            currency: "USDC".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

impl DriftFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: DRIFT_DLOB_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl Default for DriftFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for DriftFetcher {
    fn platform(&self) -> Platform {
        Platform::Drift
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

        let url = format!("{}/markets", self.base_url);
        tracing::debug!("GET {url}");

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
            raw.markets.iter().filter_map(RawPerpMarket::to_unified).collect();

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

    #[test]
    fn test_above_probability_tilts_with_spread() {
        // Mark at oracle: even odds.
        assert_eq!(
            RawPerpMarket::above_probability(dec!(100), dec!(100)),
            dec!(0.5)
        );
        // Mark 1% above oracle.
        assert_eq!(
            RawPerpMarket::above_probability(dec!(101), dec!(100)),
            dec!(0.75)
        );
        // Extreme spreads clamp inside (0, 1).
        assert_eq!(
            RawPerpMarket::above_probability(dec!(200), dec!(100)),
            dec!(0.99)
        );
        assert_eq!(
            RawPerpMarket::above_probability(dec!(1), dec!(100)),
            dec!(0.01)
        );
    }

    #[tokio::test]
    async fn test_fetch_page_synthesizes_binary_markets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "markets": [
                    {
                        "marketName": "SOL-PERP",
                        "oraclePrice": "150.00",
                        "markPrice": "151.50",
                        "baseVolume24h": "98000.5"
                    },
                    {
                        "marketName": "BROKEN-PERP",
                        "oraclePrice": "0"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let fetcher = DriftFetcher::new().with_base_url(server.uri());
        let page = fetcher.fetch_page(None, 100).await.unwrap();

        // Non-positive oracle prices are dropped.
        assert_eq!(page.markets.len(), 1);
        let market = &page.markets[0];
        assert_eq!(market.yes_price, Some(dec!(0.75)));
        assert_eq!(market.outcomes[0].name, "Above");
        assert_eq!(market.chain.as_deref(), Some("solana"));
        assert!(!page.has_more);
    }
}
