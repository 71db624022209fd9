//! Polymarket Gamma API fetcher.
//!
//! Offset-paginated REST. The Gamma API returns JSON arrays in which the
//! `outcomes` and `outcomePrices` fields are themselves *stringified* JSON
//! arrays, so each market is parsed leniently and skipped on failure rather
//! than failing the page.

use crate::util::{decimal_from_str, parse_rfc3339, probability_from_price};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{
    estimate_win_rate_from_rank, MarketOutcome, MarketStatus, Platform, TraderStats, UnifiedMarket,
};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

/// Gamma API base URL.
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Polymarket market and leaderboard fetcher.
pub struct PolymarketFetcher {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGammaMarket {
    id: Option<String>,
    question: Option<String>,
    description: Option<String>,
    category: Option<String>,
    /// Stringified JSON array of outcome names.
    outcomes: Option<String>,
    /// Stringified JSON array of outcome prices.
    outcome_prices: Option<String>,
    volume: Option<String>,
    #[serde(rename = "volume24hr")]
    volume_24hr: Option<f64>,
    liquidity: Option<String>,
    end_date: Option<String>,
    closed_time: Option<String>,
    active: Option<bool>,
    closed: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLeaderboardEntry {
    proxy_wallet: Option<String>,
    amount: Option<f64>,
    pnl: Option<f64>,
}

impl RawGammaMarket {
    /// Splits the stringified outcome/price arrays into parallel vectors.
    fn parse_outcomes(&self) -> (Vec<String>, Vec<Decimal>) {
        let names: Vec<String> = self
            .outcomes
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        let prices: Vec<Decimal> = self
            .outcome_prices
            .as_deref()
            .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
            .map(|raw| {
                raw.iter()
                    .filter_map(|p| decimal_from_str(Some(p)))
                    .collect()
            })
            .unwrap_or_default();
        (names, prices)
    }

    fn to_unified(&self) -> Option<UnifiedMarket> {
        let external_id = self.id.clone()?;
        let title = self.question.clone()?;

        let (names, prices) = self.parse_outcomes();
        let outcomes: Vec<MarketOutcome> = names
            .iter()
            .zip(prices.iter())
            .enumerate()
            .map(|(i, (name, price))| MarketOutcome {
                id: format!("{external_id}-{i}"),
                name: name.clone(),
                probability: probability_from_price(*price),
                odds: None,
            })
            .collect();

        // Binary Yes/No markets expose complementary prices directly.
        let is_binary = names.len() == 2 && names[0].eq_ignore_ascii_case("yes");
        let yes_price = is_binary.then(|| prices.first().copied()).flatten();
        let no_price = is_binary.then(|| prices.get(1).copied()).flatten();

        let resolved_at = parse_rfc3339(self.closed_time.as_deref());
        let status = if resolved_at.is_some() {
            MarketStatus::Resolved
        } else if self.closed == Some(true) {
            MarketStatus::Closed
        } else if self.active == Some(false) {
            MarketStatus::Closed
        } else {
            MarketStatus::Open
        };

        let winning_outcome = (status == MarketStatus::Resolved)
            .then(|| {
                outcomes
                    .iter()
                    .find(|o| o.probability >= Decimal::from(99))
                    .map(|o| o.name.clone())
            })
            .flatten();

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Polymarket, &external_id),
            platform: Platform::Polymarket,
            external_id,
            title,
            description: self.description.clone(),
            category: self.category.clone(),
            outcomes,
            yes_price,
            no_price,
            volume: decimal_from_str(self.volume.as_deref()),
            volume_24h: self
                .volume_24hr
                .and_then(|v| Decimal::try_from(v).ok()),
            liquidity: decimal_from_str(self.liquidity.as_deref()),
            closes_at: parse_rfc3339(self.end_date.as_deref()),
            expires_at: parse_rfc3339(self.end_date.as_deref()),
            resolved_at,
            winning_outcome,
            status,
            chain: Some("polygon".to_string()),
            currency: "USD".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

impl PolymarketFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: GAMMA_API_URL.to_string(),
        }
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

impl Default for PolymarketFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for PolymarketFetcher {
    fn platform(&self) -> Platform {
        Platform::Polymarket
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> Result<PageResult, FetchError> {
        let offset = match cursor {
            Some(Cursor::Offset(o)) => o,
            None => 0,
            Some(other) => {
                return Err(FetchError::Configuration(format!(
                    "polymarket expects offset cursor, got {other:?}"
                )))
            }
        };

        let url = format!(
            "{}/markets?limit={}&offset={}&order=volume&ascending=false",
            self.base_url, limit, offset
        );
        tracing::debug!(offset, limit, "GET {url}");

        let response = self.http.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            let retry_after = crate::util::retry_after_ms(&response);
            return Err(FetchError::rate_limited(retry_after));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::api(status, text));
        }

        let raw: Vec<RawGammaMarket> = response.json().await?;
        let fetched = raw.len();
        let markets: Vec<UnifiedMarket> = raw.iter().filter_map(RawGammaMarket::to_unified).collect();

        if markets.len() < fetched {
            tracing::debug!(
                skipped = fetched - markets.len(),
                "skipped malformed gamma records"
            );
        }

        Ok(PageResult {
            markets,
            has_more: fetched as u32 >= limit,
            next_cursor: Some(Cursor::Offset(offset + fetched as u64)),
            total_count: None,
        })
    }

    fn supports_trader_stats(&self) -> bool {
        true
    }

    /// Leaderboard volumes with rank-estimated win rates. Polymarket's
    /// public leaderboard exposes volume and pnl but not bet-level
    /// settlement, so the win rate is the tagged heuristic.
    async fn fetch_trader_stats(&self, limit: u32) -> Result<Vec<TraderStats>, FetchError> {
        let url = format!("{}/leaderboard?window=all&limit={}", self.base_url, limit);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }

        let raw: Vec<RawLeaderboardEntry> = response.json().await?;
        let stats = raw
            .into_iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let address = entry.proxy_wallet?;
                let volume = entry.amount.unwrap_or(0.0);
                let estimate = estimate_win_rate_from_rank(i as u64 + 1);

                // Synthesize settled counts from the estimated rate over a
                // nominal 100-bet sample so downstream scoring has inputs.
                let total_bets = 100u64;
                let wins = (estimate.win_rate / 100.0 * total_bets as f64).round() as u64;

                let mut stats = TraderStats::new(&address, Platform::Polymarket);
                stats.total_bets = total_bets;
                stats.wins = wins;
                stats.losses = total_bets - wins;
                stats.volume = volume;
                stats.pnl = entry.pnl.unwrap_or(0.0);
                stats.estimated = estimate.estimated;
                Some(stats)
            })
            .collect();

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gamma_market_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "question": "Will BTC go up?",
            "category": "crypto",
            "outcomes": "[\"Yes\", \"No\"]",
            "outcomePrices": "[\"0.53\", \"0.47\"]",
            "volume": "125000.50",
            "volume24hr": 4300.25,
            "liquidity": "10000.00",
            "endDate": "2026-02-01T00:00:00Z",
            "active": true,
            "closed": false
        })
    }

    #[tokio::test]
    async fn test_fetch_page_normalizes_stringified_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                gamma_market_json("0xabc"),
                gamma_market_json("0xdef"),
            ])))
            .mount(&server)
            .await;

        let fetcher = PolymarketFetcher::new().with_base_url(server.uri());
        let page = fetcher.fetch_page(None, 100).await.unwrap();

        assert_eq!(page.markets.len(), 2);
        let market = &page.markets[0];
        assert_eq!(market.id, "polymarket-0xabc");
        assert_eq!(market.yes_price, Some(dec!(0.53)));
        assert_eq!(market.no_price, Some(dec!(0.47)));
        assert_eq!(market.outcomes.len(), 2);
        assert_eq!(market.outcomes[0].probability, dec!(53));
        assert_eq!(market.volume, Some(dec!(125000.50)));
        assert_eq!(market.status, MarketStatus::Open);
        assert!(market.prices_consistent());

        // Short page means no more data.
        assert!(!page.has_more);
        assert_eq!(page.next_cursor, Some(Cursor::Offset(2)));
    }

    #[tokio::test]
    async fn test_fetch_page_skips_malformed_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                gamma_market_json("0xabc"),
                { "outcomes": "not even json" },
            ])))
            .mount(&server)
            .await;

        let fetcher = PolymarketFetcher::new().with_base_url(server.uri());
        let page = fetcher.fetch_page(None, 100).await.unwrap();

        // The record missing id/question is skipped, not fatal.
        assert_eq!(page.markets.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_page_full_page_advances_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                gamma_market_json("a"),
                gamma_market_json("b"),
            ])))
            .mount(&server)
            .await;

        let fetcher = PolymarketFetcher::new().with_base_url(server.uri());
        let page = fetcher
            .fetch_page(Some(Cursor::Offset(10)), 2)
            .await
            .unwrap();

        assert!(page.has_more);
        assert_eq!(page.next_cursor, Some(Cursor::Offset(12)));
    }

    #[tokio::test]
    async fn test_fetch_page_maps_429_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let fetcher = PolymarketFetcher::new().with_base_url(server.uri());
        let err = fetcher.fetch_page(None, 100).await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::RateLimited {
                retry_after_ms: 7_000
            }
        ));
    }

    #[tokio::test]
    async fn test_fetch_page_maps_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let fetcher = PolymarketFetcher::new().with_base_url(server.uri());
        let err = fetcher.fetch_page(None, 100).await.unwrap_err();
        assert!(matches!(err, FetchError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_trader_stats_are_estimated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leaderboard"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "proxyWallet": "0xAAA", "amount": 50000.0, "pnl": 1200.0 },
                { "proxyWallet": "0xBBB", "amount": 30000.0, "pnl": -50.0 },
            ])))
            .mount(&server)
            .await;

        let fetcher = PolymarketFetcher::new().with_base_url(server.uri());
        let stats = fetcher.fetch_trader_stats(10).await.unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].address, "0xaaa");
        assert!(stats[0].estimated);
        // Rank 1 estimate is 84.9% over a nominal 100-bet sample.
        assert_eq!(stats[0].wins, 85);
        assert!(stats[1].wins < stats[0].wins);
    }
}
