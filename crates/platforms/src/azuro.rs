//! Azuro protocol fetcher.
//!
//! Azuro runs one subgraph per chain; a page is fetched from every chain
//! with the same `skip` offset and the results are merged client-side.
//! Decimal odds from the subgraph are inverted into implied probabilities.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{MarketOutcome, MarketStatus, Platform, UnifiedMarket};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

pub const AZURO_POLYGON_SUBGRAPH: &str =
    "https://thegraph.azuro.org/subgraphs/name/azuro-protocol/azuro-api-polygon-v3";
pub const AZURO_GNOSIS_SUBGRAPH: &str =
    "https://thegraph.azuro.org/subgraphs/name/azuro-protocol/azuro-api-gnosis-v3";

const CONDITIONS_QUERY: &str = r#"
query Conditions($first: Int!, $skip: Int!) {
  conditions(first: $first, skip: $skip, where: { status: Created }, orderBy: turnover, orderDirection: desc) {
    conditionId
    turnover
    game {
      title
      startsAt
      sport { name }
    }
    outcomes {
      outcomeId
      currentOdds
    }
  }
}
"#;

pub struct AzuroFetcher {
    http: Client,
    /// (chain slug, subgraph url) pairs queried on every page.
    endpoints: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ConditionsData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ConditionsData {
    #[serde(default)]
    conditions: Vec<RawCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCondition {
    condition_id: Option<String>,
    turnover: Option<String>,
    game: Option<RawGame>,
    #[serde(default)]
    outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGame {
    title: Option<String>,
    /// Unix seconds as a string.
    starts_at: Option<String>,
    sport: Option<RawSport>,
}

#[derive(Debug, Deserialize)]
struct RawSport {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutcome {
    outcome_id: Option<String>,
    current_odds: Option<String>,
}

impl RawCondition {
    fn to_unified(&self, chain: &str) -> Option<UnifiedMarket> {
        let condition_id = self.condition_id.clone()?;
        let game = self.game.as_ref()?;
        let title = game.title.clone()?;

        // conditionIds repeat across chains, so the chain is part of the id.
        let external_id = format!("{chain}-{condition_id}");

        let outcomes: Vec<MarketOutcome> = self
            .outcomes
            .iter()
            .filter_map(|o| {
                let id = o.outcome_id.clone()?;
                let odds: Decimal = o.current_odds.as_deref()?.trim().parse().ok()?;
                if odds <= Decimal::ONE {
                    return None;
                }
                Some(MarketOutcome {
                    id: format!("{external_id}-{id}"),
                    name: id,
                    probability: Decimal::from(100) / odds,
                    odds: Some(odds),
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

        let starts_at: Option<DateTime<Utc>> = game
            .starts_at
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Azuro, &external_id),
            platform: Platform::Azuro,
            external_id,
            title,
            description: None,
            category: game.sport.as_ref().and_then(|s| s.name.clone()),
            outcomes,
            yes_price,
            no_price,
            volume: self
                .turnover
                .as_deref()
                .and_then(|t| t.trim().parse().ok()),
            volume_24h: None,
            liquidity: None,
            closes_at: starts_at,
            expires_at: starts_at,
            resolved_at: None,
            winning_outcome: None,
            status: MarketStatus::Open,
            chain: Some(chain.to_string()),
            currency: "USDT".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

impl AzuroFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            endpoints: vec![
                ("polygon".to_string(), AZURO_POLYGON_SUBGRAPH.to_string()),
                ("gnosis".to_string(), AZURO_GNOSIS_SUBGRAPH.to_string()),
            ],
        }
    }

    /// Replaces the chain set, mainly for tests.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<(String, String)>) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn fetch_chain(
        &self,
        chain: &str,
        url: &str,
        skip: u64,
        limit: u32,
    ) -> Result<Vec<UnifiedMarket>, FetchError> {
        let body = serde_json::json!({
            "query": CONDITIONS_QUERY,
            "variables": { "first": limit, "skip": skip },
        });
        let response = self.http.post(url).json(&body).send().await?;
        if response.status().as_u16() == 429 {
            return Err(FetchError::rate_limited(crate::util::retry_after_ms(&response)));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }

        let parsed: GraphQlResponse = response.json().await?;
        if let Some(err) = parsed.errors.first() {
            return Err(FetchError::Malformed(format!(
                "subgraph error: {}",
                err.message
            )));
        }

        Ok(parsed
            .data
            .map(|d| d.conditions)
            .unwrap_or_default()
            .iter()
            .filter_map(|c| c.to_unified(chain))
            .collect())
    }
}

impl Default for AzuroFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for AzuroFetcher {
    fn platform(&self) -> Platform {
        Platform::Azuro
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> Result<PageResult, FetchError> {
        let skip = match cursor {
            Some(Cursor::Offset(n)) => n,
            None => 0,
            Some(other) => {
                return Err(FetchError::Configuration(format!(
                    "azuro expects offset cursor, got {other:?}"
                )))
            }
        };
        tracing::debug!(skip, limit, chains = self.endpoints.len(), "querying subgraphs");

        let futures = self
            .endpoints
            .iter()
            .map(|(chain, url)| self.fetch_chain(chain, url, skip, limit));
        let results = join_all(futures).await;

        // A chain that errors contributes nothing; only fail the page when
        // every chain failed.
        let mut markets = Vec::new();
        let mut any_full_page = false;
        let mut last_error = None;
        let mut successes = 0usize;
        for (result, (chain, _)) in results.into_iter().zip(&self.endpoints) {
            match result {
                Ok(chunk) => {
                    successes += 1;
                    any_full_page |= chunk.len() as u32 >= limit;
                    markets.extend(chunk);
                }
                Err(e) => {
                    tracing::warn!(chain = %chain, error = %e, "subgraph query failed");
                    last_error = Some(e);
                }
            }
        }
        if successes == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(PageResult {
            markets,
            has_more: any_full_page,
            next_cursor: any_full_page.then_some(Cursor::Offset(skip + u64::from(limit))),
            total_count: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn condition_body(id: &str, odds: [&str; 2]) -> serde_json::Value {
        serde_json::json!({
            "conditionId": id,
            "turnover": "2500.50",
            "game": {
                "title": "Team A vs Team B",
                "startsAt": "1790000000",
                "sport": { "name": "Football" }
            },
            "outcomes": [
                { "outcomeId": "29", "currentOdds": odds[0] },
                { "outcomeId": "30", "currentOdds": odds[1] }
            ]
        })
    }

    #[tokio::test]
    async fn test_fetch_page_merges_chains() {
        let polygon = MockServer::start().await;
        let gnosis = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "conditions": [condition_body("100", ["2.0", "2.0"])] }
            })))
            .mount(&polygon)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "conditions": [condition_body("100", ["4.0", "1.333"])] }
            })))
            .mount(&gnosis)
            .await;

        let fetcher = AzuroFetcher::new().with_endpoints(vec![
            ("polygon".to_string(), polygon.uri()),
            ("gnosis".to_string(), gnosis.uri()),
        ]);
        let page = fetcher.fetch_page(None, 10).await.unwrap();

        assert_eq!(page.markets.len(), 2);
        // Same conditionId on both chains stays distinct.
        assert_eq!(page.markets[0].external_id, "polygon-100");
        assert_eq!(page.markets[1].external_id, "gnosis-100");
        assert_eq!(page.markets[0].outcomes[0].probability, dec!(50));
        assert_eq!(page.markets[1].outcomes[0].probability, dec!(25));
        // Short pages everywhere means done.
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_fetch_page_survives_one_failed_chain() {
        let polygon = MockServer::start().await;
        let gnosis = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "conditions": [condition_body("7", ["1.5", "3.0"])] }
            })))
            .mount(&polygon)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&gnosis)
            .await;

        let fetcher = AzuroFetcher::new().with_endpoints(vec![
            ("polygon".to_string(), polygon.uri()),
            ("gnosis".to_string(), gnosis.uri()),
        ]);
        let page = fetcher.fetch_page(None, 10).await.unwrap();
        assert_eq!(page.markets.len(), 1);
        assert_eq!(page.markets[0].chain.as_deref(), Some("polygon"));
    }

    #[tokio::test]
    async fn test_fetch_page_errors_when_all_chains_fail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let fetcher =
            AzuroFetcher::new().with_endpoints(vec![("polygon".to_string(), server.uri())]);
        let err = fetcher.fetch_page(None, 10).await.unwrap_err();
        assert!(matches!(err, FetchError::Api { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_full_page_on_one_chain_advances_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "conditions": [
                    condition_body("1", ["2.0", "2.0"]),
                    condition_body("2", ["2.0", "2.0"])
                ] }
            })))
            .mount(&server)
            .await;

        let fetcher =
            AzuroFetcher::new().with_endpoints(vec![("polygon".to_string(), server.uri())]);
        let page = fetcher
            .fetch_page(Some(Cursor::Offset(4)), 2)
            .await
            .unwrap();
        assert!(page.has_more);
        assert_eq!(page.next_cursor, Some(Cursor::Offset(6)));
    }
}
