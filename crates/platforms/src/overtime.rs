//! Overtime sports markets fetcher.
//!
//! The upstream returns the full market set per sport per call with no
//! pagination, so one "page" fans out across the sport list and merges.
//! The upstream rate-limits aggressively; this platform carries the
//! lowest request budget of all adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{MarketOutcome, MarketStatus, Platform, UnifiedMarket};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

pub const OVERTIME_API_URL: &str = "https://api.overtime.io/overtime-v2/networks/10";

const SPORTS: &[&str] = &["Soccer", "Basketball", "Baseball", "Hockey", "Tennis"];

pub struct OvertimeFetcher {
    http: Client,
    base_url: String,
    sports: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarket {
    game_id: Option<String>,
    home_team: Option<String>,
    away_team: Option<String>,
    sport: Option<String>,
    league_name: Option<String>,
    maturity_date: Option<String>,
    is_open: Option<bool>,
    is_resolved: Option<bool>,
    #[serde(default)]
    odds: Vec<RawOdds>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOdds {
    /// Implied probability in [0, 1].
    normalized_implied: Option<f64>,
    decimal: Option<f64>,
}

impl RawMarket {
    fn to_unified(&self) -> Option<UnifiedMarket> {
        let external_id = self.game_id.clone()?;
        let home = self.home_team.as_deref()?;
        let away = self.away_team.as_deref()?;
        let title = format!("{home} vs {away}");

        let outcomes: Vec<MarketOutcome> = self
            .odds
            .iter()
            .enumerate()
            .filter_map(|(i, o)| {
                let implied = o.normalized_implied?;
                let probability = Decimal::try_from(implied * 100.0).ok()?;
                let name = match i {
                    0 => home.to_string(),
                    1 => away.to_string(),
                    _ => "Draw".to_string(),
                };
                Some(MarketOutcome {
                    id: format!("{external_id}-{i}"),
                    name,
                    probability,
                    odds: o.decimal.and_then(|d| Decimal::try_from(d).ok()),
                })
            })
            .collect();

        let status = if self.is_resolved == Some(true) {
            MarketStatus::Resolved
        } else if self.is_open == Some(true) {
            MarketStatus::Open
        } else {
            MarketStatus::Closed
        };

        let maturity: Option<DateTime<Utc>> = self
            .maturity_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Overtime, &external_id),
            platform: Platform::Overtime,
            external_id,
            title,
            description: self.league_name.clone(),
            category: self.sport.clone(),
            outcomes,
            yes_price: None,
            no_price: None,
            volume: None,
            volume_24h: None,
            liquidity: None,
            closes_at: maturity,
            expires_at: maturity,
            resolved_at: None,
            winning_outcome: None,
            status,
            chain: Some("optimism".to_string()),
            currency: "USD".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

impl OvertimeFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            base_url: OVERTIME_API_URL.to_string(),
            sports: SPORTS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_sports(mut self, sports: Vec<String>) -> Self {
        self.sports = sports;
        self
    }

    async fn fetch_sport(&self, sport: &str) -> Result<Vec<UnifiedMarket>, FetchError> {
        let url = format!("{}/markets?sport={}", self.base_url, sport);
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

impl Default for OvertimeFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for OvertimeFetcher {
    fn platform(&self) -> Platform {
        Platform::Overtime
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        _limit: u32,
    ) -> Result<PageResult, FetchError> {
        if cursor.is_some() {
            // The whole result set arrives in one call.
            return Ok(PageResult {
                markets: Vec::new(),
                has_more: false,
                next_cursor: None,
                total_count: None,
            });
        }

        let futures = self.sports.iter().map(|s| self.fetch_sport(s));
        let results = join_all(futures).await;

        let mut markets = Vec::new();
        let mut last_error = None;
        let mut successes = 0usize;
        for (result, sport) in results.into_iter().zip(&self.sports) {
            match result {
                Ok(chunk) => {
                    successes += 1;
                    markets.extend(chunk);
                }
                Err(e) => {
                    tracing::warn!(sport = %sport, error = %e, "sport fetch failed");
                    last_error = Some(e);
                }
            }
        }
        if successes == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let total = markets.len() as u64;
        Ok(PageResult {
            markets,
            has_more: false,
            next_cursor: None,
            total_count: Some(total),
        })
    }
}
