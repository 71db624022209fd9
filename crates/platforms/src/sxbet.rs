//! SX Bet fetcher.
//!
//! `pageNum`/`pageSize` pagination for markets, plus per-bettor trade
//! aggregates that back trader enrichment.

use crate::util::{decimal_from_str, parse_decimal};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{MarketOutcome, MarketStatus, Platform, TraderStats, UnifiedMarket};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

pub const SXBET_API_URL: &str = "https://api.sx.bet";

pub struct SxBetFetcher {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RawResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarketsPage {
    #[serde(default)]
    markets: Vec<RawMarket>,
    count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarket {
    market_hash: Option<String>,
    outcome_one_name: Option<String>,
    outcome_two_name: Option<String>,
    teams_versus: Option<String>,
    sport_label: Option<String>,
    league_label: Option<String>,
    /// Implied probability of outcome one, string in [0, 1].
    outcome_one_probability: Option<serde_json::Value>,
    game_time: Option<i64>,
    status: Option<String>,
    reported_winner: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBettor {
    address: Option<String>,
    total_bets: Option<u64>,
    settled_wins: Option<u64>,
    settled_losses: Option<u64>,
    total_volume: Option<String>,
    net_profit: Option<String>,
}

impl RawMarket {
    fn to_unified(&self) -> Option<UnifiedMarket> {
        let external_id = self.market_hash.clone()?;
        let title = self
            .teams_versus
            .clone()
            .or_else(|| self.outcome_one_name.clone())?;

        let p_one = self
            .outcome_one_probability
            .as_ref()
            .and_then(parse_decimal);
        let p_two = p_one.map(|p| Decimal::ONE - p);

        let outcomes = [
            (self.outcome_one_name.as_deref(), p_one),
            (self.outcome_two_name.as_deref(), p_two),
        ]
        .into_iter()
        .enumerate()
        .filter_map(|(i, (name, prob))| {
            Some(MarketOutcome {
                id: format!("{external_id}-{i}"),
                name: name.unwrap_or(if i == 0 { "Outcome 1" } else { "Outcome 2" }).to_string(),
                probability: prob? * Decimal::from(100),
                odds: None,
            })
        })
        .collect();

        let status = match self.status.as_deref() {
            Some("ACTIVE") => MarketStatus::Open,
            Some("REPORTED") | Some("SETTLED") => MarketStatus::Resolved,
            _ => MarketStatus::Closed,
        };
        let winning_outcome = self.reported_winner.and_then(|w| match w {
            1 => self.outcome_one_name.clone(),
            2 => self.outcome_two_name.clone(),
            _ => None,
        });

        let game_time: Option<DateTime<Utc>> =
            self.game_time.and_then(|t| DateTime::from_timestamp(t, 0));

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::SxBet, &external_id),
            platform: Platform::SxBet,
            external_id,
            title,
            description: self.league_label.clone(),
            category: self.sport_label.clone(),
            outcomes,
            yes_price: p_one,
            no_price: p_two,
            volume: None,
            volume_24h: None,
            liquidity: None,
            closes_at: game_time,
            expires_at: game_time,
            resolved_at: None,
            winning_outcome,
            status,
            chain: Some("sx".to_string()),
            currency: "USDC".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

impl SxBetFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            base_url: SXBET_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn bettor_to_stats(raw: &RawBettor) -> Option<TraderStats> {
        let address = raw.address.as_deref()?;
        let wins = raw.settled_wins.unwrap_or(0);
        let losses = raw.settled_losses.unwrap_or(0);
        let mut stats = TraderStats::new(address, Platform::SxBet);
        stats.total_bets = raw.total_bets.unwrap_or(wins + losses);
        stats.wins = wins;
        stats.losses = losses;
        stats.volume = decimal_from_str(raw.total_volume.as_deref())
            .and_then(|d| d.to_f64())
            .unwrap_or(0.0);
        stats.pnl = decimal_from_str(raw.net_profit.as_deref())
            .and_then(|d| d.to_f64())
            .unwrap_or(0.0);
        stats.currency = "USDC".to_string();
        Some(stats)
    }
}

impl Default for SxBetFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for SxBetFetcher {
    fn platform(&self) -> Platform {
        Platform::SxBet
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> Result<PageResult, FetchError> {
        let page_num = match cursor {
            Some(Cursor::Page(p)) => p,
            None => 1,
            Some(other) => {
                return Err(FetchError::Configuration(format!(
                    "sxbet expects page cursor, got {other:?}"
                )))
            }
        };

        let url = format!(
            "{}/markets/active?pageNum={}&pageSize={}",
            self.base_url, page_num, limit
        );
        tracing::debug!(page_num, limit, "GET {url}");

        let response = self.http.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            return Err(FetchError::rate_limited(crate::util::retry_after_ms(&response)));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }

        let raw: RawResponse<RawMarketsPage> = response.json().await?;
        let fetched = raw.data.markets.len() as u64;
        let markets: Vec<UnifiedMarket> =
            raw.data.markets.iter().filter_map(RawMarket::to_unified).collect();

        let seen = (page_num - 1) * u64::from(limit) + fetched;
        let has_more = match raw.data.count {
            Some(total) => seen < total,
            None => fetched >= u64::from(limit),
        };

        Ok(PageResult {
            markets,
            has_more,
            next_cursor: has_more.then_some(Cursor::Page(page_num + 1)),
            total_count: raw.data.count,
        })
    }

    fn supports_trader_stats(&self) -> bool {
        true
    }

    async fn fetch_trader_stats(&self, limit: u32) -> Result<Vec<TraderStats>, FetchError> {
        let url = format!("{}/bettors/leaderboard?pageSize={}", self.base_url, limit);
        let response = self.http.get(&url).send().await?;
        if response.status().as_u16() == 429 {
            return Err(FetchError::rate_limited(crate::util::retry_after_ms(&response)));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }

        let raw: RawResponse<Vec<RawBettor>> = response.json().await?;
        Ok(raw.data.iter().filter_map(Self::bettor_to_stats).collect())
    }

    async fn fetch_trader_detail(&self, address: &str) -> Result<Option<TraderStats>, FetchError> {
        let url = format!("{}/bettors/{}", self.base_url, address);
        let response = self.http.get(&url).send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if response.status().as_u16() == 429 {
            return Err(FetchError::rate_limited(crate::util::retry_after_ms(&response)));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }

        let raw: RawResponse<RawBettor> = response.json().await?;
        Ok(Self::bettor_to_stats(&raw.data))
    }
}
