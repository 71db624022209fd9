//! PancakeSwap Prediction fetcher.
//!
//! No indexer API: rounds are read straight off the BSC contract with
//! JSON-RPC `eth_call` and the fixed-width return slots are decoded by
//! hand. Only a small window of recent rounds is surfaced per fetch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use truthbounty_core::{MarketOutcome, MarketStatus, Platform, UnifiedMarket};
use truthbounty_fetcher::{Cursor, FetchError, PageResult, PlatformFetcher};

pub const BSC_RPC_URL: &str = "https://bsc-dataseed.binance.org";
pub const PREDICTION_CONTRACT: &str = "0x18b2a687610328590bc8f2e5fedde3b582a49cda";

/// currentEpoch()
const SELECTOR_CURRENT_EPOCH: &str = "0x76671808";
/// rounds(uint256)
const SELECTOR_ROUNDS: &str = "0x8c65c81f";

/// rounds() returns 14 fixed-width slots.
const ROUND_SLOTS: usize = 14;
const DEFAULT_ROUND_WINDOW: u64 = 5;

pub struct PancakeSwapFetcher {
    http: Client,
    rpc_url: String,
    contract: String,
    round_window: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Debug)]
struct Round {
    epoch: u128,
    lock_timestamp: u128,
    close_timestamp: u128,
    lock_price: u128,
    close_price: u128,
    total_amount: u128,
    bull_amount: u128,
    bear_amount: u128,
    oracle_called: bool,
}

/// Reads slot `i` of an ABI-encoded return blob as a u128. Slots are 32
/// bytes; the high 16 bytes are zero for every field we care about.
fn slot_u128(data: &str, i: usize) -> Result<u128, FetchError> {
    let hex = data.strip_prefix("0x").unwrap_or(data);
    let start = i * 64;
    let slot = hex
        .get(start..start + 64)
        .ok_or_else(|| FetchError::Malformed(format!("return data truncated at slot {i}")))?;
    u128::from_str_radix(&slot[32..], 16)
        .map_err(|e| FetchError::Malformed(format!("slot {i} is not hex: {e}")))
}

fn decode_round(data: &str) -> Result<Round, FetchError> {
    let hex = data.strip_prefix("0x").unwrap_or(data);
    if hex.len() < ROUND_SLOTS * 64 {
        return Err(FetchError::Malformed(format!(
            "round blob has {} hex chars, expected {}",
            hex.len(),
            ROUND_SLOTS * 64
        )));
    }
    Ok(Round {
        epoch: slot_u128(data, 0)?,
        lock_timestamp: slot_u128(data, 2)?,
        close_timestamp: slot_u128(data, 3)?,
        lock_price: slot_u128(data, 4)?,
        close_price: slot_u128(data, 5)?,
        total_amount: slot_u128(data, 8)?,
        bull_amount: slot_u128(data, 9)?,
        bear_amount: slot_u128(data, 10)?,
        oracle_called: slot_u128(data, 13)? != 0,
    })
}

fn wei_to_bnb(wei: u128) -> Option<Decimal> {
    i128::try_from(wei)
        .ok()
        .map(|w| Decimal::from_i128_with_scale(w, 18))
}

impl Round {
    fn to_unified(&self) -> Option<UnifiedMarket> {
        if self.total_amount == 0 {
            return None;
        }
        let external_id = self.epoch.to_string();
        let total = wei_to_bnb(self.total_amount)?;
        let bull = wei_to_bnb(self.bull_amount)?;
        let bear = wei_to_bnb(self.bear_amount)?;

        let yes_price = bull / total;
        let no_price = bear / total;
        let outcomes = vec![
            MarketOutcome {
                id: format!("{external_id}-bull"),
                name: "Bull".to_string(),
                probability: yes_price * Decimal::from(100),
                odds: None,
            },
            MarketOutcome {
                id: format!("{external_id}-bear"),
                name: "Bear".to_string(),
                probability: no_price * Decimal::from(100),
                odds: None,
            },
        ];

        let now = Utc::now().timestamp() as u128;
        let status = if self.oracle_called {
            MarketStatus::Resolved
        } else if self.lock_timestamp > 0 && now >= self.lock_timestamp {
            MarketStatus::Closed
        } else {
            MarketStatus::Open
        };
        let winning_outcome = self.oracle_called.then(|| {
            if self.close_price > self.lock_price {
                "Bull".to_string()
            } else {
                "Bear".to_string()
            }
        });

        let ts = |t: u128| -> Option<DateTime<Utc>> {
            i64::try_from(t).ok().and_then(|t| DateTime::from_timestamp(t, 0))
        };

        Some(UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::PancakeSwap, &external_id),
            platform: Platform::PancakeSwap,
            external_id,
            title: format!("BNB/USD round #{}", self.epoch),
            description: None,
            category: Some("price-prediction".to_string()),
            outcomes,
            yes_price: Some(yes_price),
            no_price: Some(no_price),
            volume: Some(total),
            volume_24h: None,
            liquidity: None,
            closes_at: ts(self.lock_timestamp),
            expires_at: ts(self.close_timestamp),
            resolved_at: self.oracle_called.then(|| ts(self.close_timestamp)).flatten(),
            winning_outcome,
            status,
            chain: Some("bsc".to_string()),
            currency: "BNB".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        })
    }
}

impl PancakeSwapFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            rpc_url: BSC_RPC_URL.to_string(),
            contract: PREDICTION_CONTRACT.to_string(),
            round_window: DEFAULT_ROUND_WINDOW,
        }
    }

    #[must_use]
    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    #[must_use]
    pub fn with_round_window(mut self, window: u64) -> Self {
        self.round_window = window;
        self
    }

    async fn eth_call(&self, data: String) -> Result<String, FetchError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": self.contract, "data": data }, "latest"],
        });
        let response = self.http.post(&self.rpc_url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }
        let rpc: RpcResponse = response.json().await?;
        if let Some(err) = rpc.error {
            return Err(FetchError::Api {
                status: 200,
                message: format!("rpc error: {}", err.message),
            });
        }
        rpc.result
            .ok_or_else(|| FetchError::Malformed("rpc response missing result".to_string()))
    }

    async fn current_epoch(&self) -> Result<u128, FetchError> {
        let data = self.eth_call(SELECTOR_CURRENT_EPOCH.to_string()).await?;
        slot_u128(&data, 0)
    }

    async fn fetch_round(&self, epoch: u128) -> Result<Round, FetchError> {
        let data = format!("{SELECTOR_ROUNDS}{epoch:064x}");
        let blob = self.eth_call(data).await?;
        decode_round(&blob)
    }
}

impl Default for PancakeSwapFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformFetcher for PancakeSwapFetcher {
    fn platform(&self) -> Platform {
        Platform::PancakeSwap
    }

    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        _limit: u32,
    ) -> Result<PageResult, FetchError> {
        if cursor.is_some() {
            // Fixed window, single page.
            return Ok(PageResult {
                markets: Vec::new(),
                has_more: false,
                next_cursor: None,
                total_count: None,
            });
        }

        let current = self.current_epoch().await?;
        tracing::debug!(current, window = self.round_window, "reading recent rounds");

        // The current epoch is still accepting bets; walk back from the
        // one before it.
        let epochs: Vec<u128> = (1..=u128::from(self.round_window))
            .filter_map(|back| current.checked_sub(back))
            .filter(|e| *e > 0)
            .collect();

        let results = join_all(epochs.iter().map(|e| self.fetch_round(*e))).await;
        let mut markets = Vec::new();
        for (result, epoch) in results.into_iter().zip(&epochs) {
            match result {
                Ok(round) => markets.extend(round.to_unified()),
                Err(e) => {
                    tracing::warn!(epoch, error = %e, "round read failed");
                }
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
