//! Spot price oracle.
//!
//! CoinGecko first, Binance when CoinGecko fails or returns a
//! non-positive price. Used to normalize chain-native volume buckets
//! (BNB, SOL) into USD before scoring.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use truthbounty_fetcher::FetchError;

pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";
pub const BINANCE_API_URL: &str = "https://api.binance.com/api/v3";

pub struct PriceOracle {
    http: Client,
    coingecko_url: String,
    binance_url: String,
}

#[derive(Debug, Deserialize)]
struct BinanceTicker {
    price: String,
}

/// CoinGecko keys prices by asset id, not ticker.
fn coingecko_id(ticker: &str) -> Option<&'static str> {
    match ticker.to_ascii_uppercase().as_str() {
        "BTC" => Some("bitcoin"),
        "ETH" => Some("ethereum"),
        "BNB" => Some("binancecoin"),
        "SOL" => Some("solana"),
        "MATIC" | "POL" => Some("polygon-ecosystem-token"),
        "XDAI" | "SDAI" => Some("dai"),
        _ => None,
    }
}

impl PriceOracle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            coingecko_url: COINGECKO_API_URL.to_string(),
            binance_url: BINANCE_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_urls(
        mut self,
        coingecko: impl Into<String>,
        binance: impl Into<String>,
    ) -> Self {
        self.coingecko_url = coingecko.into();
        self.binance_url = binance.into();
        self
    }

    /// USD spot price for a ticker, trying CoinGecko then Binance.
    pub async fn spot_price_usd(&self, ticker: &str) -> Result<Decimal, FetchError> {
        match self.from_coingecko(ticker).await {
            Ok(price) if price > Decimal::ZERO => return Ok(price),
            Ok(price) => {
                tracing::warn!(ticker, %price, "coingecko returned non-positive price");
            }
            Err(e) => {
                tracing::warn!(ticker, error = %e, "coingecko lookup failed");
            }
        }
        let price = self.from_binance(ticker).await?;
        if price <= Decimal::ZERO {
            return Err(FetchError::Malformed(format!(
                "non-positive price for {ticker}: {price}"
            )));
        }
        Ok(price)
    }

    async fn from_coingecko(&self, ticker: &str) -> Result<Decimal, FetchError> {
        let id = coingecko_id(ticker).ok_or_else(|| {
            FetchError::Configuration(format!("no coingecko id for {ticker}"))
        })?;
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.coingecko_url, id
        );
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }
        let body: HashMap<String, HashMap<String, f64>> = response.json().await?;
        body.get(id)
            .and_then(|prices| prices.get("usd"))
            .and_then(|p| Decimal::try_from(*p).ok())
            .ok_or_else(|| FetchError::Malformed(format!("no usd price for {id}")))
    }

    async fn from_binance(&self, ticker: &str) -> Result<Decimal, FetchError> {
        let symbol = format!("{}USDT", ticker.to_ascii_uppercase());
        let url = format!("{}/ticker/price?symbol={}", self.binance_url, symbol);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(FetchError::api(status, response.text().await.unwrap_or_default()));
        }
        let body: BinanceTicker = response.json().await?;
        body.price
            .trim()
            .parse()
            .map_err(|_| FetchError::Malformed(format!("unparseable price: {}", body.price)))
    }
}

impl Default for PriceOracle {
    fn default() -> Self {
        Self::new()
    }
}
