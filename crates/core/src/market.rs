//! Unified prediction-market model.
//!
//! Every platform adapter normalizes its upstream schema into
//! [`UnifiedMarket`] so the rest of the system never sees upstream shapes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A supported prediction-market platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Polymarket,
    Limitless,
    Manifold,
    Kalshi,
    Azuro,
    SxBet,
    Metaculus,
    Overtime,
    PancakeSwap,
    Drift,
    Seer,
}

impl Platform {
    /// All platforms, in registration order.
    #[must_use]
    pub const fn all() -> &'static [Platform] {
        &[
            Platform::Polymarket,
            Platform::Limitless,
            Platform::Manifold,
            Platform::Kalshi,
            Platform::Azuro,
            Platform::SxBet,
            Platform::Metaculus,
            Platform::Overtime,
            Platform::PancakeSwap,
            Platform::Drift,
            Platform::Seer,
        ]
    }

    /// Stable lowercase slug, used in market IDs and cache keys.
    #[must_use]
    pub const fn slug(&self) -> &'static str {
        match self {
            Platform::Polymarket => "polymarket",
            Platform::Limitless => "limitless",
            Platform::Manifold => "manifold",
            Platform::Kalshi => "kalshi",
            Platform::Azuro => "azuro",
            Platform::SxBet => "sxbet",
            Platform::Metaculus => "metaculus",
            Platform::Overtime => "overtime",
            Platform::PancakeSwap => "pancakeswap",
            Platform::Drift => "drift",
            Platform::Seer => "seer",
        }
    }

    /// Parses a slug back into a platform.
    #[must_use]
    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::all()
            .iter()
            .find(|p| p.slug().eq_ignore_ascii_case(slug))
            .copied()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Lifecycle status of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    Closed,
    Resolved,
    Cancelled,
}

/// One outcome of a market with its current pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOutcome {
    /// Outcome identifier (upstream-native where available).
    pub id: String,
    /// Display name ("Yes", "No", team name, ...).
    pub name: String,
    /// Implied probability, 0–100. Outcomes are not required to sum to
    /// exactly 100 because upstreams round independently.
    pub probability: Decimal,
    /// Decimal odds, if the upstream quotes odds rather than prices.
    pub odds: Option<Decimal>,
}

/// A normalized prediction-market snapshot from any platform.
///
/// `id` is platform-qualified (`{platform}-{external_id}`) and stable across
/// refetches, so persistence upserts replace rather than duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedMarket {
    /// Stable platform-qualified ID.
    pub id: String,
    /// Source platform.
    pub platform: Platform,
    /// Upstream-native identifier.
    pub external_id: String,
    /// Market question/title.
    pub title: String,
    /// Optional long description.
    pub description: Option<String>,
    /// Category/tag, upstream vocabulary.
    pub category: Option<String>,
    /// Ordered outcomes with pricing.
    pub outcomes: Vec<MarketOutcome>,
    /// Yes price for binary markets, 0–1.
    pub yes_price: Option<Decimal>,
    /// No price for binary markets, 0–1.
    pub no_price: Option<Decimal>,
    /// Lifetime volume in platform-native units (see `currency`).
    pub volume: Option<Decimal>,
    /// 24-hour volume in platform-native units.
    pub volume_24h: Option<Decimal>,
    /// Current liquidity in platform-native units.
    pub liquidity: Option<Decimal>,
    /// When the market stops accepting trades.
    pub closes_at: Option<DateTime<Utc>>,
    /// When the underlying event expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the market resolved, if it has.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Name of the winning outcome, once resolved.
    pub winning_outcome: Option<String>,
    /// Lifecycle status.
    pub status: MarketStatus,
    /// Chain the market settles on, if on-chain.
    pub chain: Option<String>,
    /// Currency unit for volume/liquidity figures ("USD", "BNB", "USDC", ...).
    pub currency: String,
    /// Capture time of this snapshot.
    pub fetched_at: DateTime<Utc>,
    /// Platform-specific extras, opaque to the core.
    pub metadata: Option<serde_json::Value>,
}

impl UnifiedMarket {
    /// Builds the stable platform-qualified ID.
    #[must_use]
    pub fn qualified_id(platform: Platform, external_id: &str) -> String {
        format!("{}-{}", platform.slug(), external_id)
    }

    /// Returns true if this is a binary market with both prices present.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.yes_price.is_some() && self.no_price.is_some()
    }

    /// Checks the binary complementarity invariant `yes + no ≈ 1`.
    ///
    /// Upstream rounding means exact equality cannot be required; the
    /// tolerance absorbs one cent of drift on each side.
    #[must_use]
    pub fn prices_consistent(&self) -> bool {
        match (self.yes_price, self.no_price) {
            (Some(yes), Some(no)) => {
                let sum = yes + no;
                sum >= Decimal::new(98, 2) && sum <= Decimal::new(102, 2)
            }
            _ => true,
        }
    }

    /// Returns true if the market is still accepting trades.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == MarketStatus::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn binary_market(yes: Decimal, no: Decimal) -> UnifiedMarket {
        UnifiedMarket {
            id: UnifiedMarket::qualified_id(Platform::Polymarket, "0xabc"),
            platform: Platform::Polymarket,
            external_id: "0xabc".to_string(),
            title: "Will BTC close above 100k?".to_string(),
            description: None,
            category: Some("crypto".to_string()),
            outcomes: vec![],
            yes_price: Some(yes),
            no_price: Some(no),
            volume: Some(dec!(1000)),
            volume_24h: None,
            liquidity: None,
            closes_at: None,
            expires_at: None,
            resolved_at: None,
            winning_outcome: None,
            status: MarketStatus::Open,
            chain: Some("polygon".to_string()),
            currency: "USD".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn test_qualified_id_is_stable() {
        assert_eq!(
            UnifiedMarket::qualified_id(Platform::Polymarket, "0xabc"),
            "polymarket-0xabc"
        );
        assert_eq!(
            UnifiedMarket::qualified_id(Platform::SxBet, "123"),
            "sxbet-123"
        );
    }

    #[test]
    fn test_platform_slug_round_trip() {
        for platform in Platform::all() {
            assert_eq!(Platform::from_slug(platform.slug()), Some(*platform));
        }
        assert_eq!(Platform::from_slug("POLYMARKET"), Some(Platform::Polymarket));
        assert_eq!(Platform::from_slug("unknown"), None);
    }

    #[test]
    fn test_prices_consistent_within_tolerance() {
        assert!(binary_market(dec!(0.53), dec!(0.47)).prices_consistent());
        assert!(binary_market(dec!(0.53), dec!(0.48)).prices_consistent());
        assert!(!binary_market(dec!(0.53), dec!(0.30)).prices_consistent());
    }

    #[test]
    fn test_prices_consistent_vacuous_for_non_binary() {
        let mut market = binary_market(dec!(0.5), dec!(0.5));
        market.yes_price = None;
        market.no_price = None;
        assert!(market.prices_consistent());
        assert!(!market.is_binary());
    }
}
