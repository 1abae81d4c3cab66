//! Pair Snapshot
//!
//! Point-in-time view of a trading pair as reported by the market feed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One feed record for a DEX pair. Volumes and prices are in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSnapshot {
    pub token_address: String,
    pub pair_address: String,
    pub symbol: String,
    /// Symbol of the quote side of the pool (SOL, USDC, ...)
    pub quote_symbol: String,
    pub price_usd: Decimal,
    pub volume_24h_usd: Decimal,
    pub volume_5m_usd: Decimal,
    /// Percent units: 2.5 means +2.5% over five minutes
    pub price_change_5m_pct: Decimal,
    pub liquidity_usd: Decimal,
}

impl PairSnapshot {
    pub fn new(
        token_address: impl Into<String>,
        pair_address: impl Into<String>,
        symbol: impl Into<String>,
        price_usd: Decimal,
    ) -> Self {
        Self {
            token_address: token_address.into(),
            pair_address: pair_address.into(),
            symbol: symbol.into(),
            quote_symbol: String::new(),
            price_usd,
            volume_24h_usd: Decimal::ZERO,
            volume_5m_usd: Decimal::ZERO,
            price_change_5m_pct: Decimal::ZERO,
            liquidity_usd: Decimal::ZERO,
        }
    }

    pub fn with_quote_symbol(mut self, quote_symbol: impl Into<String>) -> Self {
        self.quote_symbol = quote_symbol.into();
        self
    }

    pub fn with_volume_5m(mut self, volume_usd: Decimal) -> Self {
        self.volume_5m_usd = volume_usd;
        self
    }

    pub fn with_volume_24h(mut self, volume_usd: Decimal) -> Self {
        self.volume_24h_usd = volume_usd;
        self
    }

    pub fn with_momentum_5m(mut self, change_pct: Decimal) -> Self {
        self.price_change_5m_pct = change_pct;
        self
    }

    pub fn with_liquidity(mut self, liquidity_usd: Decimal) -> Self {
        self.liquidity_usd = liquidity_usd;
        self
    }

    /// Case-insensitive match on token address or symbol
    pub fn matches(&self, token_or_symbol: &str) -> bool {
        self.token_address == token_or_symbol || self.symbol.eq_ignore_ascii_case(token_or_symbol)
    }
}

/// Criteria the feed applies before returning pairs
#[derive(Debug, Clone, PartialEq)]
pub struct PairFilter {
    /// Accepted quote-side symbols; empty accepts all
    pub quote_symbols: Vec<String>,
}

impl PairFilter {
    pub fn accepts_quote(&self, quote_symbol: &str) -> bool {
        self.quote_symbols.is_empty()
            || self
                .quote_symbols
                .iter()
                .any(|q| q.eq_ignore_ascii_case(quote_symbol))
    }
}

impl Default for PairFilter {
    fn default() -> Self {
        Self {
            quote_symbols: vec!["SOL".to_string(), "USDC".to_string(), "USDT".to_string()],
        }
    }
}
