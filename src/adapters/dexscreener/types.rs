//! DexScreener response shapes
//!
//! Only the fields the bot reads are modelled. Numeric fields arrive as
//! JSON floats except `priceUsd`, which is a string.

use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::PairSnapshot;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    pub chain_id: String,
    #[serde(default)]
    pub dex_id: String,
    pub pair_address: String,
    pub base_token: DexToken,
    pub quote_token: DexToken,
    #[serde(default)]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub liquidity: Option<DexLiquidity>,
    #[serde(default)]
    pub volume: Option<DexWindows>,
    #[serde(default)]
    pub price_change: Option<DexWindows>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexToken {
    pub address: String,
    #[serde(default)]
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexLiquidity {
    #[serde(default)]
    pub usd: Option<f64>,
}

/// Rolling windows reported for volume and price change
#[derive(Debug, Clone, Deserialize)]
pub struct DexWindows {
    #[serde(default)]
    pub m5: Option<f64>,
    #[serde(default)]
    pub h1: Option<f64>,
    #[serde(default)]
    pub h24: Option<f64>,
}

/// Body of the search, tokens and pairs endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DexPairsResponse {
    #[serde(default)]
    pub pairs: Option<Vec<DexPair>>,
}

impl DexPairsResponse {
    pub fn into_pairs(self) -> Vec<DexPair> {
        self.pairs.unwrap_or_default()
    }
}

impl DexPair {
    /// Parsed USD price; `None` when absent, unparsable or not positive
    pub fn price(&self) -> Option<Decimal> {
        self.price_usd
            .as_deref()
            .and_then(|raw| Decimal::from_str(raw.trim()).ok())
            .filter(|price| *price > Decimal::ZERO)
    }

    /// Normalize into a snapshot. Missing numeric fields become zero; a record
    /// without a usable price is dropped.
    pub fn to_snapshot(&self) -> Option<PairSnapshot> {
        let price = self.price()?;
        let volume_5m = self.volume.as_ref().and_then(|v| v.m5);
        let volume_24h = self.volume.as_ref().and_then(|v| v.h24);
        let change_5m = self.price_change.as_ref().and_then(|c| c.m5);
        let liquidity = self.liquidity.as_ref().and_then(|l| l.usd);

        Some(
            PairSnapshot::new(
                self.base_token.address.clone(),
                self.pair_address.clone(),
                self.base_token.symbol.clone(),
                price,
            )
            .with_quote_symbol(self.quote_token.symbol.clone())
            .with_volume_5m(decimal_or_zero(volume_5m))
            .with_volume_24h(decimal_or_zero(volume_24h))
            .with_momentum_5m(decimal_or_zero(change_5m))
            .with_liquidity(decimal_or_zero(liquidity)),
        )
    }
}

fn decimal_or_zero(value: Option<f64>) -> Decimal {
    value
        .filter(|v| v.is_finite())
        .and_then(Decimal::from_f64)
        .unwrap_or(Decimal::ZERO)
}
