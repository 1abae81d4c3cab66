use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{PairFilter, PairSnapshot};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Request(String),
    #[error("Feed returned malformed data: {0}")]
    Malformed(String),
    #[error("Feed rate limited")]
    RateLimited,
    #[error("Feed call timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of pair snapshots and spot prices.
///
/// Data may be stale or partial. A missing price is `Ok(None)`, not an error.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Current pairs passing the feed-side filter
    async fn get_pairs(&self, filter: &PairFilter) -> Result<Vec<PairSnapshot>, FeedError>;

    /// USD price of a pair
    async fn get_price(&self, pair_address: &str) -> Result<Option<Decimal>, FeedError>;

    /// All pairs that trade a given token
    async fn get_token_pairs(&self, token_address: &str) -> Result<Vec<PairSnapshot>, FeedError>;

    /// Pairs whose base symbol matches exactly (case-insensitive)
    async fn search_symbol(&self, symbol: &str) -> Result<Vec<PairSnapshot>, FeedError>;

    /// USD price of a token, taken from its most active pair
    async fn get_token_price(&self, token_address: &str) -> Result<Option<Decimal>, FeedError> {
        let pairs = self.get_token_pairs(token_address).await?;
        Ok(most_active(pairs)
            .map(|p| p.price_usd)
            .filter(|price| *price > Decimal::ZERO))
    }
}

/// Highest five-minute volume wins, liquidity breaks ties
pub fn most_active(pairs: Vec<PairSnapshot>) -> Option<PairSnapshot> {
    pairs.into_iter().max_by(|a, b| {
        a.volume_5m_usd
            .cmp(&b.volume_5m_usd)
            .then(a.liquidity_usd.cmp(&b.liquidity_usd))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_most_active_prefers_volume_then_liquidity() {
        let a = PairSnapshot::new("M", "A", "T", dec!(1)).with_volume_5m(dec!(10)).with_liquidity(dec!(5));
        let b = PairSnapshot::new("M", "B", "T", dec!(1)).with_volume_5m(dec!(10)).with_liquidity(dec!(9));
        let c = PairSnapshot::new("M", "C", "T", dec!(1)).with_volume_5m(dec!(3));

        let best = most_active(vec![a, b, c]).unwrap();
        assert_eq!(best.pair_address, "B");
        assert!(most_active(vec![]).is_none());
    }
}
