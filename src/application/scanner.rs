//! Candidate Scanner
//!
//! Pulls pairs from the market feed and keeps the liquid movers we don't
//! already hold. Read-only: never touches the position book.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use super::bounded;
use crate::domain::{PairFilter, PairSnapshot};
use crate::ports::{FeedError, MarketFeed};

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub min_volume_usd: Decimal,
    /// Percent units, compared against `price_change_5m_pct`
    pub min_momentum_pct: Decimal,
    pub filter: PairFilter,
    /// Upper bound on candidates returned per scan
    pub max_candidates: usize,
    /// Never candidates: the base asset and the quote assets it trades against
    pub excluded_mints: HashSet<String>,
    pub call_timeout: Duration,
}

pub struct CandidateScanner {
    feed: Arc<dyn MarketFeed>,
    config: ScannerConfig,
}

impl CandidateScanner {
    pub fn new(feed: Arc<dyn MarketFeed>, config: ScannerConfig) -> Self {
        Self { feed, config }
    }

    /// Query the feed and return candidates, best first.
    ///
    /// `held` holds token addresses already open or reserved. Feed failures
    /// yield an empty list; the next scan retries.
    pub async fn scan(&self, held: &HashSet<String>) -> Vec<PairSnapshot> {
        let pairs = match bounded(
            self.config.call_timeout,
            self.feed.get_pairs(&self.config.filter),
            FeedError::Timeout,
        )
        .await
        {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::warn!("Scan skipped, feed unavailable: {}", e);
                return Vec::new();
            }
        };

        let total = pairs.len();
        let mut candidates = rank_candidates(pairs, held, &self.config);
        candidates.truncate(self.config.max_candidates);

        tracing::debug!(
            "Scan: {} pairs from feed, {} candidates after filtering",
            total,
            candidates.len()
        );
        candidates
    }
}

/// Apply the filter chain and order by volume, then momentum, both descending.
///
/// Checks run in a fixed order and stop at the first failure: excluded
/// mint, volume, momentum, already held.
pub fn rank_candidates(
    pairs: Vec<PairSnapshot>,
    held: &HashSet<String>,
    config: &ScannerConfig,
) -> Vec<PairSnapshot> {
    let mut candidates: Vec<PairSnapshot> = pairs
        .into_iter()
        .filter(|p| !config.excluded_mints.contains(&p.token_address))
        .filter(|p| p.volume_5m_usd >= config.min_volume_usd)
        .filter(|p| p.price_change_5m_pct >= config.min_momentum_pct)
        .filter(|p| !held.contains(&p.token_address))
        .collect();

    candidates.sort_by(|a, b| {
        b.volume_5m_usd
            .cmp(&a.volume_5m_usd)
            .then(b.price_change_5m_pct.cmp(&a.price_change_5m_pct))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::FakeFeed;
    use rust_decimal_macros::dec;

    fn config() -> ScannerConfig {
        ScannerConfig {
            min_volume_usd: dec!(50000),
            min_momentum_pct: dec!(2),
            filter: PairFilter::default(),
            max_candidates: 10,
            excluded_mints: ["USDC".to_string()].into_iter().collect(),
            call_timeout: Duration::from_secs(1),
        }
    }

    fn pair(token: &str, volume: Decimal, momentum: Decimal) -> PairSnapshot {
        PairSnapshot::new(token, format!("pair-{}", token), token, dec!(1))
            .with_quote_symbol("SOL")
            .with_volume_5m(volume)
            .with_momentum_5m(momentum)
    }

    #[test]
    fn test_filters_volume_momentum_and_held() {
        let pairs = vec![
            pair("LOWVOL", dec!(49999), dec!(10)),
            pair("FLAT", dec!(90000), dec!(1.9)),
            pair("HELD", dec!(90000), dec!(5)),
            pair("GOOD", dec!(50000), dec!(2)),
        ];
        let held: HashSet<String> = ["HELD".to_string()].into_iter().collect();

        let result = rank_candidates(pairs, &held, &config());
        let tokens: Vec<_> = result.iter().map(|p| p.token_address.as_str()).collect();
        assert_eq!(tokens, vec!["GOOD"]);
    }

    #[test]
    fn test_base_mint_is_never_a_candidate() {
        let pairs = vec![pair("USDC", dec!(900000), dec!(12)), pair("GOOD", dec!(60000), dec!(3))];
        let result = rank_candidates(pairs, &HashSet::new(), &config());
        let tokens: Vec<_> = result.iter().map(|p| p.token_address.as_str()).collect();
        assert_eq!(tokens, vec!["GOOD"]);
    }

    #[test]
    fn test_orders_by_volume_then_momentum() {
        let pairs = vec![
            pair("A", dec!(60000), dec!(9)),
            pair("B", dec!(80000), dec!(3)),
            pair("C", dec!(80000), dec!(4)),
        ];
        let result = rank_candidates(pairs, &HashSet::new(), &config());
        let tokens: Vec<_> = result.iter().map(|p| p.token_address.as_str()).collect();
        assert_eq!(tokens, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_scan_truncates_and_tolerates_feed_failure() {
        let feed = FakeFeed::new()
            .with_pair(pair("A", dec!(60000), dec!(9)))
            .with_pair(pair("B", dec!(70000), dec!(9)));
        let mut cfg = config();
        cfg.max_candidates = 1;
        let scanner = CandidateScanner::new(Arc::new(feed.clone()), cfg);

        let result = scanner.scan(&HashSet::new()).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].token_address, "B");

        feed.set_failing(true);
        assert!(scanner.scan(&HashSet::new()).await.is_empty());
    }
}
