//! Paper trading executor
//!
//! Simulated wallet for dry runs. Fills are priced from the market feed with
//! a random slippage, and balances live in memory. Nothing touches the chain.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;

use crate::domain::BaseAsset;
use crate::ports::{BalanceError, BalanceQuery, MarketFeed, SwapError, SwapExecutor, SwapFill, SwapRequest};

pub struct PaperSwapExecutor {
    feed: Arc<dyn MarketFeed>,
    base: BaseAsset,
    balances: Mutex<HashMap<String, Decimal>>,
    /// Mints that cannot be sold, to exercise probe rejection
    sell_blocked: HashSet<String>,
    /// Overrides the random draw when set
    fixed_slippage_bps: Option<u16>,
    fills: AtomicU64,
}

impl PaperSwapExecutor {
    pub fn new(feed: Arc<dyn MarketFeed>, base: BaseAsset, starting_balance: Decimal) -> Self {
        let mut balances = HashMap::new();
        balances.insert(base.mint.clone(), starting_balance);
        Self {
            feed,
            base,
            balances: Mutex::new(balances),
            sell_blocked: HashSet::new(),
            fixed_slippage_bps: None,
            fills: AtomicU64::new(0),
        }
    }

    pub fn with_sell_blocked(mut self, mints: impl IntoIterator<Item = String>) -> Self {
        self.sell_blocked.extend(mints);
        self
    }

    pub fn with_fixed_slippage(mut self, bps: u16) -> Self {
        self.fixed_slippage_bps = Some(bps);
        self
    }

    pub fn balance_of(&self, mint: &str) -> Decimal {
        self.balances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mint)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    async fn usd_price(&self, mint: &str) -> Option<Decimal> {
        if mint == self.base.mint && self.base.usd_pegged {
            return Some(Decimal::ONE);
        }
        match self.feed.get_token_price(mint).await {
            Ok(Some(price)) if price > Decimal::ZERO => Some(price),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Paper price lookup for {} failed: {}", mint, e);
                None
            }
        }
    }

    fn slippage(&self, max_bps: u16) -> Decimal {
        let bps = self
            .fixed_slippage_bps
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..=max_bps));
        Decimal::from(bps) / Decimal::from(10_000)
    }
}

#[async_trait]
impl SwapExecutor for PaperSwapExecutor {
    async fn swap(&self, request: &SwapRequest) -> Result<SwapFill, SwapError> {
        if request.amount <= Decimal::ZERO {
            return Err(SwapError::InvalidAmount(request.amount.to_string()));
        }
        let available = self.balance_of(&request.input_mint);
        if available < request.amount {
            return Err(SwapError::InsufficientFunds {
                needed: request.amount,
                available,
            });
        }
        if self.sell_blocked.contains(&request.input_mint) {
            return Err(SwapError::Rejected(format!("transfer of {} blocked", request.input_mint)));
        }

        let no_route = |side: &str| SwapError::NoRoute {
            input: request.input_mint.clone(),
            output: request.output_mint.clone(),
            reason: format!("no {} price", side),
        };
        let price_in = self.usd_price(&request.input_mint).await.ok_or_else(|| no_route("input"))?;
        let price_out = self.usd_price(&request.output_mint).await.ok_or_else(|| no_route("output"))?;

        let gross = request.amount * price_in / price_out;
        let filled = gross * (Decimal::ONE - self.slippage(request.max_slippage_bps));
        if filled <= Decimal::ZERO {
            return Err(SwapError::NoFill);
        }

        {
            let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
            let input = balances.entry(request.input_mint.clone()).or_insert(Decimal::ZERO);
            // Re-checked under the lock; a concurrent swap may have spent it
            if *input < request.amount {
                return Err(SwapError::InsufficientFunds {
                    needed: request.amount,
                    available: *input,
                });
            }
            *input -= request.amount;
            *balances.entry(request.output_mint.clone()).or_insert(Decimal::ZERO) += filled;
        }

        let n = self.fills.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            "[PAPER] {} {} -> {} {}",
            request.amount,
            request.input_mint,
            filled,
            request.output_mint
        );
        Ok(SwapFill {
            filled_quantity: filled,
            signature: Some(format!("paper-{}", n)),
        })
    }
}

#[async_trait]
impl BalanceQuery for PaperSwapExecutor {
    async fn get_balance(&self, asset: &str) -> Result<Decimal, BalanceError> {
        Ok(self.balance_of(asset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PairSnapshot;
    use crate::ports::mocks::FakeFeed;
    use rust_decimal_macros::dec;

    fn paper(feed: &FakeFeed) -> PaperSwapExecutor {
        PaperSwapExecutor::new(Arc::new(feed.clone()), BaseAsset::usdc(), dec!(100)).with_fixed_slippage(0)
    }

    fn usdc() -> String {
        BaseAsset::usdc().mint
    }

    #[tokio::test]
    async fn test_buy_and_sell_at_feed_price() {
        let feed = FakeFeed::new().with_pair(PairSnapshot::new("Mint", "Pair", "TKN", dec!(2)));
        let exec = paper(&feed);

        let fill = exec.swap(&SwapRequest::new(usdc(), "Mint", dec!(10), 300)).await.unwrap();
        assert_eq!(fill.filled_quantity, dec!(5));
        assert_eq!(exec.get_balance(&usdc()).await.unwrap(), dec!(90));
        assert_eq!(exec.balance_of("Mint"), dec!(5));

        let back = exec.swap(&SwapRequest::new("Mint", usdc(), dec!(5), 300)).await.unwrap();
        assert_eq!(back.filled_quantity, dec!(10));
        assert_eq!(exec.balance_of(&usdc()), dec!(100));
    }

    #[test]
    fn test_balance_query_reports_simulated_wallet() {
        let exec = paper(&FakeFeed::new());
        let base = tokio_test::assert_ok!(tokio_test::block_on(exec.get_balance(&usdc())));
        assert_eq!(base, dec!(100));
        assert_eq!(tokio_test::block_on(exec.get_balance("Unknown")).unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_slippage_reduces_fill() {
        let feed = FakeFeed::new().with_pair(PairSnapshot::new("Mint", "Pair", "TKN", dec!(1)));
        let exec = PaperSwapExecutor::new(Arc::new(feed.clone()), BaseAsset::usdc(), dec!(100)).with_fixed_slippage(100);

        let fill = exec.swap(&SwapRequest::new(usdc(), "Mint", dec!(10), 300)).await.unwrap();
        assert_eq!(fill.filled_quantity, dec!(9.9));
    }

    #[tokio::test]
    async fn test_random_slippage_stays_in_bounds() {
        let feed = FakeFeed::new().with_pair(PairSnapshot::new("Mint", "Pair", "TKN", dec!(1)));
        let exec = PaperSwapExecutor::new(Arc::new(feed.clone()), BaseAsset::usdc(), dec!(1000));

        for _ in 0..20 {
            let fill = exec.swap(&SwapRequest::new(usdc(), "Mint", dec!(10), 300)).await.unwrap();
            assert!(fill.filled_quantity <= dec!(10));
            assert!(fill.filled_quantity >= dec!(9.7));
        }
    }

    #[tokio::test]
    async fn test_sell_blocked_and_insufficient_funds() {
        let feed = FakeFeed::new().with_pair(PairSnapshot::new("Mint", "Pair", "TKN", dec!(1)));
        let exec = paper(&feed).with_sell_blocked(vec!["Mint".to_string()]);

        exec.swap(&SwapRequest::new(usdc(), "Mint", dec!(10), 300)).await.unwrap();
        assert!(matches!(
            exec.swap(&SwapRequest::new("Mint", usdc(), dec!(10), 300)).await,
            Err(SwapError::Rejected(_))
        ));
        assert!(matches!(
            exec.swap(&SwapRequest::new(usdc(), "Mint", dec!(1000), 300)).await,
            Err(SwapError::InsufficientFunds { .. })
        ));
    }

    #[tokio::test]
    async fn test_unpriced_token_has_no_route() {
        let feed = FakeFeed::new();
        let exec = paper(&feed);
        assert!(matches!(
            exec.swap(&SwapRequest::new(usdc(), "Unknown", dec!(1), 300)).await,
            Err(SwapError::NoRoute { .. })
        ));
        assert_eq!(exec.balance_of(&usdc()), dec!(100));
    }
}
