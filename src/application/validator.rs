//! Trade Validator
//!
//! Probe-buys a tiny notional of the candidate and sells the exact filled
//! quantity straight back. A token that can be bought but not sold (sell
//! blocks, transfer hooks, dead pools) fails here instead of after a full
//! position is committed.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use super::{bounded_swap, SwapAttempt};
use crate::domain::{BaseAsset, PairSnapshot};
use crate::ports::{SwapError, SwapExecutor, SwapRequest};

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Probe notional in USD
    pub test_trade_usd: Decimal,
    pub max_slippage_bps: u16,
    pub call_timeout: Duration,
}

/// How a probe ended; only `Passed` means tradeable
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Passed { bought: Decimal, sold_for: Decimal },
    InvalidProbeSize,
    BuyFailed(String),
    EmptyFill,
    SellFailed(String),
}

impl ProbeOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, ProbeOutcome::Passed { .. })
    }
}

pub struct TradeValidator {
    swaps: Arc<dyn SwapExecutor>,
    base: BaseAsset,
    config: ValidatorConfig,
}

impl TradeValidator {
    pub fn new(swaps: Arc<dyn SwapExecutor>, base: BaseAsset, config: ValidatorConfig) -> Self {
        Self { swaps, base, config }
    }

    /// Probe size in base units: `test_trade_usd / base_price_usd`
    pub fn probe_amount(&self, base_price_usd: Decimal) -> Option<Decimal> {
        if base_price_usd <= Decimal::ZERO {
            return None;
        }
        Some(self.config.test_trade_usd / base_price_usd)
    }

    pub async fn validate(&self, candidate: &PairSnapshot, base_price_usd: Decimal) -> bool {
        let outcome = self.probe(candidate, base_price_usd).await;
        match &outcome {
            ProbeOutcome::Passed { bought, sold_for } => tracing::info!(
                token = %candidate.token_address,
                "Probe passed for {}: bought {}, sold back for {} {}",
                candidate.symbol, bought, sold_for, self.base.symbol
            ),
            other => tracing::info!(
                token = %candidate.token_address,
                "Probe rejected {}: {:?}",
                candidate.symbol, other
            ),
        }
        outcome.passed()
    }

    /// Run both legs. The sell leg only runs when the buy produced a positive fill.
    pub async fn probe(&self, candidate: &PairSnapshot, base_price_usd: Decimal) -> ProbeOutcome {
        let amount = match self.probe_amount(base_price_usd) {
            Some(amount) if amount > Decimal::ZERO => amount,
            _ => return ProbeOutcome::InvalidProbeSize,
        };

        let buy = SwapRequest::new(
            self.base.mint.as_str(),
            candidate.token_address.as_str(),
            amount,
            self.config.max_slippage_bps,
        );
        let bought = match self.swap(&buy).await {
            Ok(fill) => fill.filled_quantity,
            Err(e) => return ProbeOutcome::BuyFailed(e.to_string()),
        };
        if bought <= Decimal::ZERO {
            return ProbeOutcome::EmptyFill;
        }

        let sell = SwapRequest::new(
            candidate.token_address.as_str(),
            self.base.mint.as_str(),
            bought,
            self.config.max_slippage_bps,
        );
        match self.swap(&sell).await {
            Ok(fill) => ProbeOutcome::Passed {
                bought,
                sold_for: fill.filled_quantity,
            },
            Err(e) => ProbeOutcome::SellFailed(e.to_string()),
        }
    }

    /// A leg past its deadline fails the probe. It is left to finish on its
    /// own; a late probe buy leaves dust in the wallet.
    async fn swap(&self, request: &SwapRequest) -> Result<crate::ports::SwapFill, SwapError> {
        match bounded_swap(self.config.call_timeout, &self.swaps, request).await {
            SwapAttempt::Settled(result) => result,
            SwapAttempt::Overdue(_) => {
                tracing::warn!(
                    "Probe swap {} -> {} still pending after {:?}",
                    request.input_mint,
                    request.output_mint,
                    self.config.call_timeout
                );
                Err(SwapError::Timeout(self.config.call_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::{FakeOutcome, FakeSwapExecutor};
    use rust_decimal_macros::dec;

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn validator(swaps: &FakeSwapExecutor) -> TradeValidator {
        validator_with_timeout(swaps, Duration::from_secs(1))
    }

    fn validator_with_timeout(swaps: &FakeSwapExecutor, call_timeout: Duration) -> TradeValidator {
        TradeValidator::new(
            Arc::new(swaps.clone()),
            BaseAsset::usdc(),
            ValidatorConfig {
                test_trade_usd: dec!(0.01),
                max_slippage_bps: 300,
                call_timeout,
            },
        )
    }

    fn candidate() -> PairSnapshot {
        PairSnapshot::new("Mint", "Pair", "TEST", dec!(0.5))
    }

    #[tokio::test]
    async fn test_probe_passes_and_sells_exact_fill() {
        let swaps = FakeSwapExecutor::new()
            .with_rate(USDC, "Mint", dec!(1.8))
            .with_rate("Mint", USDC, dec!(0.5));
        let v = validator(&swaps);

        assert!(v.validate(&candidate(), dec!(1)).await);
        let calls = swaps.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].amount, dec!(0.01));
        assert_eq!(calls[1].amount, dec!(0.018));
    }

    #[tokio::test]
    async fn test_buy_failure_skips_sell() {
        let swaps = FakeSwapExecutor::new();
        swaps.block(USDC, "Mint", "no route");
        let v = validator(&swaps);

        assert!(!v.validate(&candidate(), dec!(1)).await);
        assert_eq!(swaps.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_sell_failure_rejects() {
        let swaps = FakeSwapExecutor::new();
        swaps.push_outcome("Mint", USDC, FakeOutcome::Fail("sell blocked".into()));
        let v = validator(&swaps);

        let outcome = v.probe(&candidate(), dec!(1)).await;
        assert_eq!(outcome, ProbeOutcome::SellFailed("Swap rejected: sell blocked".into()));
    }

    #[tokio::test]
    async fn test_probe_size_uses_base_price() {
        let swaps = FakeSwapExecutor::new();
        let v = validator(&swaps);
        assert_eq!(v.probe_amount(dec!(200)), Some(dec!(0.00005)));
        assert_eq!(v.probe(&candidate(), Decimal::ZERO).await, ProbeOutcome::InvalidProbeSize);
        assert!(swaps.calls().is_empty());
    }

    #[tokio::test]
    async fn test_slow_buy_fails_validation_without_sell() {
        let swaps = FakeSwapExecutor::new().with_delay(Duration::from_millis(300));
        let v = validator_with_timeout(&swaps, Duration::from_millis(50));

        let started = std::time::Instant::now();
        assert!(!v.validate(&candidate(), dec!(1)).await);
        assert!(started.elapsed() < Duration::from_millis(250));

        // The overdue buy still completes, but no sell follows it
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(swaps.calls_between(USDC, "Mint"), 1);
        assert_eq!(swaps.calls_between("Mint", USDC), 0);
    }

    #[tokio::test]
    async fn test_slow_sell_fails_validation() {
        let swaps = FakeSwapExecutor::new();
        let v = validator_with_timeout(&swaps, Duration::from_millis(50));
        swaps.set_route_delay("Mint", USDC, Duration::from_millis(300));

        let outcome = v.probe(&candidate(), dec!(1)).await;
        assert!(matches!(outcome, ProbeOutcome::SellFailed(reason) if reason.contains("timed out")));
    }
}
