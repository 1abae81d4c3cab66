//! Position and the stop-loss / trailing-stop engine
//!
//! A `Position` moves through Open/NotTrailing -> Open/Trailing and is removed
//! when a close confirms. The transient Opening and Closing states live in the
//! position book, never on the Position itself.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("Invalid entry price: {0}")]
    InvalidEntryPrice(Decimal),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(Decimal),
    #[error("Invalid stop policy: {0}")]
    InvalidPolicy(String),
}

/// Stop-loss and trailing-stop parameters, all fractions (0.10 = 10%)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopPolicy {
    pub stop_loss_pct: Decimal,
    pub trail_activate_pct: Decimal,
    pub trail_distance_pct: Decimal,
}

impl StopPolicy {
    pub fn validate(&self) -> Result<(), PositionError> {
        let unit = Decimal::ONE;
        if self.stop_loss_pct <= Decimal::ZERO || self.stop_loss_pct >= unit {
            return Err(PositionError::InvalidPolicy(format!(
                "stop_loss_pct must be in (0, 1), got {}",
                self.stop_loss_pct
            )));
        }
        if self.trail_activate_pct <= Decimal::ZERO {
            return Err(PositionError::InvalidPolicy(format!(
                "trail_activate_pct must be > 0, got {}",
                self.trail_activate_pct
            )));
        }
        if self.trail_distance_pct <= Decimal::ZERO || self.trail_distance_pct >= unit {
            return Err(PositionError::InvalidPolicy(format!(
                "trail_distance_pct must be in (0, 1), got {}",
                self.trail_distance_pct
            )));
        }
        Ok(())
    }

    /// Initial stop for a fresh position
    pub fn initial_stop(&self, entry_price_usd: Decimal) -> Decimal {
        entry_price_usd * (Decimal::ONE - self.stop_loss_pct)
    }

    /// Price at which trailing switches on
    pub fn activation_price(&self, entry_price_usd: Decimal) -> Decimal {
        entry_price_usd * (Decimal::ONE + self.trail_activate_pct)
    }

    pub fn trailing_stop(&self, peak_price_usd: Decimal) -> Decimal {
        peak_price_usd * (Decimal::ONE - self.trail_distance_pct)
    }
}

/// A held token, owned by the position book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub token_address: String,
    pub pair_address: String,
    pub symbol: String,
    pub entry_price_usd: Decimal,
    pub quantity: Decimal,
    /// Base-asset amount spent on the buy
    pub capital_committed: Decimal,
    pub stop_loss_price: Decimal,
    pub trailing_active: bool,
    pub peak_price_usd: Decimal,
    pub last_price_usd: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
}

/// Stop movement reported by a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdUpdate {
    pub previous_stop: Decimal,
    pub new_stop: Decimal,
    pub peak_price_usd: Decimal,
    /// True on the tick that switched trailing on
    pub trailing_activated: bool,
}

/// Result of evaluating one price against a position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Zero or negative price; nothing was touched
    Skipped,
    Hold(Option<ThresholdUpdate>),
    StopHit { price_usd: Decimal, stop_loss_price: Decimal },
}

impl Position {
    /// Build a position from an actual fill. Entry price and quantity must be
    /// strictly positive.
    pub fn open(
        token_address: impl Into<String>,
        pair_address: impl Into<String>,
        symbol: impl Into<String>,
        entry_price_usd: Decimal,
        quantity: Decimal,
        capital_committed: Decimal,
        policy: &StopPolicy,
    ) -> Result<Self, PositionError> {
        if entry_price_usd <= Decimal::ZERO {
            return Err(PositionError::InvalidEntryPrice(entry_price_usd));
        }
        if quantity <= Decimal::ZERO {
            return Err(PositionError::InvalidQuantity(quantity));
        }

        Ok(Self {
            token_address: token_address.into(),
            pair_address: pair_address.into(),
            symbol: symbol.into(),
            entry_price_usd,
            quantity,
            capital_committed,
            stop_loss_price: policy.initial_stop(entry_price_usd),
            trailing_active: false,
            peak_price_usd: entry_price_usd,
            last_price_usd: None,
            opened_at: Utc::now(),
        })
    }

    /// Apply one monitor tick.
    ///
    /// Order matters: the stop check runs first and wins over any stop
    /// movement. On the activation tick the stop is set to break-even and the
    /// trailing formula is not applied until the next tick, so the floor
    /// cannot be undercut or skipped past in the same step.
    pub fn evaluate(&mut self, price_usd: Decimal, policy: &StopPolicy) -> TickOutcome {
        if price_usd <= Decimal::ZERO {
            return TickOutcome::Skipped;
        }
        self.last_price_usd = Some(price_usd);

        if price_usd <= self.stop_loss_price {
            return TickOutcome::StopHit {
                price_usd,
                stop_loss_price: self.stop_loss_price,
            };
        }

        let previous_stop = self.stop_loss_price;
        self.peak_price_usd = self.peak_price_usd.max(price_usd);

        let mut trailing_activated = false;
        if !self.trailing_active {
            if price_usd >= policy.activation_price(self.entry_price_usd) {
                self.trailing_active = true;
                trailing_activated = true;
                self.stop_loss_price = self.stop_loss_price.max(self.entry_price_usd);
            }
        } else {
            let candidate = policy.trailing_stop(self.peak_price_usd);
            self.stop_loss_price = self.stop_loss_price.max(candidate);
        }

        if trailing_activated || self.stop_loss_price != previous_stop {
            TickOutcome::Hold(Some(ThresholdUpdate {
                previous_stop,
                new_stop: self.stop_loss_price,
                peak_price_usd: self.peak_price_usd,
                trailing_activated,
            }))
        } else {
            TickOutcome::Hold(None)
        }
    }

    pub fn unrealized_pnl_usd(&self) -> Option<Decimal> {
        self.last_price_usd
            .map(|price| (price - self.entry_price_usd) * self.quantity)
    }

    pub fn summary(&self) -> PositionSummary {
        PositionSummary {
            token_address: self.token_address.clone(),
            symbol: self.symbol.clone(),
            entry_price_usd: self.entry_price_usd,
            quantity: self.quantity,
            capital_committed: self.capital_committed,
            stop_loss_price: self.stop_loss_price,
            trailing_active: self.trailing_active,
            peak_price_usd: self.peak_price_usd,
            last_price_usd: self.last_price_usd,
            unrealized_pnl_usd: self.unrealized_pnl_usd(),
            opened_at: self.opened_at,
        }
    }
}

/// Read-only view handed to the command layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub token_address: String,
    pub symbol: String,
    pub entry_price_usd: Decimal,
    pub quantity: Decimal,
    pub capital_committed: Decimal,
    pub stop_loss_price: Decimal,
    pub trailing_active: bool,
    pub peak_price_usd: Decimal,
    pub last_price_usd: Option<Decimal>,
    pub unrealized_pnl_usd: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn policy() -> StopPolicy {
        StopPolicy {
            stop_loss_pct: dec!(0.10),
            trail_activate_pct: dec!(0.15),
            trail_distance_pct: dec!(0.10),
        }
    }

    fn position_at(entry: Decimal) -> Position {
        Position::open("Mint111", "Pair111", "TEST", entry, dec!(10), dec!(1000), &policy()).unwrap()
    }

    #[test]
    fn test_open_sets_initial_stop() {
        let pos = position_at(dec!(100));
        assert_eq!(pos.stop_loss_price, dec!(90));
        assert_eq!(pos.peak_price_usd, dec!(100));
        assert!(!pos.trailing_active);
    }

    #[test]
    fn test_open_rejects_non_positive_entry() {
        let result = Position::open("M", "P", "T", Decimal::ZERO, dec!(1), dec!(1), &policy());
        assert_eq!(result, Err(PositionError::InvalidEntryPrice(Decimal::ZERO)));

        let result = Position::open("M", "P", "T", dec!(1), Decimal::ZERO, dec!(1), &policy());
        assert_eq!(result, Err(PositionError::InvalidQuantity(Decimal::ZERO)));
    }

    #[test]
    fn test_stop_loss_hit_below_stop() {
        let mut pos = position_at(dec!(100));
        let outcome = pos.evaluate(dec!(89), &policy());
        assert_eq!(
            outcome,
            TickOutcome::StopHit { price_usd: dec!(89), stop_loss_price: dec!(90) }
        );
    }

    #[test]
    fn test_stop_loss_hit_at_exact_stop() {
        let mut pos = position_at(dec!(100));
        assert!(matches!(pos.evaluate(dec!(90), &policy()), TickOutcome::StopHit { .. }));
    }

    #[test]
    fn test_trailing_sequence() {
        let mut pos = position_at(dec!(100));
        let p = policy();

        assert_eq!(pos.evaluate(dec!(110), &p), TickOutcome::Hold(None));
        assert!(!pos.trailing_active);
        assert_eq!(pos.peak_price_usd, dec!(110));

        let outcome = pos.evaluate(dec!(116), &p);
        assert!(pos.trailing_active);
        assert_eq!(pos.stop_loss_price, dec!(100));
        match outcome {
            TickOutcome::Hold(Some(update)) => {
                assert!(update.trailing_activated);
                assert_eq!(update.previous_stop, dec!(90));
                assert_eq!(update.new_stop, dec!(100));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        pos.evaluate(dec!(130), &p);
        assert_eq!(pos.peak_price_usd, dec!(130));
        assert_eq!(pos.stop_loss_price, dec!(117));

        assert_eq!(pos.evaluate(dec!(125), &p), TickOutcome::Hold(None));
        assert_eq!(pos.stop_loss_price, dec!(117));
        assert_eq!(pos.peak_price_usd, dec!(130));
    }

    #[test]
    fn test_stop_never_decreases_once_trailing() {
        let mut pos = position_at(dec!(100));
        let p = policy();
        let prices = [
            dec!(120), dec!(140), dec!(131), dec!(150), dec!(136), dec!(160), dec!(145),
        ];

        let mut last_stop = pos.stop_loss_price;
        let mut last_peak = pos.peak_price_usd;
        for price in prices {
            if let TickOutcome::StopHit { .. } = pos.evaluate(price, &p) {
                break;
            }
            assert!(pos.stop_loss_price >= last_stop);
            assert!(pos.peak_price_usd >= last_peak);
            assert!(pos.stop_loss_price >= pos.entry_price_usd);
            last_stop = pos.stop_loss_price;
            last_peak = pos.peak_price_usd;
        }
    }

    #[test]
    fn test_break_even_stop_closes_after_reversal() {
        let mut pos = position_at(dec!(100));
        let p = policy();
        pos.evaluate(dec!(115), &p);
        assert!(pos.trailing_active);
        assert!(matches!(pos.evaluate(dec!(100), &p), TickOutcome::StopHit { .. }));
    }

    #[test]
    fn test_non_positive_price_skipped() {
        let mut pos = position_at(dec!(100));
        let before = pos.clone();
        assert_eq!(pos.evaluate(Decimal::ZERO, &policy()), TickOutcome::Skipped);
        assert_eq!(pos, before);
    }

    #[test]
    fn test_unrealized_pnl() {
        let mut pos = position_at(dec!(100));
        assert_eq!(pos.unrealized_pnl_usd(), None);
        pos.evaluate(dec!(105), &policy());
        assert_eq!(pos.unrealized_pnl_usd(), Some(dec!(50)));
    }

    #[test]
    fn test_policy_validation() {
        assert!(policy().validate().is_ok());
        let mut bad = policy();
        bad.trail_distance_pct = dec!(1);
        assert!(bad.validate().is_err());
        let mut bad = policy();
        bad.stop_loss_pct = Decimal::ZERO;
        assert!(bad.validate().is_err());
    }
}
