//! One-shot price alerts on a pair
//!
//! The direction is fixed when the alert is created: a target above the
//! current price fires on the way up, a target below fires on the way down.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AlertError {
    #[error("Target {0} equals the current price")]
    AtCurrentPrice(Decimal),
    #[error("No price available for pair {0}")]
    PriceUnavailable(String),
    #[error("Target price must be positive, got {0}")]
    InvalidTarget(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertDirection {
    Above,
    Below,
}

impl fmt::Display for AlertDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertDirection::Above => write!(f, "above"),
            AlertDirection::Below => write!(f, "below"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: u64,
    pub pair_address: String,
    pub target_price_usd: Decimal,
    pub direction: AlertDirection,
    pub created_at: DateTime<Utc>,
}

impl PriceAlert {
    pub fn new(
        id: u64,
        pair_address: impl Into<String>,
        target_price_usd: Decimal,
        current_price_usd: Decimal,
    ) -> Result<Self, AlertError> {
        if target_price_usd <= Decimal::ZERO {
            return Err(AlertError::InvalidTarget(target_price_usd));
        }
        let direction = if target_price_usd > current_price_usd {
            AlertDirection::Above
        } else if target_price_usd < current_price_usd {
            AlertDirection::Below
        } else {
            return Err(AlertError::AtCurrentPrice(target_price_usd));
        };

        Ok(Self {
            id,
            pair_address: pair_address.into(),
            target_price_usd,
            direction,
            created_at: Utc::now(),
        })
    }

    pub fn is_triggered(&self, price_usd: Decimal) -> bool {
        match self.direction {
            AlertDirection::Above => price_usd >= self.target_price_usd,
            AlertDirection::Below => price_usd <= self.target_price_usd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_direction_from_current_price() {
        let up = PriceAlert::new(1, "Pair", dec!(2), dec!(1)).unwrap();
        assert_eq!(up.direction, AlertDirection::Above);
        assert!(!up.is_triggered(dec!(1.99)));
        assert!(up.is_triggered(dec!(2)));

        let down = PriceAlert::new(2, "Pair", dec!(0.5), dec!(1)).unwrap();
        assert_eq!(down.direction, AlertDirection::Below);
        assert!(down.is_triggered(dec!(0.4)));
        assert!(!down.is_triggered(dec!(0.6)));
    }

    #[test]
    fn test_reject_target_at_current_price() {
        assert_eq!(
            PriceAlert::new(1, "Pair", dec!(1), dec!(1)),
            Err(AlertError::AtCurrentPrice(dec!(1)))
        );
        assert!(PriceAlert::new(1, "Pair", dec!(-1), dec!(1)).is_err());
    }
}
