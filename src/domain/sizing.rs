//! Position Sizer
//!
//! Fixed-fraction sizing with a dust floor.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SizingError {
    #[error("Insufficient balance: {available} available, sized amount {sized} below minimum {minimum}")]
    InsufficientBalance {
        available: Decimal,
        sized: Decimal,
        minimum: Decimal,
    },
    #[error("Trade fraction must be in (0, 1], got {0}")]
    InvalidFraction(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSizer {
    trade_fraction: Decimal,
    min_trade_amount: Decimal,
}

impl PositionSizer {
    pub fn new(trade_fraction: Decimal, min_trade_amount: Decimal) -> Result<Self, SizingError> {
        check_fraction(trade_fraction)?;
        Ok(Self {
            trade_fraction,
            min_trade_amount,
        })
    }

    pub fn trade_fraction(&self) -> Decimal {
        self.trade_fraction
    }

    pub fn min_trade_amount(&self) -> Decimal {
        self.min_trade_amount
    }

    /// `available_balance * trade_fraction`, or `InsufficientBalance` below the dust floor
    pub fn size(&self, available_balance: Decimal) -> Result<Decimal, SizingError> {
        self.size_with_fraction(available_balance, self.trade_fraction)
    }

    /// Same as `size` with a one-off fraction (manual opens)
    pub fn size_with_fraction(
        &self,
        available_balance: Decimal,
        fraction: Decimal,
    ) -> Result<Decimal, SizingError> {
        check_fraction(fraction)?;

        let sized = available_balance.max(Decimal::ZERO) * fraction;
        if sized < self.min_trade_amount || sized.is_zero() {
            return Err(SizingError::InsufficientBalance {
                available: available_balance,
                sized,
                minimum: self.min_trade_amount,
            });
        }
        Ok(sized)
    }
}

fn check_fraction(fraction: Decimal) -> Result<(), SizingError> {
    if fraction <= Decimal::ZERO || fraction > Decimal::ONE {
        return Err(SizingError::InvalidFraction(fraction));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_size_fraction_of_balance() {
        let sizer = PositionSizer::new(dec!(0.30), dec!(1)).unwrap();
        assert_eq!(sizer.size(dec!(100)), Ok(dec!(30)));
    }

    #[test]
    fn test_size_below_dust_floor() {
        let sizer = PositionSizer::new(dec!(0.30), dec!(1)).unwrap();
        assert!(matches!(
            sizer.size(dec!(3)),
            Err(SizingError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            sizer.size(Decimal::ZERO),
            Err(SizingError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_zero_floor_still_rejects_empty_wallet() {
        let sizer = PositionSizer::new(dec!(0.5), Decimal::ZERO).unwrap();
        assert!(sizer.size(Decimal::ZERO).is_err());
        assert_eq!(sizer.size(dec!(2)), Ok(dec!(1)));
    }

    #[test]
    fn test_fraction_override() {
        let sizer = PositionSizer::new(dec!(0.30), dec!(1)).unwrap();
        assert_eq!(sizer.size_with_fraction(dec!(100), dec!(0.5)), Ok(dec!(50)));
        assert_eq!(
            sizer.size_with_fraction(dec!(100), dec!(1.5)),
            Err(SizingError::InvalidFraction(dec!(1.5)))
        );
    }

    #[test]
    fn test_invalid_configured_fraction() {
        assert!(PositionSizer::new(Decimal::ZERO, dec!(1)).is_err());
        assert!(PositionSizer::new(dec!(1), dec!(1)).is_ok());
    }
}
