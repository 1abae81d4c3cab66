use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::Position;

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    Manual,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "stop-loss"),
            CloseReason::Manual => write!(f, "manual"),
        }
    }
}

/// A completed round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub token_address: String,
    pub symbol: String,
    pub reason: CloseReason,
    pub entry_price_usd: Decimal,
    pub exit_price_usd: Decimal,
    pub quantity: Decimal,
    pub realized_pnl_usd: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl ClosedTrade {
    pub fn from_position(position: &Position, exit_price_usd: Decimal, reason: CloseReason) -> Self {
        Self {
            token_address: position.token_address.clone(),
            symbol: position.symbol.clone(),
            reason,
            entry_price_usd: position.entry_price_usd,
            exit_price_usd,
            quantity: position.quantity,
            realized_pnl_usd: (exit_price_usd - position.entry_price_usd) * position.quantity,
            opened_at: position.opened_at,
            closed_at: Utc::now(),
        }
    }

    /// Realized return as a fraction of the entry notional
    pub fn return_pct(&self) -> Decimal {
        if self.entry_price_usd.is_zero() {
            return Decimal::ZERO;
        }
        (self.exit_price_usd - self.entry_price_usd) / self.entry_price_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::StopPolicy;
    use rust_decimal_macros::dec;

    #[test]
    fn test_realized_pnl() {
        let policy = StopPolicy {
            stop_loss_pct: dec!(0.10),
            trail_activate_pct: dec!(0.15),
            trail_distance_pct: dec!(0.10),
        };
        let pos = Position::open("M", "P", "TEST", dec!(2), dec!(50), dec!(100), &policy).unwrap();
        let trade = ClosedTrade::from_position(&pos, dec!(1.5), CloseReason::StopLoss);

        assert_eq!(trade.realized_pnl_usd, dec!(-25));
        assert_eq!(trade.return_pct(), dec!(-0.25));
        assert_eq!(trade.reason.to_string(), "stop-loss");
    }
}
