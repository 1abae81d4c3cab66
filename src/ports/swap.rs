use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("No route for {input} -> {output}: {reason}")]
    NoRoute {
        input: String,
        output: String,
        reason: String,
    },
    #[error("Swap rejected: {0}")]
    Rejected(String),
    #[error("Swap confirmed but nothing was received")]
    NoFill,
    #[error("Invalid swap amount: {0}")]
    InvalidAmount(String),
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },
    #[error("Slippage tolerance exceeded")]
    SlippageExceeded,
    #[error("Transaction signing failed: {0}")]
    Signing(String),
    #[error("Transaction failed: {0}")]
    Transaction(String),
    #[error("Swap API error: {0}")]
    Api(String),
    #[error("Swap timed out after {0:?}")]
    Timeout(Duration),
}

/// One swap of `amount` units of `input_mint` into `output_mint`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// UI units of the input asset
    pub amount: Decimal,
    pub max_slippage_bps: u16,
}

impl SwapRequest {
    pub fn new(
        input_mint: impl Into<String>,
        output_mint: impl Into<String>,
        amount: Decimal,
        max_slippage_bps: u16,
    ) -> Self {
        Self {
            input_mint: input_mint.into(),
            output_mint: output_mint.into(),
            amount,
            max_slippage_bps,
        }
    }
}

/// Confirmed swap result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapFill {
    /// UI units of the output asset actually received
    pub filled_quantity: Decimal,
    pub signature: Option<String>,
}

/// Atomic per call: either a confirmed fill or an error, no partial state.
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    async fn swap(&self, request: &SwapRequest) -> Result<SwapFill, SwapError>;
}
