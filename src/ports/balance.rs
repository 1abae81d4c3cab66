use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Balance query failed: {0}")]
    Query(String),
    #[error("Invalid asset: {0}")]
    InvalidAsset(String),
    #[error("Balance query timed out after {0:?}")]
    Timeout(Duration),
}

/// Wallet balance lookup, in UI units of the asset
#[async_trait]
pub trait BalanceQuery: Send + Sync {
    async fn get_balance(&self, asset: &str) -> Result<Decimal, BalanceError>;
}
