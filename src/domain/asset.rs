use serde::{Deserialize, Serialize};

/// Wrapped SOL mint
pub const NATIVE_SOL_MINT: &str = "So11111111111111111111111111111111111111112";
/// USDC mint on Solana mainnet
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// The currency positions are bought with and sold back into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseAsset {
    pub mint: String,
    pub symbol: String,
    pub decimals: u8,
    /// Treat one unit as exactly one USD instead of asking the feed
    pub usd_pegged: bool,
}

impl BaseAsset {
    pub fn usdc() -> Self {
        Self {
            mint: USDC_MINT.to_string(),
            symbol: "USDC".to_string(),
            decimals: 6,
            usd_pegged: true,
        }
    }

    pub fn sol() -> Self {
        Self {
            mint: NATIVE_SOL_MINT.to_string(),
            symbol: "SOL".to_string(),
            decimals: 9,
            usd_pegged: false,
        }
    }
}

impl Default for BaseAsset {
    fn default() -> Self {
        Self::usdc()
    }
}
