//! DexScreener Adapter
//!
//! Market feed over the DexScreener REST API: pair discovery by search,
//! per-pair prices, and token lookups.

mod client;
mod types;

pub use client::{dedupe_by_token, DexScreenerClient, DexScreenerConfig, DexScreenerError};
pub use types::{DexPair, DexPairsResponse};
