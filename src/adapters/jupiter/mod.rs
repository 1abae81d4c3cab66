//! Jupiter Adapter
//!
//! Swap execution through the Jupiter aggregator: quote fetching, swap
//! transaction building, and the signing/sending executor.

mod client;
mod executor;
mod quote;
mod swap;

pub use client::{JupiterClient, JupiterConfig, JupiterError};
pub use executor::JupiterExecutor;
pub use quote::{QuoteRequest, QuoteResponse};
pub use swap::{SwapTxRequest, SwapTxResponse};
