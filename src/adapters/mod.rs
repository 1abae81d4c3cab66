//! Adapters Layer - Concrete implementations of the ports
//!
//! - `dexscreener`: market feed over the DexScreener REST API
//! - `jupiter`: swap execution through the Jupiter aggregator
//! - `solana`: RPC client and wallet
//! - `paper`: simulated swaps and balances
//! - `telegram`: operator notifications
//! - `cli`: command-line interface and console

pub mod cli;
pub mod dexscreener;
pub mod jupiter;
pub mod paper;
pub mod solana;
pub mod telegram;

pub use cli::CliApp;
pub use dexscreener::DexScreenerClient;
pub use jupiter::{JupiterClient, JupiterExecutor};
pub use paper::PaperSwapExecutor;
pub use solana::{SolanaClient, WalletManager};
pub use telegram::{LogNotifier, TelegramNotifier};
