//! CLI Command Definitions
//!
//! clap derive structs for the `ratchet-sniper` binary.

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Ratchet Sniper - momentum position manager for Solana DEX pairs
#[derive(Parser, Debug)]
#[command(
    name = "ratchet-sniper",
    version = env!("CARGO_PKG_VERSION"),
    about = "Momentum position manager for Solana DEX pairs",
    long_about = "Scans DexScreener for high-volume momentum pairs, probes each with a tiny \
                  buy and sell, sizes a fixed fraction of the balance, and manages every \
                  position with a stop-loss that ratchets up into a trailing stop."
)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", default_value = "config/bot.toml")]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the scan and monitor loops with the interactive console
    Run(RunCmd),

    /// List current candidates without trading
    Scan,

    /// Print the USD price of a pair
    Price(PriceCmd),

    /// Print the base asset balance
    Balance(BalanceCmd),

    /// Print the wallet address
    Address,

    /// Transfer SOL from the wallet to another address
    Send(SendCmd),
}

#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Run in paper trading mode (the default)
    #[arg(short, long, conflicts_with = "live")]
    pub paper: bool,

    /// Enable live mainnet trading (requires --i-accept-losses)
    #[arg(long)]
    pub live: bool,

    /// Acknowledge risk of financial loss (required for --live)
    #[arg(long)]
    pub i_accept_losses: bool,

    /// Do not read console commands from stdin
    #[arg(long)]
    pub no_console: bool,
}

#[derive(Parser, Debug)]
pub struct PriceCmd {
    /// Pair address
    #[arg(value_name = "PAIR")]
    pub pair: String,
}

#[derive(Parser, Debug)]
pub struct BalanceCmd {
    /// Report the simulated paper balance instead of the wallet
    #[arg(long)]
    pub paper: bool,
}

#[derive(Parser, Debug)]
pub struct SendCmd {
    /// Recipient wallet address
    #[arg(value_name = "TO")]
    pub to: String,

    /// Amount in SOL
    #[arg(value_name = "SOL")]
    pub sol: Decimal,

    /// Actually send; without it the transfer is only described
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Paper,
    Live,
}

impl RunCmd {
    /// Live trading needs both flags; everything else is paper
    pub fn mode(&self) -> Result<RunMode, String> {
        match (self.live, self.i_accept_losses) {
            (true, true) => Ok(RunMode::Live),
            (true, false) => Err("--live requires --i-accept-losses".to_string()),
            (false, _) => Ok(RunMode::Paper),
        }
    }
}
