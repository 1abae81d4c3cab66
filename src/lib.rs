//! Ratchet Sniper - Momentum Position Manager Library
//!
//! Finds high-volume momentum pairs on Solana DEXes, proves each one can be
//! bought and sold with a probe trade, and manages every position with a
//! stop-loss that ratchets up into a trailing stop.
//!
//! # Modules
//!
//! - `domain`: Core rules (PairSnapshot, Position, StopPolicy, PositionSizer)
//! - `ports`: Trait abstractions (MarketFeed, SwapExecutor, BalanceQuery, Notifier)
//! - `application`: Scanner, validator, position manager, scheduler and engine
//! - `adapters`: External implementations (DexScreener, Jupiter, Solana, paper, Telegram, CLI)
//! - `config`: Configuration loading and validation

pub mod domain;
pub mod ports;
pub mod application;
pub mod adapters;
pub mod config;
