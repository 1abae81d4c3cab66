//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Market data (pair discovery, prices)
//! - Swap execution (Jupiter or paper)
//! - Wallet balances
//! - Operator notifications

pub mod balance;
pub mod market_feed;
pub mod mocks;
pub mod notifier;
pub mod swap;

pub use balance::{BalanceError, BalanceQuery};
pub use market_feed::{FeedError, MarketFeed};
pub use notifier::{NotificationKind, Notifier, NotifyError};
pub use swap::{SwapError, SwapExecutor, SwapFill, SwapRequest};
