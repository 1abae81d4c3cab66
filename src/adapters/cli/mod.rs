//! CLI Adapter
//!
//! Command-line interface and the interactive console used while running.

mod commands;
pub mod console;

pub use commands::{BalanceCmd, CliApp, Command, PriceCmd, RunCmd, RunMode, SendCmd};
pub use console::{parse_command, ConsoleCommand};
