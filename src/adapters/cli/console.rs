//! Interactive console
//!
//! Line-oriented operator commands read from stdin while the bot runs.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::application::TradingEngine;
use crate::domain::{ClosedTrade, PositionSummary, PriceAlert};

pub const HELP: &str = "\
Commands:
  open <token|symbol> [fraction]  buy a position (fraction of balance, 0-1)
  close <token|symbol>            sell a position
  positions                       list open positions
  history                         recent closed trades
  alert <pair> <price>            one-shot price alert
  alerts                          list alerts
  unalert <id>                    remove an alert
  balance                         base asset balance
  help                            this text
  quit                            stop the bot";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Open { token: String, fraction: Option<Decimal> },
    Close { token: String },
    Positions,
    History,
    Alert { pair: String, price: Decimal },
    Alerts,
    Unalert { id: u64 },
    Balance,
    Help,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(ConsoleCommand::Empty);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("open" | "buy", [token]) => ConsoleCommand::Open {
            token: token.to_string(),
            fraction: None,
        },
        ("open" | "buy", [token, fraction]) => ConsoleCommand::Open {
            token: token.to_string(),
            fraction: Some(parse_decimal(fraction, "fraction")?),
        },
        ("close" | "sell", [token]) => ConsoleCommand::Close { token: token.to_string() },
        ("positions" | "pos", []) => ConsoleCommand::Positions,
        ("history", []) => ConsoleCommand::History,
        ("alert", [pair, price]) => ConsoleCommand::Alert {
            pair: pair.to_string(),
            price: parse_decimal(price, "price")?,
        },
        ("alerts", []) => ConsoleCommand::Alerts,
        ("unalert", [id]) => ConsoleCommand::Unalert {
            id: id.parse().map_err(|_| format!("invalid alert id: {}", id))?,
        },
        ("balance", []) => ConsoleCommand::Balance,
        ("help" | "?", []) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        (verb, _) => return Err(format!("unrecognized command '{}' (try 'help')", verb)),
    };
    Ok(command)
}

fn parse_decimal(raw: &str, what: &str) -> Result<Decimal, String> {
    let value = raw.trim_start_matches('$');
    Decimal::from_str(value).map_err(|_| format!("invalid {}: {}", what, raw))
}

/// Run one command and render the reply
pub async fn execute(engine: &TradingEngine, command: ConsoleCommand) -> String {
    match command {
        ConsoleCommand::Open { token, fraction } => match engine.open_manual(&token, fraction).await {
            Ok(summary) => format!(
                "Opened {} ({}): {} @ ${} stop ${}",
                summary.symbol, summary.token_address, summary.quantity, summary.entry_price_usd, summary.stop_loss_price
            ),
            Err(e) => format!("Open failed: {}", e),
        },
        ConsoleCommand::Close { token } => match engine.close_manual(&token).await {
            Ok(trade) => format!(
                "Closed {} @ ${}, PnL ${}",
                trade.symbol,
                trade.exit_price_usd,
                trade.realized_pnl_usd.round_dp(4)
            ),
            Err(e) => format!("Close failed: {}", e),
        },
        ConsoleCommand::Positions => format_positions(&engine.list_open_positions().await),
        ConsoleCommand::History => format_history(&engine.recent_closes().await),
        ConsoleCommand::Alert { pair, price } => match engine.alerts().add(&pair, price).await {
            Ok(alert) => format!("Alert #{} set: {} {} ${}", alert.id, pair, alert.direction, price),
            Err(e) => format!("Alert not set: {}", e),
        },
        ConsoleCommand::Alerts => format_alerts(&engine.alerts().list().await),
        ConsoleCommand::Unalert { id } => {
            if engine.alerts().remove(id).await {
                format!("Alert #{} removed", id)
            } else {
                format!("No alert #{}", id)
            }
        }
        ConsoleCommand::Balance => match engine.base_balance().await {
            Ok(balance) => format!("{} {}", balance, engine.manager().base_asset().symbol),
            Err(e) => format!("Balance unavailable: {}", e),
        },
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit | ConsoleCommand::Empty => String::new(),
    }
}

/// Read commands from stdin until `quit`, EOF or cancellation. `quit`
/// cancels the token so the rest of the bot shuts down too.
pub async fn run_console(engine: Arc<TradingEngine>, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Console read failed: {}", e);
                break;
            }
        };

        match parse_command(&line) {
            Ok(ConsoleCommand::Quit) => {
                cancel.cancel();
                break;
            }
            Ok(command) => {
                let reply = execute(&engine, command).await;
                if !reply.is_empty() {
                    println!("{}", reply);
                }
            }
            Err(e) => println!("{}", e),
        }
    }
}

pub fn format_positions(positions: &[PositionSummary]) -> String {
    if positions.is_empty() {
        return "No open positions".to_string();
    }
    let mut out = format!("{} open position(s):", positions.len());
    for p in positions {
        let last = p.last_price_usd.map(|v| format!("${}", v)).unwrap_or_else(|| "-".into());
        let pnl = p
            .unrealized_pnl_usd
            .map(|v| format!("${}", v.round_dp(4)))
            .unwrap_or_else(|| "-".into());
        out.push_str(&format!(
            "\n  {} {} qty {} entry ${} last {} stop ${}{} pnl {}",
            p.symbol,
            p.token_address,
            p.quantity,
            p.entry_price_usd,
            last,
            p.stop_loss_price,
            if p.trailing_active { " (trailing)" } else { "" },
            pnl
        ));
    }
    out
}

pub fn format_history(trades: &[ClosedTrade]) -> String {
    if trades.is_empty() {
        return "No closed trades".to_string();
    }
    let mut out = format!("{} closed trade(s):", trades.len());
    for t in trades {
        out.push_str(&format!(
            "\n  {} {} [{}] ${} -> ${} pnl ${} ({}%)",
            t.closed_at.format("%Y-%m-%d %H:%M:%S"),
            t.symbol,
            t.reason,
            t.entry_price_usd,
            t.exit_price_usd,
            t.realized_pnl_usd.round_dp(4),
            (t.return_pct() * Decimal::ONE_HUNDRED).round_dp(2)
        ));
    }
    out
}

pub fn format_alerts(alerts: &[PriceAlert]) -> String {
    if alerts.is_empty() {
        return "No alerts".to_string();
    }
    let mut out = String::from("Alerts:");
    for a in alerts {
        out.push_str(&format!("\n  #{} {} {} ${}", a.id, a.pair_address, a.direction, a.target_price_usd));
    }
    out
}
