//! Ratchet Sniper - Momentum Position Manager for Solana DEX pairs

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use ratchet::adapters::cli::{console, BalanceCmd, CliApp, Command, PriceCmd, RunCmd, RunMode, SendCmd};
use ratchet::adapters::dexscreener::{DexScreenerClient, DexScreenerConfig};
use ratchet::adapters::jupiter::{JupiterClient, JupiterConfig, JupiterExecutor};
use ratchet::adapters::paper::PaperSwapExecutor;
use ratchet::adapters::solana::{SolanaClient, WalletManager};
use ratchet::adapters::telegram::{LogNotifier, TelegramNotifier};
use ratchet::application::{CandidateScanner, ScannerConfig, TradingEngine};
use ratchet::config::loader::LoggingSection;
use ratchet::config::{load_config_or_default, Config};
use ratchet::ports::{BalanceQuery, MarketFeed, Notifier, SwapExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in bot.toml)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config = load_config_or_default(&app.config).context("Failed to load configuration")?;
    init_logging(app.verbose, app.debug, &config.logging)?;
    if !app.config.exists() {
        tracing::warn!("Config file {} not found, using defaults", app.config.display());
    }

    match app.command {
        Command::Run(cmd) => {
            let interactive = !cmd.no_console;
            run_command(config, cmd).await?;
            if interactive {
                // The stdin reader thread cannot be cancelled and would hold the runtime open
                std::process::exit(0);
            }
            Ok(())
        }
        Command::Scan => scan_command(config).await,
        Command::Price(cmd) => price_command(config, cmd).await,
        Command::Balance(cmd) => balance_command(config, cmd).await,
        Command::Address => address_command(config),
        Command::Send(cmd) => send_command(config, cmd).await,
    }
}

/// `--debug` > `--verbose` > `RUST_LOG` > `[logging].level`
fn init_logging(verbose: bool, debug: bool, logging: &LoggingSection) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?
    };

    if logging.json {
        fmt().json().with_env_filter(filter).with_target(false).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
    Ok(())
}

async fn run_command(config: Config, cmd: RunCmd) -> Result<()> {
    let mode = cmd.mode().map_err(anyhow::Error::msg)?;
    tracing::info!("Starting Ratchet Sniper ({:?} mode)...", mode);

    let feed = build_feed(&config)?;
    let notifier = build_notifier(&config)?;
    let (swaps, balances): (Arc<dyn SwapExecutor>, Arc<dyn BalanceQuery>) = match mode {
        RunMode::Paper => {
            tracing::warn!("PAPER TRADING MODE - no real transactions");
            let paper = Arc::new(paper_executor(&config, Arc::clone(&feed)));
            (paper.clone() as Arc<dyn SwapExecutor>, paper as Arc<dyn BalanceQuery>)
        }
        RunMode::Live => {
            let wallet = load_wallet(&config)?;
            tracing::warn!("LIVE TRADING with wallet {}", wallet.public_key());
            let solana = SolanaClient::new(config.solana.rpc_url.clone()).with_owner(wallet.pubkey());
            let jupiter = JupiterClient::with_config(JupiterConfig::from(&config.jupiter))
                .context("Failed to create Jupiter client")?;
            let executor = JupiterExecutor::new(jupiter, solana.clone(), wallet)
                .with_priority_fee(config.jupiter.priority_fee_lamports);
            (Arc::new(executor) as Arc<dyn SwapExecutor>, Arc::new(solana) as Arc<dyn BalanceQuery>)
        }
    };

    let engine = Arc::new(
        TradingEngine::assemble(&config, feed, swaps, balances, notifier)
            .context("Failed to build trading engine")?,
    );

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        signal.cancel();
    });

    let loops = engine.start(&cancel);
    if !cmd.no_console {
        tokio::spawn(console::run_console(Arc::clone(&engine), cancel.clone()));
    }

    cancel.cancelled().await;
    for periodic in loops {
        periodic.shutdown().await;
    }

    let open = engine.list_open_positions().await;
    if !open.is_empty() {
        tracing::warn!("{} position(s) left open; they are not persisted", open.len());
        for p in &open {
            tracing::warn!(
                token = %p.token_address,
                "{} qty {} entry ${} stop ${}",
                p.symbol, p.quantity, p.entry_price_usd, p.stop_loss_price
            );
        }
    }
    tracing::info!("Ratchet Sniper stopped");
    Ok(())
}

async fn scan_command(config: Config) -> Result<()> {
    let feed = build_feed(&config)?;
    let scanner = CandidateScanner::new(feed, ScannerConfig::from(&config));
    let candidates = scanner.scan(&HashSet::new()).await;

    if candidates.is_empty() {
        println!("No candidates above ${} 5m volume and {}% momentum",
            config.trading.min_volume_usd, config.trading.min_momentum_pct);
        return Ok(());
    }
    for (rank, c) in candidates.iter().enumerate() {
        println!(
            "{:>2}. {:<10} ${:<14} vol5m ${:<12} {:>+6}%  {}/{}",
            rank + 1,
            c.symbol,
            c.price_usd,
            c.volume_5m_usd.round_dp(0),
            c.price_change_5m_pct.round_dp(2),
            c.token_address,
            c.quote_symbol
        );
    }
    Ok(())
}

async fn price_command(config: Config, cmd: PriceCmd) -> Result<()> {
    let feed = build_feed(&config)?;
    match feed.get_price(&cmd.pair).await.context("Failed to fetch price")? {
        Some(price) => println!("{}: ${}", cmd.pair, price),
        None => println!("{}: no price", cmd.pair),
    }
    Ok(())
}

async fn balance_command(config: Config, cmd: BalanceCmd) -> Result<()> {
    let base = config.base_asset();
    let balance = if cmd.paper {
        paper_executor(&config, build_feed(&config)?).balance_of(&base.mint)
    } else {
        let wallet = load_wallet(&config)?;
        SolanaClient::new(config.solana.rpc_url.clone())
            .get_wallet_balance(wallet.pubkey(), &base.mint)
            .await
            .context("Failed to get balance")?
    };
    println!("{} {}", balance, base.symbol);
    Ok(())
}

fn address_command(config: Config) -> Result<()> {
    let wallet = load_wallet(&config)?;
    println!("{}", wallet.public_key());
    Ok(())
}

async fn send_command(config: Config, cmd: SendCmd) -> Result<()> {
    let wallet = load_wallet(&config)?;
    if !cmd.yes {
        println!(
            "Would send {} SOL from {} to {}. Re-run with --yes to send.",
            cmd.sol,
            wallet.public_key(),
            cmd.to
        );
        return Ok(());
    }

    let signature = SolanaClient::new(config.solana.rpc_url.clone())
        .transfer_sol(&wallet, &cmd.to, cmd.sol)
        .await
        .context("Transfer failed")?;
    println!("Sent {} SOL to {}: {}", cmd.sol, cmd.to, signature);
    Ok(())
}

fn build_feed(config: &Config) -> Result<Arc<dyn MarketFeed>> {
    let client = DexScreenerClient::new(DexScreenerConfig::from(&config.dexscreener))
        .context("Failed to create DexScreener client")?;
    Ok(Arc::new(client))
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    if !config.alerts.telegram_enabled {
        return Ok(Arc::new(LogNotifier));
    }
    let telegram = TelegramNotifier::new(
        config.alerts.telegram_bot_token.clone(),
        config.alerts.telegram_chat_id.clone(),
        config.call_timeout(),
    )
    .context("Failed to create Telegram notifier")?;
    tracing::info!("Telegram notifications enabled");
    Ok(Arc::new(telegram))
}

fn paper_executor(config: &Config, feed: Arc<dyn MarketFeed>) -> PaperSwapExecutor {
    PaperSwapExecutor::new(feed, config.base_asset(), config.paper.starting_balance)
        .with_sell_blocked(config.paper.sell_blocked.iter().cloned())
}

/// SOL_PRIVATE_KEY wins over the keypair file
fn load_wallet(config: &Config) -> Result<WalletManager> {
    if let Some(secret) = &config.solana.private_key {
        return WalletManager::from_base58(secret).context("SOL_PRIVATE_KEY is not a valid base58 keypair");
    }
    let keypair_path = shellexpand::tilde(&config.solana.keypair_path).to_string();
    load_wallet_with_context(&keypair_path)
}

/// Load wallet with helpful error messages
fn load_wallet_with_context(keypair_path: &str) -> Result<WalletManager> {
    let path = Path::new(keypair_path);

    if !path.exists() {
        bail!(
            "Wallet file not found: {}\n\n\
             A wallet is required for live trading and balance queries.\n\n\
             To create a new wallet, run:\n  \
             solana-keygen new --outfile {}\n\n\
             Or set SOL_PRIVATE_KEY, or update 'keypair_path' in your bot.toml",
            keypair_path,
            keypair_path
        );
    }

    if let Err(e) = std::fs::metadata(path) {
        bail!(
            "Cannot access wallet file '{}': {}\n\n\
             Check file permissions and ensure the path is correct.",
            keypair_path,
            e
        );
    }

    WalletManager::from_file(keypair_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load wallet from '{}': {}\n\n\
             The file exists but may be corrupted or in the wrong format.\n\
             Expected format: JSON array of bytes (e.g., [1,2,3,...])",
            keypair_path,
            e
        )
    })
}
