//! Configuration Loader
//!
//! Loads configuration from a TOML file, applies environment overrides and
//! validates the result. Every field has a default, so sections may be
//! omitted entirely.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::application::{
    EngineConfig, ManagerConfig, ScannerConfig, ValidatorConfig, DEFAULT_HISTORY_LIMIT,
};
use crate::domain::{BaseAsset, PairFilter, StopPolicy, NATIVE_SOL_MINT, USDC_MINT};

/// Main configuration structure matching bot.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trading: TradingSection,
    #[serde(default)]
    pub base: BaseSection,
    #[serde(default)]
    pub dexscreener: DexScreenerSection,
    #[serde(default)]
    pub jupiter: JupiterSection,
    #[serde(default)]
    pub solana: SolanaSection,
    #[serde(default)]
    pub paper: PaperSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub alerts: AlertsSection,
}

/// Position lifecycle parameters. Percent fields ending in `_pct` are
/// fractions (0.10 = 10%) except `min_momentum_pct`, which is in percent
/// units like the feed's price change.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingSection {
    /// Minimum five-minute volume in USD
    #[serde(default = "default_min_volume_usd")]
    pub min_volume_usd: Decimal,
    /// Minimum five-minute price change, percent units (2.0 = +2%)
    #[serde(default = "default_min_momentum_pct")]
    pub min_momentum_pct: Decimal,
    /// Probe notional in USD
    #[serde(default = "default_test_trade_usd")]
    pub test_trade_usd: Decimal,
    /// Share of the base balance committed per position
    #[serde(default = "default_trade_fraction")]
    pub trade_fraction: Decimal,
    /// Dust floor in base units; smaller sizes are skipped
    #[serde(default = "default_min_trade_amount")]
    pub min_trade_amount: Decimal,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    #[serde(default = "default_trail_activate_pct")]
    pub trail_activate_pct: Decimal,
    #[serde(default = "default_trail_distance_pct")]
    pub trail_distance_pct: Decimal,
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: usize,
    #[serde(default = "default_scan_interval_sec")]
    pub scan_interval_sec: u64,
    #[serde(default = "default_monitor_interval_sec")]
    pub monitor_interval_sec: u64,
    /// Slippage tolerance for every swap, basis points
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u16,
    /// Deadline for any single feed, swap or balance call
    #[serde(default = "default_external_call_timeout_secs")]
    pub external_call_timeout_secs: u64,
    #[serde(default = "default_max_candidates_per_scan")]
    pub max_candidates_per_scan: usize,
}

fn default_min_volume_usd() -> Decimal {
    dec!(50000)
}

fn default_min_momentum_pct() -> Decimal {
    dec!(2.0)
}

fn default_test_trade_usd() -> Decimal {
    dec!(0.01)
}

fn default_trade_fraction() -> Decimal {
    dec!(0.30)
}

fn default_min_trade_amount() -> Decimal {
    dec!(1)
}

fn default_stop_loss_pct() -> Decimal {
    dec!(0.10)
}

fn default_trail_activate_pct() -> Decimal {
    dec!(0.15)
}

fn default_trail_distance_pct() -> Decimal {
    dec!(0.10)
}

fn default_max_concurrent_positions() -> usize {
    3
}

fn default_scan_interval_sec() -> u64 {
    60
}

fn default_monitor_interval_sec() -> u64 {
    10
}

fn default_max_slippage_bps() -> u16 {
    300
}

fn default_external_call_timeout_secs() -> u64 {
    20
}

fn default_max_candidates_per_scan() -> usize {
    10
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            min_volume_usd: default_min_volume_usd(),
            min_momentum_pct: default_min_momentum_pct(),
            test_trade_usd: default_test_trade_usd(),
            trade_fraction: default_trade_fraction(),
            min_trade_amount: default_min_trade_amount(),
            stop_loss_pct: default_stop_loss_pct(),
            trail_activate_pct: default_trail_activate_pct(),
            trail_distance_pct: default_trail_distance_pct(),
            max_concurrent_positions: default_max_concurrent_positions(),
            scan_interval_sec: default_scan_interval_sec(),
            monitor_interval_sec: default_monitor_interval_sec(),
            max_slippage_bps: default_max_slippage_bps(),
            external_call_timeout_secs: default_external_call_timeout_secs(),
            max_candidates_per_scan: default_max_candidates_per_scan(),
        }
    }
}

/// Currency positions are bought with
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BaseSection {
    pub mint: String,
    pub symbol: String,
    pub decimals: u8,
    /// Value one unit at exactly $1 instead of asking the feed
    pub usd_pegged: bool,
}

impl Default for BaseSection {
    fn default() -> Self {
        Self {
            mint: USDC_MINT.to_string(),
            symbol: "USDC".to_string(),
            decimals: 6,
            usd_pegged: true,
        }
    }
}

/// DexScreener market feed
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DexScreenerSection {
    pub api_url: String,
    pub chain_id: String,
    /// Search terms used to discover pairs each scan
    pub search_queries: Vec<String>,
    /// Accepted quote-side symbols
    pub quote_symbols: Vec<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for DexScreenerSection {
    fn default() -> Self {
        Self {
            api_url: "https://api.dexscreener.com".to_string(),
            chain_id: "solana".to_string(),
            search_queries: vec!["SOL".to_string(), "USDC".to_string()],
            quote_symbols: PairFilter::default().quote_symbols,
            timeout_secs: 10,
            max_retries: 3,
        }
    }
}

/// Jupiter API configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JupiterSection {
    pub api_url: String,
    /// Optional API key for higher rate limits (get from jup.ag)
    pub api_key: Option<String>,
    /// Priority fee in lamports; Jupiter picks one when unset
    pub priority_fee_lamports: Option<u64>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for JupiterSection {
    fn default() -> Self {
        Self {
            api_url: "https://api.jup.ag/swap/v1".to_string(),
            api_key: None,
            priority_fee_lamports: None,
            timeout_secs: 5,
            max_retries: 3,
        }
    }
}

/// Solana RPC configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolanaSection {
    /// RPC endpoint (use private RPC for production)
    pub rpc_url: String,
    /// Wallet keypair path (NEVER commit this file!)
    pub keypair_path: String,
    /// Base58 secret key, only ever taken from SOL_PRIVATE_KEY
    #[serde(skip)]
    pub private_key: Option<String>,
}

impl Default for SolanaSection {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            keypair_path: "~/.config/solana/id.json".to_string(),
            private_key: None,
        }
    }
}

/// Paper trading simulation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperSection {
    /// Simulated base balance at startup
    pub starting_balance: Decimal,
    /// Token mints whose sells always fail, for exercising probe rejection
    pub sell_blocked: Vec<String>,
}

impl Default for PaperSection {
    fn default() -> Self {
        Self {
            starting_balance: dec!(100),
            sell_blocked: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Alerts configuration section (optional)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AlertsSection {
    /// Enable Telegram notifications
    #[serde(default)]
    pub telegram_enabled: bool,
    /// Telegram bot token
    #[serde(default)]
    pub telegram_bot_token: String,
    /// Telegram chat ID
    #[serde(default)]
    pub telegram_chat_id: String,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file, then apply process env overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Like `load_config`, but a missing file means all defaults
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    if path.as_ref().exists() {
        return load_config(path);
    }
    let mut config = Config::default();
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn override_value<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

impl Config {
    /// Apply environment overrides. `lookup` returns the raw value of a variable.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let t = &mut self.trading;
        override_value(&lookup, "MIN_VOLUME_USD", &mut t.min_volume_usd)?;
        override_value(&lookup, "MIN_MOMENTUM_PCT", &mut t.min_momentum_pct)?;
        override_value(&lookup, "TEST_TRADE_USD", &mut t.test_trade_usd)?;
        override_value(&lookup, "TRADE_FRACTION", &mut t.trade_fraction)?;
        override_value(&lookup, "STOP_LOSS_PCT", &mut t.stop_loss_pct)?;
        override_value(&lookup, "TRAIL_ACTIVATE_PCT", &mut t.trail_activate_pct)?;
        override_value(&lookup, "TRAIL_DISTANCE_PCT", &mut t.trail_distance_pct)?;
        override_value(&lookup, "MAX_CONCURRENT_POSITIONS", &mut t.max_concurrent_positions)?;
        override_value(&lookup, "SCAN_INTERVAL_SEC", &mut t.scan_interval_sec)?;
        override_value(&lookup, "MONITOR_INTERVAL_SEC", &mut t.monitor_interval_sec)?;

        override_value(&lookup, "SOLANA_RPC_URL", &mut self.solana.rpc_url)?;
        override_value(&lookup, "SOLANA_KEYPAIR_PATH", &mut self.solana.keypair_path)?;
        if let Some(secret) = lookup("SOL_PRIVATE_KEY").filter(|s| !s.trim().is_empty()) {
            self.solana.private_key = Some(secret.trim().to_string());
        }
        if let Some(key) = lookup("JUPITER_API_KEY").filter(|s| !s.trim().is_empty()) {
            self.jupiter.api_key = Some(key.trim().to_string());
        }

        let token = lookup("BOT_TOKEN");
        let chat_id = lookup("TELEGRAM_CHAT_ID");
        if let Some(token) = &token {
            self.alerts.telegram_bot_token = token.trim().to_string();
        }
        if let Some(chat_id) = &chat_id {
            self.alerts.telegram_chat_id = chat_id.trim().to_string();
        }
        if token.is_some() && chat_id.is_some() {
            self.alerts.telegram_enabled = true;
        }
        Ok(())
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.trading;

        if t.min_volume_usd < Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "min_volume_usd must be >= 0, got {}",
                t.min_volume_usd
            )));
        }

        if t.test_trade_usd <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "test_trade_usd must be > 0, got {}",
                t.test_trade_usd
            )));
        }

        if t.trade_fraction <= Decimal::ZERO || t.trade_fraction > Decimal::ONE {
            return Err(ConfigError::ValidationError(format!(
                "trade_fraction must be in (0, 1], got {}",
                t.trade_fraction
            )));
        }

        if t.min_trade_amount < Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "min_trade_amount must be >= 0, got {}",
                t.min_trade_amount
            )));
        }

        self.stop_policy()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if t.max_concurrent_positions == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_positions must be > 0".to_string(),
            ));
        }

        if t.scan_interval_sec == 0 || t.monitor_interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "scan_interval_sec and monitor_interval_sec must be > 0".to_string(),
            ));
        }

        if t.external_call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "external_call_timeout_secs must be > 0".to_string(),
            ));
        }

        if t.max_slippage_bps == 0 || t.max_slippage_bps > 10_000 {
            return Err(ConfigError::ValidationError(format!(
                "max_slippage_bps must be 1-10000, got {}",
                t.max_slippage_bps
            )));
        }

        if t.monitor_interval_sec > t.scan_interval_sec {
            tracing::warn!(
                "monitor_interval_sec ({}) is longer than scan_interval_sec ({})",
                t.monitor_interval_sec,
                t.scan_interval_sec
            );
        }

        if self.base.mint.is_empty() {
            return Err(ConfigError::ValidationError(
                "base.mint cannot be empty".to_string(),
            ));
        }

        if self.dexscreener.api_url.is_empty() || self.dexscreener.search_queries.is_empty() {
            return Err(ConfigError::ValidationError(
                "dexscreener needs an api_url and at least one search query".to_string(),
            ));
        }

        if self.jupiter.api_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "api_url cannot be empty".to_string(),
            ));
        }

        // Both Jupiter requests of a swap must fit inside the swap deadline
        let jupiter_budget = self.jupiter.timeout_secs * u64::from(self.jupiter.max_retries.max(1));
        if t.external_call_timeout_secs < jupiter_budget {
            return Err(ConfigError::ValidationError(format!(
                "external_call_timeout_secs ({}) must be >= jupiter timeout_secs * max_retries ({})",
                t.external_call_timeout_secs, jupiter_budget
            )));
        }

        if self.solana.rpc_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "rpc_url cannot be empty".to_string(),
            ));
        }

        if self.alerts.telegram_enabled
            && (self.alerts.telegram_bot_token.is_empty() || self.alerts.telegram_chat_id.is_empty())
        {
            return Err(ConfigError::ValidationError(
                "telegram alerts need both a bot token and a chat id".to_string(),
            ));
        }

        Ok(())
    }

    pub fn stop_policy(&self) -> StopPolicy {
        StopPolicy {
            stop_loss_pct: self.trading.stop_loss_pct,
            trail_activate_pct: self.trading.trail_activate_pct,
            trail_distance_pct: self.trading.trail_distance_pct,
        }
    }

    pub fn base_asset(&self) -> BaseAsset {
        BaseAsset {
            mint: self.base.mint.clone(),
            symbol: self.base.symbol.clone(),
            decimals: self.base.decimals,
            usd_pegged: self.base.usd_pegged,
        }
    }

    pub fn pair_filter(&self) -> PairFilter {
        PairFilter {
            quote_symbols: self.dexscreener.quote_symbols.clone(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.trading.external_call_timeout_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.trading.scan_interval_sec)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.trading.monitor_interval_sec)
    }
}

impl From<&Config> for ScannerConfig {
    fn from(config: &Config) -> Self {
        Self {
            min_volume_usd: config.trading.min_volume_usd,
            min_momentum_pct: config.trading.min_momentum_pct,
            filter: config.pair_filter(),
            max_candidates: config.trading.max_candidates_per_scan,
            excluded_mints: [config.base.mint.as_str(), NATIVE_SOL_MINT, USDC_MINT]
                .into_iter()
                .map(str::to_string)
                .collect(),
            call_timeout: config.call_timeout(),
        }
    }
}

impl From<&Config> for ValidatorConfig {
    fn from(config: &Config) -> Self {
        Self {
            test_trade_usd: config.trading.test_trade_usd,
            max_slippage_bps: config.trading.max_slippage_bps,
            call_timeout: config.call_timeout(),
        }
    }
}

impl From<&Config> for ManagerConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrent_positions: config.trading.max_concurrent_positions,
            stop_policy: config.stop_policy(),
            max_slippage_bps: config.trading.max_slippage_bps,
            call_timeout: config.call_timeout(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            scan_interval: config.scan_interval(),
            monitor_interval: config.monitor_interval(),
            call_timeout: config.call_timeout(),
        }
    }
}
