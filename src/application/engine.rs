//! Trading Engine
//!
//! Wires scanner, validator, sizer and position manager into the two
//! periodic cycles (scan, monitor) and exposes the operator command surface.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use super::{announce, bounded};
use super::alerts::AlertWatcher;
use super::position_manager::{CloseError, ManagerConfig, MonitorReport, OpenError, PositionManager};
use super::scanner::{CandidateScanner, ScannerConfig};
use super::scheduler::Periodic;
use super::validator::{TradeValidator, ValidatorConfig};
use crate::config::Config;
use crate::domain::{ClosedTrade, PairSnapshot, PositionSizer, PositionSummary, SizingError};
use crate::ports::market_feed::most_active;
use crate::ports::{
    BalanceError, BalanceQuery, FeedError, MarketFeed, NotificationKind, Notifier, SwapExecutor,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub scan_interval: Duration,
    pub monitor_interval: Duration,
    pub call_timeout: Duration,
}

/// Counters for one scan cycle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanReport {
    pub candidates: usize,
    pub validated: usize,
    pub rejected: usize,
    pub opened: usize,
    pub open_failures: usize,
    /// Set when the cycle stopped before trying every candidate
    pub stopped_early: Option<String>,
}

pub struct TradingEngine {
    config: EngineConfig,
    feed: Arc<dyn MarketFeed>,
    balances: Arc<dyn BalanceQuery>,
    notifier: Arc<dyn Notifier>,
    manager: Arc<PositionManager>,
    scanner: CandidateScanner,
    validator: TradeValidator,
    sizer: PositionSizer,
    alerts: AlertWatcher,
}

impl TradingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        feed: Arc<dyn MarketFeed>,
        balances: Arc<dyn BalanceQuery>,
        notifier: Arc<dyn Notifier>,
        manager: Arc<PositionManager>,
        scanner: CandidateScanner,
        validator: TradeValidator,
        sizer: PositionSizer,
        alerts: AlertWatcher,
    ) -> Self {
        Self {
            config,
            feed,
            balances,
            notifier,
            manager,
            scanner,
            validator,
            sizer,
            alerts,
        }
    }

    /// Build the full engine from loaded configuration and concrete ports
    pub fn assemble(
        config: &Config,
        feed: Arc<dyn MarketFeed>,
        swaps: Arc<dyn SwapExecutor>,
        balances: Arc<dyn BalanceQuery>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, SizingError> {
        let base = config.base_asset();
        let sizer = PositionSizer::new(config.trading.trade_fraction, config.trading.min_trade_amount)?;
        let manager = Arc::new(PositionManager::new(
            ManagerConfig::from(config),
            base.clone(),
            Arc::clone(&feed),
            Arc::clone(&swaps),
            Arc::clone(&balances),
            Arc::clone(&notifier),
        ));
        let scanner = CandidateScanner::new(Arc::clone(&feed), ScannerConfig::from(config));
        let validator = TradeValidator::new(swaps, base, ValidatorConfig::from(config));
        let alerts = AlertWatcher::new(Arc::clone(&feed), Arc::clone(&notifier), config.call_timeout());

        Ok(Self::new(
            EngineConfig::from(config),
            feed,
            balances,
            notifier,
            manager,
            scanner,
            validator,
            sizer,
            alerts,
        ))
    }

    pub fn manager(&self) -> &Arc<PositionManager> {
        &self.manager
    }

    pub fn alerts(&self) -> &AlertWatcher {
        &self.alerts
    }

    /// Start the scan and monitor loops. Both stop when `cancel` fires.
    pub fn start(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<Periodic> {
        let scan_engine = Arc::clone(self);
        let scan = Periodic::spawn("scan", self.config.scan_interval, cancel.child_token(), move || {
            let engine = Arc::clone(&scan_engine);
            async move {
                let report = engine.scan_cycle().await;
                if report.opened > 0 || report.rejected > 0 {
                    tracing::info!("Scan cycle: {:?}", report);
                }
            }
        });

        let monitor_engine = Arc::clone(self);
        let monitor = Periodic::spawn(
            "monitor",
            self.config.monitor_interval,
            cancel.child_token(),
            move || {
                let engine = Arc::clone(&monitor_engine);
                async move {
                    let report = engine.monitor_cycle().await;
                    tracing::debug!("Monitor cycle: {:?}", report);
                }
            },
        );

        vec![scan, monitor]
    }

    /// Discover, validate, size and open until capacity or balance runs out
    pub async fn scan_cycle(&self) -> ScanReport {
        let mut report = ScanReport::default();
        if !self.manager.has_capacity().await {
            tracing::debug!("Scan skipped: at capacity");
            report.stopped_early = Some("at capacity".into());
            return report;
        }

        let held = self.manager.held_tokens().await;
        let candidates = self.scanner.scan(&held).await;
        report.candidates = candidates.len();
        if candidates.is_empty() {
            return report;
        }

        let Some(base_price) = self.manager.base_price_usd().await else {
            tracing::warn!("Scan aborted: no price for the base asset");
            report.stopped_early = Some("base price unavailable".into());
            return report;
        };
        let mut balance = match self.base_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!("Scan aborted: balance unavailable: {}", e);
                report.stopped_early = Some("balance unavailable".into());
                return report;
            }
        };

        for candidate in candidates {
            if !self.manager.has_capacity().await {
                report.stopped_early = Some("at capacity".into());
                break;
            }
            if self.manager.is_held(&candidate.token_address).await {
                continue;
            }

            // The balance is fixed for the cycle, so a sizing failure applies to every remaining candidate.
            let sized = match self.sizer.size(balance) {
                Ok(sized) => sized,
                Err(e) => {
                    tracing::info!("Scan stopped before {}: {}", candidate.symbol, e);
                    report.stopped_early = Some(e.to_string());
                    break;
                }
            };

            if !self.validator.validate(&candidate, base_price).await {
                report.rejected += 1;
                continue;
            }
            report.validated += 1;

            match self.manager.open(&candidate, sized, base_price).await {
                Ok(_) => {
                    report.opened += 1;
                    balance = match self.base_balance().await {
                        Ok(fresh) => fresh,
                        Err(_) => balance - sized,
                    };
                }
                Err(OpenError::CapacityReached(_)) => {
                    report.stopped_early = Some("at capacity".into());
                    break;
                }
                Err(e) => {
                    report.open_failures += 1;
                    tracing::debug!("Open of {} skipped: {}", candidate.symbol, e);
                }
            }
        }

        report
    }

    /// Tick every open position, then check price alerts
    pub async fn monitor_cycle(&self) -> MonitorReport {
        let report = self.manager.monitor_tick(self.config.monitor_interval).await;
        self.alerts.check().await;
        report
    }

    /// Candidates as the next scan would see them, without trading
    pub async fn preview_candidates(&self) -> Vec<PairSnapshot> {
        let held = self.manager.held_tokens().await;
        self.scanner.scan(&held).await
    }

    /// Operator-initiated open. `fraction` overrides the configured trade fraction.
    pub async fn open_manual(
        &self,
        token_or_symbol: &str,
        fraction: Option<Decimal>,
    ) -> Result<PositionSummary, OpenError> {
        let candidate = self.resolve(token_or_symbol).await?;
        if self.manager.is_held(&candidate.token_address).await {
            return Err(OpenError::AlreadyOpen(candidate.token_address));
        }
        if !self.manager.has_capacity().await {
            return Err(OpenError::CapacityReached(self.manager.max_positions()));
        }

        let base_price = self
            .manager
            .base_price_usd()
            .await
            .ok_or(OpenError::PriceUnavailable)?;
        let balance = self
            .base_balance()
            .await
            .map_err(|e| OpenError::BalanceUnavailable(e.to_string()))?;

        let sized = match fraction {
            Some(fraction) => self.sizer.size_with_fraction(balance, fraction),
            None => self.sizer.size(balance),
        }
        .map_err(|e| match e {
            SizingError::InsufficientBalance { available, minimum, .. } => {
                OpenError::InsufficientBalance { available, minimum }
            }
            SizingError::InvalidFraction(f) => OpenError::InvalidFraction(f),
        })?;

        if !self.validator.validate(&candidate, base_price).await {
            announce(
                self.notifier.as_ref(),
                self.config.call_timeout,
                NotificationKind::OpenFailed,
                &format!("Open of {} refused: probe trade failed", candidate.symbol),
            )
            .await;
            return Err(OpenError::ValidationFailed(candidate.symbol));
        }

        self.manager.open(&candidate, sized, base_price).await
    }

    pub async fn close_manual(&self, token_or_symbol: &str) -> Result<ClosedTrade, CloseError> {
        self.manager.close_manual(token_or_symbol).await
    }

    pub async fn list_open_positions(&self) -> Vec<PositionSummary> {
        self.manager.list_open_positions().await
    }

    pub async fn recent_closes(&self) -> Vec<ClosedTrade> {
        self.manager.recent_closes().await
    }

    pub async fn base_balance(&self) -> Result<Decimal, BalanceError> {
        let mint = self.manager.base_asset().mint.clone();
        bounded(self.config.call_timeout, self.balances.get_balance(&mint), BalanceError::Timeout).await
    }

    /// Address lookups go through the token endpoint, everything else
    /// through symbol search; each falls back to the other when empty.
    async fn resolve(&self, token_or_symbol: &str) -> Result<PairSnapshot, OpenError> {
        let by_address = looks_like_address(token_or_symbol);
        let mut pairs = self.lookup(token_or_symbol, by_address).await;
        if pairs.is_empty() {
            pairs = self.lookup(token_or_symbol, !by_address).await;
        }

        most_active(pairs.into_iter().filter(|p| p.price_usd > Decimal::ZERO).collect())
            .ok_or_else(|| OpenError::TokenNotFound(token_or_symbol.to_string()))
    }

    async fn lookup(&self, query: &str, by_address: bool) -> Vec<PairSnapshot> {
        let result = if by_address {
            bounded(self.config.call_timeout, self.feed.get_token_pairs(query), FeedError::Timeout).await
        } else {
            bounded(self.config.call_timeout, self.feed.search_symbol(query), FeedError::Timeout).await
        };
        result.unwrap_or_else(|e| {
            tracing::debug!("Token lookup for {} failed: {}", query, e);
            Vec::new()
        })
    }
}

/// Base58 string that decodes to 32 bytes
pub fn looks_like_address(value: &str) -> bool {
    (32..=44).contains(&value.len())
        && bs58::decode(value)
            .into_vec()
            .map(|bytes| bytes.len() == 32)
            .unwrap_or(false)
}
