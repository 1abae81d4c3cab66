//! Position Manager
//!
//! Owns the open-position book and drives every lifecycle transition:
//! open, per-tick stop evaluation, and close.
//!
//! Lock discipline: one async mutex guards the whole book. Capacity check
//! plus reservation, lookup plus mutation, and lookup plus removal each run
//! inside a single critical section. Feed and swap calls always happen with
//! the lock released; the lock is taken again only to apply their result.
//!
//! A swap past its deadline counts as a failure for the caller, but it is
//! never cancelled. It settles on a background task that keeps the token's
//! Opening or Closing marker until the outcome is known.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::Mutex;

use super::{announce, bounded, bounded_swap, settle_swap, SwapAttempt};
use crate::domain::{
    BaseAsset, CloseReason, ClosedTrade, PairSnapshot, Position, PositionError, PositionSummary,
    StopPolicy, TickOutcome,
};
use crate::ports::{
    BalanceError, BalanceQuery, FeedError, MarketFeed, NotificationKind, Notifier, SwapError,
    SwapExecutor, SwapFill, SwapRequest,
};

/// Closed trades kept for `recent_closes`
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Insufficient balance: {available} available, minimum trade {minimum}")]
    InsufficientBalance { available: Decimal, minimum: Decimal },
    #[error("Position already open for {0}")]
    AlreadyOpen(String),
    #[error("Capacity reached: {0} positions open or opening")]
    CapacityReached(usize),
    #[error("Validation failed for {0}")]
    ValidationFailed(String),
    #[error("Open swap failed: {0}")]
    SwapFailed(String),
    #[error("Token not found: {0}")]
    TokenNotFound(String),
    #[error("Invalid fill: {0}")]
    InvalidFill(String),
    #[error("Invalid trade fraction: {0}")]
    InvalidFraction(Decimal),
    #[error("Base asset price unavailable")]
    PriceUnavailable,
    #[error("Balance unavailable: {0}")]
    BalanceUnavailable(String),
}

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("No open position for {0}")]
    NotFound(String),
    #[error("{matches} open positions share the symbol {symbol}; close by token address")]
    AmbiguousSymbol { symbol: String, matches: usize },
    #[error("Close already in progress for {0}")]
    CloseInProgress(String),
    #[error("Close swap failed for {token}: {reason}")]
    SwapFailed { token: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub max_concurrent_positions: usize,
    pub stop_policy: StopPolicy,
    pub max_slippage_bps: u16,
    pub call_timeout: Duration,
    pub history_limit: usize,
}

/// What one position's tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickResult {
    /// Position gone or closing
    Skipped,
    NoPrice,
    Held,
    ThresholdMoved,
    Closed(ClosedTrade),
    CloseFailed,
}

/// Counters for one monitor cycle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MonitorReport {
    pub dispatched: usize,
    /// Positions skipped because their previous tick is still running
    pub coalesced: usize,
    pub closed: usize,
    pub close_failures: usize,
    pub threshold_moves: usize,
    pub no_price: usize,
    /// Ticks that outlived the cycle budget; they finish in the background
    pub still_running: usize,
}

impl MonitorReport {
    fn record(&mut self, result: &TickResult) {
        match result {
            TickResult::Closed(_) => self.closed += 1,
            TickResult::CloseFailed => self.close_failures += 1,
            TickResult::ThresholdMoved => self.threshold_moves += 1,
            TickResult::NoPrice => self.no_price += 1,
            TickResult::Held | TickResult::Skipped => {}
        }
    }
}

#[derive(Debug, Default)]
struct PositionBook {
    open: HashMap<String, Position>,
    /// Reserved by an in-progress open (Opening)
    opening: HashSet<String>,
    /// Sell swap in progress (Closing)
    closing: HashSet<String>,
    history: VecDeque<ClosedTrade>,
}

impl PositionBook {
    fn occupied(&self) -> usize {
        self.open.len() + self.opening.len()
    }

    fn holds(&self, token_address: &str) -> bool {
        self.open.contains_key(token_address) || self.opening.contains(token_address)
    }

    /// Exact address first, then case-insensitive symbol. A symbol shared
    /// by several open positions matches none of them.
    fn find_key(&self, token_or_symbol: &str) -> Result<String, CloseError> {
        if self.open.contains_key(token_or_symbol) {
            return Ok(token_or_symbol.to_string());
        }
        let matches: Vec<&Position> = self
            .open
            .values()
            .filter(|p| p.symbol.eq_ignore_ascii_case(token_or_symbol))
            .collect();
        match matches.as_slice() {
            [] => Err(CloseError::NotFound(token_or_symbol.to_string())),
            [only] => Ok(only.token_address.clone()),
            many => Err(CloseError::AmbiguousSymbol {
                symbol: token_or_symbol.to_string(),
                matches: many.len(),
            }),
        }
    }
}

/// Marks a token's tick as in flight until dropped
struct TickGuard {
    in_flight: Arc<StdMutex<HashSet<String>>>,
    token: String,
}

impl TickGuard {
    fn claim(in_flight: &Arc<StdMutex<HashSet<String>>>, token: &str) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.to_string());
        inserted.then(|| Self {
            in_flight: Arc::clone(in_flight),
            token: token.to_string(),
        })
    }
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.token);
    }
}

pub struct PositionManager {
    config: ManagerConfig,
    base: BaseAsset,
    feed: Arc<dyn MarketFeed>,
    swaps: Arc<dyn SwapExecutor>,
    balances: Arc<dyn BalanceQuery>,
    notifier: Arc<dyn Notifier>,
    book: Mutex<PositionBook>,
    in_flight: Arc<StdMutex<HashSet<String>>>,
}

impl PositionManager {
    pub fn new(
        config: ManagerConfig,
        base: BaseAsset,
        feed: Arc<dyn MarketFeed>,
        swaps: Arc<dyn SwapExecutor>,
        balances: Arc<dyn BalanceQuery>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            base,
            feed,
            swaps,
            balances,
            notifier,
            book: Mutex::new(PositionBook::default()),
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    pub fn base_asset(&self) -> &BaseAsset {
        &self.base
    }

    pub fn max_positions(&self) -> usize {
        self.config.max_concurrent_positions
    }

    /// USD value of one base unit. Pegged bases skip the feed.
    pub async fn base_price_usd(&self) -> Option<Decimal> {
        if self.base.usd_pegged {
            return Some(Decimal::ONE);
        }
        match bounded(
            self.config.call_timeout,
            self.feed.get_token_price(&self.base.mint),
            FeedError::Timeout,
        )
        .await
        {
            Ok(Some(price)) if price > Decimal::ZERO => Some(price),
            Ok(_) => {
                tracing::debug!("No price for base asset {}", self.base.symbol);
                None
            }
            Err(e) => {
                tracing::warn!("Base asset price lookup failed: {}", e);
                None
            }
        }
    }

    pub async fn has_capacity(&self) -> bool {
        self.book.lock().await.occupied() < self.config.max_concurrent_positions
    }

    pub async fn open_count(&self) -> usize {
        self.book.lock().await.open.len()
    }

    /// Open or being opened
    pub async fn is_held(&self, token_address: &str) -> bool {
        self.book.lock().await.holds(token_address)
    }

    /// Token addresses open or being opened
    pub async fn held_tokens(&self) -> HashSet<String> {
        let book = self.book.lock().await;
        book.open.keys().chain(book.opening.iter()).cloned().collect()
    }

    pub async fn list_open_positions(&self) -> Vec<PositionSummary> {
        let book = self.book.lock().await;
        let mut summaries: Vec<_> = book.open.values().map(Position::summary).collect();
        summaries.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        summaries
    }

    /// Oldest first
    pub async fn recent_closes(&self) -> Vec<ClosedTrade> {
        self.book.lock().await.history.iter().cloned().collect()
    }

    /// Buy `sized_amount` of base into the candidate and record the position.
    ///
    /// The slot is reserved before the swap and released if anything fails,
    /// so concurrent opens can never exceed capacity or duplicate a token.
    /// A buy still pending at the deadline returns `SwapFailed`; its slot
    /// stays reserved until the buy settles, and a late fill becomes a
    /// position then.
    pub async fn open(
        self: &Arc<Self>,
        candidate: &PairSnapshot,
        sized_amount: Decimal,
        base_price_usd: Decimal,
    ) -> Result<PositionSummary, OpenError> {
        let token = candidate.token_address.as_str();
        self.reserve(token).await?;

        let request = SwapRequest::new(
            self.base.mint.as_str(),
            token,
            sized_amount,
            self.config.max_slippage_bps,
        );
        match bounded_swap(self.config.call_timeout, &self.swaps, &request).await {
            SwapAttempt::Settled(Ok(fill)) => self.record_open(candidate, sized_amount, base_price_usd, fill).await,
            SwapAttempt::Settled(Err(e)) => {
                self.release(token).await;
                tracing::warn!(token = %token, "Open of {} failed: {}", candidate.symbol, e);
                self.announce(
                    NotificationKind::OpenFailed,
                    format!("Open failed for {}: {}", candidate.symbol, e),
                )
                .await;
                Err(OpenError::SwapFailed(e.to_string()))
            }
            SwapAttempt::Overdue(handle) => {
                let e = SwapError::Timeout(self.config.call_timeout);
                tracing::warn!(
                    token = %token,
                    "Open of {} failed: {}; slot held until the buy settles",
                    candidate.symbol, e
                );
                self.announce(
                    NotificationKind::OpenFailed,
                    format!("Open of {} still pending: {}. Waiting for it to settle.", candidate.symbol, e),
                )
                .await;

                let manager = Arc::clone(self);
                let candidate = candidate.clone();
                tokio::spawn(async move {
                    manager.settle_open(candidate, sized_amount, base_price_usd, handle).await;
                });
                Err(OpenError::SwapFailed(e.to_string()))
            }
        }
    }

    async fn settle_open(
        &self,
        candidate: PairSnapshot,
        sized_amount: Decimal,
        base_price_usd: Decimal,
        handle: tokio::task::JoinHandle<Result<SwapFill, SwapError>>,
    ) {
        match settle_swap(handle).await {
            Ok(fill) => {
                tracing::warn!(
                    token = %candidate.token_address,
                    "Overdue buy of {} landed; recording the position",
                    candidate.symbol
                );
                // Failures are logged and announced inside
                let _ = self.record_open(&candidate, sized_amount, base_price_usd, fill).await;
            }
            Err(e) => {
                self.release(&candidate.token_address).await;
                tracing::info!(
                    token = %candidate.token_address,
                    "Overdue buy of {} failed, slot released: {}",
                    candidate.symbol, e
                );
            }
        }
    }

    /// Turn a confirmed buy into an open position. The token must be reserved.
    async fn record_open(
        &self,
        candidate: &PairSnapshot,
        sized_amount: Decimal,
        base_price_usd: Decimal,
        fill: SwapFill,
    ) -> Result<PositionSummary, OpenError> {
        let token = candidate.token_address.as_str();
        let built = entry_price_usd(sized_amount, base_price_usd, fill.filled_quantity)
            .ok_or(PositionError::InvalidQuantity(fill.filled_quantity))
            .and_then(|entry| {
                Position::open(
                    &candidate.token_address,
                    &candidate.pair_address,
                    &candidate.symbol,
                    entry,
                    fill.filled_quantity,
                    sized_amount,
                    &self.config.stop_policy,
                )
            });
        let position = match built {
            Ok(position) => position,
            Err(e) => {
                self.release(token).await;
                tracing::error!(
                    token = %token,
                    "Bought {} of {} for {} {} but the fill is unusable ({}); tokens remain in the wallet",
                    fill.filled_quantity, candidate.symbol, sized_amount, self.base.symbol, e
                );
                self.announce(
                    NotificationKind::OpenFailed,
                    format!(
                        "Open of {} produced an invalid fill ({}); check the wallet manually",
                        candidate.symbol, e
                    ),
                )
                .await;
                return Err(OpenError::InvalidFill(e.to_string()));
            }
        };

        let summary = position.summary();
        {
            let mut book = self.book.lock().await;
            book.opening.remove(token);
            book.open.insert(token.to_string(), position);
        }

        tracing::info!(
            token = %token,
            "Opened {}: {} tokens @ ${} (stop ${}, {} {} committed)",
            summary.symbol,
            summary.quantity,
            summary.entry_price_usd.round_dp(8),
            summary.stop_loss_price.round_dp(8),
            summary.capital_committed,
            self.base.symbol
        );
        self.announce(
            NotificationKind::Opened,
            format!(
                "Opened {} @ ${} | qty {} | stop ${}",
                summary.symbol,
                summary.entry_price_usd.round_dp(8),
                summary.quantity,
                summary.stop_loss_price.round_dp(8)
            ),
        )
        .await;

        Ok(summary)
    }

    /// One monitor cycle: tick every open position concurrently.
    ///
    /// A position whose previous tick has not finished is skipped. Ticks that
    /// outlive `budget` keep running in the background and hold their
    /// in-flight marker until they finish.
    pub async fn monitor_tick(self: &Arc<Self>, budget: Duration) -> MonitorReport {
        let tokens: Vec<String> = {
            let book = self.book.lock().await;
            book.open
                .keys()
                .filter(|t| !book.closing.contains(*t))
                .cloned()
                .collect()
        };

        let mut report = MonitorReport::default();
        let mut handles = Vec::with_capacity(tokens.len());
        for token in tokens {
            let Some(guard) = TickGuard::claim(&self.in_flight, &token) else {
                tracing::debug!(token = %token, "Previous tick still in flight, skipping");
                report.coalesced += 1;
                continue;
            };
            let manager = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let _guard = guard;
                manager.tick_position(&token).await
            }));
        }
        report.dispatched = handles.len();

        let deadline = tokio::time::Instant::now() + budget;
        for handle in handles {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(result)) => report.record(&result),
                Ok(Err(e)) => tracing::error!("Tick task failed: {}", e),
                Err(_) => report.still_running += 1,
            }
        }
        report
    }

    /// Fetch a price and run one tick for a single position
    pub async fn tick_position(self: &Arc<Self>, token_address: &str) -> TickResult {
        let pair_address = {
            let book = self.book.lock().await;
            match book.open.get(token_address) {
                Some(p) if !book.closing.contains(token_address) => p.pair_address.clone(),
                _ => return TickResult::Skipped,
            }
        };

        let price = match bounded(
            self.config.call_timeout,
            self.feed.get_price(&pair_address),
            FeedError::Timeout,
        )
        .await
        {
            Ok(Some(price)) if price > Decimal::ZERO => price,
            Ok(_) => {
                tracing::debug!(token = %token_address, "No usable price, tick skipped");
                return TickResult::NoPrice;
            }
            Err(e) => {
                tracing::debug!(token = %token_address, "Price fetch failed, tick skipped: {}", e);
                return TickResult::NoPrice;
            }
        };

        self.apply_price(token_address, price).await
    }

    /// Evaluate an already fetched price. Closes on a stop hit.
    pub async fn apply_price(self: &Arc<Self>, token_address: &str, price_usd: Decimal) -> TickResult {
        let (outcome, snapshot) = {
            let mut book = self.book.lock().await;
            if book.closing.contains(token_address) {
                return TickResult::Skipped;
            }
            let Some(position) = book.open.get_mut(token_address) else {
                return TickResult::Skipped;
            };
            let outcome = position.evaluate(price_usd, &self.config.stop_policy);
            let snapshot = position.clone();
            if matches!(outcome, TickOutcome::StopHit { .. }) {
                book.closing.insert(token_address.to_string());
            }
            (outcome, snapshot)
        };

        match outcome {
            TickOutcome::Skipped => TickResult::NoPrice,
            TickOutcome::Hold(None) => {
                tracing::debug!(
                    token = %token_address,
                    price = %price_usd,
                    "{} holding, stop ${}",
                    snapshot.symbol,
                    snapshot.stop_loss_price.round_dp(8)
                );
                TickResult::Held
            }
            TickOutcome::Hold(Some(update)) => {
                let text = if update.trailing_activated {
                    format!(
                        "{} trailing active: stop raised to break-even ${} (price ${})",
                        snapshot.symbol,
                        update.new_stop.round_dp(8),
                        price_usd.round_dp(8)
                    )
                } else {
                    format!(
                        "{} stop raised ${} -> ${} (peak ${})",
                        snapshot.symbol,
                        update.previous_stop.round_dp(8),
                        update.new_stop.round_dp(8),
                        update.peak_price_usd.round_dp(8)
                    )
                };
                tracing::info!(token = %token_address, "{}", text);
                self.announce(NotificationKind::ThresholdUpdate, text).await;
                TickResult::ThresholdMoved
            }
            TickOutcome::StopHit { stop_loss_price, .. } => {
                tracing::info!(
                    token = %token_address,
                    price = %price_usd,
                    "{} hit stop ${}, closing",
                    snapshot.symbol,
                    stop_loss_price.round_dp(8)
                );
                match self.execute_close(snapshot, CloseReason::StopLoss).await {
                    Ok(trade) => TickResult::Closed(trade),
                    Err(_) => TickResult::CloseFailed,
                }
            }
        }
    }

    /// Close by exact token address
    pub async fn close(self: &Arc<Self>, token_address: &str, reason: CloseReason) -> Result<ClosedTrade, CloseError> {
        let position = self.begin_close(token_address).await?;
        self.execute_close(position, reason).await
    }

    /// Close by token address or symbol, bypassing thresholds
    pub async fn close_manual(self: &Arc<Self>, token_or_symbol: &str) -> Result<ClosedTrade, CloseError> {
        let key = self.book.lock().await.find_key(token_or_symbol)?;
        let position = self.begin_close(&key).await?;
        self.execute_close(position, CloseReason::Manual).await
    }

    /// Mark the position Closing and hand back a copy to sell
    async fn begin_close(&self, key: &str) -> Result<Position, CloseError> {
        let mut book = self.book.lock().await;
        let Some(position) = book.open.get(key).cloned() else {
            return Err(CloseError::NotFound(key.to_string()));
        };
        if !book.closing.insert(key.to_string()) {
            return Err(CloseError::CloseInProgress(key.to_string()));
        }
        Ok(position)
    }

    /// Sell the full quantity. The caller must already have marked the
    /// position Closing. A failed sell is checked against the wallet: if
    /// none of the token is left the close is recorded anyway, otherwise
    /// the marker is cleared and the position is left exactly as it was.
    async fn execute_close(self: &Arc<Self>, position: Position, reason: CloseReason) -> Result<ClosedTrade, CloseError> {
        let token = position.token_address.clone();
        let base_price = self.base_price_usd().await;

        let request = SwapRequest::new(
            token.as_str(),
            self.base.mint.as_str(),
            position.quantity,
            self.config.max_slippage_bps,
        );
        match bounded_swap(self.config.call_timeout, &self.swaps, &request).await {
            SwapAttempt::Settled(Ok(fill)) => {
                let exit_price = exit_price_usd(&position, fill.filled_quantity, base_price);
                Ok(self.finish_close(&position, exit_price, reason).await)
            }
            SwapAttempt::Settled(Err(e)) => self.recover_close(position, reason, e).await,
            SwapAttempt::Overdue(handle) => {
                let e = SwapError::Timeout(self.config.call_timeout);
                tracing::warn!(
                    token = %token,
                    "Close ({}) of {} failed: {}; position stays Closing until the sell settles",
                    reason, position.symbol, e
                );
                self.announce(
                    NotificationKind::CloseFailed,
                    format!("Close ({}) of {} still pending: {}. Waiting for it to settle.", reason, position.symbol, e),
                )
                .await;

                let manager = Arc::clone(self);
                tokio::spawn(async move {
                    match settle_swap(handle).await {
                        Ok(fill) => {
                            let exit_price = exit_price_usd(&position, fill.filled_quantity, base_price);
                            manager.finish_close(&position, exit_price, reason).await;
                        }
                        Err(e) => {
                            // Outcome is logged and announced inside
                            let _ = manager.recover_close(position, reason, e).await;
                        }
                    }
                });
                Err(CloseError::SwapFailed {
                    token,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// A sell reported failure. Record the close if the wallet no longer
    /// holds the token; otherwise reopen the position for the next tick.
    async fn recover_close(&self, position: Position, reason: CloseReason, error: SwapError) -> Result<ClosedTrade, CloseError> {
        let token = position.token_address.clone();
        match self.wallet_quantity(&token).await {
            Ok(remaining) if remaining <= Decimal::ZERO => {
                tracing::warn!(
                    token = %token,
                    "Sell of {} reported failure ({}) but the wallet holds none; recording the close",
                    position.symbol, error
                );
                let exit_price = last_known_price(&position);
                return Ok(self.finish_close(&position, exit_price, reason).await);
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(token = %token, "Wallet check after failed close unavailable: {}", e),
        }

        self.book.lock().await.closing.remove(&token);
        tracing::warn!(
            token = %token,
            "Close ({}) of {} failed, position stays open for retry: {}",
            reason, position.symbol, error
        );
        self.announce(
            NotificationKind::CloseFailed,
            format!("Close ({}) failed for {}: {}. Will retry.", reason, position.symbol, error),
        )
        .await;
        Err(CloseError::SwapFailed {
            token,
            reason: error.to_string(),
        })
    }

    /// Remove the position, record the trade and announce it
    async fn finish_close(&self, position: &Position, exit_price: Decimal, reason: CloseReason) -> ClosedTrade {
        let token = position.token_address.as_str();
        let trade = ClosedTrade::from_position(position, exit_price, reason);
        {
            let mut book = self.book.lock().await;
            book.closing.remove(token);
            book.open.remove(token);
            book.history.push_back(trade.clone());
            while book.history.len() > self.config.history_limit {
                book.history.pop_front();
            }
        }

        tracing::info!(
            token = %token,
            "Closed {} ({}): exit ${} | PnL ${}",
            trade.symbol,
            reason,
            trade.exit_price_usd.round_dp(8),
            trade.realized_pnl_usd.round_dp(4)
        );
        self.announce(
            NotificationKind::Closed,
            format!(
                "Closed {} ({}) @ ${} | PnL ${} ({}%)",
                trade.symbol,
                reason,
                trade.exit_price_usd.round_dp(8),
                trade.realized_pnl_usd.round_dp(4),
                (trade.return_pct() * Decimal::ONE_HUNDRED).round_dp(2)
            ),
        )
        .await;

        trade
    }

    async fn wallet_quantity(&self, token_address: &str) -> Result<Decimal, BalanceError> {
        bounded(
            self.config.call_timeout,
            self.balances.get_balance(token_address),
            BalanceError::Timeout,
        )
        .await
    }

    async fn reserve(&self, token_address: &str) -> Result<(), OpenError> {
        let mut book = self.book.lock().await;
        if book.holds(token_address) {
            return Err(OpenError::AlreadyOpen(token_address.to_string()));
        }
        if book.occupied() >= self.config.max_concurrent_positions {
            return Err(OpenError::CapacityReached(self.config.max_concurrent_positions));
        }
        book.opening.insert(token_address.to_string());
        Ok(())
    }

    async fn release(&self, token_address: &str) {
        self.book.lock().await.opening.remove(token_address);
    }

    async fn announce(&self, kind: NotificationKind, text: String) {
        announce(self.notifier.as_ref(), self.config.call_timeout, kind, &text).await;
    }
}

/// `capital * base_price / quantity`; `None` when the fill is empty
pub fn entry_price_usd(capital: Decimal, base_price_usd: Decimal, quantity: Decimal) -> Option<Decimal> {
    if quantity <= Decimal::ZERO {
        return None;
    }
    (capital * base_price_usd).checked_div(quantity)
}

/// Exit price from the sell proceeds. Falls back to the last observed price
/// when the base asset has no price.
fn exit_price_usd(position: &Position, proceeds: Decimal, base_price_usd: Option<Decimal>) -> Decimal {
    match base_price_usd {
        Some(base_price) if !position.quantity.is_zero() => proceeds * base_price / position.quantity,
        _ => last_known_price(position),
    }
}

fn last_known_price(position: &Position) -> Decimal {
    position.last_price_usd.unwrap_or(position.entry_price_usd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::{FakeBalance, FakeFeed, FakeOutcome, FakeSwapExecutor, RecordingNotifier};
    use rust_decimal_macros::dec;

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    struct Harness {
        manager: Arc<PositionManager>,
        feed: FakeFeed,
        swaps: FakeSwapExecutor,
        wallet: FakeBalance,
        notifier: RecordingNotifier,
    }

    fn harness(max_positions: usize) -> Harness {
        let feed = FakeFeed::new();
        let wallet = FakeBalance::new().with_balance(USDC, dec!(100000));
        let swaps = FakeSwapExecutor::new().with_wallet(wallet.clone());
        let notifier = RecordingNotifier::new();
        let manager = PositionManager::new(
            ManagerConfig {
                max_concurrent_positions: max_positions,
                stop_policy: StopPolicy {
                    stop_loss_pct: dec!(0.10),
                    trail_activate_pct: dec!(0.15),
                    trail_distance_pct: dec!(0.10),
                },
                max_slippage_bps: 300,
                call_timeout: Duration::from_secs(1),
                history_limit: DEFAULT_HISTORY_LIMIT,
            },
            BaseAsset::usdc(),
            Arc::new(feed.clone()),
            Arc::new(swaps.clone()),
            Arc::new(wallet.clone()),
            Arc::new(notifier.clone()),
        );
        Harness {
            manager: Arc::new(manager),
            feed,
            swaps,
            wallet,
            notifier,
        }
    }

    fn candidate(token: &str) -> PairSnapshot {
        PairSnapshot::new(token, format!("pair-{}", token), token, dec!(100))
    }

    /// Opens at $100 per token: 1000 USDC buys 10 tokens
    async fn open_at_100(h: &Harness, token: &str) -> PositionSummary {
        h.swaps.set_rate(USDC, token, dec!(0.01));
        h.manager.open(&candidate(token), dec!(1000), Decimal::ONE).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_uses_actual_fill_for_entry() {
        let h = harness(3);
        h.swaps.set_rate(USDC, "AAA", dec!(0.008));
        let summary = h.manager.open(&candidate("AAA"), dec!(1000), Decimal::ONE).await.unwrap();

        assert_eq!(summary.quantity, dec!(8));
        assert_eq!(summary.entry_price_usd, dec!(125));
        assert_eq!(summary.stop_loss_price, dec!(112.5));
        assert_eq!(h.notifier.count(NotificationKind::Opened), 1);
    }

    #[tokio::test]
    async fn test_open_rejects_duplicate_and_capacity() {
        let h = harness(2);
        open_at_100(&h, "AAA").await;
        assert!(matches!(
            h.manager.open(&candidate("AAA"), dec!(10), Decimal::ONE).await,
            Err(OpenError::AlreadyOpen(_))
        ));

        open_at_100(&h, "BBB").await;
        assert!(matches!(
            h.manager.open(&candidate("CCC"), dec!(10), Decimal::ONE).await,
            Err(OpenError::CapacityReached(2))
        ));
        assert_eq!(h.swaps.calls_between(USDC, "CCC"), 0);
        assert_eq!(h.manager.open_count().await, 2);
    }

    #[tokio::test]
    async fn test_failed_open_releases_reservation() {
        let h = harness(1);
        h.swaps.block(USDC, "AAA", "no route");

        let result = h.manager.open(&candidate("AAA"), dec!(10), Decimal::ONE).await;
        assert!(matches!(result, Err(OpenError::SwapFailed(_))));
        assert!(h.manager.has_capacity().await);
        assert!(!h.manager.is_held("AAA").await);
        assert_eq!(h.notifier.count(NotificationKind::OpenFailed), 1);
    }

    #[tokio::test]
    async fn test_empty_fill_creates_no_position() {
        let h = harness(1);
        h.swaps.push_outcome(USDC, "AAA", FakeOutcome::Fill(Decimal::ZERO));

        let result = h.manager.open(&candidate("AAA"), dec!(10), Decimal::ONE).await;
        assert!(result.is_err());
        assert_eq!(h.manager.open_count().await, 0);
        assert!(h.manager.has_capacity().await);
    }

    #[tokio::test]
    async fn test_tick_skips_missing_price() {
        let h = harness(1);
        open_at_100(&h, "AAA").await;

        assert_eq!(h.manager.tick_position("AAA").await, TickResult::NoPrice);
        h.feed.set_price("pair-AAA", Decimal::ZERO);
        assert_eq!(h.manager.tick_position("AAA").await, TickResult::NoPrice);

        let positions = h.manager.list_open_positions().await;
        assert_eq!(positions[0].stop_loss_price, dec!(90));
        assert_eq!(positions[0].last_price_usd, None);
    }

    #[tokio::test]
    async fn test_stop_hit_closes_with_reason() {
        let h = harness(1);
        open_at_100(&h, "AAA").await;
        h.swaps.set_rate("AAA", USDC, dec!(89));
        h.feed.set_price("pair-AAA", dec!(89));

        match h.manager.tick_position("AAA").await {
            TickResult::Closed(trade) => {
                assert_eq!(trade.reason, CloseReason::StopLoss);
                assert_eq!(trade.exit_price_usd, dec!(89));
                assert_eq!(trade.realized_pnl_usd, dec!(-110));
            }
            other => panic!("unexpected tick result {:?}", other),
        }
        assert_eq!(h.manager.open_count().await, 0);
        assert_eq!(h.manager.recent_closes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_close_keeps_position_then_retries() {
        let h = harness(1);
        open_at_100(&h, "AAA").await;
        h.swaps.push_outcome("AAA", USDC, FakeOutcome::Fail("rpc down".into()));
        h.feed.set_price("pair-AAA", dec!(80));

        assert_eq!(h.manager.tick_position("AAA").await, TickResult::CloseFailed);
        let positions = h.manager.list_open_positions().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].stop_loss_price, dec!(90));
        assert_eq!(h.notifier.count(NotificationKind::CloseFailed), 1);

        h.swaps.set_rate("AAA", USDC, dec!(80));
        assert!(matches!(h.manager.tick_position("AAA").await, TickResult::Closed(_)));
        assert_eq!(h.manager.open_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_manual_by_symbol_then_not_found() {
        let h = harness(1);
        open_at_100(&h, "AAA").await;
        h.swaps.set_rate("AAA", USDC, dec!(100));

        let trade = h.manager.close_manual("aaa").await.unwrap();
        assert_eq!(trade.reason, CloseReason::Manual);
        assert_eq!(trade.realized_pnl_usd, Decimal::ZERO);

        let sells_before = h.swaps.calls_between("AAA", USDC);
        assert!(matches!(h.manager.close_manual("AAA").await, Err(CloseError::NotFound(_))));
        assert_eq!(h.swaps.calls_between("AAA", USDC), sells_before);
        assert_eq!(h.manager.recent_closes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_threshold_update_notifies() {
        let h = harness(1);
        open_at_100(&h, "AAA").await;

        assert_eq!(h.manager.apply_price("AAA", dec!(116)).await, TickResult::ThresholdMoved);
        assert_eq!(h.manager.apply_price("AAA", dec!(118)).await, TickResult::ThresholdMoved);
        assert_eq!(h.manager.apply_price("AAA", dec!(117)).await, TickResult::Held);
        assert_eq!(h.notifier.count(NotificationKind::ThresholdUpdate), 2);
    }

    #[tokio::test]
    async fn test_monitor_tick_coalesces_in_flight_positions() {
        let feed = FakeFeed::new().with_price_delay(Duration::from_millis(300));
        let h = harness(1);
        let manager = Arc::new(PositionManager::new(
            h.manager.config.clone(),
            BaseAsset::usdc(),
            Arc::new(feed.clone()),
            Arc::new(h.swaps.clone()),
            Arc::new(h.wallet.clone()),
            Arc::new(h.notifier.clone()),
        ));
        h.swaps.set_rate(USDC, "AAA", dec!(0.01));
        manager.open(&candidate("AAA"), dec!(1000), Decimal::ONE).await.unwrap();
        feed.set_price("pair-AAA", dec!(101));

        let first = manager.monitor_tick(Duration::from_millis(20)).await;
        assert_eq!(first.dispatched, 1);
        assert_eq!(first.still_running, 1);

        let second = manager.monitor_tick(Duration::from_millis(20)).await;
        assert_eq!(second.dispatched, 0);
        assert_eq!(second.coalesced, 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let third = manager.monitor_tick(Duration::from_secs(1)).await;
        assert_eq!(third.dispatched, 1);
        assert_eq!(feed.price_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let h = harness(1);
        let manager = Arc::new(PositionManager::new(
            ManagerConfig {
                history_limit: 2,
                ..h.manager.config.clone()
            },
            BaseAsset::usdc(),
            Arc::new(h.feed.clone()),
            Arc::new(h.swaps.clone()),
            Arc::new(h.wallet.clone()),
            Arc::new(h.notifier.clone()),
        ));
        for token in ["A1", "A2", "A3"] {
            h.swaps.set_rate(USDC, token, dec!(1));
            manager.open(&candidate(token), dec!(10), Decimal::ONE).await.unwrap();
            manager.close_manual(token).await.unwrap();
        }
        let history = manager.recent_closes().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].token_address, "A2");
    }

    #[tokio::test]
    async fn test_close_by_shared_symbol_is_ambiguous() {
        let h = harness(3);
        for token in ["MintA", "MintB"] {
            h.swaps.set_rate(USDC, token, dec!(0.01));
            let pair = PairSnapshot::new(token, format!("pair-{}", token), "DOGE", dec!(100));
            h.manager.open(&pair, dec!(1000), Decimal::ONE).await.unwrap();
        }

        match h.manager.close_manual("doge").await {
            Err(CloseError::AmbiguousSymbol { symbol, matches }) => {
                assert_eq!(symbol, "doge");
                assert_eq!(matches, 2);
            }
            other => panic!("expected an ambiguous symbol, got {:?}", other),
        }
        assert_eq!(h.swaps.calls_between("MintA", USDC) + h.swaps.calls_between("MintB", USDC), 0);

        h.manager.close_manual("MintA").await.unwrap();
        let trade = h.manager.close_manual("DOGE").await.unwrap();
        assert_eq!(trade.token_address, "MintB");
    }

    #[tokio::test]
    async fn test_failed_sell_with_empty_wallet_records_close() {
        let h = harness(1);
        open_at_100(&h, "AAA").await;
        h.wallet.set_balance("AAA", Decimal::ZERO);
        h.swaps.block("AAA", USDC, "insufficient funds");

        match h.manager.apply_price("AAA", dec!(85)).await {
            TickResult::Closed(trade) => {
                assert_eq!(trade.reason, CloseReason::StopLoss);
                assert_eq!(trade.exit_price_usd, dec!(85));
                assert_eq!(trade.realized_pnl_usd, dec!(-150));
            }
            other => panic!("unexpected tick result {:?}", other),
        }
        assert_eq!(h.manager.open_count().await, 0);
        assert_eq!(h.notifier.count(NotificationKind::CloseFailed), 0);
        assert_eq!(h.notifier.count(NotificationKind::Closed), 1);
    }

    #[test]
    fn test_entry_price_helper() {
        assert_eq!(entry_price_usd(dec!(30), dec!(150), dec!(9000)), Some(dec!(0.5)));
        assert_eq!(entry_price_usd(dec!(30), dec!(1), Decimal::ZERO), None);
    }
}
