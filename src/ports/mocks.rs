//! In-memory fakes for every port, used by unit and integration tests.
//!
//! Each fake records its calls and lets a test script responses through
//! builder methods. State sits behind `Arc<Mutex<..>>` so clones share it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{PairFilter, PairSnapshot};
use crate::ports::{
    BalanceError, BalanceQuery, FeedError, MarketFeed, NotificationKind, Notifier, NotifyError,
    SwapError, SwapExecutor, SwapFill, SwapRequest,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct FeedState {
    pairs: Vec<PairSnapshot>,
    prices: HashMap<String, Decimal>,
    failing: bool,
    price_delay: Option<Duration>,
    price_calls: Vec<String>,
}

/// Market feed backed by a fixed pair list and a settable price table
#[derive(Debug, Default, Clone)]
pub struct FakeFeed {
    state: Arc<Mutex<FeedState>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair; its snapshot price becomes the pair's current price
    pub fn with_pair(self, pair: PairSnapshot) -> Self {
        {
            let mut state = lock(&self.state);
            state.prices.insert(pair.pair_address.clone(), pair.price_usd);
            state.pairs.push(pair);
        }
        self
    }

    pub fn with_price_delay(self, delay: Duration) -> Self {
        lock(&self.state).price_delay = Some(delay);
        self
    }

    pub fn set_price(&self, pair_address: &str, price: Decimal) {
        lock(&self.state).prices.insert(pair_address.to_string(), price);
    }

    pub fn clear_price(&self, pair_address: &str) {
        lock(&self.state).prices.remove(pair_address);
    }

    pub fn set_pairs(&self, pairs: Vec<PairSnapshot>) {
        lock(&self.state).pairs = pairs;
    }

    /// Make every call return a request error
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    pub fn price_calls(&self) -> Vec<String> {
        lock(&self.state).price_calls.clone()
    }

    fn snapshots(&self, keep: impl Fn(&PairSnapshot) -> bool) -> Result<Vec<PairSnapshot>, FeedError> {
        let state = lock(&self.state);
        if state.failing {
            return Err(FeedError::Request("fake feed offline".into()));
        }
        Ok(state
            .pairs
            .iter()
            .filter(|p| keep(p))
            .map(|p| {
                let mut snapshot = p.clone();
                snapshot.price_usd = state
                    .prices
                    .get(&p.pair_address)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                snapshot
            })
            .collect())
    }
}

#[async_trait]
impl MarketFeed for FakeFeed {
    async fn get_pairs(&self, filter: &PairFilter) -> Result<Vec<PairSnapshot>, FeedError> {
        self.snapshots(|p| p.quote_symbol.is_empty() || filter.accepts_quote(&p.quote_symbol))
    }

    async fn get_price(&self, pair_address: &str) -> Result<Option<Decimal>, FeedError> {
        let delay = {
            let mut state = lock(&self.state);
            state.price_calls.push(pair_address.to_string());
            if state.failing {
                return Err(FeedError::Request("fake feed offline".into()));
            }
            state.price_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(lock(&self.state).prices.get(pair_address).copied())
    }

    async fn get_token_pairs(&self, token_address: &str) -> Result<Vec<PairSnapshot>, FeedError> {
        self.snapshots(|p| p.token_address == token_address)
    }

    async fn search_symbol(&self, symbol: &str) -> Result<Vec<PairSnapshot>, FeedError> {
        self.snapshots(|p| p.symbol.eq_ignore_ascii_case(symbol))
    }
}

/// Scripted result for the next swap on a route
#[derive(Debug, Clone, PartialEq)]
pub enum FakeOutcome {
    Fill(Decimal),
    Fail(String),
}

type Route = (String, String);

fn route(input: &str, output: &str) -> Route {
    (input.to_string(), output.to_string())
}

#[derive(Debug, Default)]
struct SwapState {
    rates: HashMap<Route, Decimal>,
    scripted: HashMap<Route, VecDeque<FakeOutcome>>,
    blocked: HashMap<Route, String>,
    calls: Vec<SwapRequest>,
    delay: Option<Duration>,
    route_delays: HashMap<Route, Duration>,
    wallet: Option<FakeBalance>,
}

/// Swap executor that fills at a fixed rate per route unless scripted otherwise.
/// Unknown routes fill 1:1. With a linked wallet, fills move its balances and
/// a swap larger than the input balance fails.
#[derive(Debug, Default, Clone)]
pub struct FakeSwapExecutor {
    state: Arc<Mutex<SwapState>>,
}

impl FakeSwapExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output units received per input unit
    pub fn with_rate(self, input: &str, output: &str, rate: Decimal) -> Self {
        lock(&self.state).rates.insert(route(input, output), rate);
        self
    }

    /// Sleep this long inside every swap, before the outcome is decided
    pub fn with_delay(self, delay: Duration) -> Self {
        lock(&self.state).delay = Some(delay);
        self
    }

    /// Settle every fill against `wallet`
    pub fn with_wallet(self, wallet: FakeBalance) -> Self {
        lock(&self.state).wallet = Some(wallet);
        self
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        lock(&self.state).delay = delay;
    }

    /// Delay for one route only; overrides the global delay
    pub fn set_route_delay(&self, input: &str, output: &str, delay: Duration) {
        lock(&self.state).route_delays.insert(route(input, output), delay);
    }

    pub fn set_rate(&self, input: &str, output: &str, rate: Decimal) {
        lock(&self.state).rates.insert(route(input, output), rate);
    }

    /// Queue a one-off outcome ahead of the route's default behaviour
    pub fn push_outcome(&self, input: &str, output: &str, outcome: FakeOutcome) {
        lock(&self.state)
            .scripted
            .entry(route(input, output))
            .or_default()
            .push_back(outcome);
    }

    /// Fail every swap on the route until unblocked
    pub fn block(&self, input: &str, output: &str, reason: &str) {
        lock(&self.state)
            .blocked
            .insert(route(input, output), reason.to_string());
    }

    pub fn unblock(&self, input: &str, output: &str) {
        lock(&self.state).blocked.remove(&route(input, output));
    }

    pub fn calls(&self) -> Vec<SwapRequest> {
        lock(&self.state).calls.clone()
    }

    pub fn calls_between(&self, input: &str, output: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.input_mint == input && c.output_mint == output)
            .count()
    }
}

#[async_trait]
impl SwapExecutor for FakeSwapExecutor {
    async fn swap(&self, request: &SwapRequest) -> Result<SwapFill, SwapError> {
        let key = route(&request.input_mint, &request.output_mint);
        let delay = {
            let state = lock(&self.state);
            state.route_delays.get(&key).copied().or(state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (outcome, call_number, wallet) = {
            let mut state = lock(&self.state);
            state.calls.push(request.clone());
            let outcome = match state.scripted.get_mut(&key).and_then(VecDeque::pop_front) {
                Some(outcome) => outcome,
                None => match state.blocked.get(&key) {
                    Some(reason) => FakeOutcome::Fail(reason.clone()),
                    None => {
                        let rate = state.rates.get(&key).copied().unwrap_or(Decimal::ONE);
                        FakeOutcome::Fill(request.amount * rate)
                    }
                },
            };
            (outcome, state.calls.len(), state.wallet.clone())
        };

        match outcome {
            FakeOutcome::Fill(quantity) if quantity > Decimal::ZERO => {
                if let Some(wallet) = wallet {
                    wallet.apply_fill(request, quantity)?;
                }
                Ok(SwapFill {
                    filled_quantity: quantity,
                    signature: Some(format!("fake-sig-{}", call_number)),
                })
            }
            FakeOutcome::Fill(_) => Err(SwapError::NoFill),
            FakeOutcome::Fail(reason) => Err(SwapError::Rejected(reason)),
        }
    }
}

#[derive(Debug, Default)]
struct BalanceState {
    balances: HashMap<String, Decimal>,
    failing: bool,
}

#[derive(Debug, Default, Clone)]
pub struct FakeBalance {
    state: Arc<Mutex<BalanceState>>,
}

impl FakeBalance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, asset: &str, amount: Decimal) -> Self {
        self.set_balance(asset, amount);
        self
    }

    pub fn set_balance(&self, asset: &str, amount: Decimal) {
        lock(&self.state).balances.insert(asset.to_string(), amount);
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    pub fn balance_of(&self, asset: &str) -> Decimal {
        lock(&self.state).balances.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    fn apply_fill(&self, request: &SwapRequest, received: Decimal) -> Result<(), SwapError> {
        let mut state = lock(&self.state);
        let available = state.balances.get(&request.input_mint).copied().unwrap_or(Decimal::ZERO);
        if available < request.amount {
            return Err(SwapError::InsufficientFunds {
                needed: request.amount,
                available,
            });
        }
        state.balances.insert(request.input_mint.clone(), available - request.amount);
        *state.balances.entry(request.output_mint.clone()).or_default() += received;
        Ok(())
    }
}

#[async_trait]
impl BalanceQuery for FakeBalance {
    async fn get_balance(&self, asset: &str) -> Result<Decimal, BalanceError> {
        let state = lock(&self.state);
        if state.failing {
            return Err(BalanceError::Query("fake balance offline".into()));
        }
        Ok(state.balances.get(asset).copied().unwrap_or(Decimal::ZERO))
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    events: Vec<(NotificationKind, String)>,
    failing: bool,
}

/// Notifier that keeps every event in order
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    state: Arc<Mutex<NotifierState>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record events but report a transport failure for each
    pub fn failing() -> Self {
        let notifier = Self::default();
        lock(&notifier.state).failing = true;
        notifier
    }

    pub fn events(&self) -> Vec<(NotificationKind, String)> {
        lock(&self.state).events.clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        lock(&self.state)
            .events
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, kind: NotificationKind, payload: &str) -> Result<(), NotifyError> {
        let mut state = lock(&self.state);
        state.events.push((kind, payload.to_string()));
        if state.failing {
            return Err(NotifyError::Transport("recording notifier set to fail".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_fake_feed_prices() {
        let feed = FakeFeed::new().with_pair(PairSnapshot::new("Mint", "Pair", "T", dec!(2)));
        assert_eq!(feed.get_price("Pair").await.unwrap(), Some(dec!(2)));

        feed.set_price("Pair", dec!(3));
        assert_eq!(feed.get_token_price("Mint").await.unwrap(), Some(dec!(3)));

        feed.clear_price("Pair");
        assert_eq!(feed.get_price("Pair").await.unwrap(), None);
        assert_eq!(feed.price_calls(), vec!["Pair".to_string(), "Pair".to_string()]);
    }

    #[tokio::test]
    async fn test_fake_swap_script_then_default() {
        let swaps = FakeSwapExecutor::new().with_rate("USDC", "Mint", dec!(10));
        swaps.push_outcome("USDC", "Mint", FakeOutcome::Fail("no route".into()));

        let request = SwapRequest::new("USDC", "Mint", dec!(2), 100);
        assert!(swaps.swap(&request).await.is_err());
        assert_eq!(swaps.swap(&request).await.unwrap().filled_quantity, dec!(20));
        assert_eq!(swaps.calls_between("USDC", "Mint"), 2);
    }

    #[tokio::test]
    async fn test_fake_swap_block() {
        let swaps = FakeSwapExecutor::new();
        swaps.block("Mint", "USDC", "transfer hook");
        let request = SwapRequest::new("Mint", "USDC", dec!(1), 100);
        assert!(matches!(swaps.swap(&request).await, Err(SwapError::Rejected(_))));

        swaps.unblock("Mint", "USDC");
        assert!(swaps.swap(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::failing();
        assert!(notifier.notify(NotificationKind::Opened, "hi").await.is_err());
        assert_eq!(notifier.count(NotificationKind::Opened), 1);
    }

    #[tokio::test]
    async fn test_fake_swap_settles_against_wallet() {
        let wallet = FakeBalance::new().with_balance("USDC", dec!(10));
        let swaps = FakeSwapExecutor::new()
            .with_rate("USDC", "Mint", dec!(4))
            .with_wallet(wallet.clone());

        swaps.swap(&SwapRequest::new("USDC", "Mint", dec!(6), 100)).await.unwrap();
        assert_eq!(wallet.balance_of("USDC"), dec!(4));
        assert_eq!(wallet.balance_of("Mint"), dec!(24));

        let result = swaps.swap(&SwapRequest::new("USDC", "Mint", dec!(5), 100)).await;
        assert!(matches!(result, Err(SwapError::InsufficientFunds { .. })));
        assert_eq!(wallet.balance_of("USDC"), dec!(4));
    }
}
