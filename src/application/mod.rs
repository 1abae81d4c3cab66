//! Application Layer - Use cases wired over the ports
//!
//! - `scanner`: candidate discovery
//! - `validator`: probe buy/sell tradeability check
//! - `position_manager`: open book and lifecycle transitions
//! - `alerts`: one-shot price alerts
//! - `scheduler`: periodic task runner
//! - `engine`: scan and monitor cycles plus the command surface

pub mod alerts;
pub mod engine;
pub mod position_manager;
pub mod scanner;
pub mod scheduler;
pub mod validator;

pub use alerts::AlertWatcher;
pub use engine::{EngineConfig, ScanReport, TradingEngine};
pub use position_manager::{
    CloseError, ManagerConfig, MonitorReport, OpenError, PositionManager, TickResult,
    DEFAULT_HISTORY_LIMIT,
};
pub use scanner::{CandidateScanner, ScannerConfig};
pub use scheduler::Periodic;
pub use validator::{ProbeOutcome, TradeValidator, ValidatorConfig};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::ports::{NotificationKind, Notifier, SwapError, SwapExecutor, SwapFill, SwapRequest};

/// Run an external call with a deadline; elapsed maps to the caller's timeout error
pub(crate) async fn bounded<T, E, F>(
    limit: Duration,
    call: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}

/// A swap raced against its deadline
pub(crate) enum SwapAttempt {
    Settled(Result<SwapFill, SwapError>),
    /// The deadline passed. The swap keeps running on its own task and may
    /// still land; the handle yields its result.
    Overdue(JoinHandle<Result<SwapFill, SwapError>>),
}

/// Run a swap on its own task and wait up to `limit` for it.
///
/// Unlike `bounded`, an expired deadline never drops the swap: a
/// transaction already broadcast runs to confirmation.
pub(crate) async fn bounded_swap(
    limit: Duration,
    swaps: &Arc<dyn SwapExecutor>,
    request: &SwapRequest,
) -> SwapAttempt {
    let swaps = Arc::clone(swaps);
    let request = request.clone();
    let mut handle = tokio::spawn(async move { swaps.swap(&request).await });
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(joined) => SwapAttempt::Settled(flatten_join(joined)),
        Err(_) => SwapAttempt::Overdue(handle),
    }
}

/// Wait for an overdue swap to finish
pub(crate) async fn settle_swap(handle: JoinHandle<Result<SwapFill, SwapError>>) -> Result<SwapFill, SwapError> {
    flatten_join(handle.await)
}

fn flatten_join(
    joined: Result<Result<SwapFill, SwapError>, tokio::task::JoinError>,
) -> Result<SwapFill, SwapError> {
    joined.unwrap_or_else(|e| Err(SwapError::Api(format!("swap task failed: {}", e))))
}

/// Send a notification; failures are logged and swallowed
pub(crate) async fn announce(
    notifier: &dyn Notifier,
    limit: Duration,
    kind: NotificationKind,
    text: &str,
) {
    match tokio::time::timeout(limit, notifier.notify(kind, text)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Notification ({}) failed: {}", kind, e),
        Err(_) => tracing::warn!("Notification ({}) timed out after {:?}", kind, limit),
    }
}
