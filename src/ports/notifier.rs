use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification transport failed: {0}")]
    Transport(String),
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Opened,
    Closed,
    ThresholdUpdate,
    OpenFailed,
    CloseFailed,
    PriceAlert,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NotificationKind::Opened => "opened",
            NotificationKind::Closed => "closed",
            NotificationKind::ThresholdUpdate => "threshold_update",
            NotificationKind::OpenFailed => "open_failed",
            NotificationKind::CloseFailed => "close_failed",
            NotificationKind::PriceAlert => "price_alert",
        };
        f.write_str(label)
    }
}

/// Outbound operator messages. Callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: NotificationKind, payload: &str) -> Result<(), NotifyError>;
}
