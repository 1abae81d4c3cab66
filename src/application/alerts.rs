//! Price alert watcher
//!
//! Holds one-shot alerts and checks them once per monitor cycle. Prices are
//! fetched outside the alert lock, one request per distinct pair.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{announce, bounded};
use crate::domain::{AlertError, PriceAlert};
use crate::ports::{FeedError, MarketFeed, NotificationKind, Notifier};

pub struct AlertWatcher {
    feed: Arc<dyn MarketFeed>,
    notifier: Arc<dyn Notifier>,
    alerts: Mutex<Vec<PriceAlert>>,
    next_id: AtomicU64,
    call_timeout: Duration,
}

impl AlertWatcher {
    pub fn new(feed: Arc<dyn MarketFeed>, notifier: Arc<dyn Notifier>, call_timeout: Duration) -> Self {
        Self {
            feed,
            notifier,
            alerts: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            call_timeout,
        }
    }

    /// Create an alert relative to the pair's current price
    pub async fn add(&self, pair_address: &str, target_price_usd: Decimal) -> Result<PriceAlert, AlertError> {
        let current = self
            .price(pair_address)
            .await
            .ok_or_else(|| AlertError::PriceUnavailable(pair_address.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let alert = PriceAlert::new(id, pair_address, target_price_usd, current)?;
        tracing::info!(
            "Alert #{} set: {} {} ${} (now ${})",
            alert.id, pair_address, alert.direction, target_price_usd, current
        );
        self.alerts.lock().await.push(alert.clone());
        Ok(alert)
    }

    pub async fn remove(&self, id: u64) -> bool {
        let mut alerts = self.alerts.lock().await;
        let before = alerts.len();
        alerts.retain(|a| a.id != id);
        alerts.len() != before
    }

    pub async fn list(&self) -> Vec<PriceAlert> {
        self.alerts.lock().await.clone()
    }

    /// Fire and drop every alert whose condition holds. Pairs without a
    /// price leave their alerts untouched.
    pub async fn check(&self) -> Vec<PriceAlert> {
        let pairs: HashSet<String> = self
            .alerts
            .lock()
            .await
            .iter()
            .map(|a| a.pair_address.clone())
            .collect();
        if pairs.is_empty() {
            return Vec::new();
        }

        let mut prices = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            if let Some(price) = self.price(&pair).await {
                prices.insert(pair, price);
            }
        }

        let fired: Vec<(PriceAlert, Decimal)> = {
            let mut alerts = self.alerts.lock().await;
            let mut fired = Vec::new();
            alerts.retain(|alert| match prices.get(&alert.pair_address) {
                Some(price) if alert.is_triggered(*price) => {
                    fired.push((alert.clone(), *price));
                    false
                }
                _ => true,
            });
            fired
        };

        for (alert, price) in &fired {
            let text = format!(
                "Alert #{}: {} is {} ${} (now ${})",
                alert.id, alert.pair_address, alert.direction, alert.target_price_usd, price
            );
            tracing::info!("{}", text);
            announce(self.notifier.as_ref(), self.call_timeout, NotificationKind::PriceAlert, &text).await;
        }
        fired.into_iter().map(|(alert, _)| alert).collect()
    }

    async fn price(&self, pair_address: &str) -> Option<Decimal> {
        match bounded(self.call_timeout, self.feed.get_price(pair_address), FeedError::Timeout).await {
            Ok(Some(price)) if price > Decimal::ZERO => Some(price),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Alert price fetch for {} failed: {}", pair_address, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PairSnapshot;
    use crate::ports::mocks::{FakeFeed, RecordingNotifier};
    use rust_decimal_macros::dec;

    fn watcher(feed: &FakeFeed, notifier: &RecordingNotifier) -> AlertWatcher {
        AlertWatcher::new(Arc::new(feed.clone()), Arc::new(notifier.clone()), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_alert_fires_once() {
        let feed = FakeFeed::new().with_pair(PairSnapshot::new("Mint", "Pair", "T", dec!(1)));
        let notifier = RecordingNotifier::new();
        let w = watcher(&feed, &notifier);

        let alert = w.add("Pair", dec!(1.5)).await.unwrap();
        assert!(w.check().await.is_empty());

        feed.set_price("Pair", dec!(1.6));
        let fired = w.check().await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, alert.id);
        assert!(w.list().await.is_empty());
        assert!(w.check().await.is_empty());
        assert_eq!(notifier.count(NotificationKind::PriceAlert), 1);
    }

    #[tokio::test]
    async fn test_missing_price_keeps_alert() {
        let feed = FakeFeed::new().with_pair(PairSnapshot::new("Mint", "Pair", "T", dec!(1)));
        let notifier = RecordingNotifier::new();
        let w = watcher(&feed, &notifier);
        w.add("Pair", dec!(0.5)).await.unwrap();

        feed.clear_price("Pair");
        assert!(w.check().await.is_empty());
        assert_eq!(w.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_current_price_and_unknown_pair() {
        let feed = FakeFeed::new().with_pair(PairSnapshot::new("Mint", "Pair", "T", dec!(1)));
        let w = watcher(&feed, &RecordingNotifier::new());

        assert_eq!(w.add("Pair", dec!(1)).await, Err(AlertError::AtCurrentPrice(dec!(1))));
        assert_eq!(
            w.add("Nope", dec!(1)).await,
            Err(AlertError::PriceUnavailable("Nope".into()))
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let feed = FakeFeed::new().with_pair(PairSnapshot::new("Mint", "Pair", "T", dec!(1)));
        let w = watcher(&feed, &RecordingNotifier::new());
        let alert = w.add("Pair", dec!(2)).await.unwrap();
        assert!(w.remove(alert.id).await);
        assert!(!w.remove(alert.id).await);
    }
}
