use async_trait::async_trait;
use tracing::info;

use gold_feed_common::format::{format_inr, format_inr_delta};
use gold_feed_common::{FeedStatus, PriceSnapshot};

/// Collaborator interface for dashboard and chart consumers.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// A new snapshot was committed.
    async fn on_price_updated(&self, previous: &PriceSnapshot, current: &PriceSnapshot);

    /// The UI-visible data source label changed ("goldprice", "simulated", ...).
    async fn on_source_changed(&self, label: &str);

    /// The connection status indicator changed.
    async fn on_status_changed(&self, status: FeedStatus);

    /// Cosmetic seconds-until-next-refresh ticker. Not part of correctness.
    async fn on_countdown(&self, _seconds_remaining: u64) {}
}

/// Notifier that renders updates into the process log.
pub struct LogNotifier;

#[async_trait]
impl ChangeNotifier for LogNotifier {
    async fn on_price_updated(&self, previous: &PriceSnapshot, current: &PriceSnapshot) {
        for (purity, delta) in current.delta_from(previous) {
            let price = current.get(&purity).unwrap_or_default();
            info!(
                "💰 {purity}: {}/g ({}, {:+.2}%)",
                format_inr(price),
                format_inr_delta(delta.absolute),
                delta.percent
            );
        }
    }

    async fn on_source_changed(&self, label: &str) {
        info!("📡 price source: {label}");
    }

    async fn on_status_changed(&self, status: FeedStatus) {
        info!("feed status: {status}");
    }
}
