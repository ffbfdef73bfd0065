
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use gold_feed_common::config::FeedConfig;
use gold_feed_common::FeedStatus;
use gold_feed_engine::{PriceFeedEngine, PriceSource, ProviderChain};
use mock_feed::{RecordingNotifier, StubSource};

fn chain(sources: Vec<Box<dyn PriceSource>>) -> ProviderChain {
    ProviderChain::new(sources, Duration::from_millis(500))
}

#[tokio::test]
async fn test_overlapping_triggers_run_exactly_one_cycle() {
    // Given - a healthy but slow source
    let slow = StubSource::ok("slow", 2400.0).with_delay(Duration::from_millis(100));
    let calls = slow.call_counter();
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = PriceFeedEngine::new(
        FeedConfig::default(),
        chain(vec![Box::new(slow)]),
        notifier.clone(),
    );

    // When - two triggers land while the first cycle is still in flight
    tokio::join!(engine.refresh(), engine.refresh());

    // Then - the second trigger was dropped, not queued
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.price_updates(), 1);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let source = StubSource::ok("goldprice", 2400.0);
    let calls = source.call_counter();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut config = FeedConfig::default();
    config.engine.poll_interval_secs = 30;
    let engine = PriceFeedEngine::new(config, chain(vec![Box::new(source)]), notifier.clone());

    // When - started twice
    engine.start();
    engine.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.stop();

    // Then - only one startup cycle ran
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.price_updates(), 1);
}

#[tokio::test]
async fn test_stop_mid_cycle_commits_then_goes_quiet() {
    // Given - a running engine whose cycle takes a while
    let slow = StubSource::ok("slow", 2400.0).with_delay(Duration::from_millis(120));
    let calls = slow.call_counter();
    let notifier = Arc::new(RecordingNotifier::default());
    let mut config = FeedConfig::default();
    config.engine.poll_interval_secs = 1;
    let engine = PriceFeedEngine::new(config, chain(vec![Box::new(slow)]), notifier.clone());

    engine.start();
    assert!(engine.is_running());

    // When - stopped while the first cycle is still fetching
    tokio::time::sleep(Duration::from_millis(40)).await;
    engine.stop();
    assert!(!engine.is_running());

    // Then - the in-flight cycle still lands, with no torn state
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(notifier.price_updates(), 1);
    assert_eq!(engine.store().current().await.get("24K"), Some(6_420));

    // ... and no further automatic cycle starts after the old tick boundary
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.price_updates(), 1);
}

#[tokio::test]
async fn test_cycle_fault_walks_backoff_then_reports_error() {
    // Given - a healthy provider but degenerate conversion rates, so the
    // fault happens outside the provider boundary
    let source = StubSource::ok("goldprice", 2400.0);
    let calls = source.call_counter();
    let notifier = Arc::new(RecordingNotifier::default());

    let mut config = FeedConfig::default();
    config.conversion.grams_per_unit = 0.0;
    config.engine.max_retries = 2;
    config.engine.backoff_base_ms = 10;
    config.engine.backoff_cap_ms = 40;
    config.engine.error_cooldown_secs = 60;

    let engine = PriceFeedEngine::new(config, chain(vec![Box::new(source)]), notifier.clone());

    // When
    engine.refresh().await;

    // Then - initial attempt plus two retries, then a persistent error
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        notifier.statuses(),
        vec![
            FeedStatus::Updating,
            FeedStatus::Reconnecting,
            FeedStatus::Reconnecting,
            FeedStatus::Error,
        ]
    );

    // ... the store still serves the last good snapshot
    assert_eq!(notifier.price_updates(), 0);
    assert_eq!(engine.store().current().await.get("24K"), Some(11_831));
}

#[tokio::test]
async fn test_manual_refresh_resets_the_retry_counter() {
    // Given - a permanently faulting cycle (healthy provider, degenerate
    // rates) that has already walked to the persistent-error state
    let source = StubSource::ok("goldprice", 2400.0);
    let notifier = Arc::new(RecordingNotifier::default());

    let mut config = FeedConfig::default();
    config.conversion.grams_per_unit = 0.0;
    config.engine.max_retries = 1;
    config.engine.backoff_base_ms = 10;
    config.engine.backoff_cap_ms = 20;
    config.engine.error_cooldown_secs = 60;

    let engine = PriceFeedEngine::new(config, chain(vec![Box::new(source)]), notifier.clone());

    engine.refresh().await;
    assert_eq!(
        notifier.statuses(),
        vec![
            FeedStatus::Updating,
            FeedStatus::Reconnecting,
            FeedStatus::Error,
        ]
    );

    // When - the user refreshes again, well inside the cooldown window
    engine.refresh().await;

    // Then - the counter was reset unconditionally: the new cycle earns a
    // fresh Reconnecting retry instead of failing straight to Error
    assert_eq!(
        notifier.statuses(),
        vec![
            FeedStatus::Updating,
            FeedStatus::Reconnecting,
            FeedStatus::Error,
            FeedStatus::Updating,
            FeedStatus::Reconnecting,
            FeedStatus::Error,
        ]
    );
}
