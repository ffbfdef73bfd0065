//! The update scheduler.
//!
//! Drives periodic refresh cycles over the provider chain, falls back to the
//! estimator on total provider exhaustion, commits snapshots to the store,
//! and walks the backoff path on a cycle fault. At most one cycle is ever in
//! flight: a trigger arriving while one runs is dropped, not queued, so a
//! cycle's commit always happens before the next cycle starts.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use gold_feed_common::config::FeedConfig;
use gold_feed_common::{FeedError, FeedStatus, PriceSnapshot, SIMULATED_SOURCE};

use crate::chain::ProviderChain;
use crate::convert::convert;
use crate::notifier::ChangeNotifier;
use crate::simulate::SimulatedEstimator;
use crate::store::PriceStore;

/// Outcome of one refresh cycle. Consumed immediately by the scheduler.
#[derive(Debug)]
pub enum CycleResult {
    /// A provider supplied a usable value.
    Success(PriceSnapshot, String),
    /// Every provider failed; the estimator substituted a value.
    Fallback(PriceSnapshot),
    /// The cycle itself faulted outside the provider/estimator boundary.
    Failed(FeedError),
}

/// What prompted a cycle, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    Startup,
    Timer,
    Manual,
}

/// Delay before the n-th retry (1-based): `base * 2^(n-1)`, capped.
pub fn backoff_delay(retry: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let factor = 1u64 << retry.saturating_sub(1).min(20);
    Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
}

/// The live price feed engine.
///
/// Cheap to clone; every clone drives the same shared state. Constructed
/// once and handed to consumers by reference — the store behind it is the
/// process-wide source of truth for current prices.
#[derive(Clone)]
pub struct PriceFeedEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: FeedConfig,
    chain: ProviderChain,
    estimator: SimulatedEstimator,
    store: PriceStore,
    notifier: Arc<dyn ChangeNotifier>,
    /// Cycle mutual exclusion: at most one commit in flight.
    is_updating: AtomicBool,
    retry_count: AtomicU32,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    last_source: Mutex<String>,
}

impl PriceFeedEngine {
    pub fn new(config: FeedConfig, chain: ProviderChain, notifier: Arc<dyn ChangeNotifier>) -> Self {
        let estimator = SimulatedEstimator::new(config.simulation.clone(), config.purities.clone());
        Self::assemble(config, chain, estimator, notifier)
    }

    /// Engine whose estimator runs on a fixed seed, for deterministic tests.
    pub fn with_seeded_estimator(
        config: FeedConfig,
        chain: ProviderChain,
        notifier: Arc<dyn ChangeNotifier>,
        seed: u64,
    ) -> Self {
        let estimator =
            SimulatedEstimator::seeded(config.simulation.clone(), config.purities.clone(), seed);
        Self::assemble(config, chain, estimator, notifier)
    }

    fn assemble(
        config: FeedConfig,
        chain: ProviderChain,
        estimator: SimulatedEstimator,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        let initial = base_snapshot(&config);
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(EngineInner {
                store: PriceStore::new(initial),
                config,
                chain,
                estimator,
                notifier,
                is_updating: AtomicBool::new(false),
                retry_count: AtomicU32::new(0),
                running: AtomicBool::new(false),
                shutdown,
                last_source: Mutex::new(String::new()),
            }),
        }
    }

    /// The store consumers read prices from.
    pub fn store(&self) -> &PriceStore {
        &self.inner.store
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Begin periodic refresh: one immediate cycle, then a fixed-period
    /// ticker. Idempotent — calling `start` on a running engine is a no-op.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("engine already running, ignoring start()");
            return;
        }
        self.inner.shutdown.send_replace(false);

        let engine = self.clone();
        tokio::spawn(async move {
            let period = engine.inner.config.engine.poll_interval();
            let mut shutdown = engine.inner.shutdown.subscribe();
            // stop() may have landed before this task subscribed
            if *shutdown.borrow() {
                return;
            }
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            engine.run_cycle(CycleTrigger::Startup).await;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => engine.run_cycle(CycleTrigger::Timer).await,
                }
            }
            debug!("refresh loop stopped");
        });

        let engine = self.clone();
        tokio::spawn(async move { engine.countdown_loop().await });

        info!(
            "⏱ feed engine started, refreshing every {}s",
            self.inner.config.engine.poll_interval_secs
        );
    }

    /// Suppress future cycles. A cycle already in flight finishes and its
    /// result still commits; only the timers die.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.send_replace(true);
        info!("feed engine stopped");
    }

    /// User-initiated refresh: equivalent to a timer tick, plus an
    /// unconditional retry-counter reset. Dropped if a cycle is in flight.
    pub async fn refresh(&self) {
        self.inner.retry_count.store(0, Ordering::SeqCst);
        self.run_cycle(CycleTrigger::Manual).await;
    }

    /// One full cycle: fetch → normalize (or simulate) → commit, retrying
    /// with exponential backoff on a cycle fault.
    async fn run_cycle(&self, trigger: CycleTrigger) {
        let inner = &self.inner;
        if inner
            .is_updating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("cycle already in flight, dropping {trigger:?} trigger");
            return;
        }

        inner.notifier.on_status_changed(FeedStatus::Updating).await;

        loop {
            let committed = match self.attempt_cycle().await {
                CycleResult::Success(snapshot, source) => self.commit(snapshot, source).await,
                CycleResult::Fallback(snapshot) => {
                    self.commit(snapshot, SIMULATED_SOURCE.to_string()).await
                }
                CycleResult::Failed(err) => Err(err),
            };

            let err = match committed {
                Ok(()) => break,
                Err(err) => err,
            };

            let retries = inner.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
            let max_retries = inner.config.engine.max_retries;
            if retries > max_retries {
                error!("❌ cycle failed after {max_retries} retries: {err}");
                inner.notifier.on_status_changed(FeedStatus::Error).await;
                self.spawn_cooldown_reset();
                break;
            }

            let delay = backoff_delay(
                retries,
                inner.config.engine.backoff_base_ms,
                inner.config.engine.backoff_cap_ms,
            );
            warn!("cycle fault ({err}), retry {retries}/{max_retries} in {delay:?}");
            inner
                .notifier
                .on_status_changed(FeedStatus::Reconnecting)
                .await;
            tokio::time::sleep(delay).await;
        }

        inner.is_updating.store(false, Ordering::SeqCst);
    }

    async fn attempt_cycle(&self) -> CycleResult {
        let inner = &self.inner;
        match inner.chain.fetch_first_available().await {
            Some((spot, source)) => {
                match convert(spot, &inner.config.conversion, &inner.config.purities, Utc::now()) {
                    Ok(snapshot) => CycleResult::Success(snapshot, source),
                    Err(err) => CycleResult::Failed(err),
                }
            }
            None => {
                let current = inner.store.current().await;
                CycleResult::Fallback(inner.estimator.estimate(&current))
            }
        }
    }

    /// The Committing step: rotate the store, reset the retry counter, fan
    /// out to collaborators. A store rejection is a cycle fault.
    async fn commit(&self, snapshot: PriceSnapshot, source: String) -> Result<(), FeedError> {
        let inner = &self.inner;
        let (previous, current) = inner.store.commit(snapshot).await?;
        inner.retry_count.store(0, Ordering::SeqCst);

        info!("💰 committed snapshot from {source}");
        inner.notifier.on_price_updated(&previous, &current).await;

        let source_changed = {
            let mut last = inner.last_source.lock().await;
            if *last == source {
                false
            } else {
                *last = source.clone();
                true
            }
        };
        if source_changed {
            inner.notifier.on_source_changed(&source).await;
        }

        inner.notifier.on_status_changed(FeedStatus::Connected).await;
        Ok(())
    }

    fn spawn_cooldown_reset(&self) {
        let engine = self.clone();
        let cooldown = self.inner.config.engine.error_cooldown();
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            engine.inner.retry_count.store(0, Ordering::SeqCst);
            debug!("retry counter reset after cooldown");
        });
    }

    /// Cosmetic once-per-second ticker for the "next update in Ns" display.
    /// Independent of the fetch timer; dies with the shutdown signal.
    async fn countdown_loop(&self) {
        let period = self.inner.config.engine.poll_interval_secs;
        let mut shutdown = self.inner.shutdown.subscribe();
        if *shutdown.borrow() {
            return;
        }
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut remaining = period;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    remaining = if remaining == 0 {
                        period.saturating_sub(1)
                    } else {
                        remaining - 1
                    };
                    self.inner.notifier.on_countdown(remaining).await;
                }
            }
        }
    }
}

/// Snapshot of the configured base prices, used to seed the store.
fn base_snapshot(config: &FeedConfig) -> PriceSnapshot {
    let prices = config
        .purities
        .iter()
        .map(|(label, profile)| (label.clone(), profile.base_price))
        .collect();
    PriceSnapshot::new(prices, Utc::now())
}
