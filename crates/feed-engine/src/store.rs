use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use gold_feed_common::{FeedError, PriceSnapshot};

/// Single source of truth for "what is the price now".
///
/// Written only by the scheduler's commit step; read freely by consumers.
/// A commit replaces the whole snapshot under one write lock, so readers can
/// never observe a torn update. `current` and `previous` always carry the
/// identical purity key set.
pub struct PriceStore {
    inner: RwLock<StoreState>,
}

#[derive(Debug, Clone)]
struct StoreState {
    current: PriceSnapshot,
    previous: PriceSnapshot,
    last_updated: DateTime<Utc>,
}

/// Read-only copy of the store at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct StoreView {
    pub current: PriceSnapshot,
    pub previous: PriceSnapshot,
    pub last_updated: DateTime<Utc>,
}

impl PriceStore {
    /// Seed the store; `current` and `previous` both start at `initial`.
    pub fn new(initial: PriceSnapshot) -> Self {
        Self {
            inner: RwLock::new(StoreState {
                previous: initial.clone(),
                current: initial,
                last_updated: Utc::now(),
            }),
        }
    }

    pub async fn current(&self) -> PriceSnapshot {
        self.inner.read().await.current.clone()
    }

    pub async fn last_updated(&self) -> DateTime<Utc> {
        self.inner.read().await.last_updated
    }

    pub async fn view(&self) -> StoreView {
        let state = self.inner.read().await;
        StoreView {
            current: state.current.clone(),
            previous: state.previous.clone(),
            last_updated: state.last_updated,
        }
    }

    /// Rotate `current` into `previous`, install `next`, stamp the clock.
    ///
    /// Returns the `(previous, current)` pair collaborators should be told
    /// about. A snapshot whose purity set differs from the store's is a
    /// programming fault upstream and is rejected whole.
    pub async fn commit(
        &self,
        next: PriceSnapshot,
    ) -> Result<(PriceSnapshot, PriceSnapshot), FeedError> {
        let mut state = self.inner.write().await;

        if !state.current.same_purities(&next) {
            return Err(FeedError::PurityMismatch {
                expected: state.current.purities().map(str::to_string).collect(),
                got: next.purities().map(str::to_string).collect(),
            });
        }

        state.previous = std::mem::replace(&mut state.current, next);
        state.last_updated = Utc::now();

        Ok((state.previous.clone(), state.current.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot(pairs: &[(&str, u64)]) -> PriceSnapshot {
        let prices: BTreeMap<String, u64> =
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        PriceSnapshot::new(prices, Utc::now())
    }

    #[tokio::test]
    async fn test_commit_rotates_current_into_previous() {
        let store = PriceStore::new(snapshot(&[("24K", 11_831)]));
        let before = store.last_updated().await;

        let (previous, current) = store.commit(snapshot(&[("24K", 12_000)])).await.unwrap();

        assert_eq!(previous.get("24K"), Some(11_831));
        assert_eq!(current.get("24K"), Some(12_000));
        assert_eq!(store.current().await.get("24K"), Some(12_000));
        assert!(store.last_updated().await >= before);
    }

    #[tokio::test]
    async fn test_commit_rejects_purity_set_mismatch() {
        let store = PriceStore::new(snapshot(&[("24K", 11_831), ("22K", 10_845)]));

        let result = store.commit(snapshot(&[("24K", 12_000)])).await;
        assert!(matches!(result, Err(FeedError::PurityMismatch { .. })));

        // Store is untouched by the rejected commit
        let view = store.view().await;
        assert_eq!(view.current.get("24K"), Some(11_831));
        assert_eq!(view.current.get("22K"), Some(10_845));
    }
}
