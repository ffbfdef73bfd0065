use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source label reported when the fallback estimator supplied the value.
pub const SIMULATED_SOURCE: &str = "simulated";

/// A complete set of per-gram prices for all tracked purities at one instant.
///
/// Immutable once constructed. Prices are whole rupees per gram, keyed by
/// purity label ("24K", "22K", ...). The key set is fixed by configuration,
/// not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    prices: BTreeMap<String, u64>,
    taken_at: DateTime<Utc>,
}

impl PriceSnapshot {
    pub fn new(prices: BTreeMap<String, u64>, taken_at: DateTime<Utc>) -> Self {
        Self { prices, taken_at }
    }

    pub fn get(&self, purity: &str) -> Option<u64> {
        self.prices.get(purity).copied()
    }

    pub fn prices(&self) -> &BTreeMap<String, u64> {
        &self.prices
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn purities(&self) -> impl Iterator<Item = &str> {
        self.prices.keys().map(String::as_str)
    }

    /// True when both snapshots track the identical purity set.
    pub fn same_purities(&self, other: &PriceSnapshot) -> bool {
        self.prices.len() == other.prices.len()
            && self.prices.keys().zip(other.prices.keys()).all(|(a, b)| a == b)
    }

    /// Per-purity change relative to `previous`, for chart/dashboard consumers.
    pub fn delta_from(&self, previous: &PriceSnapshot) -> BTreeMap<String, PriceDelta> {
        self.prices
            .iter()
            .filter_map(|(purity, &current)| {
                previous.get(purity).map(|prev| {
                    let absolute = current as i64 - prev as i64;
                    let percent = if prev == 0 {
                        0.0
                    } else {
                        (absolute as f64 / prev as f64) * 100.0
                    };
                    (purity.clone(), PriceDelta { absolute, percent })
                })
            })
            .collect()
    }
}

/// Change of a single purity between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceDelta {
    /// Whole-rupee change, negative on a drop.
    pub absolute: i64,
    /// Change relative to the previous price, in percent.
    pub percent: f64,
}

/// Connection state surfaced to the UI status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    Connected,
    Updating,
    Reconnecting,
    Error,
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FeedStatus::Connected => "connected",
            FeedStatus::Updating => "updating",
            FeedStatus::Reconnecting => "reconnecting",
            FeedStatus::Error => "error",
        };
        f.write_str(label)
    }
}
