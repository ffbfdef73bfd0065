use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use gold_feed_common::config::{PerturbationTier, PurityProfile, SimulationConfig};
use gold_feed_common::PriceSnapshot;

/// Terminal fallback: synthesizes the next snapshot when every provider
/// fails.
///
/// Each purity gets a random perturbation of its *current* price, so the
/// series stays continuous instead of snapping back to a stale base value.
/// Every output honors two bounds against the configured base price: the
/// deviation clamp and, applied last, the absolute sanity floor. No external
/// dependency, so this path cannot fail.
pub struct SimulatedEstimator {
    config: SimulationConfig,
    profiles: BTreeMap<String, PurityProfile>,
    rng: Mutex<StdRng>,
}

impl SimulatedEstimator {
    pub fn new(config: SimulationConfig, profiles: BTreeMap<String, PurityProfile>) -> Self {
        Self::with_rng(config, profiles, StdRng::from_entropy())
    }

    /// Seeded variant: identical seeds produce identical price series.
    pub fn seeded(
        config: SimulationConfig,
        profiles: BTreeMap<String, PurityProfile>,
        seed: u64,
    ) -> Self {
        Self::with_rng(config, profiles, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        config: SimulationConfig,
        profiles: BTreeMap<String, PurityProfile>,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            profiles,
            rng: Mutex::new(rng),
        }
    }

    /// Produce the next snapshot from the current one. Always succeeds.
    pub fn estimate(&self, current: &PriceSnapshot) -> PriceSnapshot {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut prices = BTreeMap::new();
        for (label, profile) in &self.profiles {
            let price = current.get(label).unwrap_or(profile.base_price);
            let delta = draw_move(&self.config.tiers, &mut *rng);
            let next = clamp_to_bounds(price as i64 + delta, profile.base_price, &self.config);
            debug!("simulated {label}: {price} {delta:+} -> {next}");
            prices.insert(label.clone(), next);
        }

        PriceSnapshot::new(prices, Utc::now())
    }
}

/// Pick the movement tier matching one uniform roll in [0, 1).
fn pick_tier(tiers: &[PerturbationTier], roll: f64) -> Option<&PerturbationTier> {
    let mut cumulative = 0.0;
    for tier in tiers {
        cumulative += tier.probability;
        if roll < cumulative {
            return Some(tier);
        }
    }
    tiers.last()
}

fn draw_move<R: Rng>(tiers: &[PerturbationTier], rng: &mut R) -> i64 {
    let Some(tier) = pick_tier(tiers, rng.gen_range(0.0..1.0)) else {
        return 0;
    };
    let magnitude = rng.gen_range(1..=tier.max_move) as i64;
    if rng.gen_bool(0.5) {
        magnitude
    } else {
        -magnitude
    }
}

/// Enforce both bounds against the base price: clamp into the deviation band
/// first, then the sanity floor last. Bounds are tightened to whole rupees
/// so outputs stay strictly inside the fractional limits.
fn clamp_to_bounds(candidate: i64, base_price: u64, config: &SimulationConfig) -> u64 {
    let base = base_price as f64;
    let lower = (base * (1.0 - config.max_deviation)).ceil();
    let upper = (base * (1.0 + config.max_deviation)).floor();
    let floor = (base * config.floor_fraction).ceil();

    let mut value = (candidate as f64).clamp(lower, upper);
    if value < floor {
        value = floor;
    }
    value as u64
}
