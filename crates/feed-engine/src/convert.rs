use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use gold_feed_common::config::{ConversionRates, PurityProfile};
use gold_feed_common::{FeedError, PriceSnapshot};

/// Convert a raw spot price (source currency per source mass unit) into a
/// snapshot of whole-rupee per-gram prices at every configured purity.
///
/// `per_gram = spot * exchange_rate / grams_per_unit`, then each purity's
/// fractional multiplier. Rounding is to the nearest whole rupee with ties
/// away from zero. Values outside a purity's plausibility band are clamped
/// silently — a clamped value is still a successful conversion, since
/// rejecting it would leave no current price at all.
///
/// Pure: no I/O, no shared state. A non-positive or non-finite input (or a
/// non-finite intermediate from degenerate rates) is a hard error and feeds
/// the scheduler's backoff path.
pub fn convert(
    spot: f64,
    rates: &ConversionRates,
    purities: &BTreeMap<String, PurityProfile>,
    taken_at: DateTime<Utc>,
) -> Result<PriceSnapshot, FeedError> {
    if !(spot.is_finite() && spot > 0.0) {
        return Err(FeedError::InvalidSpotPrice(spot));
    }

    let per_gram = spot * rates.exchange_rate / rates.grams_per_unit;
    if !(per_gram.is_finite() && per_gram > 0.0) {
        return Err(FeedError::NonFinitePrice(spot));
    }

    let mut prices = BTreeMap::new();
    for (label, profile) in purities {
        let rounded = round_to_rupee(per_gram * profile.multiplier)?;
        prices.insert(
            label.clone(),
            rounded.clamp(profile.clamp_min, profile.clamp_max),
        );
    }

    Ok(PriceSnapshot::new(prices, taken_at))
}

/// Nearest whole rupee, ties away from zero.
fn round_to_rupee(value: f64) -> Result<u64, FeedError> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_u64())
        .ok_or(FeedError::PriceOutOfRange(value))
}
