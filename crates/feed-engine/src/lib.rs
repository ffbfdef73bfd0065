//! Live gold price feed engine.
//!
//! Obtains a spot price from an ordered chain of unreliable external
//! providers, normalizes it to rupees per gram at each tracked purity,
//! substitutes a bounded synthetic estimate when every provider fails, and
//! repeats on a fixed period without ever overlapping cycles.

pub mod chain;
pub mod convert;
pub mod engine;
pub mod notifier;
pub mod simulate;
pub mod source;
pub mod store;

pub use chain::ProviderChain;
pub use engine::{backoff_delay, CycleResult, CycleTrigger, PriceFeedEngine};
pub use notifier::{ChangeNotifier, LogNotifier};
pub use simulate::SimulatedEstimator;
pub use source::{HttpPriceSource, PriceSource};
pub use store::{PriceStore, StoreView};
