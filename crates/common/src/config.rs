//! Configuration surface for the feed engine.
//!
//! Everything here is immutable for the lifetime of a run: the scheduler
//! timing knobs, conversion rates, the purity table with its plausibility
//! clamp bands, the simulation tiers, and the ordered provider list.
//! Defaults mirror the dashboard's shipped dataset so the engine runs
//! without a config file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FeedError;

/// Seconds between automatic refresh cycles.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
/// HTTP timeout per provider attempt (seconds).
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;
/// Retries after a cycle fault before reporting a persistent error.
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 5_000;
const DEFAULT_BACKOFF_CAP_MS: u64 = 30_000;
/// Cooldown before the retry counter resets after a persistent error.
const DEFAULT_ERROR_COOLDOWN_SECS: u64 = 60;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub engine: EngineConfig,
    pub conversion: ConversionRates,
    /// Purity label -> conversion/clamp profile. The key set here defines the
    /// purity set of every snapshot the engine produces.
    pub purities: BTreeMap<String, PurityProfile>,
    pub simulation: SimulationConfig,
    /// Tried strictly in this order; first usable value wins.
    pub providers: Vec<ProviderSpec>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let mut purities = BTreeMap::new();
        purities.insert(
            "24K".to_string(),
            PurityProfile {
                multiplier: 1.0,
                base_price: 11_831,
                clamp_min: 5_000,
                clamp_max: 25_000,
            },
        );
        purities.insert(
            "22K".to_string(),
            PurityProfile {
                multiplier: 0.9167,
                base_price: 10_845,
                clamp_min: 4_500,
                clamp_max: 23_000,
            },
        );
        purities.insert(
            "18K".to_string(),
            PurityProfile {
                multiplier: 0.75,
                base_price: 8_873,
                clamp_min: 3_700,
                clamp_max: 19_000,
            },
        );

        Self {
            engine: EngineConfig::default(),
            conversion: ConversionRates::default(),
            purities,
            simulation: SimulationConfig::default(),
            providers: default_providers(),
        }
    }
}

impl FeedConfig {
    /// Load and validate a TOML config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let raw = std::fs::read_to_string(path)?;
        let config: FeedConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run on.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.purities.is_empty() {
            return Err(FeedError::InvalidConfig(
                "at least one purity must be configured".to_string(),
            ));
        }
        for (label, profile) in &self.purities {
            if !(profile.multiplier > 0.0 && profile.multiplier <= 1.0) {
                return Err(FeedError::InvalidConfig(format!(
                    "purity {label}: multiplier {} must be in (0, 1]",
                    profile.multiplier
                )));
            }
            if profile.clamp_min > profile.clamp_max {
                return Err(FeedError::InvalidConfig(format!(
                    "purity {label}: clamp band [{}, {}] is inverted",
                    profile.clamp_min, profile.clamp_max
                )));
            }
            if profile.base_price == 0 {
                return Err(FeedError::InvalidConfig(format!(
                    "purity {label}: base price must be positive"
                )));
            }
        }

        if !(self.conversion.exchange_rate.is_finite() && self.conversion.exchange_rate > 0.0) {
            return Err(FeedError::InvalidConfig(format!(
                "exchange rate {} must be a positive number",
                self.conversion.exchange_rate
            )));
        }
        if !(self.conversion.grams_per_unit.is_finite() && self.conversion.grams_per_unit > 0.0) {
            return Err(FeedError::InvalidConfig(format!(
                "grams per unit {} must be a positive number",
                self.conversion.grams_per_unit
            )));
        }

        if self.engine.poll_interval_secs == 0 {
            return Err(FeedError::InvalidConfig(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.engine.backoff_cap_ms < self.engine.backoff_base_ms {
            return Err(FeedError::InvalidConfig(
                "backoff cap must not be below the base delay".to_string(),
            ));
        }

        self.simulation.validate()?;

        for provider in &self.providers {
            if provider.name.is_empty() || provider.url.is_empty() {
                return Err(FeedError::InvalidConfig(
                    "provider entries need a name and a url".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Scheduler timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poll_interval_secs: u64,
    pub provider_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub error_cooldown_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            error_cooldown_secs: DEFAULT_ERROR_COOLDOWN_SECS,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }
}

/// Source-unit to canonical-unit conversion factors.
///
/// Providers quote USD per troy ounce; the dashboard wants INR per gram.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionRates {
    /// Source currency to rupees.
    pub exchange_rate: f64,
    /// Grams per source mass unit.
    pub grams_per_unit: f64,
}

impl Default for ConversionRates {
    fn default() -> Self {
        Self {
            exchange_rate: 83.20,
            grams_per_unit: 31.1035,
        }
    }
}

/// Per-purity conversion and bounds profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PurityProfile {
    /// Fractional fineness relative to 24K.
    pub multiplier: f64,
    /// Reference price-per-gram the simulator is anchored to.
    pub base_price: u64,
    /// Plausibility clamp, lower bound (rupees per gram).
    pub clamp_min: u64,
    /// Plausibility clamp, upper bound (rupees per gram).
    pub clamp_max: u64,
}

/// One external price source.
///
/// Providers are heterogeneous: each carries its own endpoint, headers,
/// optional timeout override, and parse rule. The set is fixed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Overrides `engine.provider_timeout_secs` for this provider when set.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub parse: ParseRule,
}

/// How to pull a raw spot price out of a provider response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseRule {
    /// Dotted-path lookup into a JSON document; numeric segments index arrays.
    JsonField { path: String },
    /// Candle-array responses `[[ts, low, high, open, close, vol], ...]`:
    /// takes the value at `index` of the first row.
    CandleClose { index: usize },
    /// The whole body is the number.
    PlainNumber,
}

impl ParseRule {
    /// Extract a raw spot price. Any shape mismatch yields `None`; the
    /// caller treats that as a provider failure, never as an engine fault.
    pub fn parse(&self, body: &str) -> Option<f64> {
        match self {
            ParseRule::JsonField { path } => {
                let root: Value = serde_json::from_str(body).ok()?;
                let mut node = &root;
                for segment in path.split('.') {
                    node = match node {
                        Value::Object(map) => map.get(segment)?,
                        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                value_as_f64(node)
            }
            ParseRule::CandleClose { index } => {
                let root: Value = serde_json::from_str(body).ok()?;
                let first = root.as_array()?.first()?;
                value_as_f64(first.as_array()?.get(*index)?)
            }
            ParseRule::PlainNumber => body.trim().parse().ok(),
        }
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fallback simulation bounds and movement tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Maximum deviation from the base price, as a fraction of it.
    pub max_deviation: f64,
    /// Absolute sanity floor, as a fraction of the base price. Applied after
    /// the deviation clamp; both bounds hold on every output.
    pub floor_fraction: f64,
    /// Movement tiers matched against one uniform roll, in order.
    pub tiers: Vec<PerturbationTier>,
}

/// One movement tier: probability mass and maximum move in rupees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerturbationTier {
    pub probability: f64,
    pub max_move: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_deviation: 0.15,
            floor_fraction: 0.50,
            tiers: vec![
                PerturbationTier {
                    probability: 0.70,
                    max_move: 40,
                },
                PerturbationTier {
                    probability: 0.20,
                    max_move: 150,
                },
                PerturbationTier {
                    probability: 0.10,
                    max_move: 400,
                },
            ],
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), FeedError> {
        if !(self.max_deviation > 0.0 && self.max_deviation < 1.0) {
            return Err(FeedError::InvalidConfig(format!(
                "simulation max deviation {} must be in (0, 1)",
                self.max_deviation
            )));
        }
        if !(self.floor_fraction > 0.0 && self.floor_fraction < 1.0) {
            return Err(FeedError::InvalidConfig(format!(
                "simulation floor fraction {} must be in (0, 1)",
                self.floor_fraction
            )));
        }
        if self.tiers.is_empty() {
            return Err(FeedError::InvalidConfig(
                "simulation needs at least one movement tier".to_string(),
            ));
        }
        let total: f64 = self.tiers.iter().map(|t| t.probability).sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(FeedError::InvalidConfig(format!(
                "simulation tier probabilities sum to {total}, expected 1.0"
            )));
        }
        for tier in &self.tiers {
            if tier.max_move == 0 {
                return Err(FeedError::InvalidConfig(
                    "simulation tiers need a positive max move".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn default_providers() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec {
            name: "goldprice".to_string(),
            url: "https://data-asg.goldprice.org/dbXRates/USD".to_string(),
            headers: BTreeMap::new(),
            timeout_secs: None,
            parse: ParseRule::JsonField {
                path: "items.0.xauPrice".to_string(),
            },
        },
        ProviderSpec {
            name: "metals-live".to_string(),
            url: "https://api.metals.live/v1/spot/gold".to_string(),
            headers: BTreeMap::new(),
            timeout_secs: None,
            parse: ParseRule::JsonField {
                path: "0.price".to_string(),
            },
        },
        ProviderSpec {
            name: "goldapi".to_string(),
            url: "https://www.goldapi.io/api/XAU/USD".to_string(),
            headers: BTreeMap::from([("x-access-token".to_string(), "demo".to_string())]),
            timeout_secs: None,
            parse: ParseRule::JsonField {
                path: "price".to_string(),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FeedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.purities.len(), 3);
        assert_eq!(config.providers.len(), 3);
    }

    #[test]
    fn test_json_field_parse_with_array_index() {
        let rule = ParseRule::JsonField {
            path: "items.0.xauPrice".to_string(),
        };
        let body = r#"{"ts": 1700000000, "items": [{"curr": "USD", "xauPrice": 2400.55}]}"#;
        assert_eq!(rule.parse(body), Some(2400.55));
    }

    #[test]
    fn test_json_field_parse_accepts_numeric_strings() {
        let rule = ParseRule::JsonField {
            path: "price".to_string(),
        };
        assert_eq!(rule.parse(r#"{"price": "2389.10"}"#), Some(2389.10));
    }

    #[test]
    fn test_candle_close_parse() {
        // [timestamp, low, high, open, close, volume]
        let rule = ParseRule::CandleClose { index: 4 };
        let body = "[[1700000000, 2390.0, 2410.0, 2395.0, 2402.5, 812.3]]";
        assert_eq!(rule.parse(body), Some(2402.5));
    }

    #[test]
    fn test_plain_number_parse() {
        let rule = ParseRule::PlainNumber;
        assert_eq!(rule.parse(" 2400.25\n"), Some(2400.25));
        assert_eq!(rule.parse("not a price"), None);
    }

    #[test]
    fn test_parse_failures_yield_none() {
        let rule = ParseRule::JsonField {
            path: "items.0.xauPrice".to_string(),
        };
        assert_eq!(rule.parse("{not json"), None);
        assert_eq!(rule.parse(r#"{"items": []}"#), None);
        assert_eq!(rule.parse(r#"{"items": [{"xauPrice": null}]}"#), None);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let raw = r#"
            [engine]
            poll_interval_secs = 10

            [[providers]]
            name = "test"
            url = "https://example.test/spot"
            parse = { kind = "plain_number" }
        "#;
        let config: FeedConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.engine.poll_interval_secs, 10);
        assert_eq!(config.engine.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].parse, ParseRule::PlainNumber);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_multiplier() {
        let mut config = FeedConfig::default();
        config.purities.get_mut("22K").unwrap().multiplier = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_clamp_band() {
        let mut config = FeedConfig::default();
        let profile = config.purities.get_mut("24K").unwrap();
        profile.clamp_min = profile.clamp_max + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_skewed_tier_probabilities() {
        let mut config = FeedConfig::default();
        config.simulation.tiers[0].probability = 0.9;
        assert!(config.validate().is_err());
    }
}
