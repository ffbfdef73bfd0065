use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use gold_feed_common::config::FeedConfig;

use crate::source::{HttpPriceSource, PriceSource};

/// Ordered chain of external price sources.
///
/// Sources are tried strictly in configured order; the first usable value
/// wins and the rest are skipped. Every kind of per-source trouble — network
/// failure, bad status, unparseable body, non-positive value, timeout — is
/// that source's failure alone and advances the chain.
pub struct ProviderChain {
    sources: Vec<Box<dyn PriceSource>>,
    per_source_timeout: Duration,
}

impl ProviderChain {
    pub fn new(sources: Vec<Box<dyn PriceSource>>, per_source_timeout: Duration) -> Self {
        Self {
            sources,
            per_source_timeout,
        }
    }

    /// Build HTTP sources for every configured provider, sharing one client.
    pub fn from_config(config: &FeedConfig) -> Self {
        let client = Client::builder()
            .user_agent("gold-feed/0.1")
            .build()
            .expect("Failed to create HTTP client");

        let default_timeout = config.engine.provider_timeout();
        let sources: Vec<Box<dyn PriceSource>> = config
            .providers
            .iter()
            .cloned()
            .map(|spec| {
                Box::new(HttpPriceSource::new(spec, client.clone(), default_timeout))
                    as Box<dyn PriceSource>
            })
            .collect();

        // The request-level timeout gets first say; the chain-level deadline
        // is the hard stop covering everything around it.
        let longest = config
            .providers
            .iter()
            .filter_map(|spec| spec.timeout_secs)
            .map(Duration::from_secs)
            .max()
            .unwrap_or(default_timeout)
            .max(default_timeout);

        Self::new(sources, longest + Duration::from_secs(1))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Try sources in order until one yields a usable value.
    ///
    /// Returns `None` when every source fails. That is an expected outcome
    /// the caller handles with the fallback estimator, not an error.
    pub async fn fetch_first_available(&self) -> Option<(f64, String)> {
        for source in &self.sources {
            match tokio::time::timeout(self.per_source_timeout, source.fetch_spot()).await {
                Ok(Ok(spot)) if spot.is_finite() && spot > 0.0 => {
                    debug!("✅ {} supplied spot price {:.2}", source.name(), spot);
                    return Some((spot, source.name().to_string()));
                }
                Ok(Ok(spot)) => {
                    warn!("❌ {} returned unusable spot price {}", source.name(), spot);
                }
                Ok(Err(e)) => {
                    warn!("❌ {} failed: {:#}", source.name(), e);
                }
                Err(_) => {
                    warn!(
                        "❌ {} timed out after {:?}",
                        source.name(),
                        self.per_source_timeout
                    );
                }
            }
        }

        warn!("every price source failed this cycle");
        None
    }
}
