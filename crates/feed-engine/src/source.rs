use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use gold_feed_common::config::ProviderSpec;

/// A single external spot price source.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the current raw spot price in source units (USD per troy ounce).
    async fn fetch_spot(&self) -> Result<f64>;

    /// Name of the source, for diagnostics and the UI source label.
    fn name(&self) -> &str;
}

/// HTTP-backed source driven by a [`ProviderSpec`].
///
/// One GET per fetch. Bad status, an unreadable body, a parse miss, or a
/// non-positive value all come back as errors for the chain to absorb.
pub struct HttpPriceSource {
    spec: ProviderSpec,
    client: Client,
    timeout: Duration,
}

impl HttpPriceSource {
    pub fn new(spec: ProviderSpec, client: Client, default_timeout: Duration) -> Self {
        let timeout = spec
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);
        Self {
            spec,
            client,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch_spot(&self) -> Result<f64> {
        let mut request = self.client.get(&self.spec.url).timeout(self.timeout);
        for (name, value) in &self.spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.spec.name))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "{} returned error status: {}",
                self.spec.name,
                response.status()
            );
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read {} response body", self.spec.name))?;
        debug!("{} returned {} bytes", self.spec.name, body.len());

        let spot = self
            .spec
            .parse
            .parse(&body)
            .with_context(|| format!("{} response held no spot price", self.spec.name))?;

        if !(spot.is_finite() && spot > 0.0) {
            anyhow::bail!("{} returned an unusable spot price: {}", self.spec.name, spot);
        }

        Ok(spot)
    }

    fn name(&self) -> &str {
        &self.spec.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gold_feed_common::config::ParseRule;
    use std::collections::BTreeMap;

    fn spec(timeout_secs: Option<u64>) -> ProviderSpec {
        ProviderSpec {
            name: "test".to_string(),
            url: "https://example.test/spot".to_string(),
            headers: BTreeMap::new(),
            timeout_secs,
            parse: ParseRule::PlainNumber,
        }
    }

    #[test]
    fn test_timeout_override_wins() {
        let client = Client::new();
        let default = Duration::from_secs(10);

        let source = HttpPriceSource::new(spec(None), client.clone(), default);
        assert_eq!(source.timeout(), default);

        let source = HttpPriceSource::new(spec(Some(3)), client, default);
        assert_eq!(source.timeout(), Duration::from_secs(3));
    }
}
