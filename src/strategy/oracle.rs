//! Best-effort current price lookups for open positions.
//!
//! An oracle returns `None` whenever it cannot produce a price; the
//! position manager then holds the position until the next tick.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::aggregator::SharedAggregator;
use crate::source::normalize::{first_decimal, LIQUIDITY_FIELDS, PRICE_FIELDS};
use crate::source::{RateLimiter, SourceId, DEXSCREENER_BASE_URL};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn current_price(&self, address: &str) -> Option<Decimal>;
}

/// Looks up the deepest pair for a token on DexScreener.
///
/// Endpoint: `GET {base}/latest/dex/tokens/{address}`
///
/// Lookups share the DexScreener request window with the feed when a
/// limiter is attached; a refused lookup yields `None`.
pub struct DexScreenerPriceOracle {
    http: Client,
    base_url: String,
    limiter: Option<Arc<RateLimiter>>,
}

impl DexScreenerPriceOracle {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEXSCREENER_BASE_URL.to_string()),
            limiter: None,
        })
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

#[async_trait]
impl PriceOracle for DexScreenerPriceOracle {
    #[instrument(skip(self), name = "dexscreener_price")]
    async fn current_price(&self, address: &str) -> Option<Decimal> {
        if let Some(limiter) = &self.limiter {
            if !limiter.check_and_consume(SourceId::DexScreener) {
                debug!("Price lookup rate limited");
                return None;
            }
        }

        let url = format!("{}/latest/dex/tokens/{}", self.base_url, address);

        let response = match self.http.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(status = %r.status(), "Price lookup rejected");
                return None;
            }
            Err(e) => {
                debug!(error = %e, "Price lookup failed");
                return None;
            }
        };

        let body: Value = response.json().await.ok()?;
        let pairs = body.get("pairs")?.as_array()?;

        pairs
            .iter()
            .filter_map(|pair| {
                let price = first_decimal(pair, PRICE_FIELDS)?;
                let liquidity = first_decimal(pair, LIQUIDITY_FIELDS).unwrap_or_default();
                (price > Decimal::ZERO).then_some((liquidity, price))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, price)| price)
    }
}

/// Reads the latest merged price from the candidate workspace.
pub struct WorkspacePriceOracle {
    aggregator: SharedAggregator,
}

impl WorkspacePriceOracle {
    pub fn new(aggregator: SharedAggregator) -> Self {
        Self { aggregator }
    }
}

#[async_trait]
impl PriceOracle for WorkspacePriceOracle {
    async fn current_price(&self, address: &str) -> Option<Decimal> {
        self.aggregator.latest_price(address)
    }
}

/// Tries each oracle in order and returns the first price found.
pub struct OracleChain {
    oracles: Vec<Arc<dyn PriceOracle>>,
}

impl OracleChain {
    pub fn new(oracles: Vec<Arc<dyn PriceOracle>>) -> Self {
        Self { oracles }
    }
}

#[async_trait]
impl PriceOracle for OracleChain {
    async fn current_price(&self, address: &str) -> Option<Decimal> {
        for oracle in &self.oracles {
            if let Some(price) = oracle.current_price(address).await {
                return Some(price);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::config::AggregatorConfig;
    use crate::source::{Candidate, RateLimit};
    use crate::strategy::Scorer;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_dexscreener_picks_deepest_pair() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest/dex/tokens/Mint"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pairs": [
                    {"priceUsd": "0.0010", "liquidity": {"usd": 500}},
                    {"priceUsd": "0.0012", "liquidity": {"usd": 25000}},
                    {"priceUsd": null, "liquidity": {"usd": 90000}}
                ]
            })))
            .mount(&server)
            .await;

        let oracle =
            DexScreenerPriceOracle::new(Some(server.uri()), Duration::from_secs(2)).unwrap();
        assert_eq!(oracle.current_price("Mint").await, Some(dec!(0.0012)));
    }

    #[tokio::test]
    async fn test_dexscreener_errors_are_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let oracle =
            DexScreenerPriceOracle::new(Some(server.uri()), Duration::from_secs(2)).unwrap();
        assert_eq!(oracle.current_price("Mint").await, None);
    }

    #[tokio::test]
    async fn test_dexscreener_lookups_share_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest/dex/tokens/Mint"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pairs": [{"priceUsd": "0.5", "liquidity": {"usd": 1000}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let limiter = Arc::new(
            RateLimiter::new().with_limit(SourceId::DexScreener, RateLimit::new(1, 60_000)),
        );
        let oracle = DexScreenerPriceOracle::new(Some(server.uri()), Duration::from_secs(2))
            .unwrap()
            .with_rate_limiter(Arc::clone(&limiter));

        assert_eq!(oracle.current_price("Mint").await, Some(dec!(0.5)));
        assert_eq!(oracle.current_price("Mint").await, None);
        assert!(!limiter.check_and_consume(SourceId::DexScreener));
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_workspace() {
        let aggregator = Aggregator::shared(&AggregatorConfig::default(), Scorer::default());
        aggregator.ingest(Candidate::new("Mint", SourceId::DexScreener, 2).with_price(dec!(2)));

        let mut empty = MockPriceOracle::new();
        empty.expect_current_price().returning(|_| None);

        let chain = OracleChain::new(vec![
            Arc::new(empty),
            Arc::new(WorkspacePriceOracle::new(aggregator)),
        ]);
        assert_eq!(chain.current_price("Mint").await, Some(dec!(2)));
        assert_eq!(chain.current_price("Other").await, None);
    }
}
