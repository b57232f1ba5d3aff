//! DexScreener pair search feed (poll mode).
//!
//! Endpoint: `GET {base}/latest/dex/search?q={query}`
//! Returns `{"pairs": [...]}`; only pairs on the configured chain are kept.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use super::traits::{PollFeed, SourceDescriptor};
use super::types::SourceId;
use crate::config::SourceConfig;
use crate::error::{SourceError, SourceResult};
use crate::source::normalize::first_str;

pub const DEXSCREENER_BASE_URL: &str = "https://api.dexscreener.com";
const CHAIN_ID: &str = "solana";

/// Polls DexScreener for recently active pairs.
pub struct DexScreenerFeed {
    http: Client,
    base_url: String,
    query: String,
    descriptor: SourceDescriptor,
}

impl DexScreenerFeed {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEXSCREENER_BASE_URL.to_string()),
            query: config.query.clone().unwrap_or_else(|| CHAIN_ID.to_string()),
            descriptor: SourceDescriptor::new(
                SourceId::DexScreener,
                config.priority,
                Duration::from_secs(config.interval_secs),
            ),
        })
    }
}

#[async_trait]
impl PollFeed for DexScreenerFeed {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(skip(self), name = "dexscreener_fetch")]
    async fn fetch(&self) -> SourceResult<Vec<Value>> {
        let source = SourceId::DexScreener;
        let url = format!(
            "{}/latest/dex/search?q={}",
            self.base_url,
            urlencoding::encode(&self.query)
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::from_http(source, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::transient(
                source,
                format!("DexScreener API error: {}", status),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::from_http(source, &e))?;

        let pairs = body
            .get("pairs")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::malformed(source, "response has no pairs array"))?;

        let on_chain: Vec<Value> = pairs
            .iter()
            .filter(|pair| {
                first_str(pair, &["chainId"])
                    .map(|chain| chain == CHAIN_ID)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        debug!(total = pairs.len(), kept = on_chain.len(), "Fetched DexScreener pairs");
        Ok(on_chain)
    }
}
