//! Birdeye new-listing feed (poll mode, API key required).
//!
//! Endpoint: `GET {base}/defi/v2/tokens/new_listing?limit={n}`
//! Headers: `X-API-KEY`, `x-chain: solana`
//! Returns `{"success": true, "data": {"items": [...]}}`

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use super::traits::{PollFeed, SourceDescriptor};
use super::types::SourceId;
use crate::config::SourceConfig;
use crate::error::{ConfigError, SourceError, SourceResult};

pub const BIRDEYE_BASE_URL: &str = "https://public-api.birdeye.so";
const LISTING_LIMIT: u32 = 20;

/// Polls Birdeye for tokens whose first liquidity was just added.
pub struct BirdeyeFeed {
    http: Client,
    base_url: String,
    api_key: String,
    descriptor: SourceDescriptor,
}

impl BirdeyeFeed {
    /// Build the feed. Fails when no API key is configured.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredentials {
                source_id: SourceId::Birdeye,
            })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| BIRDEYE_BASE_URL.to_string()),
            api_key,
            descriptor: SourceDescriptor::new(
                SourceId::Birdeye,
                config.priority,
                Duration::from_secs(config.interval_secs),
            ),
        })
    }
}

#[async_trait]
impl PollFeed for BirdeyeFeed {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    #[instrument(skip(self), name = "birdeye_fetch")]
    async fn fetch(&self) -> SourceResult<Vec<Value>> {
        let source = SourceId::Birdeye;
        let url = format!(
            "{}/defi/v2/tokens/new_listing?limit={}",
            self.base_url, LISTING_LIMIT
        );

        let response = self
            .http
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header("x-chain", "solana")
            .send()
            .await
            .map_err(|e| SourceError::from_http(source, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::transient(
                source,
                format!("Birdeye API error {}: {}", status, body),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::from_http(source, &e))?;

        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request rejected");
            return Err(SourceError::transient(source, message));
        }

        let items = body
            .pointer("/data/items")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::malformed(source, "response has no data.items array"))?;

        debug!(count = items.len(), "Fetched Birdeye new listings");
        Ok(items.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> SourceConfig {
        SourceConfig {
            enabled: true,
            base_url: Some(base_url),
            api_key: Some("test-key".to_string()),
            priority: 3,
            ..SourceConfig::default()
        }
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let cfg = SourceConfig {
            api_key: None,
            ..SourceConfig::default()
        };
        let err = BirdeyeFeed::new(&cfg).err().unwrap();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[tokio::test]
    async fn test_poll_sends_key_and_normalizes_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/defi/v2/tokens/new_listing"))
            .and(header("X-API-KEY", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"items": [
                    {
                        "address": "BirdMint",
                        "symbol": "BRD",
                        "name": "Bird",
                        "liquidity": 15250.75,
                        "liquidityAddedAt": "2024-05-01T12:00:00Z"
                    }
                ]}
            })))
            .mount(&server)
            .await;

        let feed = BirdeyeFeed::new(&config(server.uri())).unwrap();
        let batch = feed.poll().await;

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].address, "BirdMint");
        assert_eq!(batch[0].liquidity, dec!(15250.75));
        assert_eq!(batch[0].source_priority, 3);
        assert_eq!(batch[0].created_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "message": "quota"})),
            )
            .mount(&server)
            .await;

        let feed = BirdeyeFeed::new(&config(server.uri())).unwrap();
        assert!(matches!(
            feed.fetch().await,
            Err(SourceError::Transient { .. })
        ));
    }
}
