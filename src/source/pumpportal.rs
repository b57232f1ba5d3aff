//! PumpPortal new-token websocket feed (push mode).
//!
//! Sends `{"method":"subscribeNewToken"}` after connecting and then receives
//! one JSON message per token creation. Amounts arrive in SOL and are
//! converted to USD with the configured SOL price.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::info;

use super::normalize::{first_decimal, normalize_record};
use super::traits::{PushFeed, RawStream, SourceDescriptor};
use super::types::{Candidate, SourceId};
use crate::config::SourceConfig;
use crate::error::{SourceError, SourceResult};

pub const PUMPPORTAL_WS_URL: &str = "wss://pumpportal.fun/api/data";
const SUBSCRIBE_NEW_TOKEN: &str = r#"{"method":"subscribeNewToken"}"#;

/// Streams freshly minted bonding-curve tokens.
pub struct PumpPortalFeed {
    url: String,
    sol_usd: Decimal,
    descriptor: SourceDescriptor,
}

impl PumpPortalFeed {
    pub fn new(config: &SourceConfig, sol_usd: Decimal) -> Self {
        Self {
            url: config
                .base_url
                .clone()
                .unwrap_or_else(|| PUMPPORTAL_WS_URL.to_string()),
            sol_usd,
            descriptor: SourceDescriptor::new(
                SourceId::PumpPortal,
                config.priority,
                Duration::from_secs(config.interval_secs),
            ),
        }
    }
}

#[async_trait]
impl PushFeed for PumpPortalFeed {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn connect(&self) -> SourceResult<RawStream> {
        let source = SourceId::PumpPortal;
        info!(url = %self.url, "Connecting to PumpPortal websocket");

        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SourceError::transient(source, e.to_string()))?;

        ws.send(Message::Text(SUBSCRIBE_NEW_TOKEN.to_string().into()))
            .await
            .map_err(|e| SourceError::transient(source, e.to_string()))?;

        let stream = ws.filter_map(move |msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(
                    serde_json::from_str::<Value>(text.as_str())
                        .map_err(|e| SourceError::malformed(source, e.to_string())),
                ),
                Ok(_) => None,
                Err(e) => Some(Err(SourceError::transient(source, e.to_string()))),
            }
        });

        Ok(stream.boxed())
    }

    /// Bonding-curve records carry SOL-denominated reserves and market cap.
    fn normalize(&self, raw: &Value) -> SourceResult<Candidate> {
        let d = &self.descriptor;
        let mut candidate = normalize_record(d.id, d.priority, raw, chrono::Utc::now())?;

        let v_sol = first_decimal(raw, &["vSolInBondingCurve"]);
        let v_tokens = first_decimal(raw, &["vTokensInBondingCurve"]);

        if candidate.liquidity.is_zero() {
            if let Some(sol) = v_sol {
                candidate.liquidity = sol * self.sol_usd;
            }
        }
        if candidate.market_cap.is_zero() {
            if let Some(mc_sol) = first_decimal(raw, &["marketCapSol"]) {
                candidate.market_cap = mc_sol * self.sol_usd;
            }
        }
        if candidate.price.is_zero() {
            if let (Some(sol), Some(tokens)) = (v_sol, v_tokens) {
                if !tokens.is_zero() {
                    candidate.price = sol / tokens * self.sol_usd;
                }
            }
        }

        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn config(url: String) -> SourceConfig {
        SourceConfig {
            enabled: true,
            base_url: Some(url),
            priority: 1,
            ..SourceConfig::default()
        }
    }

    #[test]
    fn test_normalize_converts_sol_amounts() {
        let feed = PumpPortalFeed::new(&config(PUMPPORTAL_WS_URL.to_string()), dec!(150));
        let raw = json!({
            "mint": "PumpMint",
            "symbol": "PMP",
            "name": "Pump",
            "txType": "create",
            "vSolInBondingCurve": 30,
            "vTokensInBondingCurve": 1_000_000_000,
            "marketCapSol": 30
        });

        let c = feed.normalize(&raw).unwrap();
        assert_eq!(c.address, "PumpMint");
        assert_eq!(c.liquidity, dec!(4500));
        assert_eq!(c.market_cap, dec!(4500));
        assert_eq!(c.price, dec!(0.0000045));
    }

    #[test]
    fn test_subscription_ack_is_not_a_candidate() {
        let feed = PumpPortalFeed::new(&config(PUMPPORTAL_WS_URL.to_string()), dec!(150));
        let ack = json!({"message": "Successfully subscribed to token creation events."});
        assert!(feed.normalize(&ack).is_err());
    }

    #[tokio::test]
    async fn test_connect_subscribes_and_streams_records() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();

            let subscribe = ws.next().await.unwrap().unwrap();
            assert_eq!(subscribe.to_text().unwrap(), SUBSCRIBE_NEW_TOKEN);

            ws.send(Message::Text(r#"{"mint":"M1","symbol":"ONE"}"#.to_string().into()))
                .await
                .unwrap();
            ws.send(Message::Text("not json".to_string().into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let feed = PumpPortalFeed::new(&config(format!("ws://{}", addr)), dec!(150));
        let records: Vec<_> = feed.connect().await.unwrap().collect().await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap()["mint"], "M1");
        assert!(matches!(records[1], Err(SourceError::Malformed { .. })));
    }
}
