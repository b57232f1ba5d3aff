//! Feed abstraction shared by poll and push sources.
//!
//! Both modes yield the same [`Candidate`] type so the aggregator handles
//! every source uniformly:
//! - [`PollFeed`]: timer-driven fetch of a batch of raw records
//! - [`PushFeed`]: a long-lived subscription streaming raw records

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::normalize::normalize_record;
use super::types::{Candidate, SourceId, TrustTier};
use crate::error::SourceResult;

/// Static facts every feed declares up front.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub id: SourceId,
    /// Trust weight used for merge tie-breaks and threshold selection
    pub priority: u8,
    /// Poll interval, or reconnect delay for push feeds
    pub interval: Duration,
}

impl SourceDescriptor {
    pub fn new(id: SourceId, priority: u8, interval: Duration) -> Self {
        Self {
            id,
            priority,
            interval,
        }
    }

    pub fn trust_tier(&self) -> TrustTier {
        TrustTier::from_priority(self.priority)
    }
}

/// A feed polled on a fixed interval.
#[async_trait]
pub trait PollFeed: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Fetch the raw records for one cycle.
    async fn fetch(&self) -> SourceResult<Vec<Value>>;

    /// Normalize one raw record. Adapters override this for source quirks.
    fn normalize(&self, raw: &Value) -> SourceResult<Candidate> {
        let d = self.descriptor();
        normalize_record(d.id, d.priority, raw, Utc::now())
    }

    /// Fetch and normalize one cycle. Never fails: upstream errors are
    /// logged and turn into an empty batch, bad records are dropped.
    async fn poll(&self) -> Vec<Candidate> {
        let source = self.descriptor().id;
        match self.fetch().await {
            Ok(records) => normalize_batch(source, &records, |raw| self.normalize(raw)),
            Err(e) => {
                warn!(%source, error = %e, "Feed cycle failed, skipping");
                Vec::new()
            }
        }
    }
}

/// Stream of raw records from a push subscription.
pub type RawStream = BoxStream<'static, SourceResult<Value>>;

/// A feed that pushes records over a persistent connection.
#[async_trait]
pub trait PushFeed: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Open the subscription. The stream ends when the connection drops.
    async fn connect(&self) -> SourceResult<RawStream>;

    fn normalize(&self, raw: &Value) -> SourceResult<Candidate> {
        let d = self.descriptor();
        normalize_record(d.id, d.priority, raw, Utc::now())
    }
}

/// A configured feed in either operating mode.
#[derive(Clone)]
pub enum Feed {
    Poll(Arc<dyn PollFeed>),
    Push(Arc<dyn PushFeed>),
}

impl Feed {
    pub fn descriptor(&self) -> &SourceDescriptor {
        match self {
            Feed::Poll(feed) => feed.descriptor(),
            Feed::Push(feed) => feed.descriptor(),
        }
    }

    pub fn is_push(&self) -> bool {
        matches!(self, Feed::Push(_))
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.is_push() { "push" } else { "poll" };
        f.debug_struct("Feed")
            .field("mode", &mode)
            .field("descriptor", self.descriptor())
            .finish()
    }
}

/// Normalize a batch, dropping each record that fails on its own.
pub fn normalize_batch<F>(source: SourceId, records: &[Value], normalize: F) -> Vec<Candidate>
where
    F: Fn(&Value) -> SourceResult<Candidate>,
{
    let mut dropped = 0usize;
    let candidates: Vec<Candidate> = records
        .iter()
        .filter_map(|raw| match normalize(raw) {
            Ok(c) => Some(c),
            Err(e) => {
                dropped += 1;
                debug!(%source, error = %e, "Dropping record");
                None
            }
        })
        .collect();

    debug!(
        %source,
        received = records.len(),
        normalized = candidates.len(),
        dropped,
        "Normalized feed batch"
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use serde_json::json;

    struct FailingFeed {
        descriptor: SourceDescriptor,
    }

    #[async_trait]
    impl PollFeed for FailingFeed {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.descriptor
        }

        async fn fetch(&self) -> SourceResult<Vec<Value>> {
            Err(SourceError::transient(SourceId::DexScreener, "503"))
        }
    }

    struct StaticFeed {
        descriptor: SourceDescriptor,
        records: Vec<Value>,
    }

    #[async_trait]
    impl PollFeed for StaticFeed {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.descriptor
        }

        async fn fetch(&self) -> SourceResult<Vec<Value>> {
            Ok(self.records.clone())
        }
    }

    fn descriptor() -> SourceDescriptor {
        SourceDescriptor::new(SourceId::DexScreener, 2, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_poll_swallows_upstream_failure() {
        let feed = FailingFeed {
            descriptor: descriptor(),
        };
        assert!(feed.poll().await.is_empty());
    }

    #[tokio::test]
    async fn test_poll_drops_only_bad_records() {
        let feed = StaticFeed {
            descriptor: descriptor(),
            records: vec![
                json!({"address": "A1", "symbol": "ONE"}),
                json!({"symbol": "NO_ADDRESS"}),
                json!({"mint": "A2"}),
            ],
        };

        let batch = feed.poll().await;
        let addresses: Vec<_> = batch.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, vec!["A1", "A2"]);
        assert!(batch.iter().all(|c| c.source_priority == 2));
    }

    #[test]
    fn test_feed_debug_reports_mode() {
        let feed = Feed::Poll(Arc::new(FailingFeed {
            descriptor: descriptor(),
        }));
        assert!(format!("{:?}", feed).contains("poll"));
        assert!(!feed.is_push());
    }
}
