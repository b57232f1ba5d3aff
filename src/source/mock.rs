//! In-memory feeds for paper runs and tests.

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use super::traits::{PollFeed, PushFeed, RawStream, SourceDescriptor};
use super::types::SourceId;
use crate::error::{SourceError, SourceResult};

/// Poll feed that replays scripted batches, then repeats the last one.
pub struct ScriptedFeed {
    descriptor: SourceDescriptor,
    batches: Mutex<VecDeque<SourceResult<Vec<Value>>>>,
    last: Mutex<Vec<Value>>,
    fetches: AtomicU64,
}

impl ScriptedFeed {
    pub fn new(id: SourceId, priority: u8, interval: Duration) -> Self {
        Self {
            descriptor: SourceDescriptor::new(id, priority, interval),
            batches: Mutex::new(VecDeque::new()),
            last: Mutex::new(Vec::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Queue a successful batch.
    pub fn push_batch(self, batch: Vec<Value>) -> Self {
        self.batches.lock().push_back(Ok(batch));
        self
    }

    /// Queue a failed cycle.
    pub fn push_failure(self, reason: &str) -> Self {
        let id = self.descriptor.id;
        self.batches
            .lock()
            .push_back(Err(SourceError::transient(id, reason)));
        self
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollFeed for ScriptedFeed {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self) -> SourceResult<Vec<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.batches.lock().pop_front();
        match next {
            Some(Ok(batch)) => {
                *self.last.lock() = batch.clone();
                Ok(batch)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last.lock().clone()),
        }
    }
}

/// Push feed fed from an mpsc channel. Only the first `connect` gets records.
pub struct ChannelFeed {
    descriptor: SourceDescriptor,
    rx: Mutex<Option<mpsc::Receiver<Value>>>,
}

impl ChannelFeed {
    pub fn new(id: SourceId, priority: u8, reconnect: Duration) -> (Self, mpsc::Sender<Value>) {
        let (tx, rx) = mpsc::channel(64);
        let feed = Self {
            descriptor: SourceDescriptor::new(id, priority, reconnect),
            rx: Mutex::new(Some(rx)),
        };
        (feed, tx)
    }
}

#[async_trait]
impl PushFeed for ChannelFeed {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn connect(&self) -> SourceResult<RawStream> {
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| SourceError::transient(self.descriptor.id, "channel already consumed"))?;

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|value| (Ok(value), rx))
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_feed_replays_then_repeats() {
        let feed = ScriptedFeed::new(SourceId::DexScreener, 2, Duration::from_secs(1))
            .push_batch(vec![json!({"address": "A"})])
            .push_failure("timeout");

        assert_eq!(feed.poll().await.len(), 1);
        assert!(feed.poll().await.is_empty());
        assert_eq!(feed.poll().await.len(), 1);
        assert_eq!(feed.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_channel_feed_streams_until_sender_dropped() {
        let (feed, tx) = ChannelFeed::new(SourceId::PumpPortal, 1, Duration::from_secs(1));
        tx.send(json!({"mint": "X"})).await.unwrap();
        drop(tx);

        let records: Vec<_> = feed.connect().await.unwrap().collect().await;
        assert_eq!(records.len(), 1);
        assert!(feed.connect().await.is_err());
    }
}
