//! Shared candidate workspace fed by every source.
//!
//! Feeds write concurrently through [`Aggregator::ingest_batch`]; the
//! position manager and query callers only ever see cloned snapshots.

mod store;

pub use store::{CandidateStore, IngestOutcome};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AggregatorConfig;
use crate::strategy::{ScoreResult, Scorer};
use crate::source::Candidate;

/// Counts from one ingested batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub inserted: usize,
    pub merged: usize,
    /// Candidates that became multi-source with this batch
    pub confirmed: usize,
}

/// A snapshot paired with its score at query time.
#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub score: ScoreResult,
}

/// Thread-safe wrapper around the [`CandidateStore`].
pub struct Aggregator {
    store: RwLock<CandidateStore>,
    scorer: Scorer,
}

pub type SharedAggregator = Arc<Aggregator>;

impl Aggregator {
    pub fn new(config: &AggregatorConfig, scorer: Scorer) -> Self {
        Self {
            store: RwLock::new(CandidateStore::new(
                config.capacity,
                Duration::seconds(config.confirmation_window_secs),
            )),
            scorer,
        }
    }

    pub fn shared(config: &AggregatorConfig, scorer: Scorer) -> SharedAggregator {
        Arc::new(Self::new(config, scorer))
    }

    pub fn ingest(&self, candidate: Candidate) -> IngestOutcome {
        self.store.write().put(candidate)
    }

    /// Merge a whole batch under one write lock.
    pub fn ingest_batch(&self, batch: Vec<Candidate>) -> IngestStats {
        let mut stats = IngestStats::default();
        if batch.is_empty() {
            return stats;
        }

        let mut store = self.store.write();
        for candidate in batch {
            let address = candidate.address.clone();
            match store.put(candidate) {
                IngestOutcome::Inserted => stats.inserted += 1,
                IngestOutcome::Merged { newly_confirmed } => {
                    stats.merged += 1;
                    if newly_confirmed {
                        stats.confirmed += 1;
                        info!(address = %address, "Candidate confirmed by multiple sources");
                    }
                }
            }
        }

        debug!(
            inserted = stats.inserted,
            merged = stats.merged,
            total = store.len(),
            "Ingested batch"
        );
        stats
    }

    pub fn get(&self, address: &str) -> Option<Candidate> {
        self.store.read().get(address).cloned()
    }

    /// Latest merged price, `None` when unknown.
    pub fn latest_price(&self, address: &str) -> Option<Decimal> {
        self.store
            .read()
            .get(address)
            .map(|c| c.price)
            .filter(|p| *p > Decimal::ZERO)
    }

    pub fn snapshot(&self) -> Vec<Candidate> {
        self.store.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidates ordered by source priority, then overall score, then
    /// discovery time (newest first).
    pub fn ranked(&self, limit: usize, now: DateTime<Utc>) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = self
            .snapshot()
            .into_iter()
            .map(|candidate| {
                let score = self.scorer.score(&candidate, now);
                RankedCandidate { candidate, score }
            })
            .collect();

        ranked.sort_by(compare_ranked);
        ranked.truncate(limit);
        ranked
    }

    /// Candidates with the largest 24h gains.
    pub fn top_movers(&self, limit: usize) -> Vec<Candidate> {
        let mut movers = self.snapshot();
        movers.sort_by(|a, b| {
            b.price_change_24h
                .cmp(&a.price_change_24h)
                .then_with(|| b.discovered_at.cmp(&a.discovered_at))
        });
        movers.truncate(limit);
        movers
    }
}

fn compare_ranked(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.candidate
        .source_priority
        .cmp(&a.candidate.source_priority)
        .then_with(|| b.score.overall_score.cmp(&a.score.overall_score))
        .then_with(|| b.candidate.discovered_at.cmp(&a.candidate.discovered_at))
}
