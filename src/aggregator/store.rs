//! Address-keyed candidate workspace with bounded capacity.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::source::Candidate;

/// Result of ingesting one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// First report for this address
    Inserted,
    /// Merged into an existing candidate
    Merged {
        /// This report confirmed the candidate from a second source
        newly_confirmed: bool,
    },
}

/// Owns every candidate the aggregator knows about.
///
/// Merging is field-by-field: a report from a source of equal or higher
/// priority overwrites the fields it carries; a lower-priority report only
/// fills fields that are still unknown.
#[derive(Debug)]
pub struct CandidateStore {
    entries: HashMap<String, Candidate>,
    capacity: usize,
    confirmation_window: Duration,
}

impl CandidateStore {
    pub fn new(capacity: usize, confirmation_window: Duration) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity + 1),
            capacity: capacity.max(2),
            confirmation_window,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&Candidate> {
        self.entries.get(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.entries.values()
    }

    /// Insert or merge one report, evicting if the capacity is exceeded.
    pub fn put(&mut self, incoming: Candidate) -> IngestOutcome {
        let outcome = match self.entries.get_mut(&incoming.address) {
            Some(existing) => Self::merge(existing, incoming, self.confirmation_window),
            None => {
                self.entries.insert(incoming.address.clone(), incoming);
                IngestOutcome::Inserted
            }
        };

        if self.entries.len() > self.capacity {
            self.evict_oldest_half();
        }
        outcome
    }

    pub fn remove(&mut self, address: &str) -> Option<Candidate> {
        self.entries.remove(address)
    }

    /// Drop the oldest half of the workspace by discovery time.
    pub fn evict_oldest_half(&mut self) -> usize {
        let count = self.entries.len() / 2;
        if count == 0 {
            return 0;
        }

        let mut by_age: Vec<(DateTime<Utc>, String)> = self
            .entries
            .values()
            .map(|c| (c.discovered_at, c.address.clone()))
            .collect();
        by_age.sort();

        for (_, address) in by_age.into_iter().take(count) {
            self.entries.remove(&address);
        }

        debug!(evicted = count, remaining = self.entries.len(), "Evicted oldest candidates");
        count
    }

    fn merge(existing: &mut Candidate, incoming: Candidate, window: Duration) -> IngestOutcome {
        let reported_at = incoming.discovered_at;
        let source = incoming.source;

        let mut newly_confirmed = false;
        if !existing.multi_source {
            let confirmed = existing
                .sources
                .iter()
                .any(|(other, seen)| *other != source && (reported_at - *seen).abs() <= window);
            if confirmed {
                existing.multi_source = true;
                newly_confirmed = true;
            }
        }

        existing.sources.insert(source, reported_at);
        existing.created_at = existing.created_at.min(incoming.created_at);

        if incoming.source_priority >= existing.source_priority {
            overwrite_known(existing, &incoming);
            existing.source = source;
            existing.source_priority = incoming.source_priority;
        } else {
            fill_unknown(existing, &incoming);
        }
        existing.raw_metadata.extend(incoming.raw_metadata);

        IngestOutcome::Merged { newly_confirmed }
    }
}

fn overwrite_known(existing: &mut Candidate, incoming: &Candidate) {
    if !incoming.symbol.is_empty() {
        existing.symbol = incoming.symbol.clone();
    }
    if !incoming.name.is_empty() {
        existing.name = incoming.name.clone();
    }
    overwrite_decimal(&mut existing.price, incoming.price);
    overwrite_decimal(&mut existing.liquidity, incoming.liquidity);
    overwrite_decimal(&mut existing.volume_24h, incoming.volume_24h);
    overwrite_decimal(&mut existing.price_change_24h, incoming.price_change_24h);
    overwrite_decimal(&mut existing.market_cap, incoming.market_cap);
}

fn fill_unknown(existing: &mut Candidate, incoming: &Candidate) {
    if existing.symbol.is_empty() {
        existing.symbol = incoming.symbol.clone();
    }
    if existing.name.is_empty() {
        existing.name = incoming.name.clone();
    }
    fill_decimal(&mut existing.price, incoming.price);
    fill_decimal(&mut existing.liquidity, incoming.liquidity);
    fill_decimal(&mut existing.volume_24h, incoming.volume_24h);
    fill_decimal(&mut existing.price_change_24h, incoming.price_change_24h);
    fill_decimal(&mut existing.market_cap, incoming.market_cap);
}

#[inline]
fn overwrite_decimal(field: &mut Decimal, value: Decimal) {
    if !value.is_zero() {
        *field = value;
    }
}

#[inline]
fn fill_decimal(field: &mut Decimal, value: Decimal) {
    if field.is_zero() {
        *field = value;
    }
}
