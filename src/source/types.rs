//! Canonical candidate model shared by every feed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Feed identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceId {
    Birdeye,
    DexScreener,
    PumpPortal,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Birdeye => write!(f, "Birdeye"),
            SourceId::DexScreener => write!(f, "DexScreener"),
            SourceId::PumpPortal => write!(f, "PumpPortal"),
        }
    }
}

impl SourceId {
    pub fn all() -> [SourceId; 3] {
        [SourceId::Birdeye, SourceId::DexScreener, SourceId::PumpPortal]
    }
}

impl std::str::FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "birdeye" => Ok(SourceId::Birdeye),
            "dexscreener" => Ok(SourceId::DexScreener),
            "pumpportal" => Ok(SourceId::PumpPortal),
            other => Err(format!("unknown source: {}", other)),
        }
    }
}

/// Trust tier derived from a source's declared priority.
///
/// Selects acceptance thresholds and the trust adjustments in scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum TrustTier {
    Low,
    Medium,
    High,
}

impl TrustTier {
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            p if p >= 3 => TrustTier::High,
            2 => TrustTier::Medium,
            _ => TrustTier::Low,
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustTier::Low => write!(f, "low"),
            TrustTier::Medium => write!(f, "medium"),
            TrustTier::High => write!(f, "high"),
        }
    }
}

/// A freshly discovered asset, keyed by its on-chain address.
///
/// Numeric fields a source does not report are left at zero; the aggregator
/// treats zero as "unknown" when merging reports from several sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub address: String,
    pub symbol: String,
    pub name: String,
    /// Price in USD
    pub price: Decimal,
    /// Pool liquidity in USD
    pub liquidity: Decimal,
    /// 24-hour traded volume in USD
    pub volume_24h: Decimal,
    /// 24-hour price change in percent (e.g. 120 = +120%)
    pub price_change_24h: Decimal,
    pub market_cap: Decimal,
    /// Origin timestamp reported by the source (pair or mint creation)
    pub created_at: DateTime<Utc>,
    /// Local ingestion time of the first report
    pub discovered_at: DateTime<Utc>,
    /// Source currently owning the merged field values
    pub source: SourceId,
    pub source_priority: u8,
    pub multi_source: bool,
    /// Every source that reported this address, with its latest report time
    pub sources: BTreeMap<SourceId, DateTime<Utc>>,
    /// Raw payload per source, kept for diagnostics
    pub raw_metadata: BTreeMap<SourceId, serde_json::Value>,
}

impl Candidate {
    /// Create a candidate with only the identifying fields set.
    pub fn new(address: impl Into<String>, source: SourceId, source_priority: u8) -> Self {
        let now = Utc::now();
        let mut sources = BTreeMap::new();
        sources.insert(source, now);

        Self {
            address: address.into(),
            symbol: String::new(),
            name: String::new(),
            price: Decimal::ZERO,
            liquidity: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            price_change_24h: Decimal::ZERO,
            market_cap: Decimal::ZERO,
            created_at: now,
            discovered_at: now,
            source,
            source_priority,
            multi_source: false,
            sources,
            raw_metadata: BTreeMap::new(),
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = price;
        self
    }

    pub fn with_liquidity(mut self, liquidity: Decimal) -> Self {
        self.liquidity = liquidity;
        self
    }

    pub fn with_volume_24h(mut self, volume: Decimal) -> Self {
        self.volume_24h = volume;
        self
    }

    pub fn with_price_change_24h(mut self, change_pct: Decimal) -> Self {
        self.price_change_24h = change_pct;
        self
    }

    pub fn with_market_cap(mut self, market_cap: Decimal) -> Self {
        self.market_cap = market_cap;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set the local discovery time, also used as the source's report time.
    pub fn discovered(mut self, at: DateTime<Utc>) -> Self {
        self.discovered_at = at;
        self.sources.insert(self.source, at);
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw_metadata.insert(self.source, raw);
        self
    }

    pub fn trust_tier(&self) -> TrustTier {
        TrustTier::from_priority(self.source_priority)
    }

    /// Number of distinct sources that reported this address.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Age in whole minutes relative to `now`, never negative.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_minutes().max(0)
    }
}
