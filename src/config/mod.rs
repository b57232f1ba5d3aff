//! Configuration management for the token scout.
//!
//! Loads settings from an optional config file and `SCOUT__`-prefixed
//! environment variables. The resulting [`Config`] is immutable for the
//! lifetime of the process.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;
use crate::source::{RateLimit, SourceId};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Per-feed settings
    #[serde(default)]
    pub sources: SourcesConfig,
    /// Candidate workspace bounds
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    /// Score weights
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Acceptance thresholds
    #[serde(default)]
    pub selection: SelectionConfig,
    /// Position sizing and risk limits
    #[serde(default)]
    pub trading: TradingConfig,
    /// SQLite storage
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Per-source settings. Each `[sources.<name>]` table only overrides the
/// keys it sets; every other key keeps that source's own default.
#[derive(Debug, Clone, Serialize)]
pub struct SourcesConfig {
    pub birdeye: SourceConfig,
    pub dexscreener: SourceConfig,
    pub pumpportal: SourceConfig,
}

impl<'de> Deserialize<'de> for SourcesConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawSources::deserialize(deserializer)?;
        Ok(Self {
            birdeye: raw.birdeye.apply(default_birdeye()),
            dexscreener: raw.dexscreener.apply(default_dexscreener()),
            pumpportal: raw.pumpportal.apply(default_pumpportal()),
        })
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawSources {
    birdeye: SourceOverrides,
    dexscreener: SourceOverrides,
    pumpportal: SourceOverrides,
}

/// Keys set explicitly for one source.
#[derive(Default, Deserialize)]
#[serde(default)]
struct SourceOverrides {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
    priority: Option<u8>,
    api_key: Option<String>,
    base_url: Option<String>,
    query: Option<String>,
    timeout_secs: Option<u64>,
    rate_limit: Option<RateLimit>,
}

impl SourceOverrides {
    fn apply(self, base: SourceConfig) -> SourceConfig {
        SourceConfig {
            enabled: self.enabled.unwrap_or(base.enabled),
            interval_secs: self.interval_secs.unwrap_or(base.interval_secs),
            priority: self.priority.unwrap_or(base.priority),
            api_key: self.api_key.or(base.api_key),
            base_url: self.base_url.or(base.base_url),
            query: self.query.or(base.query),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
            rate_limit: self.rate_limit.or(base.rate_limit),
        }
    }
}

impl SourcesConfig {
    /// Iterate over every source with its settings.
    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &SourceConfig)> {
        [
            (SourceId::Birdeye, &self.birdeye),
            (SourceId::DexScreener, &self.dexscreener),
            (SourceId::PumpPortal, &self.pumpportal),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Poll interval, or reconnect delay for push feeds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Trust weight: 3+ = high, 2 = medium, otherwise low
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// API credentials (mandatory for Birdeye)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Override for the REST/websocket endpoint
    #[serde(default)]
    pub base_url: Option<String>,
    /// Search query for feeds that take one
    #[serde(default)]
    pub query: Option<String>,
    /// HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Requests allowed per window
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Maximum candidates kept before the oldest half is evicted
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Two sources reporting within this window confirm a candidate
    #[serde(default = "default_confirmation_window_secs")]
    pub confirmation_window_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoreWeights,
}

/// Weights of each sub-score in the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_weight_liquidity")]
    pub liquidity: Decimal,
    #[serde(default = "default_weight_momentum")]
    pub momentum: Decimal,
    #[serde(default = "default_weight_age")]
    pub age: Decimal,
    #[serde(default = "default_weight_volume")]
    pub volume: Decimal,
    #[serde(default = "default_weight_source")]
    pub source: Decimal,
}

impl ScoreWeights {
    pub fn total(&self) -> Decimal {
        self.liquidity + self.momentum + self.age + self.volume + self.source
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Minimum pool liquidity in USD
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: Decimal,
    #[serde(default = "default_high_trust")]
    pub high_trust: TierThresholds,
    #[serde(default = "default_medium_trust")]
    pub medium_trust: TierThresholds,
    #[serde(default = "default_low_trust")]
    pub low_trust: TierThresholds,
}

/// Acceptance bounds for one trust tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    /// Overall score must be strictly above this
    pub min_score: Decimal,
    /// Risk score must be strictly below this
    pub max_risk: Decimal,
}

/// Trading mode: Live (external signer) or Paper (simulated fills).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Paper,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_trading_mode")]
    pub mode: TradingMode,
    /// Starting capital in USD
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    /// Maximum size of one entry in USD
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,
    /// Maximum number of concurrently open positions
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Realized loss in USD that halts new entries for the day
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,
    /// Minutes before a closed token may be entered again
    #[serde(default = "default_reentry_cooldown_minutes")]
    pub reentry_cooldown_minutes: i64,
    /// Simulated slippage for paper fills (0.0-1.0)
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,
    /// Simulated swap fee rate for paper fills (0.0-1.0)
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// SOL price in USD for SOL-denominated feeds and trade records
    #[serde(default = "default_sol_usd")]
    pub sol_usd: Decimal,
    /// Seconds between entry evaluation cycles
    #[serde(default = "default_entry_interval_secs")]
    pub entry_interval_secs: u64,
    /// Seconds between position monitoring ticks
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_enabled")]
    pub enabled: bool,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

// Default value functions
fn default_interval_secs() -> u64 {
    30
}

fn default_priority() -> u8 {
    1
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_birdeye() -> SourceConfig {
    SourceConfig {
        enabled: false, // needs an API key
        interval_secs: 20,
        priority: 3,
        rate_limit: Some(RateLimit::new(60, 60_000)),
        ..SourceConfig::default()
    }
}

fn default_dexscreener() -> SourceConfig {
    SourceConfig {
        enabled: true,
        interval_secs: 30,
        priority: 2,
        rate_limit: Some(RateLimit::new(60, 60_000)),
        ..SourceConfig::default()
    }
}

fn default_pumpportal() -> SourceConfig {
    SourceConfig {
        enabled: true,
        interval_secs: 5, // reconnect delay
        priority: 1,
        rate_limit: Some(RateLimit::new(10, 60_000)), // reconnect attempts
        ..SourceConfig::default()
    }
}

fn default_capacity() -> usize {
    1000
}

fn default_confirmation_window_secs() -> i64 {
    300 // 5 minutes
}

fn default_weight_liquidity() -> Decimal {
    Decimal::new(2, 1) // 0.2
}

fn default_weight_momentum() -> Decimal {
    Decimal::new(2, 1) // 0.2
}

fn default_weight_age() -> Decimal {
    Decimal::new(3, 1) // 0.3
}

fn default_weight_volume() -> Decimal {
    Decimal::new(2, 1) // 0.2
}

fn default_weight_source() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_min_liquidity() -> Decimal {
    Decimal::new(1000, 0) // $1k
}

fn default_high_trust() -> TierThresholds {
    TierThresholds {
        min_score: Decimal::new(55, 0),
        max_risk: Decimal::new(70, 0),
    }
}

fn default_medium_trust() -> TierThresholds {
    TierThresholds {
        min_score: Decimal::new(65, 0),
        max_risk: Decimal::new(60, 0),
    }
}

fn default_low_trust() -> TierThresholds {
    TierThresholds {
        min_score: Decimal::new(75, 0),
        max_risk: Decimal::new(50, 0),
    }
}

fn default_trading_mode() -> TradingMode {
    TradingMode::Paper
}

fn default_initial_capital() -> Decimal {
    Decimal::new(1000, 0) // $1,000 paper balance
}

fn default_max_position_size() -> Decimal {
    Decimal::new(100, 0) // $100
}

fn default_max_positions() -> usize {
    5
}

fn default_max_daily_loss() -> Decimal {
    Decimal::new(200, 0) // $200
}

fn default_reentry_cooldown_minutes() -> i64 {
    60
}

fn default_slippage() -> Decimal {
    Decimal::new(1, 2) // 0.01 (1%)
}

fn default_fee_rate() -> Decimal {
    Decimal::new(25, 4) // 0.0025 (0.25%)
}

fn default_sol_usd() -> Decimal {
    Decimal::new(150, 0)
}

fn default_entry_interval_secs() -> u64 {
    15
}

fn default_monitor_interval_secs() -> u64 {
    10
}

fn default_storage_enabled() -> bool {
    true
}

fn default_db_path() -> String {
    "data/scout.db".to_string()
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Load configuration from a named file (extension optional) plus environment.
    pub fn load_from(file: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::default().separator("__").prefix("SCOUT"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        for (id, source) in self.sources.iter() {
            if !source.enabled {
                continue;
            }
            if id == SourceId::Birdeye
                && source.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
            {
                return Err(ConfigError::MissingCredentials { source_id: id }.into());
            }
            anyhow::ensure!(
                source.interval_secs > 0,
                "{} interval_secs must be > 0",
                id
            );
            if let Some(limit) = source.rate_limit {
                anyhow::ensure!(
                    limit.max_requests > 0 && limit.window_ms > 0,
                    "{} rate_limit must allow at least one request per positive window",
                    id
                );
            }
        }

        anyhow::ensure!(
            self.aggregator.capacity >= 2,
            "aggregator capacity must be at least 2"
        );
        anyhow::ensure!(
            self.aggregator.confirmation_window_secs > 0,
            "confirmation_window_secs must be > 0"
        );

        let weights = &self.scoring.weights;
        anyhow::ensure!(
            [
                weights.liquidity,
                weights.momentum,
                weights.age,
                weights.volume,
                weights.source
            ]
            .iter()
            .all(|w| *w >= Decimal::ZERO),
            "score weights must be non-negative"
        );
        anyhow::ensure!(
            weights.total() > Decimal::ZERO,
            "score weights must not all be zero"
        );

        let hundred = Decimal::ONE_HUNDRED;
        for (tier, t) in [
            ("high_trust", &self.selection.high_trust),
            ("medium_trust", &self.selection.medium_trust),
            ("low_trust", &self.selection.low_trust),
        ] {
            anyhow::ensure!(
                t.min_score >= Decimal::ZERO && t.max_risk > Decimal::ZERO && t.max_risk <= hundred,
                "{} thresholds out of range",
                tier
            );
        }

        let trading = &self.trading;
        anyhow::ensure!(
            trading.max_position_size > Decimal::ZERO,
            "max_position_size must be > 0"
        );
        anyhow::ensure!(
            trading.initial_capital >= Decimal::ZERO,
            "initial_capital must be >= 0"
        );
        anyhow::ensure!(
            trading.max_daily_loss > Decimal::ZERO,
            "max_daily_loss must be > 0"
        );
        anyhow::ensure!(trading.max_positions >= 1, "max_positions must be >= 1");
        anyhow::ensure!(
            trading.slippage >= Decimal::ZERO && trading.slippage < Decimal::ONE,
            "slippage must be between 0 and 1"
        );
        anyhow::ensure!(
            trading.fee_rate >= Decimal::ZERO && trading.fee_rate < Decimal::ONE,
            "fee_rate must be between 0 and 1"
        );
        anyhow::ensure!(trading.sol_usd > Decimal::ZERO, "sol_usd must be > 0");
        anyhow::ensure!(
            trading.entry_interval_secs > 0 && trading.monitor_interval_secs > 0,
            "entry and monitor intervals must be > 0"
        );

        Ok(())
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            birdeye: default_birdeye(),
            dexscreener: default_dexscreener(),
            pumpportal: default_pumpportal(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
            priority: default_priority(),
            api_key: None,
            base_url: None,
            query: None,
            timeout_secs: default_timeout_secs(),
            rate_limit: None,
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            confirmation_window_secs: default_confirmation_window_secs(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
        }
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            liquidity: default_weight_liquidity(),
            momentum: default_weight_momentum(),
            age: default_weight_age(),
            volume: default_weight_volume(),
            source: default_weight_source(),
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_liquidity: default_min_liquidity(),
            high_trust: default_high_trust(),
            medium_trust: default_medium_trust(),
            low_trust: default_low_trust(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: default_trading_mode(),
            initial_capital: default_initial_capital(),
            max_position_size: default_max_position_size(),
            max_positions: default_max_positions(),
            max_daily_loss: default_max_daily_loss(),
            reentry_cooldown_minutes: default_reentry_cooldown_minutes(),
            slippage: default_slippage(),
            fee_rate: default_fee_rate(),
            sol_usd: default_sol_usd(),
            entry_interval_secs: default_entry_interval_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: default_storage_enabled(),
            db_path: default_db_path(),
        }
    }
}
