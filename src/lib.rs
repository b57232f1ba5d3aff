//! # Token Scout
//!
//! Multi-source new-token discovery with deterministic scoring and a
//! paper-trading position lifecycle.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `source`: Birdeye, DexScreener and PumpPortal feeds plus normalization
//! - `aggregator`: Shared candidate workspace with cross-source merging
//! - `strategy`: Scoring, selection gate, execution and position management
//! - `risk`: Balance ledger and daily loss guard
//! - `persistence`: SQLite record of accepted tokens and closed trades
//! - `engine`: Task runtime with deterministic shutdown

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod risk;
pub mod source;
pub mod strategy;

pub use config::Config;
