//! Scoring, selection and the position lifecycle.
//!
//! - `scorer`: deterministic component scores for a candidate
//! - `selection`: trust-tier gate deciding accept or reject
//! - `executor`: trade execution seam with a paper implementation
//! - `oracle`: current price lookups for open positions
//! - `position_manager`: entry, monitoring and exit of positions

mod executor;
mod oracle;
mod position_manager;
mod scorer;
mod selection;

pub use executor::{ExecutionReport, PaperExecutor, TradeExecutor, TradeSide};
pub use oracle::{DexScreenerPriceOracle, OracleChain, PriceOracle, WorkspacePriceOracle};
pub use position_manager::{
    evaluate_exit, Evaluation, ExitReason, Position, PositionManager, PositionStatus, Trade,
};
pub use scorer::{ScoreResult, Scorer};
pub use selection::{Decision, RejectReason, SelectionGate};
