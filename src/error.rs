//! Error taxonomy for ingestion, trading and startup.
//!
//! Source errors never escape an adapter cycle; trade errors are surfaced to
//! the position manager's caller; configuration errors are fatal at startup.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::source::SourceId;

/// Failures raised while fetching or normalizing feed data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Timeout, connection failure or non-success HTTP status.
    #[error("transient failure from {source_id}: {reason}")]
    Transient { source_id: SourceId, reason: String },

    /// A payload or single record that cannot be normalized.
    #[error("malformed record from {source_id}: {reason}")]
    Malformed { source_id: SourceId, reason: String },

    /// The rate limiter refused this cycle.
    #[error("rate limit exceeded for {0}")]
    RateLimited(SourceId),
}

impl SourceError {
    pub fn transient(source: SourceId, reason: impl Into<String>) -> Self {
        Self::Transient {
            source_id: source,
            reason: reason.into(),
        }
    }

    pub fn malformed(source: SourceId, reason: impl Into<String>) -> Self {
        Self::Malformed {
            source_id: source,
            reason: reason.into(),
        }
    }

    /// Classify a reqwest failure. Decode failures are schema drift, the rest
    /// are network conditions that may clear on the next cycle.
    pub fn from_http(source: SourceId, err: &reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed(source, err.to_string())
        } else {
            Self::transient(source, err.to_string())
        }
    }
}

/// Failures raised by the position lifecycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("execution failed for {address}: {reason}")]
    ExecutionFailure { address: String, reason: String },

    #[error("position already open for {0}")]
    AlreadyOpen(String),

    #[error("{0} is cooling down after a recent exit")]
    CoolingDown(String),

    #[error("position limit reached: {current} >= {limit}")]
    PositionLimit { current: usize, limit: usize },

    #[error("daily loss limit tripped: pnl {pnl} <= -{limit}")]
    DailyLossLimit { pnl: Decimal, limit: Decimal },

    #[error("insufficient capital: requested {requested}, available {available}")]
    InsufficientCapital {
        requested: Decimal,
        available: Decimal,
    },
}

/// Startup-time configuration failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("source {source_id} is enabled but missing required credentials")]
    MissingCredentials { source_id: SourceId },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;
pub type TradeResult<T> = std::result::Result<T, TradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_source() {
        let err = SourceError::transient(SourceId::DexScreener, "timeout");
        assert_eq!(err.to_string(), "transient failure from DexScreener: timeout");

        let err = ConfigError::MissingCredentials {
            source_id: SourceId::Birdeye,
        };
        assert!(err.to_string().contains("Birdeye"));
    }
}
