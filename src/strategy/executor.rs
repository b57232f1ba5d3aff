//! Trade execution seam and the simulated paper executor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use uuid::Uuid;

use crate::config::TradingConfig;
use crate::error::{TradeError, TradeResult};
use crate::source::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fill details returned by an executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub id: String,
    pub side: TradeSide,
    /// Effective price per token in USD, slippage included
    pub fill_price: Decimal,
    /// Tokens received (buy) or sold (sell)
    pub token_amount: Decimal,
    /// USD spent (buy) or net USD received after fees (sell)
    pub usd_value: Decimal,
    /// SOL equivalent of `usd_value`
    pub sol_amount: Decimal,
    pub fee: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Executes swaps against a candidate's quoted price.
///
/// For [`TradeSide::Buy`] `size` is the USD notional to spend; for
/// [`TradeSide::Sell`] it is the token amount to sell.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute(
        &self,
        candidate: &Candidate,
        side: TradeSide,
        size: Decimal,
    ) -> TradeResult<ExecutionReport>;
}

/// Simulated fills with fixed slippage and fee.
pub struct PaperExecutor {
    slippage: Decimal,
    fee_rate: Decimal,
    sol_usd: Decimal,
    fills: AtomicU64,
}

impl PaperExecutor {
    pub fn new(slippage: Decimal, fee_rate: Decimal, sol_usd: Decimal) -> Self {
        Self {
            slippage,
            fee_rate,
            sol_usd,
            fills: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &TradingConfig) -> Self {
        Self::new(config.slippage, config.fee_rate, config.sol_usd)
    }

    pub fn fill_count(&self) -> u64 {
        self.fills.load(Ordering::SeqCst)
    }

    fn to_sol(&self, usd: Decimal) -> Decimal {
        if self.sol_usd.is_zero() {
            Decimal::ZERO
        } else {
            (usd / self.sol_usd).round_dp(9)
        }
    }
}

#[async_trait]
impl TradeExecutor for PaperExecutor {
    async fn execute(
        &self,
        candidate: &Candidate,
        side: TradeSide,
        size: Decimal,
    ) -> TradeResult<ExecutionReport> {
        let failure = |reason: &str| TradeError::ExecutionFailure {
            address: candidate.address.clone(),
            reason: reason.to_string(),
        };

        if candidate.price <= Decimal::ZERO {
            return Err(failure("no quote price"));
        }
        if size <= Decimal::ZERO {
            return Err(failure("non-positive size"));
        }

        let (fill_price, token_amount, usd_value, fee) = match side {
            TradeSide::Buy => {
                let fill_price = candidate.price * (Decimal::ONE + self.slippage);
                let fee = size * self.fee_rate;
                (fill_price, (size - fee) / fill_price, size, fee)
            }
            TradeSide::Sell => {
                let fill_price = candidate.price * (Decimal::ONE - self.slippage);
                let gross = size * fill_price;
                let fee = gross * self.fee_rate;
                (fill_price, size, gross - fee, fee)
            }
        };

        self.fills.fetch_add(1, Ordering::SeqCst);

        info!(
            address = %candidate.address,
            symbol = %candidate.symbol,
            %side,
            price = %fill_price,
            tokens = %token_amount,
            usd = %usd_value,
            fee = %fee,
            "Paper fill"
        );

        Ok(ExecutionReport {
            id: Uuid::new_v4().to_string(),
            side,
            fill_price,
            token_amount,
            usd_value,
            sol_amount: self.to_sol(usd_value),
            fee,
            executed_at: Utc::now(),
        })
    }
}
