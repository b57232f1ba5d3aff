//! Capital, daily P&L and entry guards.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::TradingConfig;
use crate::error::{TradeError, TradeResult};

/// Point-in-time view of the ledger for logging and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub available_capital: Decimal,
    pub committed_capital: Decimal,
    pub daily_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub active_positions: usize,
    pub loss_guard_tripped: bool,
}

/// Single owner of balances and risk limits.
///
/// Entries commit capital; exits settle it back with the realized result.
/// The daily-loss guard blocks new entries only and stays tripped across
/// day rollovers until [`BalanceLedger::reset_daily_loss_guard`] is called.
#[derive(Debug)]
pub struct BalanceLedger {
    /// Capital free for new entries
    available: Decimal,
    /// Capital tied up in open positions
    committed: Decimal,
    /// Realized P&L for the current UTC day
    daily_pnl: Decimal,
    /// Realized P&L since start
    realized: Decimal,
    /// UTC day `daily_pnl` belongs to
    day: NaiveDate,
    active_positions: usize,
    max_positions: usize,
    max_daily_loss: Decimal,
    loss_guard_tripped: bool,
}

impl BalanceLedger {
    pub fn new(config: &TradingConfig, now: DateTime<Utc>) -> Self {
        Self {
            available: config.initial_capital,
            committed: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            realized: Decimal::ZERO,
            day: now.date_naive(),
            active_positions: 0,
            max_positions: config.max_positions,
            max_daily_loss: config.max_daily_loss,
            loss_guard_tripped: false,
        }
    }

    pub fn daily_pnl(&self) -> Decimal {
        self.daily_pnl
    }

    pub fn available_capital(&self) -> Decimal {
        self.available
    }

    pub fn committed_capital(&self) -> Decimal {
        self.committed
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized
    }

    pub fn active_position_count(&self) -> usize {
        self.active_positions
    }

    pub fn is_loss_guard_tripped(&self) -> bool {
        self.loss_guard_tripped
    }

    /// Check every entry guard for a position of `size`.
    pub fn can_open(&mut self, size: Decimal, now: DateTime<Utc>) -> TradeResult<()> {
        self.roll_day(now);

        if self.loss_guard_tripped {
            return Err(TradeError::DailyLossLimit {
                pnl: self.daily_pnl,
                limit: self.max_daily_loss,
            });
        }
        if self.active_positions >= self.max_positions {
            return Err(TradeError::PositionLimit {
                current: self.active_positions,
                limit: self.max_positions,
            });
        }
        if size <= Decimal::ZERO || size > self.available {
            return Err(TradeError::InsufficientCapital {
                requested: size,
                available: self.available,
            });
        }
        Ok(())
    }

    /// Reserve capital for a newly opened position.
    pub fn commit(&mut self, amount: Decimal) -> TradeResult<()> {
        if amount > self.available {
            return Err(TradeError::InsufficientCapital {
                requested: amount,
                available: self.available,
            });
        }
        self.available -= amount;
        self.committed += amount;
        self.active_positions += 1;
        Ok(())
    }

    /// Return a closed position's proceeds. Returns the realized P&L.
    pub fn settle(
        &mut self,
        committed: Decimal,
        exit_value: Decimal,
        now: DateTime<Utc>,
    ) -> Decimal {
        self.roll_day(now);

        let pnl = exit_value - committed;
        self.available += exit_value;
        self.committed = (self.committed - committed).max(Decimal::ZERO);
        self.active_positions = self.active_positions.saturating_sub(1);
        self.daily_pnl += pnl;
        self.realized += pnl;

        if !self.loss_guard_tripped && self.daily_pnl <= -self.max_daily_loss {
            self.loss_guard_tripped = true;
            warn!(
                daily_pnl = %self.daily_pnl,
                limit = %self.max_daily_loss,
                "Daily loss limit reached, new entries halted"
            );
        }
        pnl
    }

    pub fn reset_daily_loss_guard(&mut self) {
        if self.loss_guard_tripped {
            info!(daily_pnl = %self.daily_pnl, "Daily loss guard reset");
        }
        self.loss_guard_tripped = false;
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            available_capital: self.available,
            committed_capital: self.committed,
            daily_pnl: self.daily_pnl,
            realized_pnl: self.realized,
            active_positions: self.active_positions,
            loss_guard_tripped: self.loss_guard_tripped,
        }
    }

    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today > self.day {
            info!(
                previous_day = %self.day,
                daily_pnl = %self.daily_pnl,
                "Daily P&L rolled over"
            );
            self.day = today;
            self.daily_pnl = Decimal::ZERO;
        }
    }
}
