//! Position lifecycle: `Scanning -> Open -> Closed`.
//!
//! The manager owns every position and the [`BalanceLedger`]. Entries are
//! gated by score and ledger guards; each monitoring tick checks the exit
//! rules in priority order and closes at most once per position.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::executor::{TradeExecutor, TradeSide};
use super::oracle::PriceOracle;
use super::scorer::{ScoreResult, Scorer};
use super::selection::{Decision, SelectionGate};
use crate::config::TradingConfig;
use crate::error::{TradeError, TradeResult};
use crate::risk::BalanceLedger;
use crate::source::{Candidate, SourceId};

/// Full take-profit: gain of at least 100%.
const TAKE_PROFIT_FULL_PCT: Decimal = dec!(100);
/// Partial take-profit: gain of at least 50% once held long enough.
const TAKE_PROFIT_PARTIAL_PCT: Decimal = dec!(50);
const TAKE_PROFIT_PARTIAL_MIN_HOLD_MINUTES: i64 = 30;
const STOP_LOSS_PCT: Decimal = dec!(-20);
const MAX_HOLD_HOURS: i64 = 24;
/// Stale positions below this gain are closed after the max hold.
const TIME_EXIT_MIN_GAIN_PCT: Decimal = dec!(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit100,
    TakeProfit50,
    StopLoss,
    TimeExit,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit100 => "take_profit_100",
            ExitReason::TakeProfit50 => "take_profit_50",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TimeExit => "time_exit",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First exit rule matching the current gain and holding time.
pub fn evaluate_exit(gain_pct: Decimal, held: Duration) -> Option<ExitReason> {
    if gain_pct >= TAKE_PROFIT_FULL_PCT {
        Some(ExitReason::TakeProfit100)
    } else if gain_pct >= TAKE_PROFIT_PARTIAL_PCT
        && held > Duration::minutes(TAKE_PROFIT_PARTIAL_MIN_HOLD_MINUTES)
    {
        Some(ExitReason::TakeProfit50)
    } else if gain_pct <= STOP_LOSS_PCT {
        Some(ExitReason::StopLoss)
    } else if held > Duration::hours(MAX_HOLD_HOURS) && gain_pct < TIME_EXIT_MIN_GAIN_PCT {
        Some(ExitReason::TimeExit)
    } else {
        None
    }
}

/// An open holding of one token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub id: String,
    pub token_address: String,
    pub symbol: String,
    pub source: SourceId,
    pub source_priority: u8,
    /// Fill price per token in USD
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub amount_held: Decimal,
    /// USD spent on entry
    pub capital_committed: Decimal,
    pub entry_sol_amount: Decimal,
    pub entry_score: Decimal,
    pub status: PositionStatus,
}

impl Position {
    /// Gain in percent at `price` (e.g. 100 = doubled).
    pub fn gain_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.entry_price) / self.entry_price * dec!(100)
    }

    pub fn held(&self, now: DateTime<Utc>) -> Duration {
        now - self.entry_time
    }

    /// Candidate snapshot quoting this token at `price`, for the executor.
    fn quote(&self, price: Decimal) -> Candidate {
        Candidate::new(self.token_address.clone(), self.source, self.source_priority)
            .with_symbol(self.symbol.clone())
            .with_price(price)
    }
}

/// Record emitted exactly once when a position closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub id: String,
    pub position_id: String,
    pub token_address: String,
    pub symbol: String,
    pub side: TradeSide,
    /// Tokens sold
    pub amount: Decimal,
    pub entry_price: Decimal,
    /// Exit fill price per token in USD
    pub price: Decimal,
    pub capital_committed: Decimal,
    /// USD received on exit
    pub exit_value: Decimal,
    pub sol_amount: Decimal,
    pub status: PositionStatus,
    pub profit_loss: Decimal,
    pub exit_reason: ExitReason,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Score and gate decision for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub score: ScoreResult,
    pub decision: Decision,
}

pub struct PositionManager {
    max_position_size: Decimal,
    reentry_cooldown: Duration,
    scorer: Scorer,
    gate: SelectionGate,
    ledger: BalanceLedger,
    executor: Arc<dyn TradeExecutor>,
    oracle: Arc<dyn PriceOracle>,
    positions: HashMap<String, Position>,
    /// Close time per address, for re-entry cooldown
    recently_closed: HashMap<String, DateTime<Utc>>,
}

impl PositionManager {
    pub fn new(
        config: &TradingConfig,
        scorer: Scorer,
        gate: SelectionGate,
        executor: Arc<dyn TradeExecutor>,
        oracle: Arc<dyn PriceOracle>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            max_position_size: config.max_position_size,
            reentry_cooldown: Duration::minutes(config.reentry_cooldown_minutes),
            scorer,
            gate,
            ledger: BalanceLedger::new(config, now),
            executor,
            oracle,
            positions: HashMap::new(),
            recently_closed: HashMap::new(),
        }
    }

    pub fn ledger(&self) -> &BalanceLedger {
        &self.ledger
    }

    pub fn reset_daily_loss_guard(&mut self) {
        self.ledger.reset_daily_loss_guard();
    }

    pub fn position(&self, address: &str) -> Option<&Position> {
        self.positions.get(address)
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn evaluate(&self, candidate: &Candidate, now: DateTime<Utc>) -> Evaluation {
        let score = self.scorer.score(candidate, now);
        let decision = self.gate.evaluate(candidate, &score);
        Evaluation { score, decision }
    }

    /// `max_position_size * (0.5 + 0.5 * confidence)`, capped by free capital.
    pub fn entry_size(&self, score: &ScoreResult) -> Decimal {
        let confidence = (score.overall_score / dec!(100)).clamp(Decimal::ZERO, Decimal::ONE);
        let size = self.max_position_size * (dec!(0.5) + dec!(0.5) * confidence);
        size.min(self.ledger.available_capital())
    }

    /// Score, gate and, if accepted, open a position. `Ok(None)` means the
    /// gate rejected the candidate.
    pub async fn try_enter(
        &mut self,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> TradeResult<Option<Position>> {
        let evaluation = self.evaluate(candidate, now);
        self.enter_evaluated(candidate, &evaluation, now).await
    }

    /// Open a position for an already evaluated candidate.
    pub async fn enter_evaluated(
        &mut self,
        candidate: &Candidate,
        evaluation: &Evaluation,
        now: DateTime<Utc>,
    ) -> TradeResult<Option<Position>> {
        if let Decision::Reject(reason) = evaluation.decision {
            debug!(address = %candidate.address, %reason, "Candidate rejected");
            return Ok(None);
        }

        let address = &candidate.address;
        if self.positions.contains_key(address) {
            return Err(TradeError::AlreadyOpen(address.clone()));
        }
        if let Some(closed_at) = self.recently_closed.get(address) {
            if now - *closed_at < self.reentry_cooldown {
                return Err(TradeError::CoolingDown(address.clone()));
            }
        }

        let size = self.entry_size(&evaluation.score);
        self.ledger.can_open(size, now)?;

        // Nothing is recorded until the fill succeeds
        let report = self
            .executor
            .execute(candidate, TradeSide::Buy, size)
            .await?;

        if report.token_amount <= Decimal::ZERO || report.fill_price <= Decimal::ZERO {
            return Err(TradeError::ExecutionFailure {
                address: address.clone(),
                reason: "empty fill".to_string(),
            });
        }

        self.ledger.commit(report.usd_value)?;

        let position = Position {
            id: Uuid::new_v4().to_string(),
            token_address: address.clone(),
            symbol: candidate.symbol.clone(),
            source: candidate.source,
            source_priority: candidate.source_priority,
            entry_price: report.fill_price,
            entry_time: now,
            amount_held: report.token_amount,
            capital_committed: report.usd_value,
            entry_sol_amount: report.sol_amount,
            entry_score: evaluation.score.overall_score,
            status: PositionStatus::Open,
        };

        info!(
            address = %position.token_address,
            symbol = %position.symbol,
            entry_price = %position.entry_price,
            size = %position.capital_committed,
            score = %position.entry_score,
            risk = %evaluation.score.risk_score,
            "Position opened"
        );

        self.positions.insert(address.clone(), position.clone());
        Ok(Some(position))
    }

    pub async fn monitor(&mut self) -> Vec<Trade> {
        self.monitor_at(Utc::now()).await
    }

    /// One monitoring tick. Returns the trades closed by this tick.
    pub async fn monitor_at(&mut self, now: DateTime<Utc>) -> Vec<Trade> {
        let cooldown = self.reentry_cooldown;
        self.recently_closed
            .retain(|_, closed_at| now - *closed_at < cooldown);

        let mut addresses: Vec<String> = self.positions.keys().cloned().collect();
        addresses.sort();

        let mut trades = Vec::new();
        for address in addresses {
            let Some(position) = self.positions.get(&address).cloned() else {
                continue;
            };

            let Some(price) = self.oracle.current_price(&address).await else {
                let err = TradeError::PriceUnavailable(address.clone());
                debug!(error = %err, "Holding position until next tick");
                continue;
            };

            let gain = position.gain_pct(price);
            let Some(reason) = evaluate_exit(gain, position.held(now)) else {
                continue;
            };

            match self.close(&position, price, reason, now).await {
                Ok(trade) => trades.push(trade),
                Err(e) => warn!(
                    address = %address,
                    %reason,
                    error = %e,
                    "Exit failed, holding until next tick"
                ),
            }
        }
        trades
    }

    async fn close(
        &mut self,
        position: &Position,
        price: Decimal,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> TradeResult<Trade> {
        let report = self
            .executor
            .execute(&position.quote(price), TradeSide::Sell, position.amount_held)
            .await?;

        self.positions.remove(&position.token_address);
        self.recently_closed
            .insert(position.token_address.clone(), now);

        let profit_loss = self
            .ledger
            .settle(position.capital_committed, report.usd_value, now);

        let trade = Trade {
            id: report.id,
            position_id: position.id.clone(),
            token_address: position.token_address.clone(),
            symbol: position.symbol.clone(),
            side: TradeSide::Sell,
            amount: position.amount_held,
            entry_price: position.entry_price,
            price: report.fill_price,
            capital_committed: position.capital_committed,
            exit_value: report.usd_value,
            sol_amount: report.sol_amount,
            status: PositionStatus::Closed,
            profit_loss,
            exit_reason: reason,
            opened_at: position.entry_time,
            closed_at: now,
        };

        info!(
            address = %trade.token_address,
            symbol = %trade.symbol,
            reason = %reason,
            entry_price = %trade.entry_price,
            exit_price = %trade.price,
            pnl = %trade.profit_loss,
            daily_pnl = %self.ledger.daily_pnl(),
            "Position closed"
        );

        Ok(trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::executor::{ExecutionReport, MockTradeExecutor, PaperExecutor};
    use crate::strategy::oracle::MockPriceOracle;
    use mockall::Sequence;
    use parking_lot::Mutex;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn trading() -> TradingConfig {
        TradingConfig {
            initial_capital: dec!(1000),
            max_position_size: dec!(100),
            max_positions: 2,
            max_daily_loss: dec!(150),
            ..TradingConfig::default()
        }
    }

    /// Trusted fresh token that clears the gate, priced at 1.0.
    fn hot(address: &str) -> Candidate {
        Candidate::new(address, SourceId::Birdeye, 3)
            .with_symbol("HOT")
            .with_price(dec!(1.0))
            .with_liquidity(dec!(60000))
            .with_volume_24h(dec!(120000))
            .with_price_change_24h(dec!(120))
            .with_created_at(t0() - Duration::minutes(2))
            .discovered(t0())
    }

    /// Oracle whose price can be changed by the test.
    fn settable_oracle(price: Option<Decimal>) -> (Arc<Mutex<Option<Decimal>>>, MockPriceOracle) {
        let shared = Arc::new(Mutex::new(price));
        let reader = Arc::clone(&shared);
        let mut oracle = MockPriceOracle::new();
        oracle
            .expect_current_price()
            .returning(move |_| *reader.lock());
        (shared, oracle)
    }

    fn manager(oracle: MockPriceOracle) -> PositionManager {
        manager_with(Arc::new(PaperExecutor::new(Decimal::ZERO, Decimal::ZERO, dec!(150))), oracle)
    }

    fn manager_with(executor: Arc<dyn TradeExecutor>, oracle: MockPriceOracle) -> PositionManager {
        PositionManager::new(
            &trading(),
            Scorer::default(),
            SelectionGate::default(),
            executor,
            Arc::new(oracle),
            t0(),
        )
    }

    #[tokio::test]
    async fn test_take_profit_at_double() {
        let (price, oracle) = settable_oracle(None);
        let mut pm = manager(oracle);

        let position = pm.try_enter(&hot("A"), t0()).await.unwrap().unwrap();
        assert_eq!(position.entry_price, dec!(1.0));
        assert_eq!(position.capital_committed, dec!(100));
        assert_eq!(pm.ledger().available_capital(), dec!(900));

        *price.lock() = Some(dec!(2.0));
        let trades = pm.monitor_at(t0() + Duration::minutes(1)).await;

        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.exit_reason.as_str(), "take_profit_100");
        assert_eq!(trade.exit_value, trade.amount * dec!(2.0));
        assert_eq!(trade.profit_loss, trade.exit_value - trade.capital_committed);
        assert_eq!(trade.profit_loss, dec!(100));
        assert_eq!(trade.status, PositionStatus::Closed);
        assert_eq!(pm.open_count(), 0);
        assert_eq!(pm.ledger().available_capital(), dec!(1100));

        // Exactly one trade per close
        assert!(pm.monitor_at(t0() + Duration::minutes(2)).await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_loss() {
        let (price, oracle) = settable_oracle(None);
        let mut pm = manager(oracle);
        pm.try_enter(&hot("A"), t0()).await.unwrap();

        *price.lock() = Some(dec!(0.79));
        let trades = pm.monitor_at(t0() + Duration::minutes(1)).await;

        assert_eq!(trades[0].exit_reason.as_str(), "stop_loss");
        assert_eq!(trades[0].profit_loss, dec!(-21));
        assert_eq!(pm.ledger().daily_pnl(), dec!(-21));
    }

    #[tokio::test]
    async fn test_partial_take_profit_needs_hold_time() {
        let (_price, oracle) = settable_oracle(Some(dec!(1.6)));
        let mut pm = manager(oracle);
        pm.try_enter(&hot("A"), t0()).await.unwrap();

        assert!(pm.monitor_at(t0() + Duration::minutes(10)).await.is_empty());

        let trades = pm.monitor_at(t0() + Duration::minutes(31)).await;
        assert_eq!(trades[0].exit_reason, ExitReason::TakeProfit50);
    }

    #[tokio::test]
    async fn test_time_exit_for_stale_positions() {
        let (price, oracle) = settable_oracle(Some(dec!(1.15)));
        let mut pm = manager(oracle);
        pm.try_enter(&hot("A"), t0()).await.unwrap();

        let day_later = t0() + Duration::hours(25);
        assert!(pm.monitor_at(day_later).await.is_empty());

        *price.lock() = Some(dec!(1.05));
        let trades = pm.monitor_at(day_later).await;
        assert_eq!(trades[0].exit_reason, ExitReason::TimeExit);
    }

    #[test]
    fn test_exit_rule_priority() {
        let long = Duration::hours(30);
        assert_eq!(evaluate_exit(dec!(150), long), Some(ExitReason::TakeProfit100));
        assert_eq!(evaluate_exit(dec!(60), long), Some(ExitReason::TakeProfit50));
        assert_eq!(evaluate_exit(dec!(-20), long), Some(ExitReason::StopLoss));
        assert_eq!(evaluate_exit(dec!(5), long), Some(ExitReason::TimeExit));
        assert_eq!(evaluate_exit(dec!(49.9), Duration::minutes(5)), None);
    }

    #[tokio::test]
    async fn test_missing_price_holds_position() {
        let (_price, oracle) = settable_oracle(None);
        let mut pm = manager(oracle);
        pm.try_enter(&hot("A"), t0()).await.unwrap();

        let trades = pm.monitor_at(t0() + Duration::hours(48)).await;
        assert!(trades.is_empty());
        assert_eq!(pm.position("A").unwrap().status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn test_entry_execution_failure_leaves_no_position() {
        let mut executor = MockTradeExecutor::new();
        executor.expect_execute().returning(|c, _, _| {
            Err(TradeError::ExecutionFailure {
                address: c.address.clone(),
                reason: "rpc timeout".to_string(),
            })
        });
        let (_price, oracle) = settable_oracle(None);
        let mut pm = manager_with(Arc::new(executor), oracle);

        let err = pm.try_enter(&hot("A"), t0()).await.unwrap_err();
        assert!(matches!(err, TradeError::ExecutionFailure { .. }));
        assert_eq!(pm.open_count(), 0);
        assert_eq!(pm.ledger().available_capital(), dec!(1000));
        assert_eq!(pm.ledger().active_position_count(), 0);
    }

    #[tokio::test]
    async fn test_exit_failure_retries_next_tick() {
        let fill = |side: TradeSide, usd: Decimal, tokens: Decimal| ExecutionReport {
            id: Uuid::new_v4().to_string(),
            side,
            fill_price: dec!(1),
            token_amount: tokens,
            usd_value: usd,
            sol_amount: Decimal::ZERO,
            fee: Decimal::ZERO,
            executed_at: t0(),
        };

        let mut seq = Sequence::new();
        let mut executor = MockTradeExecutor::new();
        executor
            .expect_execute()
            .withf(|_, side, _| *side == TradeSide::Buy)
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, side, size| Ok(fill(side, size, size)));
        executor
            .expect_execute()
            .withf(|_, side, _| *side == TradeSide::Sell)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|c, _, _| {
                Err(TradeError::ExecutionFailure {
                    address: c.address.clone(),
                    reason: "slippage exceeded".to_string(),
                })
            });
        executor
            .expect_execute()
            .withf(|_, side, _| *side == TradeSide::Sell)
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |c, side, amount| Ok(fill(side, amount * c.price, amount)));

        let (_price, oracle) = settable_oracle(Some(dec!(0.5)));
        let mut pm = manager_with(Arc::new(executor), oracle);
        pm.try_enter(&hot("A"), t0()).await.unwrap();

        assert!(pm.monitor_at(t0() + Duration::minutes(1)).await.is_empty());
        assert!(pm.position("A").is_some());

        let trades = pm.monitor_at(t0() + Duration::minutes(2)).await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(trades[0].profit_loss, dec!(-50));
    }

    #[tokio::test]
    async fn test_entry_guards() {
        let (price, oracle) = settable_oracle(None);
        let mut pm = manager(oracle);

        pm.try_enter(&hot("A"), t0()).await.unwrap();
        assert_eq!(
            pm.try_enter(&hot("A"), t0()).await,
            Err(TradeError::AlreadyOpen("A".to_string()))
        );

        pm.try_enter(&hot("B"), t0()).await.unwrap();
        assert!(matches!(
            pm.try_enter(&hot("C"), t0()).await,
            Err(TradeError::PositionLimit { .. })
        ));

        // Close A and check the re-entry cooldown
        *price.lock() = Some(dec!(2.0));
        let closed_at = t0() + Duration::minutes(1);
        assert_eq!(pm.monitor_at(closed_at).await.len(), 2);
        assert_eq!(
            pm.try_enter(&hot("A"), closed_at + Duration::minutes(30)).await,
            Err(TradeError::CoolingDown("A".to_string()))
        );
        assert!(pm
            .try_enter(&hot("A"), closed_at + Duration::minutes(61))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_daily_loss_blocks_entries_but_not_exits() {
        let (price, oracle) = settable_oracle(None);
        let mut pm = manager(oracle);
        pm.try_enter(&hot("A"), t0()).await.unwrap();
        pm.try_enter(&hot("B"), t0()).await.unwrap();

        // Both stop out: -180 exceeds the 150 limit
        *price.lock() = Some(dec!(0.1));
        let trades = pm.monitor_at(t0() + Duration::minutes(1)).await;
        assert_eq!(trades.len(), 2);
        assert!(pm.ledger().is_loss_guard_tripped());

        assert!(matches!(
            pm.try_enter(&hot("C"), t0() + Duration::minutes(2)).await,
            Err(TradeError::DailyLossLimit { .. })
        ));

        pm.reset_daily_loss_guard();
        assert!(pm
            .try_enter(&hot("C"), t0() + Duration::minutes(2))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_gate_rejection_is_not_an_error() {
        let (_price, oracle) = settable_oracle(None);
        let mut pm = manager(oracle);
        let thin = hot("A").with_liquidity(dec!(10));

        assert_eq!(pm.try_enter(&thin, t0()).await, Ok(None));
        assert_eq!(pm.open_count(), 0);
    }

    #[test]
    fn test_entry_size_scales_with_confidence() {
        let (_price, oracle) = settable_oracle(None);
        let pm = manager(oracle);
        let mut score = pm.evaluate(&hot("A"), t0()).score;

        assert_eq!(pm.entry_size(&score), dec!(100));
        score.overall_score = dec!(60);
        assert_eq!(pm.entry_size(&score), dec!(80));
        score.overall_score = dec!(-5);
        assert_eq!(pm.entry_size(&score), dec!(50));
    }
}
