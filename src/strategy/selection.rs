//! Acceptance gate applied to scored candidates.

use rust_decimal::Decimal;
use std::fmt;

use super::scorer::ScoreResult;
use crate::config::{SelectionConfig, TierThresholds};
use crate::source::{Candidate, TrustTier};

/// Why a candidate was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    LowLiquidity,
    LowScore,
    HighRisk,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::LowLiquidity => write!(f, "low_liquidity"),
            RejectReason::LowScore => write!(f, "low_score"),
            RejectReason::HighRisk => write!(f, "high_risk"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject(RejectReason),
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Accept => write!(f, "accept"),
            Decision::Reject(reason) => write!(f, "reject:{}", reason),
        }
    }
}

/// Thresholds get looser as source trust increases.
#[derive(Debug, Clone)]
pub struct SelectionGate {
    config: SelectionConfig,
}

impl SelectionGate {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    pub fn thresholds(&self, tier: TrustTier) -> &TierThresholds {
        match tier {
            TrustTier::High => &self.config.high_trust,
            TrustTier::Medium => &self.config.medium_trust,
            TrustTier::Low => &self.config.low_trust,
        }
    }

    pub fn min_liquidity(&self) -> Decimal {
        self.config.min_liquidity
    }

    pub fn evaluate(&self, candidate: &Candidate, score: &ScoreResult) -> Decision {
        if candidate.liquidity < self.config.min_liquidity {
            return Decision::Reject(RejectReason::LowLiquidity);
        }

        let t = self.thresholds(candidate.trust_tier());
        if score.overall_score <= t.min_score {
            Decision::Reject(RejectReason::LowScore)
        } else if score.risk_score >= t.max_risk {
            Decision::Reject(RejectReason::HighRisk)
        } else {
            Decision::Accept
        }
    }
}

impl Default for SelectionGate {
    fn default() -> Self {
        Self::new(SelectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;
    use rust_decimal_macros::dec;

    fn score(overall: Decimal, risk: Decimal) -> ScoreResult {
        ScoreResult {
            liquidity_score: Decimal::ZERO,
            momentum_score: Decimal::ZERO,
            age_score: Decimal::ZERO,
            volume_score: Decimal::ZERO,
            source_score: Decimal::ZERO,
            overall_score: overall,
            risk_score: risk,
        }
    }

    fn candidate(priority: u8) -> Candidate {
        Candidate::new("Mint", SourceId::DexScreener, priority).with_liquidity(dec!(20000))
    }

    #[test]
    fn test_thresholds_are_strict() {
        let gate = SelectionGate::default();
        let c = candidate(2);

        assert_eq!(
            gate.evaluate(&c, &score(dec!(65), dec!(10))),
            Decision::Reject(RejectReason::LowScore)
        );
        assert_eq!(
            gate.evaluate(&c, &score(dec!(66), dec!(60))),
            Decision::Reject(RejectReason::HighRisk)
        );
        assert!(gate.evaluate(&c, &score(dec!(66), dec!(59))).is_accept());
    }

    #[test]
    fn test_trust_relaxes_thresholds() {
        let gate = SelectionGate::default();
        let s = score(dec!(60), dec!(55));

        assert!(gate.evaluate(&candidate(3), &s).is_accept());
        assert!(!gate.evaluate(&candidate(2), &s).is_accept());
        assert!(!gate.evaluate(&candidate(1), &s).is_accept());
    }

    #[test]
    fn test_min_liquidity_rejects_first() {
        let gate = SelectionGate::default();
        let thin = candidate(3).with_liquidity(dec!(999));
        assert_eq!(
            gate.evaluate(&thin, &score(dec!(99), dec!(0))),
            Decision::Reject(RejectReason::LowLiquidity)
        );
    }
}
