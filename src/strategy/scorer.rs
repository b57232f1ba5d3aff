//! Deterministic multi-factor scoring of candidates.
//!
//! Every sub-score is a step function on a single candidate field, so the
//! same snapshot and evaluation time always produce the same [`ScoreResult`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::config::ScoreWeights;
use crate::source::{Candidate, TrustTier};

/// Sub-scores and the derived overall and risk scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreResult {
    pub liquidity_score: Decimal,
    pub momentum_score: Decimal,
    /// Freshness plus trust bonus; may exceed 100 for fresh trusted tokens
    pub age_score: Decimal,
    pub volume_score: Decimal,
    pub source_score: Decimal,
    pub overall_score: Decimal,
    /// 0 (safe) to 100 (avoid)
    pub risk_score: Decimal,
}

/// Pure scoring function parameterized by sub-score weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer {
    weights: ScoreWeights,
}

impl Scorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Score a candidate snapshot as of `now`.
    pub fn score(&self, candidate: &Candidate, now: DateTime<Utc>) -> ScoreResult {
        let tier = candidate.trust_tier();
        let age = candidate.age_minutes(now);

        let liquidity_score = liquidity_score(candidate.liquidity);
        let momentum_score = momentum_score(candidate.price_change_24h, candidate.volume_24h);
        let age_score = age_score(age, tier);
        let volume_score = volume_score(candidate.volume_24h, candidate.liquidity);
        let source_score = source_score(tier, candidate.multi_source);

        let w = &self.weights;
        let weighted = liquidity_score * w.liquidity
            + momentum_score * w.momentum
            + age_score * w.age
            + volume_score * w.volume
            + source_score * w.source;
        // Weights are relative; scores stay on the 0-100 scale
        let total = w.total();
        let overall_score = if total > Decimal::ZERO {
            weighted / total
        } else {
            Decimal::ZERO
        };

        ScoreResult {
            liquidity_score,
            momentum_score,
            age_score,
            volume_score,
            source_score,
            overall_score: overall_score.normalize(),
            risk_score: risk_score(
                candidate.liquidity,
                candidate.price_change_24h,
                age,
                tier,
            ),
        }
    }
}

fn liquidity_score(liquidity: Decimal) -> Decimal {
    if liquidity >= dec!(50000) {
        dec!(100)
    } else if liquidity >= dec!(25000) {
        dec!(80)
    } else if liquidity >= dec!(10000) {
        dec!(60)
    } else if liquidity >= dec!(5000) {
        dec!(40)
    } else if liquidity >= dec!(1000) {
        dec!(20)
    } else {
        Decimal::ZERO
    }
}

fn momentum_score(change_pct: Decimal, volume: Decimal) -> Decimal {
    let change_bonus = if change_pct >= dec!(100) {
        dec!(30)
    } else if change_pct >= dec!(50) {
        dec!(25)
    } else if change_pct >= dec!(20) {
        dec!(20)
    } else if change_pct >= dec!(10) {
        dec!(15)
    } else if change_pct >= dec!(5) {
        dec!(10)
    } else {
        Decimal::ZERO
    };

    let volume_bonus = if volume >= dec!(100000) {
        dec!(20)
    } else if volume >= dec!(50000) {
        dec!(15)
    } else if volume >= dec!(10000) {
        dec!(10)
    } else if volume >= dec!(1000) {
        dec!(5)
    } else {
        Decimal::ZERO
    };

    (dec!(50) + change_bonus + volume_bonus).min(dec!(100))
}

fn age_score(age_minutes: i64, tier: TrustTier) -> Decimal {
    let freshness = match age_minutes {
        m if m <= 5 => dec!(100),
        m if m <= 15 => dec!(90),
        m if m <= 30 => dec!(80),
        m if m <= 60 => dec!(70),
        m if m <= 180 => dec!(50),
        m if m <= 360 => dec!(35),
        m if m <= 720 => dec!(20),
        _ => dec!(10),
    };

    let trust_bonus = match tier {
        TrustTier::High => dec!(10),
        TrustTier::Medium => dec!(5),
        TrustTier::Low => Decimal::ZERO,
    };

    freshness + trust_bonus
}

/// Turnover relative to pool depth. Very high turnover is scored below the
/// 2-5x band since it usually indicates wash trading.
fn volume_score(volume: Decimal, liquidity: Decimal) -> Decimal {
    if liquidity <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let ratio = volume / liquidity;

    if ratio > dec!(5) {
        dec!(90)
    } else if ratio >= dec!(2) {
        dec!(100)
    } else if ratio > dec!(1) {
        dec!(80)
    } else if ratio > dec!(0.5) {
        dec!(60)
    } else if ratio > dec!(0.1) {
        dec!(40)
    } else if ratio > Decimal::ZERO {
        dec!(20)
    } else {
        Decimal::ZERO
    }
}

fn source_score(tier: TrustTier, multi_source: bool) -> Decimal {
    let base = match tier {
        TrustTier::High => dec!(90),
        TrustTier::Medium => dec!(70),
        TrustTier::Low => dec!(50),
    };
    let confirmation = if multi_source { dec!(10) } else { Decimal::ZERO };
    (base + confirmation).min(dec!(100))
}

fn risk_score(liquidity: Decimal, change_pct: Decimal, age_minutes: i64, tier: TrustTier) -> Decimal {
    let mut risk = dec!(40);

    // Thin pools
    if liquidity < dec!(1000) {
        risk += dec!(30);
    } else if liquidity < dec!(5000) {
        risk += dec!(20);
    } else if liquidity < dec!(10000) {
        risk += dec!(10);
    }

    // Extreme swings in either direction
    let swing = change_pct.abs();
    if swing > dec!(200) {
        risk += dec!(25);
    } else if swing > dec!(100) {
        risk += dec!(15);
    }

    // Extreme youth
    if age_minutes < 10 {
        risk += dec!(20);
    } else if age_minutes < 30 {
        risk += dec!(10);
    } else if age_minutes < 60 {
        risk += dec!(5);
    }

    risk -= match tier {
        TrustTier::High => dec!(15),
        TrustTier::Medium => dec!(5),
        TrustTier::Low => Decimal::ZERO,
    };

    risk.clamp(Decimal::ZERO, dec!(100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn candidate(priority: u8) -> Candidate {
        Candidate::new("Mint", SourceId::Birdeye, priority).discovered(now())
    }

    #[test]
    fn test_trusted_fresh_token_scenario() {
        let c = candidate(3)
            .with_liquidity(dec!(60000))
            .with_volume_24h(dec!(120000))
            .with_price_change_24h(dec!(120))
            .with_created_at(now() - Duration::minutes(2));

        let s = Scorer::default().score(&c, now());

        assert_eq!(s.liquidity_score, dec!(100));
        assert_eq!(s.momentum_score, dec!(100));
        assert_eq!(s.age_score, dec!(110));
        assert_eq!(s.volume_score, dec!(100));
        assert_eq!(s.source_score, dec!(90));
        // 20 + 20 + 33 + 20 + 9
        assert_eq!(s.overall_score, dec!(102));
        // 40 + 15 (swing) + 20 (youth) - 15 (trust)
        assert_eq!(s.risk_score, dec!(60));
        assert!(s.overall_score > dec!(55));
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let c = candidate(2)
            .with_liquidity(dec!(7300))
            .with_volume_24h(dec!(4100))
            .with_price_change_24h(dec!(-37.5))
            .with_created_at(now() - Duration::minutes(95));
        let scorer = Scorer::default();

        assert_eq!(scorer.score(&c, now()), scorer.score(&c, now()));
    }

    #[test]
    fn test_liquidity_steps() {
        assert_eq!(liquidity_score(dec!(999)), dec!(0));
        assert_eq!(liquidity_score(dec!(1000)), dec!(20));
        assert_eq!(liquidity_score(dec!(9999)), dec!(40));
        assert_eq!(liquidity_score(dec!(25000)), dec!(80));
    }

    #[test]
    fn test_momentum_is_capped() {
        assert_eq!(momentum_score(dec!(500), dec!(1000000)), dec!(100));
        assert_eq!(momentum_score(dec!(0), dec!(0)), dec!(50));
        assert_eq!(momentum_score(dec!(12), dec!(2000)), dec!(70));
    }

    #[test]
    fn test_age_decreases_with_floor() {
        let ages = [0, 10, 20, 45, 120, 300, 600, 5000];
        let scores: Vec<_> = ages.iter().map(|a| age_score(*a, TrustTier::Low)).collect();
        assert!(scores.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(age_score(100_000, TrustTier::Low), dec!(10));
        assert_eq!(age_score(100_000, TrustTier::Medium), dec!(15));
    }

    #[test]
    fn test_volume_ratio_buckets() {
        assert_eq!(volume_score(dec!(100), Decimal::ZERO), dec!(0));
        assert_eq!(volume_score(dec!(0), dec!(1000)), dec!(0));
        assert_eq!(volume_score(dec!(50), dec!(1000)), dec!(20));
        assert_eq!(volume_score(dec!(1500), dec!(1000)), dec!(80));
        assert_eq!(volume_score(dec!(6000), dec!(1000)), dec!(90));
    }

    #[test]
    fn test_risk_is_clamped_and_lowered_by_trust() {
        let young = now() - Duration::minutes(1);
        let low = candidate(1)
            .with_liquidity(dec!(100))
            .with_price_change_24h(dec!(900))
            .with_created_at(young);
        let high = Candidate { source_priority: 3, ..low.clone() };

        let scorer = Scorer::default();
        // 40 + 30 + 25 + 20 = 115, clamped
        assert_eq!(scorer.score(&low, now()).risk_score, dec!(100));
        assert_eq!(scorer.score(&high, now()).risk_score, dec!(100));

        let seasoned = candidate(1)
            .with_liquidity(dec!(50000))
            .with_created_at(now() - Duration::hours(3));
        let trusted = Candidate { source_priority: 3, ..seasoned.clone() };
        assert_eq!(scorer.score(&seasoned, now()).risk_score, dec!(40));
        assert_eq!(scorer.score(&trusted, now()).risk_score, dec!(25));
    }

    #[test]
    fn test_multi_source_raises_source_score() {
        let mut c = candidate(3);
        c.multi_source = true;
        assert_eq!(Scorer::default().score(&c, now()).source_score, dec!(100));
    }

    #[test]
    fn test_custom_weights() {
        let weights = ScoreWeights {
            liquidity: Decimal::ONE,
            momentum: Decimal::ZERO,
            age: Decimal::ZERO,
            volume: Decimal::ZERO,
            source: Decimal::ZERO,
        };
        let c = candidate(1).with_liquidity(dec!(30000));
        assert_eq!(Scorer::new(weights).score(&c, now()).overall_score, dec!(80));
    }

    #[test]
    fn test_weights_are_relative() {
        let defaults = ScoreWeights::default();
        let doubled = ScoreWeights {
            liquidity: defaults.liquidity * dec!(2),
            momentum: defaults.momentum * dec!(2),
            age: defaults.age * dec!(2),
            volume: defaults.volume * dec!(2),
            source: defaults.source * dec!(2),
        };
        let c = candidate(3)
            .with_liquidity(dec!(12000))
            .with_volume_24h(dec!(8000))
            .with_price_change_24h(dec!(25));

        let base = Scorer::new(defaults).score(&c, now()).overall_score;
        assert_eq!(Scorer::new(doubled).score(&c, now()).overall_score, base);
    }
}
