use crate::types::{CovenantKind, CovenantThreshold, MetricsSnapshot, RatioValue, ThresholdDirection};

// ---------------------------------------------------------------------------
// Ratio calculation
// ---------------------------------------------------------------------------
//
// Pure functions; both the stochastic engine and the deterministic scenario
// path go through these, so the two can never disagree on the same input.

/// A non-positive denominator means the test cannot bind: the ratio is
/// reported as `SafelyUnbounded` instead of a raw infinity.
fn guarded_ratio(numerator: f64, denominator: f64) -> RatioValue {
    if denominator <= 0.0 {
        RatioValue::SafelyUnbounded
    } else {
        RatioValue::Finite(numerator / denominator)
    }
}

/// Total debt / EBITDA.
pub fn leverage(m: &MetricsSnapshot) -> RatioValue {
    guarded_ratio(m.total_debt, m.ebitda)
}

/// EBITDA / interest expense.
pub fn interest_coverage(m: &MetricsSnapshot) -> RatioValue {
    guarded_ratio(m.ebitda, m.interest_expense)
}

/// EBITDA / fixed charges.
pub fn fixed_charge_coverage(m: &MetricsSnapshot) -> RatioValue {
    guarded_ratio(m.ebitda, m.fixed_charges)
}

/// Net operating income / total debt service.
pub fn debt_service_coverage(m: &MetricsSnapshot) -> RatioValue {
    guarded_ratio(m.net_operating_income, m.total_debt_service)
}

/// The liquidity balance itself; no ratio involved.
pub fn minimum_liquidity(m: &MetricsSnapshot) -> RatioValue {
    RatioValue::Finite(m.liquidity)
}

pub fn ratio_for(kind: CovenantKind, m: &MetricsSnapshot) -> RatioValue {
    match kind {
        CovenantKind::Leverage => leverage(m),
        CovenantKind::InterestCoverage => interest_coverage(m),
        CovenantKind::FixedChargeCoverage => fixed_charge_coverage(m),
        CovenantKind::DebtServiceCoverage => debt_service_coverage(m),
        CovenantKind::MinimumLiquidity => minimum_liquidity(m),
    }
}

// ---------------------------------------------------------------------------
// Headroom and breach
// ---------------------------------------------------------------------------

/// Signed percentage distance between a ratio and its threshold. Negative
/// always means breach, whichever direction the threshold binds in.
/// Minimum-liquidity covenants use the minimum-style formula regardless of
/// the declared direction. An unbounded ratio maps to −∞ headroom under a
/// maximum threshold and +∞ under a minimum one, reproducing the float
/// arithmetic of a division-based ratio.
pub fn headroom_pct(kind: CovenantKind, ratio: RatioValue, threshold: &CovenantThreshold) -> f64 {
    let direction = if kind == CovenantKind::MinimumLiquidity {
        ThresholdDirection::Minimum
    } else {
        threshold.direction
    };

    match ratio {
        RatioValue::Finite(r) => match direction {
            ThresholdDirection::Maximum => (threshold.value - r) / threshold.value * 100.0,
            ThresholdDirection::Minimum => (r - threshold.value) / threshold.value * 100.0,
        },
        RatioValue::SafelyUnbounded => match direction {
            ThresholdDirection::Maximum => f64::NEG_INFINITY,
            ThresholdDirection::Minimum => f64::INFINITY,
        },
    }
}

pub fn is_breach(headroom: f64) -> bool {
    headroom < 0.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
