use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Distribution summary for one covenant's simulated ratio series. Moments
/// and extremes cover finite values only; unbounded ratios never enter the
/// arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilityDistribution {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Percentile per requested confidence level, keyed by the level as a
    /// percentage (e.g. "95").
    pub percentiles: BTreeMap<String, f64>,
    /// Share of iterations that breached this covenant, in percent.
    pub breach_probability: f64,
}

/// Pooled-headroom summary across every covenant. The var_95/var_99 figures
/// are pessimistic lower-tail headroom bounds, not a loss-distribution VaR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub mean_headroom: f64,
    pub std_dev_headroom: f64,
    pub var_95: f64,
    pub var_99: f64,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Nearest-rank percentile over an ascending-sorted, non-empty slice:
/// `index = floor(p × count)`, clamped to the last valid index. Not
/// interpolated; the exact method is a contract for deterministic test
/// expectations.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let index = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Population mean and standard deviation.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Map key for a confidence level, as a percentage. Rounded so that e.g.
/// 0.95 renders as "95" rather than a float-noise tail.
pub fn confidence_key(level: f64) -> String {
    let pct = (level * 100.0 * 10_000.0).round() / 10_000.0;
    format!("{pct}")
}

/// Summarize one covenant's finite ratio series. An empty series (every
/// iteration produced an unbounded ratio) reports zeroed moments and
/// percentiles; breach probability is computed regardless.
pub fn build_distribution(
    finite_values: &[f64],
    confidence_levels: &[f64],
    breach_count: u32,
    iterations: u32,
) -> ProbabilityDistribution {
    let breach_probability = breach_count as f64 / iterations as f64 * 100.0;

    if finite_values.is_empty() {
        let percentiles = confidence_levels
            .iter()
            .map(|level| (confidence_key(*level), 0.0))
            .collect();
        return ProbabilityDistribution {
            mean: 0.0,
            std_dev: 0.0,
            min: 0.0,
            max: 0.0,
            percentiles,
            breach_probability,
        };
    }

    let mut sorted = finite_values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let (mean, std_dev) = mean_and_std(&sorted);
    let percentiles = confidence_levels
        .iter()
        .map(|level| (confidence_key(*level), percentile(&sorted, *level)))
        .collect();

    ProbabilityDistribution {
        mean,
        std_dev,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        percentiles,
        breach_probability,
    }
}

/// Pool every covenant's finite headroom values into one distribution and
/// report its centre and pessimistic tail.
pub fn build_portfolio_summary(pooled_headroom: &[f64]) -> PortfolioSummary {
    if pooled_headroom.is_empty() {
        return PortfolioSummary {
            mean_headroom: 0.0,
            std_dev_headroom: 0.0,
            var_95: 0.0,
            var_99: 0.0,
        };
    }

    let mut sorted = pooled_headroom.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let (mean_headroom, std_dev_headroom) = mean_and_std(&sorted);
    PortfolioSummary {
        mean_headroom,
        std_dev_headroom,
        var_95: percentile(&sorted, 0.05),
        var_99: percentile(&sorted, 0.01),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
