use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::correlation::{CholeskyFactor, CorrelationMatrix};
use crate::covenant::ratios;
use crate::error::CovenantRiskError;
use crate::rng::SimulationRng;
use crate::simulation::config::{MonteCarloConfig, ResolvedVariable};
use crate::simulation::sampler::CorrelatedSampler;
use crate::simulation::statistics::{self, PortfolioSummary, ProbabilityDistribution};
use crate::types::{
    with_metadata, ComputationOutput, CovenantKind, CovenantThreshold, MetricsSnapshot,
    RatioValue, SimulationContext,
};
use crate::CovenantRiskResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One simulated scenario. Produced and consumed within a single run; the
/// engine folds it into the accumulators and drops it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloIteration {
    pub index: u32,
    pub variable_values: HashMap<String, f64>,
    pub ratios: HashMap<CovenantKind, RatioValue>,
    pub headroom: HashMap<CovenantKind, f64>,
    pub breached: bool,
    pub breached_covenants: Vec<CovenantKind>,
}

/// The single worst iteration of the run, by breached-covenant count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorstCaseSummary {
    pub breach_count: u32,
    pub covenants: Vec<CovenantKind>,
}

/// Full result of a covenant Monte Carlo run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub run_id: String,
    pub config: MonteCarloConfig,
    pub run_at: DateTime<Utc>,
    pub runtime_us: u64,
    pub iterations_completed: u32,
    pub distributions: HashMap<CovenantKind, ProbabilityDistribution>,
    /// Share of iterations with at least one breach, in percent.
    pub portfolio_breach_probability: f64,
    pub expected_breaches_per_iteration: f64,
    pub worst_case: WorstCaseSummary,
    pub portfolio_summary: PortfolioSummary,
}

#[derive(Debug, Default)]
struct CovenantSeries {
    finite_ratios: Vec<f64>,
    breach_count: u32,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the full simulation: sample correlated scenarios, evaluate every
/// covenant in the context's threshold mapping per iteration, and aggregate
/// distributions, breach probabilities, and the pooled-headroom portfolio
/// summary. Synchronous and CPU-bound; the loop runs to completion before
/// anything is returned.
pub fn run_monte_carlo_simulation(
    config: &MonteCarloConfig,
    context: &SimulationContext,
) -> CovenantRiskResult<ComputationOutput<MonteCarloResult>> {
    run_simulation(config, context, None)
}

/// Like [`run_monte_carlo_simulation`], with a cooperative cancellation flag
/// checked between iterations. A raised flag aborts the run with
/// `Cancelled`; no partial result is produced.
pub fn run_monte_carlo_simulation_cancellable(
    config: &MonteCarloConfig,
    context: &SimulationContext,
    cancel: &AtomicBool,
) -> CovenantRiskResult<ComputationOutput<MonteCarloResult>> {
    run_simulation(config, context, Some(cancel))
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

fn run_simulation(
    config: &MonteCarloConfig,
    context: &SimulationContext,
    cancel: Option<&AtomicBool>,
) -> CovenantRiskResult<ComputationOutput<MonteCarloResult>> {
    let start = Instant::now();
    let run_at = Utc::now();
    let mut warnings: Vec<String> = Vec::new();

    let resolved = config.validate()?;

    if context.thresholds.is_empty() {
        return Err(CovenantRiskError::InsufficientData(
            "at least one covenant threshold is required".into(),
        ));
    }

    let matrix = CorrelationMatrix::from_variables(&config.variables, config.strict_correlation)?;
    let factor = CholeskyFactor::decompose(&matrix, config.strict_correlation)?;
    if factor.clamped_pivots() > 0 {
        warnings.push(format!(
            "correlation matrix is not positive semi-definite; {} pivot(s) clamped to zero during decomposition",
            factor.clamped_pivots()
        ));
    }

    let mut rng = match config.seed {
        Some(s) => SimulationRng::new(s),
        None => SimulationRng::from_entropy(),
    };
    let sampler = CorrelatedSampler::new(&resolved, &factor);

    // Fixed evaluation order keeps iteration records and breach lists stable
    // across runs; only covenants present in the mapping are ever evaluated.
    let mut covenants: Vec<CovenantKind> = context.thresholds.keys().copied().collect();
    covenants.sort();

    let mut series: Vec<CovenantSeries> = covenants
        .iter()
        .map(|_| CovenantSeries::default())
        .collect();
    let mut pooled_headroom: Vec<f64> = Vec::new();
    let mut breached_iterations: u32 = 0;
    let mut total_breaches: u64 = 0;
    let mut worst_case = WorstCaseSummary {
        breach_count: 0,
        covenants: Vec::new(),
    };

    for index in 0..config.iterations {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(CovenantRiskError::Cancelled {
                    completed_iterations: index,
                });
            }
        }

        let drawn = sampler.sample(&mut rng);
        let iteration = evaluate_iteration(
            index,
            &resolved,
            &drawn,
            &context.base_metrics,
            &covenants,
            &context.thresholds,
        );

        for (kind, entry) in covenants.iter().zip(series.iter_mut()) {
            if let Some(value) = iteration.ratios.get(kind).and_then(RatioValue::as_finite) {
                entry.finite_ratios.push(value);
            }
            if let Some(&headroom) = iteration.headroom.get(kind) {
                if headroom.is_finite() {
                    pooled_headroom.push(headroom);
                }
                if ratios::is_breach(headroom) {
                    entry.breach_count += 1;
                }
            }
        }

        if iteration.breached {
            breached_iterations += 1;
        }
        total_breaches += iteration.breached_covenants.len() as u64;
        if iteration.breached_covenants.len() as u32 > worst_case.breach_count {
            worst_case = WorstCaseSummary {
                breach_count: iteration.breached_covenants.len() as u32,
                covenants: iteration.breached_covenants.clone(),
            };
        }
    }

    let mut distributions = HashMap::with_capacity(covenants.len());
    for (kind, entry) in covenants.iter().zip(series.iter()) {
        if entry.finite_ratios.is_empty() {
            warnings.push(format!(
                "covenant {kind:?} produced no finite ratio values; distribution moments reported as zero"
            ));
        }
        distributions.insert(
            *kind,
            statistics::build_distribution(
                &entry.finite_ratios,
                &config.confidence_levels,
                entry.breach_count,
                config.iterations,
            ),
        );
    }

    let result = MonteCarloResult {
        run_id: format!("mcr-{}-{}", rng.seed(), run_at.timestamp_millis()),
        config: config.clone(),
        run_at,
        runtime_us: start.elapsed().as_micros() as u64,
        iterations_completed: config.iterations,
        distributions,
        portfolio_breach_probability: breached_iterations as f64 / config.iterations as f64
            * 100.0,
        expected_breaches_per_iteration: total_breaches as f64 / config.iterations as f64,
        worst_case,
        portfolio_summary: statistics::build_portfolio_summary(&pooled_headroom),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Correlated Monte Carlo Covenant Simulation",
        &serde_json::json!({
            "iterations": config.iterations,
            "seed": config.seed,
            "resolved_seed": rng.seed(),
            "variables": config.variables.iter().map(|v| &v.id).collect::<Vec<_>>(),
            "covenants": covenants,
            "strict_correlation": config.strict_correlation,
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Perturb the base metrics with one sampled scenario and evaluate every
/// applicable covenant.
fn evaluate_iteration(
    index: u32,
    variables: &[ResolvedVariable],
    drawn: &[f64],
    base_metrics: &MetricsSnapshot,
    covenants: &[CovenantKind],
    thresholds: &HashMap<CovenantKind, CovenantThreshold>,
) -> MonteCarloIteration {
    let mut metrics = *base_metrics;
    let mut variable_values = HashMap::with_capacity(variables.len());
    for (var, value) in variables.iter().zip(drawn.iter()) {
        var.shock.apply(&mut metrics, *value);
        variable_values.insert(var.id.clone(), *value);
    }

    let mut ratio_map = HashMap::with_capacity(covenants.len());
    let mut headroom_map = HashMap::with_capacity(covenants.len());
    let mut breached_covenants = Vec::new();

    for kind in covenants {
        let Some(threshold) = thresholds.get(kind) else {
            continue;
        };
        let ratio = ratios::ratio_for(*kind, &metrics);
        let headroom = ratios::headroom_pct(*kind, ratio, threshold);
        if ratios::is_breach(headroom) {
            breached_covenants.push(*kind);
        }
        ratio_map.insert(*kind, ratio);
        headroom_map.insert(*kind, headroom);
    }

    MonteCarloIteration {
        index,
        variable_values,
        ratios: ratio_map,
        headroom: headroom_map,
        breached: !breached_covenants.is_empty(),
        breached_covenants,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::{DistributionKind, SimulationVariable};
    use crate::types::ThresholdDirection;
    use std::collections::BTreeMap;

    const SEED: u64 = 42;

    fn normal_var(id: &str, std_dev: f64) -> SimulationVariable {
        SimulationVariable {
            id: id.into(),
            distribution: DistributionKind::Normal,
            base_value: 0.0,
            std_dev: Some(std_dev),
            min: None,
            max: None,
            mode: None,
            correlations: BTreeMap::new(),
        }
    }

    fn base_metrics() -> MetricsSnapshot {
        MetricsSnapshot {
            total_debt: 200.0,
            ebitda: 50.0,
            interest_expense: 10.0,
            fixed_charges: 20.0,
            net_operating_income: 45.0,
            total_debt_service: 30.0,
            liquidity: 25.0,
        }
    }

    fn leverage_context(threshold: f64) -> SimulationContext {
        let mut thresholds = HashMap::new();
        thresholds.insert(
            CovenantKind::Leverage,
            CovenantThreshold {
                value: threshold,
                direction: ThresholdDirection::Maximum,
            },
        );
        SimulationContext {
            thresholds,
            base_metrics: base_metrics(),
        }
    }

    fn basic_config() -> MonteCarloConfig {
        MonteCarloConfig {
            iterations: 500,
            confidence_levels: vec![0.5, 0.95],
            variables: vec![normal_var("ebitda_change", 0.1)],
            seed: Some(SEED),
            strict_correlation: false,
        }
    }

    #[test]
    fn test_basic_run_completes() {
        let output = run_monte_carlo_simulation(&basic_config(), &leverage_context(4.5)).unwrap();
        let result = &output.result;
        assert_eq!(result.iterations_completed, 500);
        assert_eq!(result.distributions.len(), 1);
        assert!(result.distributions.contains_key(&CovenantKind::Leverage));
        assert!(result.run_id.starts_with("mcr-"));
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let config = basic_config();
        let context = leverage_context(4.5);
        let a = run_monte_carlo_simulation(&config, &context).unwrap();
        let b = run_monte_carlo_simulation(&config, &context).unwrap();
        let da = &a.result.distributions[&CovenantKind::Leverage];
        let db = &b.result.distributions[&CovenantKind::Leverage];
        assert_eq!(da.mean, db.mean);
        assert_eq!(da.std_dev, db.std_dev);
        assert_eq!(da.breach_probability, db.breach_probability);
        assert_eq!(
            a.result.portfolio_summary.var_95,
            b.result.portfolio_summary.var_95
        );
    }

    #[test]
    fn test_empty_thresholds_rejected() {
        let context = SimulationContext {
            thresholds: HashMap::new(),
            base_metrics: base_metrics(),
        };
        assert!(matches!(
            run_monte_carlo_simulation(&basic_config(), &context).unwrap_err(),
            CovenantRiskError::InsufficientData(_)
        ));
    }

    #[test]
    fn test_invalid_config_rejected_before_sampling() {
        let mut config = basic_config();
        config.iterations = 0;
        assert!(run_monte_carlo_simulation(&config, &leverage_context(4.5)).is_err());
    }

    #[test]
    fn test_zero_variance_already_breached_is_certain() {
        // Base leverage is 4.0; a 3.5x maximum is already violated and the
        // zero-variance scenario never moves, so every iteration breaches.
        let mut config = basic_config();
        config.variables = vec![normal_var("ebitda_change", 0.0)];
        let output = run_monte_carlo_simulation(&config, &leverage_context(3.5)).unwrap();
        let result = &output.result;
        assert_eq!(result.portfolio_breach_probability, 100.0);
        assert_eq!(
            result.distributions[&CovenantKind::Leverage].breach_probability,
            100.0
        );
        assert_eq!(result.expected_breaches_per_iteration, 1.0);
        assert_eq!(result.worst_case.breach_count, 1);
        assert_eq!(result.worst_case.covenants, vec![CovenantKind::Leverage]);
    }

    #[test]
    fn test_zero_variance_safe_case_never_breaches() {
        let mut config = basic_config();
        config.variables = vec![normal_var("ebitda_change", 0.0)];
        let output = run_monte_carlo_simulation(&config, &leverage_context(4.5)).unwrap();
        let result = &output.result;
        assert_eq!(result.portfolio_breach_probability, 0.0);
        assert_eq!(result.worst_case.breach_count, 0);
        let dist = &result.distributions[&CovenantKind::Leverage];
        assert_eq!(dist.mean, 4.0);
        assert_eq!(dist.std_dev, 0.0);
        assert_eq!(dist.min, 4.0);
        assert_eq!(dist.max, 4.0);
    }

    #[test]
    fn test_only_mapped_covenants_evaluated() {
        let output = run_monte_carlo_simulation(&basic_config(), &leverage_context(4.5)).unwrap();
        assert!(!output
            .result
            .distributions
            .contains_key(&CovenantKind::InterestCoverage));
    }

    #[test]
    fn test_unbounded_ratio_series_warns() {
        // EBITDA perturbed to a fixed -120% leaves it negative every
        // iteration: leverage is unbounded throughout.
        let mut config = basic_config();
        config.variables = vec![SimulationVariable {
            base_value: -1.2,
            ..normal_var("ebitda_change", 0.0)
        }];
        let output = run_monte_carlo_simulation(&config, &leverage_context(4.5)).unwrap();
        assert!(
            output.warnings.iter().any(|w| w.contains("no finite ratio")),
            "expected a no-finite-values warning, got {:?}",
            output.warnings
        );
        // An unbounded leverage ratio under a maximum threshold is a breach.
        assert_eq!(output.result.portfolio_breach_probability, 100.0);
    }

    #[test]
    fn test_cancellation_between_iterations() {
        let cancel = AtomicBool::new(true);
        let err = run_monte_carlo_simulation_cancellable(
            &basic_config(),
            &leverage_context(4.5),
            &cancel,
        )
        .unwrap_err();
        match err {
            CovenantRiskError::Cancelled {
                completed_iterations,
            } => assert_eq!(completed_iterations, 0),
            other => panic!("Expected Cancelled, got {other:?}"),
        }
    }

    #[test]
    fn test_unset_cancel_flag_is_inert() {
        let cancel = AtomicBool::new(false);
        let output = run_monte_carlo_simulation_cancellable(
            &basic_config(),
            &leverage_context(4.5),
            &cancel,
        )
        .unwrap();
        assert_eq!(output.result.iterations_completed, 500);
    }

    #[test]
    fn test_assumptions_echo_inputs() {
        let output = run_monte_carlo_simulation(&basic_config(), &leverage_context(4.5)).unwrap();
        assert_eq!(output.assumptions["iterations"], 500);
        assert_eq!(output.assumptions["seed"], SEED);
        assert_eq!(output.assumptions["variables"][0], "ebitda_change");
        assert_eq!(output.metadata.precision, "ieee754_f64");
    }
}
