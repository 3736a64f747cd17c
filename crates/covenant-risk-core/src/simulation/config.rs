use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::CovenantRiskError;
use crate::types::MetricsSnapshot;
use crate::CovenantRiskResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Probability distribution kind for a simulation variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    Normal,
    Uniform,
    Triangular,
    Lognormal,
}

/// A single risk variable to simulate. Immutable during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationVariable {
    /// One of the recognized metric perturbation identifiers; anything else
    /// is rejected when the configuration is validated.
    pub id: String,
    pub distribution: DistributionKind,
    pub base_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<f64>,
    /// Pairwise correlation coefficients against other variable ids, each in
    /// [-1, 1]. Ordered map so matrix assembly is deterministic.
    #[serde(default)]
    pub correlations: BTreeMap<String, f64>,
}

/// Top-level input for a covenant Monte Carlo run. Immutable per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of iterations; must be a positive integer.
    pub iterations: u32,
    /// Confidence levels to report percentiles at, each strictly in (0, 1).
    pub confidence_levels: Vec<f64>,
    pub variables: Vec<SimulationVariable>,
    /// Optional seed for reproducibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Reject conflicting or non-positive-semi-definite correlation input
    /// instead of clamping through it.
    #[serde(default)]
    pub strict_correlation: bool,
}

// ---------------------------------------------------------------------------
// Metric perturbation mapping
// ---------------------------------------------------------------------------

/// The closed set of metric perturbations a variable id can name. Resolved
/// once at validation time, so an unrecognized id is a construction-time
/// error rather than a silent no-op inside the iteration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricShock {
    DebtChange,
    EbitdaChange,
    RateChange,
    FixedChargeChange,
    NoiChange,
    DebtServiceChange,
    LiquidityChange,
}

impl MetricShock {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "debt_change" => Some(MetricShock::DebtChange),
            "ebitda_change" => Some(MetricShock::EbitdaChange),
            "rate_change" => Some(MetricShock::RateChange),
            "fixed_charge_change" => Some(MetricShock::FixedChargeChange),
            "noi_change" => Some(MetricShock::NoiChange),
            "debt_service_change" => Some(MetricShock::DebtServiceChange),
            "liquidity_change" => Some(MetricShock::LiquidityChange),
            _ => None,
        }
    }

    /// Scale the targeted base metric by `1 + shock`.
    pub fn apply(self, metrics: &mut MetricsSnapshot, shock: f64) {
        match self {
            MetricShock::DebtChange => metrics.total_debt *= 1.0 + shock,
            MetricShock::EbitdaChange => metrics.ebitda *= 1.0 + shock,
            MetricShock::RateChange => metrics.interest_expense *= 1.0 + shock,
            MetricShock::FixedChargeChange => metrics.fixed_charges *= 1.0 + shock,
            MetricShock::NoiChange => metrics.net_operating_income *= 1.0 + shock,
            MetricShock::DebtServiceChange => metrics.total_debt_service *= 1.0 + shock,
            MetricShock::LiquidityChange => metrics.liquidity *= 1.0 + shock,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved form
// ---------------------------------------------------------------------------

/// Distribution with every required parameter proven present, so sampling is
/// total. Lognormal mu/sigma are derived here, once.
#[derive(Debug, Clone)]
pub enum ResolvedDistribution {
    Normal { base_value: f64, std_dev: f64 },
    Uniform { min: f64, max: f64 },
    Triangular { min: f64, max: f64, mode: f64 },
    Lognormal { mu: f64, sigma: f64 },
}

/// A simulation variable after validation: shock target resolved, parameters
/// checked and pre-derived.
#[derive(Debug, Clone)]
pub struct ResolvedVariable {
    pub id: String,
    pub shock: MetricShock,
    pub distribution: ResolvedDistribution,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl MonteCarloConfig {
    /// Validate the configuration and resolve every variable. All failures
    /// here are fail-fast configuration errors; nothing has been sampled yet.
    pub fn validate(&self) -> CovenantRiskResult<Vec<ResolvedVariable>> {
        if self.iterations == 0 {
            return Err(CovenantRiskError::InvalidInput {
                field: "iterations".into(),
                reason: "must be a positive integer".into(),
            });
        }

        if self.variables.is_empty() {
            return Err(CovenantRiskError::InsufficientData(
                "at least one simulation variable is required".into(),
            ));
        }

        for (i, level) in self.confidence_levels.iter().enumerate() {
            if !(*level > 0.0 && *level < 1.0) {
                return Err(CovenantRiskError::InvalidInput {
                    field: format!("confidence_levels[{i}]"),
                    reason: format!("must lie strictly between 0 and 1 (got {level})"),
                });
            }
        }

        let mut known_ids: HashSet<&str> = HashSet::new();
        for (i, var) in self.variables.iter().enumerate() {
            if !known_ids.insert(var.id.as_str()) {
                return Err(CovenantRiskError::InvalidInput {
                    field: format!("variables[{i}].id"),
                    reason: format!("duplicate variable id '{}'", var.id),
                });
            }
        }

        let mut resolved = Vec::with_capacity(self.variables.len());
        for (i, var) in self.variables.iter().enumerate() {
            let shock = MetricShock::from_id(&var.id).ok_or_else(|| {
                CovenantRiskError::InvalidInput {
                    field: format!("variables[{i}].id"),
                    reason: format!("unrecognized metric perturbation id '{}'", var.id),
                }
            })?;

            for (target, rho) in &var.correlations {
                if !(-1.0..=1.0).contains(rho) {
                    return Err(CovenantRiskError::InvalidInput {
                        field: format!("variables[{i}].correlations[{target}]"),
                        reason: format!("correlation coefficient must lie in [-1, 1] (got {rho})"),
                    });
                }
                if target != &var.id && !known_ids.contains(target.as_str()) {
                    return Err(CovenantRiskError::InvalidInput {
                        field: format!("variables[{i}].correlations[{target}]"),
                        reason: "references an unknown variable id".into(),
                    });
                }
            }

            let distribution = resolve_distribution(i, var)?;
            resolved.push(ResolvedVariable {
                id: var.id.clone(),
                shock,
                distribution,
            });
        }

        Ok(resolved)
    }
}

fn require(i: usize, name: &str, value: Option<f64>, kind: &str) -> CovenantRiskResult<f64> {
    value.ok_or_else(|| CovenantRiskError::InvalidInput {
        field: format!("variables[{i}].{name}"),
        reason: format!("{name} is required for a {kind} distribution"),
    })
}

fn resolve_distribution(
    i: usize,
    var: &SimulationVariable,
) -> CovenantRiskResult<ResolvedDistribution> {
    match var.distribution {
        DistributionKind::Normal => {
            let std_dev = var.std_dev.unwrap_or(0.0);
            if std_dev < 0.0 {
                return Err(CovenantRiskError::InvalidInput {
                    field: format!("variables[{i}].std_dev"),
                    reason: "must be non-negative".into(),
                });
            }
            Ok(ResolvedDistribution::Normal {
                base_value: var.base_value,
                std_dev,
            })
        }
        DistributionKind::Uniform => {
            let min = require(i, "min", var.min, "uniform")?;
            let max = require(i, "max", var.max, "uniform")?;
            if min > max {
                return Err(CovenantRiskError::InvalidInput {
                    field: format!("variables[{i}].min"),
                    reason: format!("min ({min}) must not exceed max ({max})"),
                });
            }
            Ok(ResolvedDistribution::Uniform { min, max })
        }
        DistributionKind::Triangular => {
            let min = require(i, "min", var.min, "triangular")?;
            let max = require(i, "max", var.max, "triangular")?;
            let mode = require(i, "mode", var.mode, "triangular")?;
            if min >= max {
                return Err(CovenantRiskError::InvalidInput {
                    field: format!("variables[{i}].min"),
                    reason: format!("min ({min}) must be strictly below max ({max})"),
                });
            }
            if mode < min || mode > max {
                return Err(CovenantRiskError::InvalidInput {
                    field: format!("variables[{i}].mode"),
                    reason: format!("mode ({mode}) must lie within [min, max]"),
                });
            }
            Ok(ResolvedDistribution::Triangular { min, max, mode })
        }
        DistributionKind::Lognormal => {
            let std_dev = require(i, "std_dev", var.std_dev, "lognormal")?;
            if std_dev < 0.0 {
                return Err(CovenantRiskError::InvalidInput {
                    field: format!("variables[{i}].std_dev"),
                    reason: "must be non-negative".into(),
                });
            }
            if var.base_value <= 0.0 {
                return Err(CovenantRiskError::InvalidInput {
                    field: format!("variables[{i}].base_value"),
                    reason: "lognormal mean must be positive".into(),
                });
            }
            let sigma = (1.0 + (std_dev / var.base_value).powi(2)).ln().sqrt();
            let mu = var.base_value.ln() - 0.5 * sigma * sigma;
            Ok(ResolvedDistribution::Lognormal { mu, sigma })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn normal_var(id: &str, base: f64, std_dev: f64) -> SimulationVariable {
        SimulationVariable {
            id: id.into(),
            distribution: DistributionKind::Normal,
            base_value: base,
            std_dev: Some(std_dev),
            min: None,
            max: None,
            mode: None,
            correlations: BTreeMap::new(),
        }
    }

    fn basic_config() -> MonteCarloConfig {
        MonteCarloConfig {
            iterations: 1_000,
            confidence_levels: vec![0.5, 0.95, 0.99],
            variables: vec![normal_var("ebitda_change", 0.0, 0.1)],
            seed: Some(42),
            strict_correlation: false,
        }
    }

    #[test]
    fn test_valid_config_resolves() {
        let resolved = basic_config().validate().unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].shock, MetricShock::EbitdaChange);
        match resolved[0].distribution {
            ResolvedDistribution::Normal { base_value, std_dev } => {
                assert_eq!(base_value, 0.0);
                assert_eq!(std_dev, 0.1);
            }
            ref other => panic!("Expected Normal, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut config = basic_config();
        config.iterations = 0;
        let err = config.validate().unwrap_err();
        match err {
            CovenantRiskError::InvalidInput { field, .. } => assert_eq!(field, "iterations"),
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_variables_rejected() {
        let mut config = basic_config();
        config.variables.clear();
        assert!(matches!(
            config.validate().unwrap_err(),
            CovenantRiskError::InsufficientData(_)
        ));
    }

    #[test]
    fn test_confidence_level_bounds() {
        for bad in [0.0, 1.0, -0.5, 1.5] {
            let mut config = basic_config();
            config.confidence_levels = vec![bad];
            assert!(
                config.validate().is_err(),
                "confidence level {bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_unrecognized_variable_id_rejected() {
        let mut config = basic_config();
        config.variables.push(normal_var("revenue_change", 0.0, 0.1));
        let err = config.validate().unwrap_err();
        match err {
            CovenantRiskError::InvalidInput { reason, .. } => {
                assert!(reason.contains("unrecognized"), "{reason}");
            }
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_variable_id_rejected() {
        let mut config = basic_config();
        config.variables.push(normal_var("ebitda_change", 0.0, 0.2));
        let err = config.validate().unwrap_err();
        match err {
            CovenantRiskError::InvalidInput { reason, .. } => {
                assert!(reason.contains("duplicate"), "{reason}");
            }
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_correlation_coefficient_out_of_range() {
        let mut config = basic_config();
        config.variables.push(normal_var("rate_change", 0.0, 0.05));
        config.variables[0]
            .correlations
            .insert("rate_change".into(), 1.2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_correlation_against_unknown_variable() {
        let mut config = basic_config();
        config.variables[0]
            .correlations
            .insert("debt_change".into(), 0.5);
        let err = config.validate().unwrap_err();
        match err {
            CovenantRiskError::InvalidInput { reason, .. } => {
                assert!(reason.contains("unknown variable"), "{reason}");
            }
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_uniform_requires_bounds() {
        let mut config = basic_config();
        config.variables[0].distribution = DistributionKind::Uniform;
        config.variables[0].min = Some(-0.1);
        config.variables[0].max = None;
        assert!(config.validate().is_err());

        config.variables[0].max = Some(0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_uniform_min_above_max_rejected() {
        let mut config = basic_config();
        config.variables[0].distribution = DistributionKind::Uniform;
        config.variables[0].min = Some(0.2);
        config.variables[0].max = Some(0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_triangular_mode_must_lie_within_bounds() {
        let mut config = basic_config();
        config.variables[0].distribution = DistributionKind::Triangular;
        config.variables[0].min = Some(-0.1);
        config.variables[0].max = Some(0.1);
        config.variables[0].mode = Some(0.5);
        assert!(config.validate().is_err());

        config.variables[0].mode = Some(0.02);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lognormal_rejects_non_positive_mean() {
        let mut config = basic_config();
        config.variables[0].distribution = DistributionKind::Lognormal;
        config.variables[0].base_value = 0.0;
        config.variables[0].std_dev = Some(0.1);
        let err = config.validate().unwrap_err();
        match err {
            CovenantRiskError::InvalidInput { reason, .. } => {
                assert!(reason.contains("positive"), "{reason}");
            }
            other => panic!("Expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_lognormal_derives_mu_sigma() {
        let mut config = basic_config();
        config.variables[0].distribution = DistributionKind::Lognormal;
        config.variables[0].base_value = 1.0;
        config.variables[0].std_dev = Some(0.5);
        let resolved = config.validate().unwrap();
        match resolved[0].distribution {
            ResolvedDistribution::Lognormal { mu, sigma } => {
                let expected_sigma = (1.0_f64 + 0.25).ln().sqrt();
                assert!((sigma - expected_sigma).abs() < 1e-12);
                assert!((mu - (-0.5 * expected_sigma * expected_sigma)).abs() < 1e-12);
            }
            ref other => panic!("Expected Lognormal, got {other:?}"),
        }
    }

    #[test]
    fn test_metric_shock_mapping_is_closed() {
        let ids = [
            ("debt_change", MetricShock::DebtChange),
            ("ebitda_change", MetricShock::EbitdaChange),
            ("rate_change", MetricShock::RateChange),
            ("fixed_charge_change", MetricShock::FixedChargeChange),
            ("noi_change", MetricShock::NoiChange),
            ("debt_service_change", MetricShock::DebtServiceChange),
            ("liquidity_change", MetricShock::LiquidityChange),
        ];
        for (id, shock) in ids {
            assert_eq!(MetricShock::from_id(id), Some(shock));
        }
        assert_eq!(MetricShock::from_id("capex_change"), None);
    }

    #[test]
    fn test_metric_shock_applies_multiplicatively() {
        let mut metrics = MetricsSnapshot {
            total_debt: 200.0,
            ebitda: 50.0,
            interest_expense: 10.0,
            fixed_charges: 20.0,
            net_operating_income: 45.0,
            total_debt_service: 30.0,
            liquidity: 25.0,
        };
        MetricShock::EbitdaChange.apply(&mut metrics, -0.1);
        MetricShock::RateChange.apply(&mut metrics, 0.25);
        assert!((metrics.ebitda - 45.0).abs() < 1e-12);
        assert!((metrics.interest_expense - 12.5).abs() < 1e-12);
        // Untouched metrics stay put.
        assert_eq!(metrics.total_debt, 200.0);
        assert_eq!(metrics.liquidity, 25.0);
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = basic_config();
        let json = serde_json::to_string(&config).unwrap();
        let back: MonteCarloConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.iterations, config.iterations);
        assert_eq!(back.seed, config.seed);
        assert_eq!(back.variables.len(), 1);
        assert!(!back.strict_correlation);
    }
}
