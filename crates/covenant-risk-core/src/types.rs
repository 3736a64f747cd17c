use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The covenant tests an engagement can carry. Keys of the threshold
/// mapping; only covenants present in that mapping are ever evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovenantKind {
    Leverage,
    InterestCoverage,
    FixedChargeCoverage,
    DebtServiceCoverage,
    MinimumLiquidity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    /// The ratio must not exceed the threshold.
    Maximum,
    /// The ratio must not fall below the threshold.
    Minimum,
}

/// Contractual threshold for a single covenant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CovenantThreshold {
    pub value: f64,
    pub direction: ThresholdDirection,
}

/// Base financial metrics a simulation run perturbs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_debt: f64,
    pub ebitda: f64,
    pub interest_expense: f64,
    pub fixed_charges: f64,
    pub net_operating_income: f64,
    pub total_debt_service: f64,
    pub liquidity: f64,
}

/// Per-run evaluation context: which covenants apply, at what thresholds,
/// against which base metrics. Assembled by the caller; supplied fresh per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationContext {
    pub thresholds: HashMap<CovenantKind, CovenantThreshold>,
    pub base_metrics: MetricsSnapshot,
}

/// A computed covenant ratio. A non-positive denominator does not produce a
/// raw float infinity; it produces the explicit `SafelyUnbounded` tag, so
/// statistics code has to filter it deliberately rather than by accident.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RatioValue {
    Finite(f64),
    SafelyUnbounded,
}

impl RatioValue {
    pub fn as_finite(&self) -> Option<f64> {
        match self {
            RatioValue::Finite(v) => Some(*v),
            RatioValue::SafelyUnbounded => None,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, RatioValue::SafelyUnbounded)
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}
