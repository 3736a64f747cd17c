use crate::correlation::CholeskyFactor;
use crate::rng::{triangular_inverse_cdf, SimulationRng};
use crate::simulation::config::{ResolvedDistribution, ResolvedVariable};

// Abramowitz–Stegun 7.1.26 rational approximation of erf. The coefficients
// are fixed; together with the LCG they define the reproducible stream, so
// they must never be swapped for a library implementation.
const A1: f64 = 0.254829592;
const A2: f64 = -0.284496736;
const A3: f64 = 1.421413741;
const A4: f64 = -1.453152027;
const A5: f64 = 1.061405429;
const P: f64 = 0.3275911;

/// Standard normal CDF, accurate to roughly 1e-7.
pub fn standard_normal_cdf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + P * x);
    let erf = 1.0 - ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    0.5 * (1.0 + sign * erf)
}

/// Draws one correlated value per variable per iteration.
///
/// Independent standard normals are correlated through the Cholesky factor,
/// then each correlated normal is mapped into its variable's distribution.
/// Normal variables consume the correlated normal directly; uniform and
/// triangular variables go through the normal CDF to a percentile first;
/// lognormal variables combine the correlated normal with the pre-derived
/// mu/sigma. The asymmetry is part of the reproducibility contract.
pub struct CorrelatedSampler<'a> {
    variables: &'a [ResolvedVariable],
    factor: &'a CholeskyFactor,
}

impl<'a> CorrelatedSampler<'a> {
    pub fn new(variables: &'a [ResolvedVariable], factor: &'a CholeskyFactor) -> Self {
        debug_assert_eq!(variables.len(), factor.size());
        Self { variables, factor }
    }

    /// One draw per variable, in variable order.
    pub fn sample(&self, rng: &mut SimulationRng) -> Vec<f64> {
        let z: Vec<f64> = (0..self.variables.len())
            .map(|_| rng.normal(0.0, 1.0))
            .collect();
        let correlated = self.factor.correlate(&z);

        self.variables
            .iter()
            .zip(correlated.iter())
            .map(|(var, &y)| transform(&var.distribution, y))
            .collect()
    }
}

fn transform(distribution: &ResolvedDistribution, y: f64) -> f64 {
    match *distribution {
        ResolvedDistribution::Normal {
            base_value,
            std_dev,
        } => base_value + std_dev * y,
        ResolvedDistribution::Uniform { min, max } => {
            let u = standard_normal_cdf(y);
            min + u * (max - min)
        }
        ResolvedDistribution::Triangular { min, max, mode } => {
            let u = standard_normal_cdf(y);
            triangular_inverse_cdf(u, min, max, mode)
        }
        ResolvedDistribution::Lognormal { mu, sigma } => (mu + sigma * y).exp(),
    }
}
