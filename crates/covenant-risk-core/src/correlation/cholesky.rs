use serde::{Deserialize, Serialize};

use crate::correlation::matrix::CorrelationMatrix;
use crate::error::CovenantRiskError;
use crate::CovenantRiskResult;

/// A radicand below this is treated as materially negative in strict mode;
/// anything between it and zero is ordinary floating-point noise.
const STRICT_RADICAND_TOLERANCE: f64 = 1e-10;

/// Lower-triangular Cholesky factor of a correlation matrix, used to turn
/// independent standard normals into correlated ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CholeskyFactor {
    lower: Vec<Vec<f64>>,
    clamped_pivots: usize,
}

impl CholeskyFactor {
    /// Factor `matrix` into `L` with `L·Lᵗ ≈ matrix`.
    ///
    /// Lenient mode tolerates matrices that are not positive semi-definite:
    /// a negative diagonal radicand is clamped to zero (and counted so the
    /// caller can surface a warning) and a zero pivot divides as 1 instead
    /// of poisoning the column. Strict mode rejects a materially negative
    /// radicand with `InconsistentCorrelationMatrix`.
    pub fn decompose(matrix: &CorrelationMatrix, strict: bool) -> CovenantRiskResult<Self> {
        let n = matrix.size();
        let mut lower = vec![vec![0.0; n]; n];
        let mut clamped_pivots = 0;

        for i in 0..n {
            for j in 0..=i {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += lower[i][k] * lower[j][k];
                }

                if i == j {
                    let radicand = matrix.get(i, i) - sum;
                    if radicand < 0.0 {
                        if strict && radicand < -STRICT_RADICAND_TOLERANCE {
                            return Err(CovenantRiskError::InconsistentCorrelationMatrix(
                                format!(
                                    "matrix is not positive semi-definite (pivot {} radicand {})",
                                    i, radicand
                                ),
                            ));
                        }
                        clamped_pivots += 1;
                        lower[i][j] = 0.0;
                    } else {
                        lower[i][j] = radicand.sqrt();
                    }
                } else {
                    let pivot = lower[j][j];
                    let divisor = if pivot == 0.0 { 1.0 } else { pivot };
                    lower[i][j] = (matrix.get(i, j) - sum) / divisor;
                }
            }
        }

        Ok(Self {
            lower,
            clamped_pivots,
        })
    }

    /// `y = L·z`, using only the lower triangle.
    pub fn correlate(&self, z: &[f64]) -> Vec<f64> {
        let n = self.lower.len();
        debug_assert_eq!(z.len(), n);
        let mut y = vec![0.0; n];
        for i in 0..n {
            for j in 0..=i {
                y[i] += self.lower[i][j] * z[j];
            }
        }
        y
    }

    pub fn size(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[Vec<f64>] {
        &self.lower
    }

    /// How many diagonal radicands were clamped to zero during the
    /// factorization. Non-zero means the input was not positive
    /// semi-definite.
    pub fn clamped_pivots(&self) -> usize {
        self.clamped_pivots
    }
}
