use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::CovenantRiskError;
use crate::simulation::config::SimulationVariable;
use crate::CovenantRiskResult;

/// Tolerance below which two pairwise declarations count as the same value.
const DECLARATION_TOLERANCE: f64 = 1e-12;

/// Symmetric, unit-diagonal matrix of pairwise correlation coefficients,
/// ordered like the variable list it was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Assemble the matrix from each variable's pairwise declarations.
    ///
    /// Unspecified pairs default to 0 and every declaration is mirrored, so
    /// the result is symmetric by construction. Self-referential entries are
    /// ignored; the diagonal stays 1. In lenient mode (the default) a pair
    /// declared by both sides resolves last-writer-wins, in declaration
    /// order; `strict` turns a conflicting pair into an error. The matrix is
    /// deliberately not tested for positive-semi-definiteness here; the
    /// decomposition handles degenerate input per its own mode.
    pub fn from_variables(
        variables: &[SimulationVariable],
        strict: bool,
    ) -> CovenantRiskResult<Self> {
        let n = variables.len();
        let index: HashMap<&str, usize> = variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id.as_str(), i))
            .collect();

        let mut values = vec![vec![0.0; n]; n];
        for (i, row) in values.iter_mut().enumerate() {
            row[i] = 1.0;
        }

        let mut declared: HashSet<(usize, usize)> = HashSet::new();

        for (i, var) in variables.iter().enumerate() {
            for (other_id, &rho) in &var.correlations {
                if other_id == &var.id {
                    continue;
                }
                let Some(&j) = index.get(other_id.as_str()) else {
                    continue;
                };
                let pair = (i.min(j), i.max(j));
                if strict
                    && declared.contains(&pair)
                    && (values[i][j] - rho).abs() > DECLARATION_TOLERANCE
                {
                    return Err(CovenantRiskError::InconsistentCorrelationMatrix(format!(
                        "variables '{}' and '{}' declare conflicting coefficients ({} vs {})",
                        variables[pair.0].id, variables[pair.1].id, values[i][j], rho
                    )));
                }
                declared.insert(pair);
                values[i][j] = rho;
                values[j][i] = rho;
            }
        }

        Ok(Self { values })
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }
}
