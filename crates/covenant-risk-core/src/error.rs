use thiserror::Error;

#[derive(Debug, Error)]
pub enum CovenantRiskError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Inconsistent correlation matrix: {0}")]
    InconsistentCorrelationMatrix(String),

    #[error("Simulation cancelled after {completed_iterations} iterations")]
    Cancelled { completed_iterations: u32 },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CovenantRiskError {
    fn from(e: serde_json::Error) -> Self {
        CovenantRiskError::SerializationError(e.to_string())
    }
}
