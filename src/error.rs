use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatementEngineError {
    #[error("Duplicate account code '{code}' in period {period}")]
    DuplicateAccountCode { code: String, period: String },

    #[error("Invalid period selector: {0}")]
    InvalidPeriod(String),

    #[error("Invalid fixed share {share} for account {code}: must be between 0.0 and 1.0")]
    InvalidCostShare { code: String, share: f64 },

    #[error("Invalid classification pattern '{id}': {details}")]
    InvalidPattern { id: String, details: String },

    #[error("Aggregation mismatch at account {code}: node value {value} != children sum {children_sum}")]
    AggregationMismatch {
        code: String,
        value: f64,
        children_sum: f64,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StatementEngineError>;
