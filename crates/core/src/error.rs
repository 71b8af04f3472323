use thiserror::Error;

use super::statement::StatementStatus;

/// Fatal pipeline errors. Each halts the owning statement's pipeline and is
/// retained verbatim as the failure cause. Non-fatal conditions (low
/// confidence, duplicates, unmatched reconciliation items) are flags on the
/// data, not errors — visible uncertainty is preferred over silent loss.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unsupported format (best-guess confidence {confidence:.2})")]
    UnsupportedFormat { confidence: f32 },

    #[error("Malformed input at line {line}: {detail}")]
    MalformedInput { line: u32, detail: String },

    #[error("Cannot normalize field '{field}': {detail}")]
    Normalization { field: String, detail: String },

    #[error("{tool} timed out after {secs}s")]
    ExternalToolTimeout { tool: String, secs: u64 },

    #[error("{tool} failed: {detail}")]
    ExternalToolFailure { tool: String, detail: String },

    #[error("Illegal statement transition: {from} -> {to}")]
    IllegalTransition {
        from: StatementStatus,
        to: StatementStatus,
    },

    #[error("Statement not found: {0}")]
    StatementNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(i64),

    #[error("Money error: {0}")]
    Money(#[from] super::money::MoneyError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Whether a failed statement is worth resubmitting as-is.
    /// Timeouts are transient; format and parse failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::ExternalToolTimeout { .. } | IngestError::Io(_))
    }
}
