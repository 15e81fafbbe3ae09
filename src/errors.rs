use std::io;

use thiserror::Error;

use crate::types::SourceId;

/// Error type for extraction, aggregation, record-source, and cache failures.
#[derive(Debug, Error)]
pub enum StatsError {
    /// An aggregate was requested over zero observed values.
    #[error("statistic '{statistic}' requested but no values were observed")]
    EmptyInput {
        /// Statistic or accumulator name.
        statistic: String,
    },
    /// A field path failed to parse.
    #[error("invalid field path '{path}': {reason}")]
    InvalidFieldPath {
        /// Path as written by the caller.
        path: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Retryable record-source failure.
    #[error("record source '{source_id}' hit a transient failure: {reason}")]
    TransientSource {
        /// Failing source.
        source_id: SourceId,
        /// Underlying failure.
        reason: String,
    },
    /// Record source or input file cannot be used (retries exhausted included).
    #[error("record source '{source_id}' is unavailable: {reason}")]
    SourceUnavailable {
        /// Failing source or input file.
        source_id: SourceId,
        /// Underlying failure.
        reason: String,
    },
    /// Input was readable but malformed.
    #[error("record source '{source_id}' returned inconsistent state: {details}")]
    SourceInconsistent {
        /// Failing source or input file.
        source_id: SourceId,
        /// What was inconsistent.
        details: String,
    },
    /// Cache document or artifact could not be written.
    #[error("cache artifact {path} failed: {reason}")]
    Cache {
        /// Artifact path.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// Unclassified IO failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Invalid configuration or argument.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StatsError {
    /// Build an `EmptyInput` error for the named statistic.
    pub fn empty(statistic: impl Into<String>) -> Self {
        StatsError::EmptyInput {
            statistic: statistic.into(),
        }
    }

    /// True for failures the record-source retry policy should absorb.
    pub fn is_transient(&self) -> bool {
        matches!(self, StatsError::TransientSource { .. })
    }
}
