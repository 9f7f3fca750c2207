//! Error taxonomy for the analysis core.

use thiserror::Error;

/// Failures raised by grouping, aggregation, sorting and graph building.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// The key selector produced an empty value for a transaction.
    #[error("transaction {position} has no {key} value")]
    InvalidKey { key: &'static str, position: usize },

    /// Radix sort was handed a negative or non-integer key.
    #[error("radix sort needs non-negative integer keys, item {position} has {key}")]
    UnsupportedKey { position: usize, key: String },

    /// A group is not ordered by ascending time.
    #[error("group {entity} is not time-ordered at position {position}")]
    UnorderedGroup { entity: String, position: usize },

    /// Aggregation was asked to summarize an empty group.
    #[error("group {entity} has no transactions")]
    EmptyGroup { entity: String },

    /// Sorting by label was requested before classification ran.
    #[error("aggregate {entity} has no classification label")]
    Unlabeled { entity: String },

    /// A display timestamp did not match the configured format.
    #[error("failed to parse {value:?} with format {format:?}")]
    DateParse { value: String, format: String },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
