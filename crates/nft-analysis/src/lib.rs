//! nft-analysis crate
//!
//! Batch analytics over marketplace transactions: grouping and aggregation,
//! merge/radix ranking, fraud classification, buyer hand-off graphs and the
//! runtime batch harness.

pub mod adjacency;
pub mod aggregate;
pub mod classify;
pub mod error;
pub mod group;
pub mod pipeline;
pub mod runtime;
pub mod sort;

pub use error::AnalysisError;
