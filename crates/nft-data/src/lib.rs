//! nft-data crate
//!
//! Marketplace transaction records, CSV ingestion and price normalization.

pub mod currency;
pub mod ingest;
pub mod types;

pub use types::Transaction;
