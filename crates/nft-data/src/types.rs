//! Type definitions for marketplace transaction records.

use serde::{Deserialize, Serialize};

/// One marketplace sale as exported by the NFT marketplace scraper.
///
/// Records are produced by [`crate::ingest`] and are treated as immutable by
/// the analysis crate. The only field rewritten after parsing is `price`,
/// which [`crate::currency`] fills with the USD-normalized amount.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash (hex text).
    pub hash: String,
    /// Sale time in unix seconds.
    pub unix_time: i64,
    /// Sale time as rendered by the marketplace, e.g. `"3/14/2022 17:05"`.
    pub display_time: String,
    /// Marketplace action, e.g. `"Bought"`.
    pub action: String,
    /// Buyer identity (address or ENS name).
    pub buyer_id: String,
    /// NFT collection name.
    pub nft: String,
    /// Token identifier within the collection.
    pub token_id: String,
    /// Token standard, e.g. `"ERC-721"`.
    pub token_type: String,
    /// Number of units sold.
    pub quantity: u64,
    /// Price in USD after normalization (0.0 until normalized).
    pub price: f64,
    /// Price text as exported, e.g. `"0.05 ETH ($65.50)"`.
    pub price_text: String,
    /// Marketplace name.
    pub market: String,
}
