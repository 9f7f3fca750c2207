//! Shared test helpers.
//!
//! Factory functions for transactions and aggregates with sensible defaults.

#![allow(dead_code)]

use nft_analysis::aggregate::{AggregateRecord, PurchaseTime};
use nft_data::Transaction;

/// 2022-04-15T05:20:00Z, the display time `04/15/2022 05:20`.
pub const BASE_UNIX_TIME: i64 = 1_650_000_000;

/// Sample purchase of `token` by `buyer`, `minutes` after [`BASE_UNIX_TIME`].
///
/// The display time is formatted so the default fraud time format parses it.
pub fn sample_tx(hash: &str, buyer: &str, token: &str, minutes: i64) -> Transaction {
    let total = 5 * 60 + 20 + minutes;
    Transaction {
        hash: hash.to_string(),
        unix_time: BASE_UNIX_TIME + minutes * 60,
        display_time: format!("04/15/2022 {:02}:{:02}", total / 60, total % 60),
        action: "Bought".to_string(),
        buyer_id: buyer.to_string(),
        nft: "CryptoPunks".to_string(),
        token_id: token.to_string(),
        token_type: "ERC-721".to_string(),
        quantity: 1,
        price: 65.5,
        price_text: "0.05 ETH ($65.50)".to_string(),
        market: "OpenSea".to_string(),
    }
}

/// Aggregate with only the entity and counts set; times are zeroed.
pub fn sample_record(entity_id: &str, n_transactions: u64, n_unique_buyers: u64) -> AggregateRecord {
    let time = PurchaseTime {
        unix_time: 0,
        display: String::new(),
    };
    AggregateRecord {
        entity_id: entity_id.to_string(),
        n_transactions,
        n_unique_buyers,
        n_unique_hashes: n_transactions,
        first_time: time.clone(),
        last_time: time,
        second_last_time: None,
        third_last_time: None,
        label: None,
    }
}

/// Deterministic key sequence with plenty of ties: `(i * 37 + 13) % modulus`.
pub fn scrambled_counts(len: usize, modulus: u64) -> Vec<u64> {
    (0..len as u64).map(|i| (i * 37 + 13) % modulus).collect()
}

/// CSV export header in the scraper's column order.
pub const CSV_HEADER: &str = "Txn Hash,UnixTimestamp,Date Time (UTC),Action,Buyer,NFT,Token ID,Type,Quantity,Price,Market";
