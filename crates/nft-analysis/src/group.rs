//! Stable partitioning of transactions by entity key.
//!
//! Groups are emitted in first-seen key order and keep arrival order inside
//! each group. Aggregation reads "first", "last" and "second last" purchases
//! positionally, so every group must already be ordered by time; [`group_by`]
//! checks that and reports the first violation.

use std::collections::HashMap;

use nft_data::Transaction;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, Result};

/// Which transaction field identifies an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    /// Buyer identity.
    Buyer,
    /// Token id within a collection.
    Token,
    /// Collection name.
    Nft,
}

impl GroupKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKey::Buyer => "buyer",
            GroupKey::Token => "token",
            GroupKey::Nft => "nft",
        }
    }

    /// The key value of `tx` under this selector.
    pub fn select<'a>(&self, tx: &'a Transaction) -> &'a str {
        match self {
            GroupKey::Buyer => &tx.buyer_id,
            GroupKey::Token => &tx.token_id,
            GroupKey::Nft => &tx.nft,
        }
    }
}

/// Transactions sharing one entity key, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    pub key: String,
    pub transactions: Vec<Transaction>,
}

/// Result of [`group_by`]: groups in first-seen key order.
#[derive(Clone, Debug)]
pub struct Groups {
    pub key: GroupKey,
    groups: Vec<Group>,
    index: HashMap<String, usize>,
}

impl Groups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Group> {
        self.index.get(key).map(|&ix| &self.groups[ix])
    }

    /// Total transactions across all groups.
    pub fn transaction_count(&self) -> usize {
        self.groups.iter().map(|g| g.transactions.len()).sum()
    }

    pub fn into_vec(self) -> Vec<Group> {
        self.groups
    }
}

/// Partition `txs` by `key`, preserving relative order inside each group.
///
/// # Errors
/// - [`AnalysisError::InvalidKey`] if a transaction has an empty key value.
/// - [`AnalysisError::UnorderedGroup`] if a group's timestamps decrease.
pub fn group_by(txs: &[Transaction], key: GroupKey) -> Result<Groups> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (position, tx) in txs.iter().enumerate() {
        let value = key.select(tx);
        if value.is_empty() {
            return Err(AnalysisError::InvalidKey {
                key: key.as_str(),
                position,
            });
        }

        let ix = *index.entry(value.to_string()).or_insert_with(|| {
            groups.push(Group {
                key: value.to_string(),
                transactions: Vec::new(),
            });
            groups.len() - 1
        });
        groups[ix].transactions.push(tx.clone());
    }

    for group in &groups {
        check_time_order(group)?;
    }

    debug!(key = key.as_str(), groups = groups.len(), transactions = txs.len(), "grouped transactions");
    Ok(Groups { key, groups, index })
}

fn check_time_order(group: &Group) -> Result<()> {
    for (position, pair) in group.transactions.windows(2).enumerate() {
        if pair[1].unix_time < pair[0].unix_time {
            return Err(AnalysisError::UnorderedGroup {
                entity: group.key.clone(),
                position: position + 1,
            });
        }
    }
    Ok(())
}

/// Stable sort by sale time, establishing the [`group_by`] precondition.
pub fn order_by_time(txs: &mut [Transaction]) {
    txs.sort_by_key(|tx| tx.unix_time);
}

/// Entity descending, then time ascending: the layout the hand-off graph scans.
pub fn order_by_entity_then_time(txs: &mut [Transaction], key: GroupKey) {
    txs.sort_by(|a, b| {
        key.select(b)
            .cmp(key.select(a))
            .then(a.unix_time.cmp(&b.unix_time))
    });
}
