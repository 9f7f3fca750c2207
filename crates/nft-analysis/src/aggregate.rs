//! Per-entity summaries built from one time-ordered group.

use std::collections::HashSet;

use nft_data::Transaction;
use serde::{Deserialize, Serialize};

use crate::classify::ClassificationLabel;
use crate::error::{AnalysisError, Result};
use crate::group::{Group, GroupKey, Groups};
use crate::sort::{SortField, SortKey};

/// A purchase time in both forms the export carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseTime {
    pub unix_time: i64,
    pub display: String,
}

impl From<&Transaction> for PurchaseTime {
    fn from(tx: &Transaction) -> Self {
        Self {
            unix_time: tx.unix_time,
            display: tx.display_time.clone(),
        }
    }
}

/// Summary of one entity's transaction group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// Entity key (buyer, token id or collection name).
    pub entity_id: String,
    pub n_transactions: u64,
    pub n_unique_buyers: u64,
    /// Distinct transaction hashes; a batch sale repeats one hash.
    pub n_unique_hashes: u64,
    pub first_time: PurchaseTime,
    pub last_time: PurchaseTime,
    /// Purchase before the last one, when it belongs to the same entity.
    pub second_last_time: Option<PurchaseTime>,
    /// Purchase two before the last one, when it belongs to the same entity.
    pub third_last_time: Option<PurchaseTime>,
    /// Set once by [`crate::classify::FraudClassifier::label`].
    pub label: Option<ClassificationLabel>,
}

impl AggregateRecord {
    /// The value ranked on for `field`.
    pub fn sort_key(&self, field: SortField) -> Result<SortKey> {
        let key = match field {
            SortField::Transactions => SortKey(i128::from(self.n_transactions)),
            SortField::UniqueBuyers => SortKey(i128::from(self.n_unique_buyers)),
            SortField::UniqueHashes => SortKey(i128::from(self.n_unique_hashes)),
            SortField::Label => {
                let label = self.label.ok_or_else(|| AnalysisError::Unlabeled {
                    entity: self.entity_id.clone(),
                })?;
                SortKey(label.surrogate() as i128)
            }
        };
        Ok(key)
    }
}

/// Reduce one group to its [`AggregateRecord`] in a single pass.
///
/// The "second/third last" lookbacks are only taken when the earlier
/// transaction carries the same `key` value as the last one, so a record
/// never reads across an entity boundary.
pub fn aggregate_group(group: &Group, key: GroupKey) -> Result<AggregateRecord> {
    let txs = &group.transactions;
    let (first, last) = match (txs.first(), txs.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(AnalysisError::EmptyGroup {
                entity: group.key.clone(),
            })
        }
    };

    let mut buyers: HashSet<&str> = HashSet::new();
    let mut hashes: HashSet<&str> = HashSet::new();
    for tx in txs {
        buyers.insert(tx.buyer_id.as_str());
        hashes.insert(tx.hash.as_str());
    }

    let lookback = |back: usize| -> Option<PurchaseTime> {
        let ix = txs.len().checked_sub(back + 1)?;
        let earlier = &txs[ix];
        (key.select(earlier) == key.select(last)).then(|| PurchaseTime::from(earlier))
    };

    Ok(AggregateRecord {
        entity_id: group.key.clone(),
        n_transactions: txs.len() as u64,
        n_unique_buyers: buyers.len() as u64,
        n_unique_hashes: hashes.len() as u64,
        first_time: PurchaseTime::from(first),
        last_time: PurchaseTime::from(last),
        second_last_time: lookback(1),
        third_last_time: lookback(2),
        label: None,
    })
}

/// Aggregate every group, in group order.
pub fn aggregate_all(groups: &Groups) -> Result<Vec<AggregateRecord>> {
    groups
        .iter()
        .map(|group| aggregate_group(group, groups.key))
        .collect()
}
