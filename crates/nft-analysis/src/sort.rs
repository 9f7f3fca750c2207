//! Descending ranking with two interchangeable algorithms.
//!
//! Both algorithms sort a permutation of indices over precomputed keys and
//! then move the items once, so key extraction runs exactly once per item.
//!
//! - [`SortAlgorithm::Merge`]: iterative bottom-up merge sort, O(n log n),
//!   no recursion. On equal keys the left run wins, keeping input order.
//! - [`SortAlgorithm::Radix`]: LSD radix sort over base-10 digits with a
//!   stable counting pass per digit, O(n·k). Only non-negative keys.
//!   The counting passes run over the reversed input and their ascending
//!   output is reversed at the end, so equal keys also keep input order and
//!   both algorithms return identical sequences.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateRecord;
use crate::error::{AnalysisError, Result};

/// Sorting strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortAlgorithm {
    Merge,
    Radix,
}

impl SortAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortAlgorithm::Merge => "merge",
            SortAlgorithm::Radix => "radix",
        }
    }
}

impl FromStr for SortAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge" => Ok(SortAlgorithm::Merge),
            "radix" => Ok(SortAlgorithm::Radix),
            other => Err(format!("unknown sort algorithm: {other}")),
        }
    }
}

/// Aggregate field to rank on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Transactions,
    UniqueBuyers,
    UniqueHashes,
    /// ASCII surrogate of the classification label.
    Label,
}

/// A rankable value. Every ranked field is an integer count or the label
/// surrogate, so one signed integer covers them all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey(pub i128);

impl SortKey {
    /// The key as a radix digit source, if it is non-negative.
    pub fn radix_value(&self) -> Option<u128> {
        u128::try_from(self.0).ok()
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sort `items` descending by `key` with the chosen algorithm.
///
/// # Errors
/// [`AnalysisError::UnsupportedKey`] when `Radix` meets a key that is not a
/// non-negative. Nothing is reordered in that case.
pub fn sort_by_key<T, F>(items: Vec<T>, algorithm: SortAlgorithm, key: F) -> Result<Vec<T>>
where
    F: FnMut(&T) -> SortKey,
{
    match algorithm {
        SortAlgorithm::Merge => Ok(merge_sort_by_key(items, key)),
        SortAlgorithm::Radix => radix_sort_by_key(items, key),
    }
}

/// Rank aggregates descending by `field`.
pub fn sort_records(
    records: Vec<AggregateRecord>,
    field: SortField,
    algorithm: SortAlgorithm,
) -> Result<Vec<AggregateRecord>> {
    let keys = records
        .iter()
        .map(|record| record.sort_key(field))
        .collect::<Result<Vec<_>>>()?;

    let order = match algorithm {
        SortAlgorithm::Merge => merge_order(&keys),
        SortAlgorithm::Radix => radix_order(&radix_keys(&keys)?),
    };
    Ok(apply_order(records, &order))
}

/// Merge sort, descending, stable.
pub fn merge_sort_by_key<T, F>(items: Vec<T>, key: F) -> Vec<T>
where
    F: FnMut(&T) -> SortKey,
{
    let keys: Vec<SortKey> = items.iter().map(key).collect();
    let order = merge_order(&keys);
    apply_order(items, &order)
}

/// LSD radix sort, descending, stable.
pub fn radix_sort_by_key<T, F>(items: Vec<T>, key: F) -> Result<Vec<T>>
where
    F: FnMut(&T) -> SortKey,
{
    let keys: Vec<SortKey> = items.iter().map(key).collect();
    let order = radix_order(&radix_keys(&keys)?);
    Ok(apply_order(items, &order))
}

/// Number of counting passes for a maximum key: `⌈log10(max + 1)⌉`, at least 1.
pub fn radix_passes(max_key: u128) -> u32 {
    let mut passes = 1;
    let mut rest = max_key / 10;
    while rest > 0 {
        passes += 1;
        rest /= 10;
    }
    passes
}

fn radix_keys(keys: &[SortKey]) -> Result<Vec<u128>> {
    keys.iter()
        .enumerate()
        .map(|(position, key)| {
            key.radix_value().ok_or_else(|| AnalysisError::UnsupportedKey {
                position,
                key: key.to_string(),
            })
        })
        .collect()
}

fn merge_order(keys: &[SortKey]) -> Vec<usize> {
    let n = keys.len();
    let mut src: Vec<usize> = (0..n).collect();
    let mut dst = vec![0usize; n];

    let mut width = 1;
    while width < n {
        let mut start = 0;
        while start < n {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            merge_runs(keys, &src[start..mid], &src[mid..end], &mut dst[start..end]);
            start = end;
        }
        std::mem::swap(&mut src, &mut dst);
        width *= 2;
    }

    src
}

/// Take the larger head each step; `>=` keeps the left run first on ties.
fn merge_runs(keys: &[SortKey], left: &[usize], right: &[usize], out: &mut [usize]) {
    let (mut i, mut j) = (0, 0);
    for slot in out.iter_mut() {
        let take_left = j >= right.len()
            || (i < left.len() && keys[left[i]] >= keys[right[j]]);
        if take_left {
            *slot = left[i];
            i += 1;
        } else {
            *slot = right[j];
            j += 1;
        }
    }
}

fn radix_order(keys: &[u128]) -> Vec<usize> {
    let max_key = keys.iter().copied().max().unwrap_or(0);
    let passes = radix_passes(max_key);

    let mut order: Vec<usize> = (0..keys.len()).rev().collect();
    let mut exp: u128 = 1;
    for pass in 0..passes {
        order = counting_pass(keys, &order, exp);
        if pass + 1 < passes {
            exp *= 10;
        }
    }

    order.reverse();
    order
}

/// Stable ascending counting sort of `order` on the digit at `exp`.
fn counting_pass(keys: &[u128], order: &[usize], exp: u128) -> Vec<usize> {
    let digit = |ix: usize| ((keys[ix] / exp) % 10) as usize;

    let mut count = [0usize; 10];
    for &ix in order {
        count[digit(ix)] += 1;
    }
    for d in 1..10 {
        count[d] += count[d - 1];
    }

    let mut out = vec![0usize; order.len()];
    for &ix in order.iter().rev() {
        let d = digit(ix);
        count[d] -= 1;
        out[count[d]] = ix;
    }
    out
}

fn apply_order<T>(items: Vec<T>, order: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order
        .iter()
        .filter_map(|&ix| slots[ix].take())
        .collect()
}
