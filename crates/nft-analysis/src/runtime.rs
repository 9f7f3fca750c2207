//! Runtime-versus-batch-size harness.
//!
//! Re-runs a workload on growing prefixes of the input (`step`, `2·step`,
//! …, then the full input) and records the mean measured time next to an
//! asymptotic reference for the same batch size, so the two curves can be
//! compared.

use std::time::Duration;

use nft_data::Transaction;
use serde::Serialize;

use crate::error::Result;
use crate::pipeline::{build_graph, run_query, AnalysisConfig};
use crate::sort::{radix_passes, SortAlgorithm};

/// What the harness times.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    /// The sort stage of `config.query`.
    Query,
    /// Hand-off graph construction.
    Graph,
}

/// Measurements for one batch size.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchTiming {
    pub batch_size: usize,
    pub runs: usize,
    pub mean_elapsed_ns: f64,
    /// Operation count predicted by the algorithm's complexity.
    pub asymptotic_ops: f64,
}

/// Prefix lengths to time: multiples of `step` below `total`, then `total`.
///
/// A zero `step` yields the full input as a single batch.
pub fn batch_sizes(total: usize, step: usize) -> Vec<usize> {
    if total == 0 {
        return Vec::new();
    }
    if step == 0 {
        return vec![total];
    }
    let mut sizes: Vec<usize> = (1..)
        .map(|i| i * step)
        .take_while(|&n| n < total)
        .collect();
    sizes.push(total);
    sizes
}

/// `n·log10(n)` for merge sort, `n·k` for radix sort with `k` digit passes.
pub fn sort_asymptotic_ops(algorithm: SortAlgorithm, n: usize, max_key: u128) -> f64 {
    let n = n as f64;
    match algorithm {
        SortAlgorithm::Merge if n > 1.0 => n * n.log10(),
        SortAlgorithm::Merge => n,
        SortAlgorithm::Radix => n * f64::from(radix_passes(max_key)),
    }
}

/// Time `workload` over growing batches of `txs`.
///
/// `on_batch` is called after each batch, e.g. to advance a progress bar.
pub fn measure_batches<F>(
    txs: &[Transaction],
    config: &AnalysisConfig,
    workload: Workload,
    mut on_batch: F,
) -> Result<Vec<BatchTiming>>
where
    F: FnMut(&BatchTiming),
{
    let runs = config.runs.max(1);
    let mut timings = Vec::new();

    for batch_size in batch_sizes(txs.len(), config.batch_step) {
        let batch = &txs[..batch_size];
        let mut total = Duration::ZERO;
        let mut asymptotic_ops = 0.0;

        for _ in 0..runs {
            match workload {
                Workload::Query => {
                    let report = run_query(batch, config)?;
                    total += report.sort_elapsed;
                    let field = config.query.sort_field();
                    let max_key = report
                        .records
                        .iter()
                        .filter_map(|record| record.sort_key(field).ok()?.radix_value())
                        .max()
                        .unwrap_or(0);
                    asymptotic_ops =
                        sort_asymptotic_ops(config.algorithm, batch_size, max_key);
                }
                Workload::Graph => {
                    let (_, elapsed) = build_graph(batch, config.graph_entity)?;
                    total += elapsed;
                    asymptotic_ops = batch_size as f64;
                }
            }
        }

        let timing = BatchTiming {
            batch_size,
            runs,
            mean_elapsed_ns: total.as_nanos() as f64 / runs as f64,
            asymptotic_ops,
        };
        on_batch(&timing);
        timings.push(timing);
    }

    Ok(timings)
}
