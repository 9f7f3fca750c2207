//! Query pipeline: group, aggregate, classify, rank.
//!
//! All run settings travel in [`AnalysisConfig`]; nothing is read from
//! process-wide state.

use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

use eyre::{Context, Result as EyreResult};
use nft_data::Transaction;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adjacency::AdjacencyGraph;
use crate::aggregate::{aggregate_all, AggregateRecord};
use crate::classify::{ClassifierConfig, FraudClassifier};
use crate::error::Result;
use crate::group::{group_by, order_by_entity_then_time, GroupKey};
use crate::sort::{sort_records, SortAlgorithm, SortField};

/// Which ranking to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// Buyers ranked by number of purchases.
    BuyerActivity,
    /// Tokens ranked by number of distinct buyers.
    TokenPopularity,
    /// Tokens classified by the fraud heuristic, ranked by label.
    TokenFraud,
}

impl Query {
    pub fn as_str(&self) -> &'static str {
        match self {
            Query::BuyerActivity => "buyer_activity",
            Query::TokenPopularity => "token_popularity",
            Query::TokenFraud => "token_fraud",
        }
    }

    pub fn group_key(&self) -> GroupKey {
        match self {
            Query::BuyerActivity => GroupKey::Buyer,
            Query::TokenPopularity | Query::TokenFraud => GroupKey::Token,
        }
    }

    pub fn sort_field(&self) -> SortField {
        match self {
            Query::BuyerActivity => SortField::Transactions,
            Query::TokenPopularity => SortField::UniqueBuyers,
            Query::TokenFraud => SortField::Label,
        }
    }

    pub fn classifies(&self) -> bool {
        matches!(self, Query::TokenFraud)
    }
}

impl FromStr for Query {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.replace('-', "_").to_ascii_lowercase().as_str() {
            "buyer_activity" => Ok(Query::BuyerActivity),
            "token_popularity" => Ok(Query::TokenPopularity),
            "token_fraud" => Ok(Query::TokenFraud),
            other => Err(format!("unknown query: {other}")),
        }
    }
}

/// Everything one run needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub query: Query,
    pub algorithm: SortAlgorithm,
    pub classifier: ClassifierConfig,
    /// Entity the hand-off graph chains on (`token` or `nft`).
    pub graph_entity: GroupKey,
    /// Repetitions per batch in the runtime harness.
    pub runs: usize,
    /// Batch size increment in the runtime harness.
    pub batch_step: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            query: Query::BuyerActivity,
            algorithm: SortAlgorithm::Merge,
            classifier: ClassifierConfig::default(),
            graph_entity: GroupKey::Token,
            runs: 1,
            batch_step: 1000,
        }
    }
}

impl AnalysisConfig {
    /// Load a JSON config; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> EyreResult<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .wrap_err_with(|| format!("failed to parse config {}", path.display()))
    }
}

/// Ranked output of one query run.
#[derive(Clone, Debug)]
pub struct QueryReport {
    pub query: Query,
    pub algorithm: SortAlgorithm,
    pub records: Vec<AggregateRecord>,
    /// Time spent in the sort stage only.
    pub sort_elapsed: Duration,
}

/// Run `config.query` over `txs`, which must be time-ordered per entity.
pub fn run_query(txs: &[Transaction], config: &AnalysisConfig) -> Result<QueryReport> {
    let query = config.query;
    let groups = group_by(txs, query.group_key())?;
    let mut records = aggregate_all(&groups)?;

    if query.classifies() {
        let classifier = FraudClassifier::new(config.classifier.clone());
        records = classifier.label_all(records);
    }

    let started = Instant::now();
    let records = sort_records(records, query.sort_field(), config.algorithm)?;
    let sort_elapsed = started.elapsed();

    info!(
        query = query.as_str(),
        algorithm = config.algorithm.as_str(),
        transactions = txs.len(),
        entities = records.len(),
        sort_ns = sort_elapsed.as_nanos() as u64,
        "query completed"
    );

    Ok(QueryReport {
        query,
        algorithm: config.algorithm,
        records,
        sort_elapsed,
    })
}

/// Order a copy of `txs` by (entity desc, time asc) and build the hand-off graph.
///
/// The returned duration covers graph construction only.
pub fn build_graph(txs: &[Transaction], entity_key: GroupKey) -> Result<(AdjacencyGraph, Duration)> {
    let mut ordered = txs.to_vec();
    order_by_entity_then_time(&mut ordered, entity_key);

    let started = Instant::now();
    let graph = AdjacencyGraph::build(&ordered, entity_key)?;
    let elapsed = started.elapsed();

    info!(
        entity_key = entity_key.as_str(),
        transactions = txs.len(),
        buyers = graph.node_count(),
        edges = graph.edge_count(),
        build_ns = elapsed.as_nanos() as u64,
        "graph built"
    );
    Ok((graph, elapsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassificationLabel;

    fn tx(hash: &str, buyer: &str, token: &str, t: i64, display: &str) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            unix_time: t,
            display_time: display.to_string(),
            action: "Bought".to_string(),
            buyer_id: buyer.to_string(),
            nft: "Punks".to_string(),
            token_id: token.to_string(),
            token_type: "ERC-721".to_string(),
            quantity: 1,
            price: 1.0,
            price_text: "1 USDC ($1.00)".to_string(),
            market: "OpenSea".to_string(),
        }
    }

    fn batch() -> Vec<Transaction> {
        vec![
            tx("0x1", "alice", "7", 0, "3/14/2022 9:00"),
            tx("0x2", "bob", "8", 60, "3/14/2022 9:01"),
            tx("0x3", "alice", "7", 120, "3/14/2022 9:02"),
            tx("0x4", "alice", "7", 180, "3/14/2022 9:03"),
            tx("0x5", "carol", "8", 240, "3/14/2022 9:04"),
            tx("0x6", "bob", "9", 300, "3/14/2022 9:05"),
        ]
    }

    #[test]
    fn buyer_activity_ranks_by_count() {
        for algorithm in [SortAlgorithm::Merge, SortAlgorithm::Radix] {
            let config = AnalysisConfig {
                algorithm,
                ..AnalysisConfig::default()
            };
            let report = run_query(&batch(), &config).unwrap();
            let ranked: Vec<(&str, u64)> = report
                .records
                .iter()
                .map(|r| (r.entity_id.as_str(), r.n_transactions))
                .collect();
            assert_eq!(ranked, vec![("alice", 3), ("bob", 2), ("carol", 1)]);
        }
    }

    #[test]
    fn token_popularity_ranks_by_unique_buyers() {
        let config = AnalysisConfig {
            query: Query::TokenPopularity,
            ..AnalysisConfig::default()
        };
        let report = run_query(&batch(), &config).unwrap();
        let ranked: Vec<(&str, u64)> = report
            .records
            .iter()
            .map(|r| (r.entity_id.as_str(), r.n_unique_buyers))
            .collect();
        assert_eq!(ranked, vec![("8", 2), ("7", 1), ("9", 1)]);
    }

    #[test]
    fn token_fraud_labels_and_ranks() {
        let config = AnalysisConfig {
            query: Query::TokenFraud,
            algorithm: SortAlgorithm::Radix,
            ..AnalysisConfig::default()
        };
        let report = run_query(&batch(), &config).unwrap();

        // token 7: three quick sales to one buyer
        assert_eq!(report.records[0].entity_id, "7");
        assert_eq!(report.records[0].label, Some(ClassificationLabel::Fraudulent));
        assert!(report.records[1..]
            .iter()
            .all(|r| r.label == Some(ClassificationLabel::Normal)));
    }

    #[test]
    fn unordered_input_fails() {
        let mut txs = batch();
        txs.swap(0, 3);
        assert!(run_query(&txs, &AnalysisConfig::default()).is_err());
    }

    #[test]
    fn graph_orders_its_input() {
        let txs = vec![
            tx("0x1", "alice", "7", 0, "a"),
            tx("0x2", "bob", "8", 10, "b"),
            tx("0x3", "carol", "7", 20, "c"),
            tx("0x4", "dave", "8", 30, "d"),
        ];
        let (graph, _) = build_graph(&txs, GroupKey::Token).unwrap();
        let pairs: Vec<(String, String)> = graph
            .edges()
            .into_iter()
            .map(|e| (e.from_buyer, e.to_buyer))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("bob".to_string(), "dave".to_string()),
                ("alice".to_string(), "carol".to_string()),
            ]
        );
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"query": "token_fraud", "classifier": {"window_hours": 3.0}}"#)
                .unwrap();
        assert_eq!(config.query, Query::TokenFraud);
        assert_eq!(config.classifier.window_hours, 3.0);
        assert_eq!(config.classifier.ratio_threshold, 1.8);
        assert_eq!(config.algorithm, SortAlgorithm::Merge);
    }

    #[test]
    fn query_from_str() {
        assert_eq!("token-fraud".parse::<Query>(), Ok(Query::TokenFraud));
        assert!("nope".parse::<Query>().is_err());
    }
}
