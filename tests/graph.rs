//! Hand-off graph construction over realistic sale sequences.

mod common;

use common::sample_tx;
use nft_analysis::group::GroupKey;
use nft_analysis::pipeline::build_graph;
use nft_analysis::AnalysisError;
use nft_data::Transaction;

fn pairs(txs: &[Transaction], key: GroupKey) -> Vec<(String, String, String)> {
    let (graph, _) = build_graph(txs, key).unwrap();
    graph
        .edges()
        .into_iter()
        .map(|e| (e.from_buyer, e.to_buyer, e.entity_id))
        .collect()
}

fn edge(from: &str, to: &str, entity: &str) -> (String, String, String) {
    (from.to_string(), to.to_string(), entity.to_string())
}

#[test]
fn sales_chain_buyers_per_token() {
    let txs = vec![
        sample_tx("0x1", "alice", "7", 0),
        sample_tx("0x2", "bob", "7", 5),
        sample_tx("0x3", "carol", "7", 10),
    ];
    assert_eq!(
        pairs(&txs, GroupKey::Token),
        vec![edge("alice", "bob", "7"), edge("bob", "carol", "7")]
    );
}

/// dave relists then erin buys: one edge from the look-ahead, one from the plain pair.
#[test]
fn relist_then_sale_keeps_parallel_edges() {
    let txs = vec![
        sample_tx("0x1", "dave", "8", 0),
        sample_tx("0x2", "dave", "8", 5),
        sample_tx("0x3", "erin", "8", 10),
    ];
    let (graph, _) = build_graph(&txs, GroupKey::Token).unwrap();

    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 2);
    let edges = graph.edges();
    assert!(edges.iter().all(|e| e.from_buyer == "dave" && e.to_buyer == "erin"));
    assert!(edges.iter().all(|e| e.time == txs[2].display_time));
}

/// Input order does not matter: the graph is built over entity-then-time order.
#[test]
fn interleaved_tokens_are_regrouped() {
    let txs = vec![
        sample_tx("0x1", "alice", "7", 0),
        sample_tx("0x2", "dave", "8", 1),
        sample_tx("0x3", "bob", "7", 2),
        sample_tx("0x4", "erin", "8", 3),
    ];
    assert_eq!(
        pairs(&txs, GroupKey::Token),
        vec![edge("dave", "erin", "8"), edge("alice", "bob", "7")]
    );
}

#[test]
fn buyers_get_one_node_each() {
    let txs = vec![
        sample_tx("0x1", "alice", "7", 0),
        sample_tx("0x2", "bob", "7", 5),
        sample_tx("0x3", "bob", "9", 6),
        sample_tx("0x4", "alice", "9", 8),
    ];
    let (graph, _) = build_graph(&txs, GroupKey::Token).unwrap();

    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 2);
    let alice = graph.node_index("alice").unwrap();
    let bob = graph.node_index("bob").unwrap();
    assert_ne!(alice, bob);

    let list = graph.adjacency_list();
    assert_eq!(list.len(), 2);
}

#[test]
fn collection_key_chains_across_tokens() {
    let txs = vec![
        sample_tx("0x1", "alice", "7", 0),
        sample_tx("0x2", "bob", "8", 5),
        sample_tx("0x3", "carol", "9", 10),
    ];
    assert_eq!(
        pairs(&txs, GroupKey::Nft),
        vec![
            edge("alice", "bob", "CryptoPunks"),
            edge("bob", "carol", "CryptoPunks"),
        ]
    );
}

#[test]
fn buyer_key_is_rejected() {
    let txs = vec![sample_tx("0x1", "alice", "7", 0)];
    let err = build_graph(&txs, GroupKey::Buyer).err().unwrap();
    assert!(matches!(err, AnalysisError::InvalidKey { .. }));
}

#[test]
fn single_buyer_history_has_no_edges() {
    let txs = vec![sample_tx("0x1", "alice", "7", 0), sample_tx("0x2", "alice", "7", 5)];
    let (graph, _) = build_graph(&txs, GroupKey::Token).unwrap();
    assert_eq!(graph.edge_count(), 0);
}
