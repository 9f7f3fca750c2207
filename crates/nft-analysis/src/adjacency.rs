//! Buyer-to-buyer hand-off graph.
//!
//! Scans transactions ordered by (entity, time) and adds a directed edge
//! each time the same entity passes from one buyer to the next. Nodes are
//! buyers; each distinct buyer gets one stable [`NodeIndex`], assigned in
//! the order buyers are first referenced by an edge.
//!
//! Parallel edges are intentional: the same pair can trade an entity back
//! and forth, and a relist (same buyer twice in a row) followed by a sale
//! yields an edge from the look-ahead and another from the plain pair rule.

use std::collections::{HashMap, HashSet};

use nft_data::Transaction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::debug;

use crate::aggregate::PurchaseTime;
use crate::error::{AnalysisError, Result};
use crate::group::GroupKey;

/// Edge weight: the sale that moved the entity to the receiving buyer.
#[derive(Clone, Debug, PartialEq)]
pub struct HandOff {
    pub entity_id: String,
    /// USD-normalized price.
    pub price: f64,
    pub time: PurchaseTime,
}

/// Flattened view of one edge.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Edge {
    pub from_buyer: String,
    pub to_buyer: String,
    pub entity_id: String,
    pub price: f64,
    pub time: String,
}

/// Directed multigraph of consecutive ownership changes.
pub struct AdjacencyGraph {
    /// The underlying petgraph directed graph.
    pub graph: DiGraph<String, HandOff>,
    /// Lookup from buyer to node index.
    pub buyer_to_ix: HashMap<String, NodeIndex>,
    /// Field that identifies the traded entity.
    pub entity_key: GroupKey,
}

impl AdjacencyGraph {
    /// Build the graph from `txs`, which must be contiguous per entity and
    /// time-ascending within each entity.
    ///
    /// # Errors
    /// - [`AnalysisError::InvalidKey`] for `GroupKey::Buyer` or an empty entity value.
    /// - [`AnalysisError::UnorderedGroup`] if an entity reappears after its run
    ///   ended or its timestamps decrease.
    pub fn build(txs: &[Transaction], entity_key: GroupKey) -> Result<Self> {
        if entity_key == GroupKey::Buyer {
            return Err(AnalysisError::InvalidKey {
                key: entity_key.as_str(),
                position: 0,
            });
        }
        check_layout(txs, entity_key)?;

        let mut this = Self {
            graph: DiGraph::new(),
            buyer_to_ix: HashMap::new(),
            entity_key,
        };

        let same_entity = |a: &Transaction, b: &Transaction| entity_key.select(a) == entity_key.select(b);
        for i in 1..txs.len() {
            let prev = &txs[i - 1];
            let cur = &txs[i];
            if !same_entity(prev, cur) {
                continue;
            }

            if prev.buyer_id != cur.buyer_id {
                this.add_hand_off(&prev.buyer_id, cur);
            } else if let Some(next) = txs.get(i + 1) {
                if same_entity(next, cur) && next.buyer_id != cur.buyer_id {
                    this.add_hand_off(&cur.buyer_id, next);
                }
            }
        }

        debug!(
            entity_key = entity_key.as_str(),
            nodes = this.graph.node_count(),
            edges = this.graph.edge_count(),
            "built hand-off graph"
        );
        Ok(this)
    }

    /// Always a new edge; repeated hand-offs between the same buyers stay parallel.
    fn add_hand_off(&mut self, from_buyer: &str, sale: &Transaction) {
        let from_ix = self.node_for(from_buyer);
        let to_ix = self.node_for(&sale.buyer_id);
        self.graph.add_edge(
            from_ix,
            to_ix,
            HandOff {
                entity_id: self.entity_key.select(sale).to_string(),
                price: sale.price,
                time: PurchaseTime::from(sale),
            },
        );
    }

    fn node_for(&mut self, buyer: &str) -> NodeIndex {
        if let Some(&ix) = self.buyer_to_ix.get(buyer) {
            return ix;
        }
        let ix = self.graph.add_node(buyer.to_string());
        self.buyer_to_ix.insert(buyer.to_string(), ix);
        ix
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_index(&self, buyer: &str) -> Option<NodeIndex> {
        self.buyer_to_ix.get(buyer).copied()
    }

    /// All edges in insertion (scan) order.
    pub fn edges(&self) -> Vec<Edge> {
        self.graph
            .edge_references()
            .map(|edge_ref| self.flatten(edge_ref.source(), edge_ref.target(), edge_ref.weight()))
            .collect()
    }

    /// Outgoing edges per buyer, buyers in node order, edges in scan order.
    pub fn adjacency_list(&self) -> Vec<(String, Vec<Edge>)> {
        let mut out: Vec<(String, Vec<Edge>)> = self
            .graph
            .node_indices()
            .map(|ix| (self.graph[ix].clone(), Vec::new()))
            .collect();
        for edge_ref in self.graph.edge_references() {
            let edge = self.flatten(edge_ref.source(), edge_ref.target(), edge_ref.weight());
            out[edge_ref.source().index()].1.push(edge);
        }
        out.retain(|(_, edges)| !edges.is_empty());
        out
    }

    fn flatten(&self, source: NodeIndex, target: NodeIndex, weight: &HandOff) -> Edge {
        Edge {
            from_buyer: self.graph[source].clone(),
            to_buyer: self.graph[target].clone(),
            entity_id: weight.entity_id.clone(),
            price: weight.price,
            time: weight.time.display.clone(),
        }
    }
}

fn check_layout(txs: &[Transaction], entity_key: GroupKey) -> Result<()> {
    let mut finished: HashSet<&str> = HashSet::new();

    for (position, tx) in txs.iter().enumerate() {
        let entity = entity_key.select(tx);
        if entity.is_empty() {
            return Err(AnalysisError::InvalidKey {
                key: entity_key.as_str(),
                position,
            });
        }

        let Some(prev) = position.checked_sub(1).map(|ix| &txs[ix]) else {
            continue;
        };
        let prev_entity = entity_key.select(prev);

        if prev_entity == entity {
            if tx.unix_time < prev.unix_time {
                return Err(AnalysisError::UnorderedGroup {
                    entity: entity.to_string(),
                    position,
                });
            }
        } else {
            finished.insert(prev_entity);
            if finished.contains(entity) {
                return Err(AnalysisError::UnorderedGroup {
                    entity: entity.to_string(),
                    position,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(token: &str, buyer: &str, t: i64) -> Transaction {
        Transaction {
            hash: format!("0x{token}{buyer}{t}"),
            unix_time: t,
            display_time: format!("t{t}"),
            action: "Bought".to_string(),
            buyer_id: buyer.to_string(),
            nft: "Punks".to_string(),
            token_id: token.to_string(),
            token_type: "ERC-721".to_string(),
            quantity: 1,
            price: t as f64 * 10.0,
            price_text: format!("{t} USDC"),
            market: "OpenSea".to_string(),
        }
    }

    #[test]
    fn single_hand_off_does_not_cross_entities() {
        let txs = vec![tx("A", "X", 1), tx("A", "Y", 2), tx("B", "Y", 3)];
        let graph = AdjacencyGraph::build(&txs, GroupKey::Token).unwrap();

        let edges = graph.edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from_buyer, "X");
        assert_eq!(edges[0].to_buyer, "Y");
        assert_eq!(edges[0].entity_id, "A");
        assert_eq!(edges[0].price, 20.0);
        assert_eq!(edges[0].time, "t2");
    }

    #[test]
    fn relist_looks_ahead() {
        let txs = vec![tx("A", "X", 1), tx("A", "X", 2), tx("A", "Y", 3)];
        let graph = AdjacencyGraph::build(&txs, GroupKey::Token).unwrap();

        // look-ahead at i=1, then the plain pair rule at i=2
        let edges = graph.edges();
        assert_eq!(edges.len(), 2);
        for edge in &edges {
            assert_eq!((edge.from_buyer.as_str(), edge.to_buyer.as_str()), ("X", "Y"));
            assert_eq!(edge.time, "t3");
        }
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn relist_at_end_of_entity_emits_nothing() {
        let txs = vec![tx("A", "X", 1), tx("A", "X", 2), tx("B", "Y", 3)];
        let graph = AdjacencyGraph::build(&txs, GroupKey::Token).unwrap();
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn buyers_get_one_stable_index() {
        let txs = vec![
            tx("A", "X", 1),
            tx("A", "Y", 2),
            tx("A", "X", 3),
            tx("B", "Y", 4),
            tx("B", "Z", 5),
        ];
        let graph = AdjacencyGraph::build(&txs, GroupKey::Token).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.node_index("X").unwrap().index(), 0);
        assert_eq!(graph.node_index("Y").unwrap().index(), 1);
        assert_eq!(graph.node_index("Z").unwrap().index(), 2);

        let list = graph.adjacency_list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].0, "X");
        assert_eq!(list[0].1.len(), 1);
        assert_eq!(list[1].0, "Y");
        assert_eq!(list[1].1.len(), 2);
    }

    #[test]
    fn empty_and_single_inputs_have_no_edges() {
        let graph = AdjacencyGraph::build(&[], GroupKey::Token).unwrap();
        assert_eq!(graph.node_count(), 0);

        let graph = AdjacencyGraph::build(&[tx("A", "X", 1)], GroupKey::Token).unwrap();
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn buyer_key_is_invalid() {
        let err = AdjacencyGraph::build(&[tx("A", "X", 1)], GroupKey::Buyer)
            .err()
            .unwrap();
        assert!(matches!(err, AnalysisError::InvalidKey { key: "buyer", .. }));
    }

    #[test]
    fn interleaved_entities_are_rejected() {
        let txs = vec![tx("A", "X", 1), tx("B", "Y", 2), tx("A", "Z", 3)];
        let err = AdjacencyGraph::build(&txs, GroupKey::Token).err().unwrap();
        assert_eq!(
            err,
            AnalysisError::UnorderedGroup {
                entity: "A".to_string(),
                position: 2
            }
        );
    }

    #[test]
    fn time_regression_is_rejected() {
        let txs = vec![tx("A", "X", 5), tx("A", "Y", 2)];
        assert!(AdjacencyGraph::build(&txs, GroupKey::Token).is_err());
    }
}
