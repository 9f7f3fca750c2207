//! Terminal tables and text reports for query and graph results.

use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use nft_analysis::adjacency::AdjacencyGraph;
use nft_analysis::aggregate::AggregateRecord;
use nft_analysis::group::Groups;
use nft_analysis::pipeline::{Query, QueryReport};
use nft_analysis::runtime::BatchTiming;

/// Ranked aggregates, at most `limit` rows.
pub fn query_table(report: &QueryReport, limit: usize) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);

    let mut header = vec!["#", entity_title(report.query), "Txns", "Unique Buyers"];
    if report.query.classifies() {
        header.extend(["First Buy", "Last Buy", "Status"]);
    }
    table.set_header(header);

    for (rank, record) in report.records.iter().take(limit).enumerate() {
        let mut row = vec![
            format!("{}", rank + 1),
            truncate_id(&record.entity_id),
            format!("{}", record.n_transactions),
            format!("{}", record.n_unique_buyers),
        ];
        if report.query.classifies() {
            row.push(record.first_time.display.clone());
            row.push(record.last_time.display.clone());
            row.push(status(record).to_string());
        }
        table.add_row(row);
    }
    table
}

/// One line per entity followed by its transactions.
pub fn query_text(report: &QueryReport, groups: &Groups) -> String {
    let mut out = format!(
        "The sort took {} nano secs ({})\n\n",
        report.sort_elapsed.as_nanos(),
        report.algorithm.as_str()
    );

    for record in &report.records {
        out.push_str(&summary_line(report.query, record));
        out.push('\n');
        out.push_str("Entity,\t Txn hash,\t Date Time (UTC),\t Buyer,\t NFT,\t Type,\t Quantity,\t Price (USD)\n\n");
        if let Some(group) = groups.get(&record.entity_id) {
            for tx in &group.transactions {
                out.push_str(&format!(
                    "{},\t {},\t {},\t {},\t {},\t {},\t {},\t {:.2}\n",
                    record.entity_id,
                    tx.hash,
                    tx.display_time,
                    tx.buyer_id,
                    tx.nft,
                    tx.token_type,
                    tx.quantity,
                    tx.price
                ));
            }
        }
        out.push_str("\n\n");
    }
    out
}

fn summary_line(query: Query, record: &AggregateRecord) -> String {
    match query {
        Query::BuyerActivity => format!("{} (frequency = {})", record.entity_id, record.n_transactions),
        Query::TokenPopularity => format!(
            "{} (number of unique buyers = {})",
            record.entity_id, record.n_unique_buyers
        ),
        Query::TokenFraud => format!(
            "{} (number of transactions = {}, number of unique buyers = {}, status = {})",
            record.entity_id,
            record.n_transactions,
            record.n_unique_buyers,
            status(record)
        ),
    }
}

/// Edges in scan order, at most `limit` rows.
pub fn graph_table(graph: &AdjacencyGraph, limit: usize) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["From", "To", "Entity", "Price (USD)", "Time"]);

    for edge in graph.edges().into_iter().take(limit) {
        table.add_row(vec![
            truncate_id(&edge.from_buyer),
            truncate_id(&edge.to_buyer),
            edge.entity_id,
            format!("{:.2}", edge.price),
            edge.time,
        ]);
    }
    table
}

/// One `from - to -> [(entity, price, time)]` line per edge, in scan order.
pub fn graph_text(graph: &AdjacencyGraph) -> String {
    let mut out = String::new();
    for edge in graph.edges() {
        out.push_str(&format!(
            "{} - {} -> [({}, {:.2}, {})]\n",
            edge.from_buyer, edge.to_buyer, edge.entity_id, edge.price, edge.time
        ));
    }
    out
}

pub fn bench_table(timings: &[BatchTiming]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Batch", "Runs", "Mean (ns)", "Asymptotic ops"]);
    for timing in timings {
        table.add_row(vec![
            format!("{}", timing.batch_size),
            format!("{}", timing.runs),
            format!("{:.0}", timing.mean_elapsed_ns),
            format!("{:.0}", timing.asymptotic_ops),
        ]);
    }
    table
}

fn entity_title(query: Query) -> &'static str {
    match query {
        Query::BuyerActivity => "Buyer",
        Query::TokenPopularity | Query::TokenFraud => "Token ID",
    }
}

fn status(record: &AggregateRecord) -> &'static str {
    record.label.map(|label| label.as_str()).unwrap_or("-")
}

/// Truncate a long address for compact table display.
fn truncate_id(id: &str) -> String {
    if id.len() > 14 && id.is_ascii() {
        format!("{}…{}", &id[..8], &id[id.len() - 4..])
    } else {
        id.to_string()
    }
}
