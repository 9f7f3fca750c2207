//! CSV ingestion for marketplace transaction exports.
//!
//! Reads the scraper's CSV layout, drops rows with empty fields and exact
//! duplicate rows, and maps the remaining rows to [`Transaction`]s in file
//! order. Prices are left at 0.0; run [`crate::currency::CurrencyTable::normalize`]
//! afterwards.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use eyre::{eyre, Context, Result};
use tracing::{debug, info};

use crate::types::Transaction;

/// Columns read from the export, in the order they are looked up.
pub const REQUIRED_COLUMNS: [&str; 11] = [
    "Txn Hash",
    "UnixTimestamp",
    "Date Time (UTC)",
    "Action",
    "Buyer",
    "NFT",
    "Token ID",
    "Type",
    "Quantity",
    "Price",
    "Market",
];

/// Row accounting for one ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Data rows seen (header excluded).
    pub rows_read: usize,
    /// Rows dropped because a required field was empty.
    pub null_rows: usize,
    /// Rows dropped because an identical row was already kept.
    pub duplicate_rows: usize,
    /// Rows dropped because a numeric field did not parse.
    pub malformed_rows: usize,
}

impl IngestStats {
    /// Rows that became transactions.
    pub fn kept(&self) -> usize {
        self.rows_read - self.null_rows - self.duplicate_rows - self.malformed_rows
    }

    fn merge(&mut self, other: &IngestStats) {
        self.rows_read += other.rows_read;
        self.null_rows += other.null_rows;
        self.duplicate_rows += other.duplicate_rows;
        self.malformed_rows += other.malformed_rows;
    }
}

/// Stateful loader so duplicate detection spans every file of a run.
#[derive(Debug, Default)]
pub struct Ingestor {
    seen_rows: HashSet<Vec<String>>,
    stats: IngestStats,
}

impl Ingestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated row accounting.
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Load one CSV file.
    pub fn load_file(&mut self, path: &Path) -> Result<Vec<Transaction>> {
        let reader = csv_reader()
            .from_path(path)
            .wrap_err_with(|| format!("failed to open {}", path.display()))?;
        self.read_records(reader)
            .wrap_err_with(|| format!("failed to parse {}", path.display()))
    }

    /// Load every `*.csv` file in `dir`, in file-name order.
    pub fn load_dir(&mut self, dir: &Path) -> Result<Vec<Transaction>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .wrap_err_with(|| format!("failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(eyre!("no .csv files found in {}", dir.display()));
        }

        let mut all = Vec::new();
        for path in &paths {
            all.extend(self.load_file(path)?);
        }
        Ok(all)
    }

    /// Parse CSV text (header record first).
    pub fn parse(&mut self, content: &str) -> Result<Vec<Transaction>> {
        self.read_records(csv_reader().from_reader(content.as_bytes()))
    }

    fn read_records<R: Read>(&mut self, mut reader: csv::Reader<R>) -> Result<Vec<Transaction>> {
        let headers = reader.headers().wrap_err("failed to read CSV header")?.clone();

        let col_idx = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|field| field.trim_start_matches('\u{feff}').trim() == name)
                .ok_or_else(|| eyre!("column {name} not found in CSV header"))
        };

        let mut columns = [0usize; REQUIRED_COLUMNS.len()];
        for (slot, name) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = col_idx(name)?;
        }

        let mut local = IngestStats::default();
        let mut txs = Vec::new();

        for result in reader.records() {
            local.rows_read += 1;
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    debug!(error = %err, "skipping unreadable csv record");
                    local.malformed_rows += 1;
                    continue;
                }
            };

            let values: Vec<String> = columns
                .iter()
                .map(|&ix| record.get(ix).map(|f| f.trim().to_string()).unwrap_or_default())
                .collect();

            if values.iter().any(|value| value.is_empty()) {
                local.null_rows += 1;
                continue;
            }

            let row: Vec<String> = record.iter().map(str::to_string).collect();
            if !self.seen_rows.insert(row) {
                local.duplicate_rows += 1;
                continue;
            }

            match row_to_transaction(&values) {
                Some(tx) => txs.push(tx),
                None => {
                    debug!(
                        line = ?record.position().map(|p| p.line()),
                        "skipping malformed transaction row"
                    );
                    local.malformed_rows += 1;
                }
            }
        }

        info!(
            rows_read = local.rows_read,
            kept = local.kept(),
            null_rows = local.null_rows,
            duplicate_rows = local.duplicate_rows,
            malformed_rows = local.malformed_rows,
            "csv parsed"
        );
        self.stats.merge(&local);
        Ok(txs)
    }
}

/// Exports carry ragged rows; short rows are caught by the null filter.
fn csv_reader() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true).flexible(true);
    builder
}

/// Load one CSV file with a fresh duplicate filter.
pub fn load_csv(path: &Path) -> Result<Vec<Transaction>> {
    Ingestor::new().load_file(path)
}

/// Load a CSV file or every CSV file of a directory.
pub fn load_path(path: &Path) -> Result<(Vec<Transaction>, IngestStats)> {
    let mut ingestor = Ingestor::new();
    let txs = if path.is_dir() {
        ingestor.load_dir(path)?
    } else {
        ingestor.load_file(path)?
    };
    Ok((txs, ingestor.stats().clone()))
}

/// `values` follows [`REQUIRED_COLUMNS`] order.
fn row_to_transaction(values: &[String]) -> Option<Transaction> {
    let unix_time = parse_integral(&values[1])?;
    let quantity = u64::try_from(parse_integral(&values[8])?).ok()?;

    Some(Transaction {
        hash: values[0].clone(),
        unix_time,
        display_time: values[2].clone(),
        action: values[3].clone(),
        buyer_id: values[4].clone(),
        nft: values[5].clone(),
        token_id: values[6].clone(),
        token_type: values[7].clone(),
        quantity,
        price: 0.0,
        price_text: values[9].clone(),
        market: values[10].clone(),
    })
}

/// Spreadsheet exports sometimes write integers as `1650000000.0`.
fn parse_integral(value: &str) -> Option<i64> {
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|v| v as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "Txn Hash,UnixTimestamp,Date Time (UTC),Action,Buyer,NFT,Token ID,Type,Quantity,Price,Market";

    #[test]
    fn parse_drops_nulls_and_duplicates() {
        let content = format!(
            "{HEADER}\n\
             0x1,1650000000,4/15/2022 5:20,Bought,alice,Punks,7,ERC-721,1,\"0.05 ETH ($65.50)\",OpenSea\n\
             0x1,1650000000,4/15/2022 5:20,Bought,alice,Punks,7,ERC-721,1,\"0.05 ETH ($65.50)\",OpenSea\n\
             0x2,1650000100,4/15/2022 5:21,Bought,,Punks,7,ERC-721,1,\"0.05 ETH ($65.50)\",OpenSea\n\
             0x3,notatime,4/15/2022 5:22,Bought,bob,Punks,7,ERC-721,1,\"0.05 ETH ($65.50)\",OpenSea\n\
             0x4,1650000300.0,4/15/2022 5:25,Bought,carol,Punks,8,ERC-721,2,\"1 USDC ($1.00)\",OpenSea\n"
        );

        let mut ingestor = Ingestor::new();
        let txs = ingestor.parse(&content).unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].hash, "0x1");
        assert_eq!(txs[0].price_text, "0.05 ETH ($65.50)");
        assert_eq!(txs[1].unix_time, 1_650_000_300);
        assert_eq!(txs[1].quantity, 2);

        let stats = ingestor.stats();
        assert_eq!(stats.rows_read, 5);
        assert_eq!(stats.duplicate_rows, 1);
        assert_eq!(stats.null_rows, 1);
        assert_eq!(stats.malformed_rows, 1);
        assert_eq!(stats.kept(), 2);
    }

    #[test]
    fn parse_accepts_bom_prefixed_header() {
        let content = format!(
            "\u{feff}{HEADER}\n\
             0x1,1650000000,4/15/2022 5:20,Bought,alice,Punks,7,ERC-721,1,\"1,500 MANA ($963.08)\",OpenSea\n"
        );
        let mut ingestor = Ingestor::new();
        let txs = ingestor.parse(&content).unwrap();

        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].hash, "0x1");
        assert_eq!(txs[0].price_text, "1,500 MANA ($963.08)");
    }

    #[test]
    fn quoted_field_may_span_lines() {
        let content = format!(
            "{HEADER}\n\
             0x1,1650000000,4/15/2022 5:20,Bought,alice,\"Punks\nEdition\",7,ERC-721,1,1.0,OpenSea\n\
             0x2,1650000060,4/15/2022 5:21,Bought,bob,Punks,8,ERC-721,1,1.0,OpenSea\n"
        );
        let mut ingestor = Ingestor::new();
        let txs = ingestor.parse(&content).unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].nft, "Punks\nEdition");
        assert_eq!(
            ingestor.stats(),
            &IngestStats {
                rows_read: 2,
                ..IngestStats::default()
            }
        );
    }

    #[test]
    fn short_rows_count_as_null() {
        let content = format!("{HEADER}\n0x1,1650000000,4/15/2022 5:20,Bought\n");
        let mut ingestor = Ingestor::new();
        assert!(ingestor.parse(&content).unwrap().is_empty());
        assert_eq!(ingestor.stats().null_rows, 1);
    }

    #[test]
    fn parse_rejects_missing_column() {
        let mut ingestor = Ingestor::new();
        let err = ingestor.parse("Txn Hash,Buyer\n0x1,alice\n").unwrap_err();
        assert!(err.to_string().contains("UnixTimestamp"));
    }

    #[test]
    fn load_dir_reads_all_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        for (name, hash) in [("a.csv", "0xa"), ("b.csv", "0xb")] {
            let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
            writeln!(file, "{HEADER}").unwrap();
            writeln!(
                file,
                "{hash},1650000000,4/15/2022 5:20,Bought,alice,Punks,7,ERC-721,1,1.0,OpenSea"
            )
            .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (txs, stats) = load_path(dir.path()).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].hash, "0xa");
        assert_eq!(txs[1].hash, "0xb");
        assert_eq!(stats.kept(), 2);
    }

    #[test]
    fn load_dir_without_csv_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_path(dir.path()).is_err());
    }
}
