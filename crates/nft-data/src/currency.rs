//! Static currency-to-USD conversion.
//!
//! Marketplace exports quote prices in the currency the sale settled in,
//! e.g. `"0.05 ETH ($65.50)"`. Analysis needs one common unit, so every
//! price is multiplied by a fixed per-symbol USD rate. The table is a
//! snapshot, not a live feed.

use std::collections::HashMap;

use tracing::debug;

use crate::types::Transaction;

/// USD multipliers per settlement currency symbol.
pub const DEFAULT_RATES: &[(&str, f64)] = &[
    ("ETH", 1309.97),
    ("WETH", 1322.16),
    ("ASH", 0.9406),
    ("GALA", 0.03748),
    ("TATR", 0.012056),
    ("USDC", 1.00),
    ("MANA", 0.64205),
    ("SAND", 0.7919),
    ("RARI", 2.18),
    ("CTZN", 0.00321),
    ("APE", 4.62),
];

/// Multiplier applied to symbols missing from the table.
pub const UNKNOWN_SYMBOL_RATE: f64 = 1.0;

/// Lookup table from currency symbol to USD multiplier.
#[derive(Clone, Debug)]
pub struct CurrencyTable {
    rates: HashMap<String, f64>,
}

impl Default for CurrencyTable {
    fn default() -> Self {
        Self {
            rates: DEFAULT_RATES
                .iter()
                .map(|(symbol, rate)| (symbol.to_string(), *rate))
                .collect(),
        }
    }
}

impl CurrencyTable {
    /// USD multiplier for `symbol`, falling back to [`UNKNOWN_SYMBOL_RATE`].
    pub fn rate(&self, symbol: &str) -> f64 {
        self.rates
            .get(symbol)
            .copied()
            .unwrap_or(UNKNOWN_SYMBOL_RATE)
    }

    /// Convert a marketplace price string to USD.
    ///
    /// Accepts `"<amount> <SYMBOL> <usd-hint>"` (thousands separators allowed
    /// in the amount) or a bare number, which is taken as already in USD.
    /// Returns `None` when the text matches neither shape.
    pub fn to_usd(&self, price_text: &str) -> Option<f64> {
        let trimmed = price_text.trim();
        if let Ok(bare) = trimmed.replace(',', "").parse::<f64>() {
            return Some(bare * UNKNOWN_SYMBOL_RATE);
        }

        let parts: Vec<&str> = trimmed.split(' ').collect();
        if parts.len() != 3 {
            return None;
        }

        let amount = parts[0].replace(',', "").parse::<f64>().ok()?;
        Some(amount * self.rate(parts[1]))
    }

    /// Fill `price` for every transaction from its `price_text`.
    ///
    /// Unparseable prices are left untouched. Returns how many were skipped.
    pub fn normalize(&self, txs: &mut [Transaction]) -> usize {
        let mut skipped = 0;
        for tx in txs.iter_mut() {
            match self.to_usd(&tx.price_text) {
                Some(usd) => tx.price = usd,
                None => {
                    debug!(hash = %tx.hash, price = %tx.price_text, "unparseable price text");
                    skipped += 1;
                }
            }
        }
        skipped
    }
}
