//! Ratio and time-window fraud heuristic.
//!
//! A token that changes hands many times among few buyers within a short
//! window looks like wash trading. For one aggregate:
//!
//! 1. `Fraudulent` if `count / unique_buyers > ratio_threshold` and any of
//!    the last, second-last or third-last purchase is within
//!    `window_hours` of the first purchase.
//! 2. `Suspicious` if `count < unique_buyers`.
//! 3. `Normal` otherwise.
//!
//! Gaps are computed from the display timestamps. When one side does not
//! parse, [`ParseFailurePolicy`] decides the gap instead of failing the
//! record. An absent lookback never satisfies the window.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{AggregateRecord, PurchaseTime};
use crate::error::{AnalysisError, Result};

pub const DEFAULT_RATIO_THRESHOLD: f64 = 1.8;
pub const DEFAULT_WINDOW_HOURS: f64 = 1.0;
pub const DEFAULT_TIME_FORMAT: &str = "%m/%d/%Y %H:%M";
/// Gap assumed for unparseable timestamps; outside the default window.
pub const DEFAULT_SAFE_GAP_HOURS: f64 = 2.0;

/// Heuristic verdict for one aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassificationLabel {
    Normal,
    Fraudulent,
    Suspicious,
}

impl ClassificationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationLabel::Normal => "Normal",
            ClassificationLabel::Fraudulent => "Fraudulent",
            ClassificationLabel::Suspicious => "Suspicious",
        }
    }

    /// Integer surrogate for ranking: the decimal ASCII codes of the label
    /// text concatenated, e.g. `"Normal"` -> `78 111 114 109 97 108`.
    ///
    /// Descending order is Suspicious, Fraudulent, Normal.
    pub fn surrogate(&self) -> u128 {
        self.as_str()
            .bytes()
            .fold(0u128, |acc, byte| {
                let width = if byte >= 100 { 1000 } else { 100 };
                acc * width + u128::from(byte)
            })
    }
}

/// What a timestamp that fails to parse means for the window check.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailurePolicy {
    /// Treat the gap as this many hours.
    AssumeSafeGap { hours: f64 },
    /// Fall back to the unix timestamps carried alongside the display text.
    UseUnixTime,
}

impl Default for ParseFailurePolicy {
    fn default() -> Self {
        ParseFailurePolicy::AssumeSafeGap {
            hours: DEFAULT_SAFE_GAP_HOURS,
        }
    }
}

/// Which count is compared against unique buyers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountBasis {
    /// Every transaction row.
    #[default]
    Transactions,
    /// Distinct transaction hashes (batch sales count once).
    UniqueHashes,
}

/// Tunables for [`FraudClassifier`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub ratio_threshold: f64,
    pub window_hours: f64,
    pub time_format: String,
    pub on_parse_failure: ParseFailurePolicy,
    pub count_basis: CountBasis,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            window_hours: DEFAULT_WINDOW_HOURS,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            on_parse_failure: ParseFailurePolicy::default(),
            count_basis: CountBasis::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FraudClassifier {
    config: ClassifierConfig,
}

impl FraudClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Verdict for `record`.
    pub fn classify(&self, record: &AggregateRecord) -> ClassificationLabel {
        let count = match self.config.count_basis {
            CountBasis::Transactions => record.n_transactions,
            CountBasis::UniqueHashes => record.n_unique_hashes,
        };
        let buyers = record.n_unique_buyers;

        let ratio = if buyers == 0 {
            0.0
        } else {
            count as f64 / buyers as f64
        };

        if ratio > self.config.ratio_threshold && self.within_window(record) {
            ClassificationLabel::Fraudulent
        } else if count < buyers {
            ClassificationLabel::Suspicious
        } else {
            ClassificationLabel::Normal
        }
    }

    /// Attach a label unless one is already present.
    pub fn label(&self, mut record: AggregateRecord) -> AggregateRecord {
        if record.label.is_none() {
            record.label = Some(self.classify(&record));
        }
        record
    }

    pub fn label_all(&self, records: Vec<AggregateRecord>) -> Vec<AggregateRecord> {
        records.into_iter().map(|record| self.label(record)).collect()
    }

    fn within_window(&self, record: &AggregateRecord) -> bool {
        let first = &record.first_time;
        [
            Some(&record.last_time),
            record.second_last_time.as_ref(),
            record.third_last_time.as_ref(),
        ]
        .into_iter()
        .flatten()
        .any(|later| self.hours_between(later, first) <= self.config.window_hours)
    }

    /// Hours from `first` to `later`, applying the parse-failure policy.
    pub fn hours_between(&self, later: &PurchaseTime, first: &PurchaseTime) -> f64 {
        match self.parsed_gap_hours(later, first) {
            Ok(hours) => hours,
            Err(err) => {
                debug!(error = %err, "timestamp parse failed, applying fallback");
                match self.config.on_parse_failure {
                    ParseFailurePolicy::AssumeSafeGap { hours } => hours,
                    ParseFailurePolicy::UseUnixTime => {
                        later.unix_time.saturating_sub(first.unix_time) as f64 / 3600.0
                    }
                }
            }
        }
    }

    /// Hours from `first` to `later` using the display timestamps only.
    pub fn parsed_gap_hours(&self, later: &PurchaseTime, first: &PurchaseTime) -> Result<f64> {
        let later = self.parse(&later.display)?;
        let first = self.parse(&first.display)?;
        Ok((later - first).num_seconds() as f64 / 3600.0)
    }

    fn parse(&self, value: &str) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(value.trim(), &self.config.time_format).map_err(|_| {
            AnalysisError::DateParse {
                value: value.to_string(),
                format: self.config.time_format.clone(),
            }
        })
    }
}
