//! Revenue-type classification (time & expense vs fixed price)
//!
//! Two rules exist in practice and they can disagree on the same record: a
//! keyword match over a contract-type text column, and a numeric range over
//! the activity sequence. Both are offered behind [`RevenueClassifier`];
//! [`default_classifier`] uses the keyword rule.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{RollupError, RollupResult};
use crate::types::{Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RevenueType {
    TimeAndExpense,
    Fixed,
    Unknown,
}

impl fmt::Display for RevenueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RevenueType::TimeAndExpense => "T&E",
            RevenueType::Fixed => "Fixed",
            RevenueType::Unknown => "Unknown",
        })
    }
}

impl FromStr for RevenueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "t&e" | "te" | "tne" | "time-and-expense" => Ok(RevenueType::TimeAndExpense),
            "fixed" | "fixed-price" => Ok(RevenueType::Fixed),
            "unknown" => Ok(RevenueType::Unknown),
            other => Err(format!(
                "unknown revenue type '{}' (use te, fixed or unknown)",
                other
            )),
        }
    }
}

pub trait RevenueClassifier: Send + Sync {
    fn classify(&self, record: &Record) -> RevenueType;
}

/// Keyword rule over a text field
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    field: String,
    time_and_expense: Regex,
    fixed: Regex,
}

const TIME_AND_EXPENSE_PATTERN: &str =
    r"(?i)\bt\s*&\s*e\b|\bt\s*&\s*m\b|time\s*(and|&)\s*(materials?|expenses?)";
const FIXED_PATTERN: &str = r"(?i)\bfixed\b|\bfixed[\s-]*price\b|\blump[\s-]*sum\b";

impl KeywordClassifier {
    pub fn new(field: impl Into<String>) -> RollupResult<Self> {
        Self::with_patterns(field, TIME_AND_EXPENSE_PATTERN, FIXED_PATTERN)
    }

    pub fn with_patterns(
        field: impl Into<String>,
        time_and_expense: &str,
        fixed: &str,
    ) -> RollupResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| RollupError::Parse(format!("Regex error in '{}': {}", pattern, e)))
        };
        Ok(Self {
            field: field.into(),
            time_and_expense: compile(time_and_expense)?,
            fixed: compile(fixed)?,
        })
    }
}

impl RevenueClassifier for KeywordClassifier {
    fn classify(&self, record: &Record) -> RevenueType {
        let Some(text) = record.get(&self.field).map(Value::render) else {
            return RevenueType::Unknown;
        };
        if self.time_and_expense.is_match(&text) {
            RevenueType::TimeAndExpense
        } else if self.fixed.is_match(&text) {
            RevenueType::Fixed
        } else {
            RevenueType::Unknown
        }
    }
}

/// Range rule over a numeric activity-sequence field
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRangeClassifier {
    field: String,
    ranges: Vec<(f64, f64, RevenueType)>,
}

impl SequenceRangeClassifier {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ranges: Vec::new(),
        }
    }

    /// Classify `low..=high` as `kind`; the first matching range wins
    #[must_use]
    pub fn range(mut self, low: f64, high: f64, kind: RevenueType) -> Self {
        self.ranges.push((low, high, kind));
        self
    }
}

impl RevenueClassifier for SequenceRangeClassifier {
    fn classify(&self, record: &Record) -> RevenueType {
        let Some(seq) = record.get(&self.field).and_then(Value::as_number) else {
            return RevenueType::Unknown;
        };
        self.ranges
            .iter()
            .find(|(low, high, _)| (*low..=*high).contains(&seq))
            .map_or(RevenueType::Unknown, |(_, _, kind)| *kind)
    }
}

/// Keyword rule over `field`
pub fn default_classifier(field: impl Into<String>) -> RollupResult<KeywordClassifier> {
    KeywordClassifier::new(field)
}

/// Group records by revenue type, keeping input order within each group
pub fn partition(
    records: Vec<Record>,
    classifier: &dyn RevenueClassifier,
) -> BTreeMap<RevenueType, Vec<Record>> {
    let mut groups: BTreeMap<RevenueType, Vec<Record>> = BTreeMap::new();
    for record in records {
        groups
            .entry(classifier.classify(&record))
            .or_default()
            .push(record);
    }
    groups
}
