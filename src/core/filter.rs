//! Record filtering: a conjunction of equality and substring predicates

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RollupError;
use crate::types::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Case-sensitive exact match on the rendered value
    Equals,
    /// Case-insensitive substring match on the rendered value
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl FilterPredicate {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Equals,
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Contains,
            value: value.into(),
        }
    }

    /// Test one record. An absent field renders as the empty string.
    pub fn test(&self, record: &Record) -> bool {
        let rendered = record
            .get(&self.field)
            .map(|v| v.render())
            .unwrap_or_default();
        match self.op {
            FilterOp::Equals => rendered == self.value,
            FilterOp::Contains => rendered
                .to_lowercase()
                .contains(&self.value.to_lowercase()),
        }
    }
}

/// Parse `field=value` (equals) or `field~value` (contains)
impl FromStr for FilterPredicate {
    type Err = RollupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .char_indices()
            .find(|(_, c)| *c == '=' || *c == '~');
        let Some((pos, op_char)) = split else {
            return Err(RollupError::Parse(format!(
                "Invalid filter '{}': expected field=value or field~value",
                s
            )));
        };
        let field = s[..pos].trim();
        if field.is_empty() {
            return Err(RollupError::Parse(format!(
                "Invalid filter '{}': missing field name",
                s
            )));
        }
        let value = &s[pos + op_char.len_utf8()..];
        Ok(match op_char {
            '=' => FilterPredicate::equals(field, value),
            _ => FilterPredicate::contains(field, value),
        })
    }
}

/// True when the record satisfies every predicate; an empty set always matches
pub fn matches(record: &Record, predicates: &[FilterPredicate]) -> bool {
    predicates.iter().all(|p| p.test(record))
}

/// Keep the records that satisfy every predicate
pub fn apply(records: Vec<Record>, predicates: &[FilterPredicate]) -> Vec<Record> {
    if predicates.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| matches(r, predicates))
        .collect()
}
