//! Column layout configuration
//!
//! A layouts file names one column map per known sheet shape, so a change in
//! a spreadsheet's column order is a one-line edit here instead of a change
//! in every report:
//!
//! ```yaml
//! layouts:
//!   transactions:
//!     sheet: "IFS project transactions"
//!     fields:
//!       date:       { column: "A", kind: date }
//!       project_id: { column: 2, kind: text }
//!       hours:      { header: "Quantity", kind: number }
//! ```
//!
//! Columns are given as a zero-based index, a spreadsheet letter, or header
//! text. Resolution against a concrete sheet produces an immutable
//! [`ColumnMap`].

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::core::extractor::ColumnMap;
use crate::error::{RollupError, RollupResult};
use crate::types::{FieldKind, Sheet};

/// A column given by position or letter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Letter(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<ColumnRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    pub kind: FieldKind,
}

impl FieldLayout {
    pub fn at(column: ColumnRef, kind: FieldKind) -> Self {
        Self {
            column: Some(column),
            header: None,
            kind,
        }
    }

    pub fn by_header(header: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            column: None,
            header: Some(header.into()),
            kind,
        }
    }
}

/// Field layout of one sheet shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    /// Sheet this layout normally applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub fields: BTreeMap<String, FieldLayout>,
}

impl SheetLayout {
    /// Resolve every field against the sheet's headers
    pub fn resolve(&self, sheet: &Sheet) -> RollupResult<ColumnMap> {
        let mut map = ColumnMap::new();
        for (name, field) in &self.fields {
            let index = resolve_column(name, field, sheet)?;
            debug!(field = %name, index, sheet = %sheet.name, "resolved column");
            map = map.field(name.clone(), index, field.kind);
        }
        Ok(map)
    }
}

fn resolve_column(name: &str, field: &FieldLayout, sheet: &Sheet) -> RollupResult<usize> {
    match (&field.column, &field.header) {
        (Some(ColumnRef::Index(i)), _) => Ok(*i),
        (Some(ColumnRef::Letter(letter)), header) => {
            // `--field id=ID` names a header when the sheet has one
            if let Some(index) = header.as_deref().and_then(|h| sheet.header_index(h)) {
                return Ok(index);
            }
            column_letter_to_index(letter).ok_or_else(|| {
                RollupError::Layout(format!(
                    "Field '{}': '{}' is not a column letter",
                    name, letter
                ))
            })
        }
        (None, Some(header)) => sheet.header_index(header).ok_or_else(|| {
            RollupError::Layout(format!(
                "Field '{}': no column with header '{}' in sheet '{}' (headers: {})",
                name,
                header,
                sheet.name,
                sheet.headers.join(", ")
            ))
        }),
        (None, None) => Err(RollupError::Layout(format!(
            "Field '{}' needs a column or a header",
            name
        ))),
    }
}

/// All named layouts from one configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub layouts: BTreeMap<String, SheetLayout>,
}

impl LayoutConfig {
    pub fn get(&self, name: &str) -> RollupResult<&SheetLayout> {
        self.layouts.get(name).ok_or_else(|| {
            let available: Vec<&str> = self.layouts.keys().map(String::as_str).collect();
            RollupError::Layout(format!(
                "Unknown layout '{}' (available: {})",
                name,
                available.join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.layouts.keys().map(String::as_str).collect()
    }
}

/// Load and validate a layouts file
pub fn load_layouts(path: &Path) -> RollupResult<LayoutConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_layouts(&content)?;
    debug!(path = %path.display(), layouts = config.layouts.len(), "loaded layouts");
    Ok(config)
}

/// Parse and validate layouts YAML
pub fn parse_layouts(content: &str) -> RollupResult<LayoutConfig> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    validate_against_schema(&yaml)?;
    Ok(serde_yaml::from_value(yaml)?)
}

/// Validate layouts YAML against the embedded JSON Schema
fn validate_against_schema(yaml: &serde_yaml::Value) -> RollupResult<()> {
    let schema_str = include_str!("../schema/layouts.schema.json");
    let schema_value: serde_json::Value = serde_json::from_str(schema_str)
        .map_err(|e| RollupError::Validation(format!("Failed to parse schema: {}", e)))?;

    let compiled_schema = JSONSchema::compile(&schema_value)
        .map_err(|e| RollupError::Validation(format!("Failed to compile schema: {}", e)))?;

    let json_value: serde_json::Value = serde_json::to_value(yaml)
        .map_err(|e| RollupError::Validation(format!("Failed to convert YAML to JSON: {}", e)))?;

    if let Err(errors) = compiled_schema.validate(&json_value) {
        let error_messages: Vec<String> = errors.map(|e| format!("  - {}", e)).collect();
        return Err(RollupError::Validation(format!(
            "Layout schema validation failed:\n{}",
            error_messages.join("\n")
        )));
    }

    Ok(())
}

/// Parse an inline field: `name=COLUMN[:kind]`.
///
/// COLUMN is a zero-based index, a column letter (`A`..`ZZZ`, upper case) or
/// header text. Kind defaults to text.
pub fn parse_field_arg(arg: &str) -> RollupResult<(String, FieldLayout)> {
    let (name, rest) = arg.split_once('=').ok_or_else(|| {
        RollupError::Parse(format!(
            "Invalid field '{}': expected name=COLUMN[:kind]",
            arg
        ))
    })?;
    let name = name.trim();
    if name.is_empty() {
        return Err(RollupError::Parse(format!(
            "Invalid field '{}': missing name",
            arg
        )));
    }

    let (column, kind) = match rest.rsplit_once(':') {
        Some((col, kind)) => match kind.parse::<FieldKind>() {
            Ok(kind) => (col, kind),
            Err(_) => (rest, FieldKind::Text),
        },
        None => (rest, FieldKind::Text),
    };
    let column = column.trim();
    if column.is_empty() {
        return Err(RollupError::Parse(format!(
            "Invalid field '{}': missing column",
            arg
        )));
    }

    let layout = if let Ok(index) = column.parse::<usize>() {
        FieldLayout::at(ColumnRef::Index(index), kind)
    } else if is_column_letter(column) {
        FieldLayout {
            column: Some(ColumnRef::Letter(column.to_string())),
            header: Some(column.to_string()),
            kind,
        }
    } else {
        FieldLayout::by_header(column, kind)
    };
    Ok((name.to_string(), layout))
}

fn is_column_letter(s: &str) -> bool {
    (1..=3).contains(&s.len()) && s.chars().all(|c| c.is_ascii_uppercase())
}

/// Convert a column letter to a zero-based index (A→0, Z→25, AA→26)
pub fn column_letter_to_index(letter: &str) -> Option<usize> {
    let letter = letter.trim();
    if letter.is_empty() || letter.len() > 3 || !letter.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let n = letter
        .to_ascii_uppercase()
        .bytes()
        .fold(0usize, |acc, b| acc * 26 + usize::from(b - b'A' + 1));
    Some(n - 1)
}

/// Convert column index to Excel column letter (0→A, 1→B, 25→Z, 26→AA, etc.)
pub fn column_index_to_letter(n: usize) -> String {
    let mut result = String::new();
    let mut num = n;

    loop {
        let remainder = num % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if num < 26 {
            break;
        }
        num = num / 26 - 1;
    }

    result
}
