use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::dates;

//==============================================================================
// Cells
//==============================================================================

/// One spreadsheet grid position.
///
/// Deserialization is lenient: plain JSON scalars map to the matching variant,
/// objects are read by their `text` / `number` / `datetime` / `boolean` key,
/// and anything unrecognized (null, arrays, unknown objects) becomes `Empty`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "RawCell")]
pub enum Cell {
    Text(String),
    Number(f64),
    /// ISO-style date-time text as written by the spreadsheet reader
    DateTime(String),
    Boolean(bool),
    #[default]
    Empty,
}

/// Shared empty cell for reads past the end of a short row.
pub(crate) static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn number(n: f64) -> Self {
        Cell::Number(n)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Get the variant name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Text(_) => "Text",
            Cell::Number(_) => "Number",
            Cell::DateTime(_) => "DateTime",
            Cell::Boolean(_) => "Boolean",
            Cell::Empty => "Empty",
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
struct TaggedCell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    number: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    boolean: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCell {
    Boolean(bool),
    Number(f64),
    Text(String),
    Tagged(TaggedCell),
    Other(serde::de::IgnoredAny),
}

impl From<RawCell> for Cell {
    fn from(raw: RawCell) -> Self {
        match raw {
            RawCell::Boolean(b) => Cell::Boolean(b),
            RawCell::Number(n) => Cell::Number(n),
            RawCell::Text(s) => Cell::Text(s),
            RawCell::Tagged(t) => {
                if let Some(s) = t.text {
                    Cell::Text(s)
                } else if let Some(n) = t.number {
                    Cell::Number(n)
                } else if let Some(s) = t.datetime {
                    Cell::DateTime(s)
                } else if let Some(b) = t.boolean {
                    Cell::Boolean(b)
                } else {
                    Cell::Empty
                }
            }
            RawCell::Other(_) => Cell::Empty,
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tagged = match self {
            Cell::Text(s) => TaggedCell {
                text: Some(s.clone()),
                ..Default::default()
            },
            Cell::Number(n) => TaggedCell {
                number: Some(*n),
                ..Default::default()
            },
            Cell::DateTime(s) => TaggedCell {
                datetime: Some(s.clone()),
                ..Default::default()
            },
            Cell::Boolean(b) => TaggedCell {
                boolean: Some(*b),
                ..Default::default()
            },
            Cell::Empty => return serializer.serialize_none(),
        };
        tagged.serialize(serializer)
    }
}

//==============================================================================
// Sheets and workbooks
//==============================================================================

/// A worksheet: header strings plus data rows.
///
/// Rows may be shorter than the header; missing trailing cells read as `Empty`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Cell at (row, col), or `Empty` when either index is out of range
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Widest of the header and every row
    pub fn width(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0)
    }

    /// Index of the first header equal to `name`, ignoring case and surrounding space
    pub fn header_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.headers
            .iter()
            .position(|h| h.trim().to_lowercase() == wanted)
    }
}

/// All sheets read from one file, in workbook order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    /// Look a sheet up by exact name, then case-insensitively
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheet_index(name).map(|i| &self.sheets[i])
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheet_index(name).map(|i| &mut self.sheets[i])
    }

    /// Exact name first, then case-insensitive
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name).or_else(|| {
            let wanted = name.to_lowercase();
            self.sheets
                .iter()
                .position(|s| s.name.to_lowercase() == wanted)
        })
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

//==============================================================================
// Canonical values and records
//==============================================================================

/// Expected type of a logical field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Date,
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "string" => Ok(FieldKind::Text),
            "number" | "num" => Ok(FieldKind::Number),
            "date" => Ok(FieldKind::Date),
            other => Err(format!(
                "unknown field kind '{}' (use text, number or date)",
                other
            )),
        }
    }
}

/// A normalized cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Date(NaiveDate),
    Text(String),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric contribution of this value; `None` for anything that is not a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    /// Calendar date carried by this value, resolving serials and date text
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Number(n) => dates::resolve_serial(*n),
            Value::Text(s) => dates::resolve_text(s),
            Value::Null => None,
        }
    }

    /// String form used for filtering and distinct-value sets
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Text(s) => write!(f, "{}", s),
            Value::Null => Ok(()),
        }
    }
}

/// Whole numbers print without a fractional part (100.0 → "100")
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// One extracted row: logical field name → canonical value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (field, value) in iter {
            record.insert(field, value);
        }
        record
    }
}
