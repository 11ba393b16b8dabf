//! Row extraction: positional cells → named, normalized `Record`

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::normalizer::normalize;
use crate::types::{Cell, FieldKind, Record, Sheet, EMPTY_CELL};

/// One logical field: where it lives and what it should be
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub index: usize,
    pub kind: FieldKind,
}

/// Logical field name → zero-based column index, for one sheet shape.
///
/// Built once with the `field` builder and then only read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    fields: Vec<FieldSpec>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field; a later field with the same name replaces the earlier one
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, index: usize, kind: FieldKind) -> Self {
        let spec = FieldSpec {
            name: name.into(),
            index,
            kind,
        };
        match self.fields.iter_mut().find(|f| f.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.fields.push(spec),
        }
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<FieldSpec> for ColumnMap {
    fn from_iter<I: IntoIterator<Item = FieldSpec>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ColumnMap::new(), |map, f| map.field(f.name, f.index, f.kind))
    }
}

/// Pull the mapped fields out of one row.
///
/// Indices past the end of the row read as empty cells. Fields that are not
/// in the map are simply absent from the record.
pub fn extract(row: &[Cell], map: &ColumnMap) -> Record {
    map.fields()
        .iter()
        .map(|spec| {
            let cell = row.get(spec.index).unwrap_or(&EMPTY_CELL);
            (spec.name.as_str(), normalize(cell, spec.kind))
        })
        .collect()
}

/// Extract every data row of a sheet
pub fn extract_all(sheet: &Sheet, map: &ColumnMap) -> Vec<Record> {
    debug!(
        sheet = %sheet.name,
        rows = sheet.row_count(),
        fields = map.len(),
        "extracting records"
    );
    sheet.rows.iter().map(|row| extract(row, map)).collect()
}
