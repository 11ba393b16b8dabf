//! Workbook importer - Excel (.xlsx, .xlsm) → `Workbook`

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{RollupError, RollupResult};
use crate::types::{format_number, Cell, Sheet, Workbook};

/// Where a sheet's header lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRow {
    /// Zero-based row index; rows above it are dropped
    Row(usize),
    /// No header row: headers are `Col0..ColN` and every row is data
    Synthetic,
}

/// Header placement for sheets whose name contains `contains` (and not `excludes`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRule {
    pub contains: String,
    pub excludes: Option<String>,
    pub header_row: HeaderRow,
}

impl HeaderRule {
    pub fn new(contains: impl Into<String>, header_row: HeaderRow) -> Self {
        Self {
            contains: contains.into().to_lowercase(),
            excludes: None,
            header_row,
        }
    }

    #[must_use]
    pub fn excluding(mut self, excludes: impl Into<String>) -> Self {
        self.excludes = Some(excludes.into().to_lowercase());
        self
    }

    fn applies_to(&self, sheet_name: &str) -> bool {
        let name = sheet_name.to_lowercase();
        name.contains(&self.contains)
            && self
                .excludes
                .as_ref()
                .map_or(true, |ex| !name.contains(ex.as_str()))
    }
}

/// Header detection rules, checked in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub rules: Vec<HeaderRule>,
    pub default_header_row: usize,
}

impl Default for ImportOptions {
    /// Pipeline headers sit in row 11, Program Management headers in row 3,
    /// vacation planners have no header row at all.
    fn default() -> Self {
        Self {
            rules: vec![
                HeaderRule::new("vacation", HeaderRow::Synthetic),
                HeaderRule::new("pipeline", HeaderRow::Row(10)),
                HeaderRule::new("program", HeaderRow::Row(2)).excluding("vacation"),
            ],
            default_header_row: 0,
        }
    }
}

impl ImportOptions {
    /// Every sheet has its header in the first row
    pub fn first_row_headers() -> Self {
        Self {
            rules: Vec::new(),
            default_header_row: 0,
        }
    }

    /// No header rows anywhere: every row of every sheet is kept as cells
    pub fn raw() -> Self {
        Self {
            rules: vec![HeaderRule::new("", HeaderRow::Synthetic)],
            default_header_row: 0,
        }
    }

    pub fn header_row_for(&self, sheet_name: &str) -> HeaderRow {
        self.rules
            .iter()
            .find(|r| r.applies_to(sheet_name))
            .map_or(HeaderRow::Row(self.default_header_row), |r| r.header_row)
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Boolean(*b),
            Data::DateTime(d) => Cell::Number(d.as_f64()),
            Data::DateTimeIso(s) => Cell::DateTime(s.clone()),
            Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }
}

/// Reads every worksheet of a workbook
pub struct WorkbookImporter {
    path: PathBuf,
    options: ImportOptions,
}

impl WorkbookImporter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options: ImportOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Import all readable sheets; unreadable sheets are skipped with a warning
    pub fn import(&self) -> RollupResult<Workbook> {
        let mut workbook: Xlsx<_> = open_workbook(&self.path).map_err(|e| {
            RollupError::Excel(format!(
                "Failed to open Excel file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let sheet_names = workbook.sheet_names().to_vec();
        let mut sheets = Vec::with_capacity(sheet_names.len());

        for sheet_name in sheet_names {
            match workbook.worksheet_range(&sheet_name) {
                Ok(range) => {
                    sheets.push(self.build_sheet(&sheet_name, absolute_rows(&range)));
                }
                Err(e) => {
                    warn!(sheet = %sheet_name, error = %e, "skipping unreadable sheet");
                }
            }
        }

        debug!(path = %self.path.display(), sheets = sheets.len(), "imported workbook");
        Ok(Workbook::new(sheets))
    }

    /// Split raw rows into header and data according to the sheet's header rule
    fn build_sheet(&self, sheet_name: &str, mut rows: Vec<Vec<Cell>>) -> Sheet {
        match self.options.header_row_for(sheet_name) {
            HeaderRow::Synthetic => {
                let width = rows.iter().map(Vec::len).max().unwrap_or(0);
                let headers = (0..width).map(|i| format!("Col{}", i)).collect();
                Sheet::new(sheet_name, headers, rows)
            }
            HeaderRow::Row(index) => {
                if index >= rows.len() {
                    return Sheet::new(sheet_name, Vec::new(), Vec::new());
                }
                let data = rows.split_off(index + 1);
                let headers = rows
                    .pop()
                    .unwrap_or_default()
                    .iter()
                    .map(header_text)
                    .collect();
                Sheet::new(sheet_name, headers, data)
            }
        }
    }
}

/// Cells at their sheet positions: `rows[0][0]` is A1 even when the used
/// range starts further down or right.
fn absolute_rows(range: &Range<Data>) -> Vec<Vec<Cell>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let mut rows = vec![Vec::new(); start_row as usize];
    rows.extend(range.rows().map(|row| {
        let mut cells = vec![Cell::Empty; start_col as usize];
        cells.extend(row.iter().map(Cell::from));
        cells
    }));
    rows
}

fn header_text(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) | Cell::DateTime(s) => s.clone(),
        Cell::Number(n) => format_number(*n),
        Cell::Boolean(_) | Cell::Empty => String::new(),
    }
}
