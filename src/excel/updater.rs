//! Batch cell updates written back to a workbook file

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{RollupError, RollupResult};
use crate::excel::{ExcelExporter, ImportOptions, WorkbookImporter};
use crate::types::{Cell, Sheet, Workbook};

/// One cell edit. `row` is 1-based over data rows; `column` is zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub row: usize,
    pub column: usize,
    pub value: String,
}

/// Parse `ROW,COL=VALUE`
impl FromStr for CellUpdate {
    type Err = RollupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            RollupError::Parse(format!(
                "Invalid cell update '{}': expected ROW,COL=VALUE",
                s
            ))
        };
        let (position, value) = s.split_once('=').ok_or_else(invalid)?;
        let (row, column) = position.split_once(',').ok_or_else(invalid)?;
        Ok(CellUpdate {
            row: row.trim().parse().map_err(|_| invalid())?,
            column: column.trim().parse().map_err(|_| invalid())?,
            value: value.to_string(),
        })
    }
}

/// Coerce edited text into a cell: finite number, boolean, empty, or text
pub fn coerce_cell(value: &str) -> Cell {
    if let Some(num) = value.parse::<f64>().ok().filter(|n| n.is_finite()) {
        Cell::Number(num)
    } else if value.eq_ignore_ascii_case("true") {
        Cell::Boolean(true)
    } else if value.eq_ignore_ascii_case("false") {
        Cell::Boolean(false)
    } else if value.is_empty() {
        Cell::Empty
    } else {
        Cell::Text(value.to_string())
    }
}

/// Apply updates to one sheet in memory, growing rows and columns as needed.
///
/// Updates addressing row 0 are ignored. Returns the number applied.
pub fn apply_updates(
    workbook: &mut Workbook,
    sheet_name: &str,
    updates: &[CellUpdate],
) -> RollupResult<usize> {
    let sheet = find_sheet(workbook, sheet_name)?;
    let width = sheet.headers.len();
    Ok(write_updates(&mut sheet.rows, width, 0, updates))
}

/// Read the workbook, apply updates to `sheet_name` and write it back.
///
/// The file is read as a raw grid (header row included) and rewritten cell
/// for cell, so untouched cells keep their type and address. Data row 1 is
/// the second row of the sheet.
pub fn update_cells(path: &Path, sheet_name: &str, updates: &[CellUpdate]) -> RollupResult<usize> {
    let mut workbook = WorkbookImporter::new(path)
        .with_options(ImportOptions::raw())
        .import()?;
    let sheet = find_sheet(&mut workbook, sheet_name)?;
    let applied = write_updates(&mut sheet.rows, 0, 1, updates);
    ExcelExporter::export_grid(path, &workbook)?;
    info!(path = %path.display(), sheet = sheet_name, applied, "updated cells");
    Ok(applied)
}

fn find_sheet<'a>(workbook: &'a mut Workbook, name: &str) -> RollupResult<&'a mut Sheet> {
    match workbook.sheet_index(name) {
        Some(index) => Ok(&mut workbook.sheets[index]),
        None => Err(RollupError::Excel(format!(
            "Sheet '{}' not found (sheets: {})",
            name,
            workbook.sheet_names().join(", ")
        ))),
    }
}

/// Data row `n` lives at `rows[n - 1 + first_data_row]`
fn write_updates(
    rows: &mut Vec<Vec<Cell>>,
    width: usize,
    first_data_row: usize,
    updates: &[CellUpdate],
) -> usize {
    let mut applied = 0;
    for update in updates {
        if update.row == 0 {
            debug!(column = update.column, "ignoring update addressed to row 0");
            continue;
        }
        let index = update.row - 1 + first_data_row;
        while rows.len() <= index {
            rows.push(vec![Cell::Empty; width]);
        }
        let row = &mut rows[index];
        if row.len() <= update.column {
            row.resize(update.column + 1, Cell::Empty);
        }
        row[update.column] = coerce_cell(&update.value);
        applied += 1;
    }
    applied
}
