//! Spreadsheet file I/O
//!
//! - Import: .xlsx / .xlsm → `Workbook` (calamine)
//! - Export: bucket series, variance reports and workbooks → .xlsx (rust_xlsxwriter)
//! - Update: batch cell edits written back to the file

mod exporter;
mod importer;
mod updater;

pub use exporter::ExcelExporter;
pub(crate) use exporter::variance_status;
pub use importer::{HeaderRow, HeaderRule, ImportOptions, WorkbookImporter};
pub use updater::{apply_updates, coerce_cell, update_cells, CellUpdate};
