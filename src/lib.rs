//! Sheet Rollup - spreadsheet cell normalization and period aggregation
//!
//! Turns loosely typed spreadsheet rows into canonical records and rolls them
//! up into time buckets.
//!
//! # Features
//!
//! - Total normalization of raw cells into number, date, text or null
//! - Spreadsheet serial dates and free-form date text on one path
//! - Column maps resolved once per sheet from indices, letters or headers
//! - Day, week, month, quarter and year buckets with sums, averages, shares
//!   and distinct counts; records without a date land in `Unknown`
//! - Mergeable partial aggregates for parallel folding
//! - Excel import/export, budget vs actual variance and cell write-back
//!
//! # Example
//!
//! ```no_run
//! use sheet_rollup::core::{aggregate, extract_all, AggregationSpec, ColumnMap, Granularity};
//! use sheet_rollup::excel::WorkbookImporter;
//! use sheet_rollup::FieldKind;
//!
//! let workbook = WorkbookImporter::new("transactions.xlsx").import()?;
//! let sheet = workbook.sheet("Transactions").expect("sheet exists");
//!
//! let map = ColumnMap::new()
//!     .field("date", 0, FieldKind::Date)
//!     .field("project", 2, FieldKind::Text)
//!     .field("hours", 5, FieldKind::Number);
//! let records = extract_all(sheet, &map);
//!
//! let spec = AggregationSpec::new("date", Granularity::Month).measure("hours");
//! for bucket in aggregate(&records, &spec) {
//!     println!("{}: {} hours", bucket.display_label(), bucket.sum("hours"));
//! }
//! # Ok::<(), sheet_rollup::error::RollupError>(())
//! ```

pub mod cache;
pub mod cli;
pub mod core;
pub mod error;
pub mod excel;
pub mod layout;
pub mod types;

// Re-export commonly used types
pub use error::{RollupError, RollupResult};
pub use types::{Cell, FieldKind, Record, Sheet, Value, Workbook};
