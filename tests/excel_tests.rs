//! Excel import, export and write-back against real .xlsx files
//!
//! Workbooks are generated into a TempDir with rust_xlsxwriter.

use calamine::{open_workbook, Reader, Xlsx};
use pretty_assertions::assert_eq;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook as XlsxWorkbook};
use sheet_rollup::cache::{ExcelSource, SheetCache};
use sheet_rollup::core::{
    aggregate, compare, extract_all, AggregationSpec, Favorability, Granularity,
};
use sheet_rollup::excel::{
    update_cells, CellUpdate, ExcelExporter, HeaderRow, HeaderRule, ImportOptions,
    WorkbookImporter,
};
use sheet_rollup::layout::parse_layouts;
use sheet_rollup::{Cell, RollupError, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Three sheet shapes: plain header, pipeline header in row 11, vacation grid
fn write_dashboard(dir: &Path) -> PathBuf {
    let path = dir.join("dashboard.xlsx");
    let mut workbook = XlsxWorkbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    let tx = workbook.add_worksheet();
    tx.set_name("Transactions").unwrap();
    for (col, header) in ["Date", "Project", "Quantity", "Contract"].iter().enumerate() {
        tx.write_string(0, col as u16, *header).unwrap();
    }
    let rows = [
        ((2024, 1, 15), "P100", 3.0, "T&E"),
        ((2024, 1, 20), "P100", 5.0, "T&E"),
        ((2024, 2, 1), "P200", 2.0, "Fixed"),
    ];
    for (i, ((y, m, d), project, qty, contract)) in rows.iter().enumerate() {
        let row = (i + 1) as u32;
        let date = ExcelDateTime::from_ymd(*y, *m, *d).unwrap();
        tx.write_datetime_with_format(row, 0, &date, &date_format).unwrap();
        tx.write_string(row, 1, *project).unwrap();
        tx.write_number(row, 2, *qty).unwrap();
        tx.write_string(row, 3, *contract).unwrap();
    }

    let pipeline = workbook.add_worksheet();
    pipeline.set_name("Sales Pipeline").unwrap();
    pipeline.write_string(0, 0, "Pipeline report").unwrap();
    pipeline.write_string(10, 0, "Opportunity").unwrap();
    pipeline.write_string(10, 1, "Value").unwrap();
    pipeline.write_string(11, 0, "Bridge").unwrap();
    pipeline.write_number(11, 1, 250000.0).unwrap();

    let vacation = workbook.add_worksheet();
    vacation.set_name("Vacation").unwrap();
    vacation.write_string(0, 0, "Alice").unwrap();
    vacation.write_string(0, 1, "x").unwrap();
    vacation.write_string(1, 0, "Bob").unwrap();

    workbook.save(&path).unwrap();
    path
}

#[test]
fn test_import_applies_header_rules() {
    let dir = TempDir::new().unwrap();
    let workbook = WorkbookImporter::new(write_dashboard(dir.path())).import().unwrap();

    assert_eq!(workbook.sheet_names(), vec!["Transactions", "Sales Pipeline", "Vacation"]);

    let tx = workbook.sheet("Transactions").unwrap();
    assert_eq!(tx.headers, vec!["Date", "Project", "Quantity", "Contract"]);
    assert_eq!(tx.row_count(), 3);
    assert_eq!(tx.cell(0, 1), &Cell::text("P100"));

    let pipeline = workbook.sheet("sales pipeline").unwrap();
    assert_eq!(pipeline.headers, vec!["Opportunity", "Value"]);
    assert_eq!(pipeline.row_count(), 1);
    assert_eq!(pipeline.cell(0, 1), &Cell::Number(250000.0));

    let vacation = workbook.sheet("Vacation").unwrap();
    assert_eq!(vacation.headers, vec!["Col0", "Col1"]);
    assert_eq!(vacation.row_count(), 2);
}

#[test]
fn test_custom_header_rule() {
    let dir = TempDir::new().unwrap();
    let options = ImportOptions {
        rules: vec![HeaderRule::new("pipeline", HeaderRow::Row(0))],
        default_header_row: 0,
    };
    let workbook = WorkbookImporter::new(write_dashboard(dir.path()))
        .with_options(options)
        .import()
        .unwrap();
    let pipeline = workbook.sheet("Sales Pipeline").unwrap();
    assert_eq!(pipeline.headers[0], "Pipeline report");
}

#[test]
fn test_imported_dates_aggregate_by_month() {
    let dir = TempDir::new().unwrap();
    let workbook = WorkbookImporter::new(write_dashboard(dir.path())).import().unwrap();
    let sheet = workbook.sheet("Transactions").unwrap();

    let layouts = parse_layouts(
        r#"
layouts:
  transactions:
    sheet: Transactions
    fields:
      date: { column: "A", kind: date }
      project: { header: project, kind: text }
      hours: { header: Quantity, kind: number }
"#,
    )
    .unwrap();
    let map = layouts.get("transactions").unwrap().resolve(sheet).unwrap();
    let records = extract_all(sheet, &map);
    assert!(matches!(records[0].get("date"), Some(Value::Date(_))));

    let spec = AggregationSpec::new("date", Granularity::Month).measure("hours");
    let buckets = aggregate(&records, &spec);
    let summary: Vec<(String, f64)> = buckets.iter().map(|b| (b.label(), b.sum("hours"))).collect();
    assert_eq!(
        summary,
        vec![("2024-01".to_string(), 8.0), ("2024-02".to_string(), 2.0)]
    );
}

#[test]
fn test_export_series_reimports() {
    let dir = TempDir::new().unwrap();
    let workbook = WorkbookImporter::new(write_dashboard(dir.path())).import().unwrap();
    let sheet = workbook.sheet("Transactions").unwrap();
    let map = sheet_rollup::core::ColumnMap::new()
        .field("date", 0, sheet_rollup::FieldKind::Date)
        .field("project", 1, sheet_rollup::FieldKind::Text)
        .field("hours", 2, sheet_rollup::FieldKind::Number);
    let spec = AggregationSpec::new("date", Granularity::Quarter)
        .measure("hours")
        .distinct("project");
    let buckets = aggregate(&extract_all(sheet, &map), &spec);

    let out = dir.path().join("series.xlsx");
    ExcelExporter::export_series(&out, "Quarterly", &buckets).unwrap();

    let report = WorkbookImporter::new(&out)
        .with_options(ImportOptions::first_row_headers())
        .import()
        .unwrap();
    let sheet = report.sheet("Quarterly").unwrap();
    assert_eq!(
        sheet.headers,
        vec![
            "Period",
            "Label",
            "Entries",
            "hours (sum)",
            "hours (avg)",
            "hours (share)",
            "distinct project"
        ]
    );
    assert_eq!(sheet.row_count(), 1);
    assert_eq!(sheet.cell(0, 0), &Cell::text("2024-Q1"));
    assert_eq!(sheet.cell(0, 1), &Cell::text("Q1 2024"));
    assert_eq!(sheet.cell(0, 2), &Cell::Number(3.0));
    assert_eq!(sheet.cell(0, 3), &Cell::Number(10.0));
    assert_eq!(sheet.cell(0, 5), &Cell::Number(1.0));
    assert_eq!(sheet.cell(0, 6), &Cell::Number(2.0));
}

#[test]
fn test_export_variance() {
    let dir = TempDir::new().unwrap();
    let workbook = WorkbookImporter::new(write_dashboard(dir.path())).import().unwrap();
    let sheet = workbook.sheet("Transactions").unwrap();
    let map = sheet_rollup::core::ColumnMap::new()
        .field("date", 0, sheet_rollup::FieldKind::Date)
        .field("cost", 2, sheet_rollup::FieldKind::Number);
    let spec = AggregationSpec::new("date", Granularity::Month).measure("cost");
    let actual = aggregate(&extract_all(sheet, &map), &spec);

    let variances = compare(&[], &actual, "cost", 5.0, Favorability::for_measure("cost"));
    assert!(variances.iter().all(|v| !v.is_favorable));

    let out = dir.path().join("variance.xlsx");
    ExcelExporter::export_variance(&out, "cost", &variances, 5.0).unwrap();

    let report = WorkbookImporter::new(&out)
        .with_options(ImportOptions::first_row_headers())
        .import()
        .unwrap();
    let sheet = report.sheet("Variance").unwrap();
    assert_eq!(sheet.headers[0], "Period");
    assert_eq!(sheet.cell(0, 0), &Cell::text("2024-01"));
    assert_eq!(sheet.cell(0, 2), &Cell::Number(8.0));
    assert_eq!(sheet.cell(0, 5), &Cell::text("Unfavorable"));
}

#[test]
fn test_update_cells_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("projects.xlsx");
    let mut workbook = XlsxWorkbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Projects").unwrap();
    sheet.write_string(0, 0, "ID").unwrap();
    sheet.write_string(0, 1, "Budget").unwrap();
    sheet.write_string(0, 2, "Active").unwrap();
    sheet.write_string(1, 0, "P100").unwrap();
    sheet.write_number(1, 1, 1000.0).unwrap();
    workbook.save(&path).unwrap();

    let updates: Vec<CellUpdate> = ["1,1=1500", "1,2=TRUE", "2,0=P200", "2,3=new column"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    assert_eq!(update_cells(&path, "Projects", &updates).unwrap(), 4);

    let reread = WorkbookImporter::new(&path)
        .with_options(ImportOptions::first_row_headers())
        .import()
        .unwrap();
    let sheet = reread.sheet("Projects").unwrap();
    assert_eq!(&sheet.headers[..3], ["ID", "Budget", "Active"]);
    assert_eq!(sheet.row_count(), 2);
    assert_eq!(sheet.cell(0, 1), &Cell::Number(1500.0));
    assert_eq!(sheet.cell(0, 2), &Cell::Boolean(true));
    assert_eq!(sheet.cell(1, 0), &Cell::text("P200"));
    assert_eq!(sheet.cell(1, 3), &Cell::text("new column"));
}

#[test]
fn test_update_unknown_sheet_leaves_file() {
    let dir = TempDir::new().unwrap();
    let path = write_dashboard(dir.path());
    let before = std::fs::read(&path).unwrap();
    let updates = vec!["1,1=5".parse::<CellUpdate>().unwrap()];
    assert!(update_cells(&path, "Nope", &updates).is_err());
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn test_columns_are_absolute_when_data_starts_off_a1() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("offset.xlsx");
    let mut workbook = XlsxWorkbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Hours").unwrap();
    sheet.write_string(0, 1, "Project").unwrap();
    sheet.write_string(0, 2, "Hours").unwrap();
    sheet.write_string(1, 1, "P100").unwrap();
    sheet.write_number(1, 2, 3.0).unwrap();
    workbook.save(&path).unwrap();

    let imported = WorkbookImporter::new(&path).import().unwrap();
    let sheet = imported.sheet("Hours").unwrap();
    assert_eq!(sheet.headers, vec!["", "Project", "Hours"]);

    let layouts = parse_layouts(
        r#"
layouts:
  hours:
    fields:
      project: { column: "B", kind: text }
      hours: { column: "C", kind: number }
      by_header: { header: Hours, kind: number }
"#,
    )
    .unwrap();
    let map = layouts.get("hours").unwrap().resolve(sheet).unwrap();
    let records = extract_all(sheet, &map);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("project"), Some(&Value::Text("P100".into())));
    assert_eq!(records[0].get("hours"), Some(&Value::Number(3.0)));
    assert_eq!(records[0].get("by_header"), Some(&Value::Number(3.0)));
}

#[test]
fn test_header_rule_counts_rows_from_top_of_sheet() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("program.xlsx");
    let mut workbook = XlsxWorkbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Program Management").unwrap();
    // Header in row 3 with nothing above it
    sheet.write_string(2, 0, "Program").unwrap();
    sheet.write_string(2, 1, "Budget").unwrap();
    sheet.write_string(3, 0, "Bridge").unwrap();
    sheet.write_number(3, 1, 5000.0).unwrap();
    workbook.save(&path).unwrap();

    let imported = WorkbookImporter::new(&path).import().unwrap();
    let sheet = imported.sheet("Program Management").unwrap();
    assert_eq!(sheet.headers, vec!["Program", "Budget"]);
    assert_eq!(sheet.row_count(), 1);
    assert_eq!(sheet.cell(0, 1), &Cell::Number(5000.0));
}

#[test]
fn test_update_keeps_cells_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("offset.xlsx");
    let mut workbook = XlsxWorkbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Offset").unwrap();
    sheet.write_string(2, 2, "Hdr").unwrap();
    sheet.write_number(3, 2, 5.0).unwrap();
    sheet.write_boolean(3, 3, true).unwrap();
    workbook.save(&path).unwrap();

    // Data row 3 is sheet row 4, i.e. C4
    let updates = vec!["3,2=9".parse::<CellUpdate>().unwrap()];
    assert_eq!(update_cells(&path, "Offset", &updates).unwrap(), 1);

    let mut reread: Xlsx<_> = open_workbook(&path).unwrap();
    let range = reread.worksheet_range("Offset").unwrap();
    assert_eq!(range.start(), Some((2, 2)));

    let grid = WorkbookImporter::new(&path)
        .with_options(ImportOptions::raw())
        .import()
        .unwrap();
    let sheet = grid.sheet("Offset").unwrap();
    assert_eq!(sheet.cell(2, 2), &Cell::text("Hdr"));
    assert_eq!(sheet.cell(3, 2), &Cell::Number(9.0));
    assert_eq!(sheet.cell(3, 3), &Cell::Boolean(true));
}

#[test]
fn test_update_keeps_first_row_types() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vacation.xlsx");
    let mut workbook = XlsxWorkbook::new();
    let grid = workbook.add_worksheet();
    grid.set_name("Vacation").unwrap();
    grid.write_number(0, 1, 45292.0).unwrap();
    grid.write_boolean(0, 2, true).unwrap();
    grid.write_string(1, 0, "Alice").unwrap();
    let other = workbook.add_worksheet();
    other.set_name("Notes").unwrap();
    other.write_number(0, 0, 1.5).unwrap();
    workbook.save(&path).unwrap();

    let updates = vec!["2,0=Bob".parse::<CellUpdate>().unwrap()];
    update_cells(&path, "vacation", &updates).unwrap();

    let reread = WorkbookImporter::new(&path)
        .with_options(ImportOptions::raw())
        .import()
        .unwrap();
    let vacation = reread.sheet("Vacation").unwrap();
    assert_eq!(
        vacation.rows[0],
        vec![Cell::Empty, Cell::Number(45292.0), Cell::Boolean(true)]
    );
    assert_eq!(vacation.cell(1, 0), &Cell::text("Alice"));
    assert_eq!(vacation.cell(2, 0), &Cell::text("Bob"));
    assert_eq!(reread.sheet("Notes").unwrap().cell(0, 0), &Cell::Number(1.5));
}

#[test]
fn test_cache_loads_files_in_parallel() {
    let dir = TempDir::new().unwrap();
    let good = write_dashboard(dir.path());
    let missing = dir.path().join("missing.xlsx");

    let mut cache = SheetCache::new(ExcelSource::default());
    let report = cache.init(&[good.clone(), missing.clone()]);
    assert_eq!(report.loaded, vec![good.clone()]);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, RollupError::Excel(_)));

    let workbook = cache.get(&good).unwrap();
    assert_eq!(workbook.sheets.len(), 3);
    assert!(cache.get(&missing).is_none());

    assert!(cache.invalidate(&good));
    assert!(cache.is_empty());
}
