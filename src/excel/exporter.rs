//! Excel exporter - bucket series, variance reports and whole workbooks → .xlsx

use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, Worksheet};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use crate::core::aggregator::PeriodBucket;
use crate::core::variance::PeriodVariance;
use crate::error::RollupResult;
use crate::types::{Cell, Workbook};

/// Writes reports and workbooks with rust_xlsxwriter
pub struct ExcelExporter;

impl ExcelExporter {
    /// One row per period: label, entries, sum/average/share per measure, distinct counts
    pub fn export_series(path: &Path, sheet_name: &str, buckets: &[PeriodBucket]) -> RollupResult<()> {
        let mut workbook = XlsxWorkbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name)?;

        let measures: BTreeSet<&str> = buckets
            .iter()
            .flat_map(|b| b.measures().map(|(m, _)| m))
            .collect();
        let dimensions: BTreeSet<&str> = buckets
            .iter()
            .flat_map(|b| b.distinct_counts().map(|(f, _)| f))
            .collect();

        let header_format = Format::new().set_bold();
        let number_format = Format::new().set_num_format("#,##0.00");
        let percent_format = Format::new().set_num_format("0.0%");

        let mut headers = vec!["Period".to_string(), "Label".to_string(), "Entries".to_string()];
        for m in &measures {
            headers.push(format!("{} (sum)", m));
            headers.push(format!("{} (avg)", m));
            headers.push(format!("{} (share)", m));
        }
        for d in &dimensions {
            headers.push(format!("distinct {}", d));
        }
        write_header_row(worksheet, &headers, &header_format)?;

        for (i, bucket) in buckets.iter().enumerate() {
            let row = (i + 1) as u32;
            worksheet.write_string(row, 0, bucket.label())?;
            worksheet.write_string(row, 1, bucket.display_label())?;
            worksheet.write_number(row, 2, bucket.entries() as f64)?;

            let mut col: u16 = 3;
            for m in &measures {
                worksheet.write_number_with_format(row, col, bucket.sum(m), &number_format)?;
                worksheet.write_number_with_format(row, col + 1, bucket.average(m), &number_format)?;
                worksheet.write_number_with_format(row, col + 2, bucket.share(m), &percent_format)?;
                col += 3;
            }
            for d in &dimensions {
                worksheet.write_number(row, col, bucket.distinct_count(d) as f64)?;
                col += 1;
            }
        }

        worksheet.set_column_width(0, 12)?;
        worksheet.set_column_width(1, 20)?;
        workbook.save(path)?;
        debug!(path = %path.display(), rows = buckets.len(), "exported series");
        Ok(())
    }

    /// Budget vs actual report, one row per period
    pub fn export_variance(
        path: &Path,
        measure: &str,
        variances: &[PeriodVariance],
        threshold: f64,
    ) -> RollupResult<()> {
        let mut workbook = XlsxWorkbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Variance")?;

        worksheet.set_column_width(0, 12)?;
        for col in 1..=4 {
            worksheet.set_column_width(col, 12)?;
        }
        worksheet.set_column_width(5, 22)?;

        let header_format = Format::new().set_bold();
        let headers = ["Period", "Budget", "Actual", "Variance", "Var %", "Status"];
        write_header_row(worksheet, &headers, &header_format)?;

        for (i, v) in variances.iter().enumerate() {
            let row = (i + 1) as u32;
            worksheet.write_string(row, 0, v.period.label())?;
            worksheet.write_number(row, 1, v.budget)?;
            worksheet.write_number(row, 2, v.actual)?;
            worksheet.write_number(row, 3, v.variance)?;
            worksheet.write_number(row, 4, v.variance_pct / 100.0)?;
            worksheet.write_string(row, 5, variance_status(v))?;
        }

        let meta_row = (variances.len() + 3) as u32;
        worksheet.write_string(meta_row, 0, format!("Measure: {}", measure))?;
        worksheet.write_string(meta_row + 1, 0, format!("Threshold: {}%", threshold))?;

        workbook.save(path)?;
        debug!(path = %path.display(), rows = variances.len(), "exported variance report");
        Ok(())
    }

    /// Write every sheet: headers in the first row, data rows below
    pub fn export_workbook(path: &Path, data: &Workbook) -> RollupResult<()> {
        let mut workbook = XlsxWorkbook::new();

        for sheet in &data.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;

            for (col, header) in sheet.headers.iter().enumerate() {
                worksheet.write_string(0, col as u16, header)?;
            }
            write_cells(worksheet, 1, &sheet.rows)?;
        }

        workbook.save(path)?;
        debug!(path = %path.display(), sheets = data.sheets.len(), "wrote workbook");
        Ok(())
    }

    /// Write every sheet's rows from A1 with no header row.
    ///
    /// Pairs with `ImportOptions::raw()`: cells keep their type and position,
    /// empty cells stay unwritten.
    pub fn export_grid(path: &Path, data: &Workbook) -> RollupResult<()> {
        let mut workbook = XlsxWorkbook::new();

        for sheet in &data.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;
            write_cells(worksheet, 0, &sheet.rows)?;
        }

        workbook.save(path)?;
        debug!(path = %path.display(), sheets = data.sheets.len(), "wrote workbook grid");
        Ok(())
    }
}

fn write_cells(worksheet: &mut Worksheet, first_row: u32, rows: &[Vec<Cell>]) -> RollupResult<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        let row_num = first_row + row_idx as u32;
        for (col_idx, cell) in row.iter().enumerate() {
            let col_num = col_idx as u16;
            match cell {
                Cell::Text(s) | Cell::DateTime(s) => {
                    worksheet.write_string(row_num, col_num, s)?;
                }
                Cell::Number(n) => {
                    worksheet.write_number(row_num, col_num, *n)?;
                }
                Cell::Boolean(b) => {
                    worksheet.write_boolean(row_num, col_num, *b)?;
                }
                Cell::Empty => {}
            }
        }
    }
    Ok(())
}

fn write_header_row<S: AsRef<str>>(
    worksheet: &mut Worksheet,
    headers: &[S],
    format: &Format,
) -> RollupResult<()> {
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header.as_ref(), format)?;
    }
    Ok(())
}

pub(crate) fn variance_status(v: &PeriodVariance) -> &'static str {
    if v.exceeds_threshold && !v.is_favorable {
        "ALERT - Unfavorable"
    } else if v.exceeds_threshold {
        "ALERT - Favorable"
    } else if v.is_favorable {
        "Favorable"
    } else {
        "Unfavorable"
    }
}
