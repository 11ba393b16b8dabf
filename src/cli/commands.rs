use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cache::SheetCache;
use crate::core::classify::{self, KeywordClassifier, RevenueType};
use crate::core::{
    aggregate, aggregate_parallel, compare, extract_all, filter, totals, AggregationSpec,
    Favorability, FilterPredicate, Granularity, PeriodBucket, PeriodVariance, SeriesTotals,
};
use crate::error::{RollupError, RollupResult};
use crate::excel::{update_cells, variance_status, CellUpdate, ExcelExporter};
use crate::layout::{load_layouts, parse_field_arg, SheetLayout};
use crate::types::{format_number, Record, Sheet, Workbook};

/// Field that holds contract-type text when none is given
pub const DEFAULT_CLASSIFY_FIELD: &str = "contract";

/// Where a command reads its records from
#[derive(Debug, Clone, Default)]
pub struct RecordSource {
    pub workbook: PathBuf,
    /// Sheet to read; falls back to the layout's sheet, then the first sheet
    pub sheet: Option<String>,
    pub layouts: Option<PathBuf>,
    pub layout: Option<String>,
    /// Inline `name=COLUMN[:kind]` fields, applied over the layout
    pub fields: Vec<String>,
    pub filters: Vec<FilterPredicate>,
    pub revenue_type: Option<RevenueType>,
    pub classify_field: Option<String>,
}

/// How records roll up into periods
#[derive(Debug, Clone)]
pub struct RollupOptions {
    pub date_field: String,
    pub period: Granularity,
    pub measures: Vec<String>,
    pub distinct: Vec<String>,
    /// Fold this many partitions in parallel; sequential when unset
    pub partitions: Option<usize>,
}

impl RollupOptions {
    fn spec(&self) -> AggregationSpec {
        let mut spec = AggregationSpec::new(self.date_field.clone(), self.period);
        for m in &self.measures {
            spec = spec.measure(m.clone());
        }
        for d in &self.distinct {
            spec = spec.distinct(d.clone());
        }
        spec
    }

    fn run(&self, records: &[Record]) -> Vec<PeriodBucket> {
        let spec = self.spec();
        match self.partitions {
            Some(n) if n > 1 => aggregate_parallel(records, &spec, n),
            _ => aggregate(records, &spec),
        }
    }
}

/// Serialized form of an aggregated series
#[derive(Debug, Serialize)]
struct SeriesReport<'a> {
    granularity: Granularity,
    date_field: &'a str,
    buckets: &'a [PeriodBucket],
    totals: SeriesTotals,
}

/// Serialized form of a variance comparison
#[derive(Debug, Serialize)]
struct VarianceReport<'a> {
    measure: &'a str,
    threshold_pct: f64,
    favorable_count: usize,
    alert_count: usize,
    variances: &'a [PeriodVariance],
}

//==============================================================================
// Commands
//==============================================================================

/// Execute the sheets command - list sheets with headers and row counts
pub fn sheets(file: PathBuf) -> RollupResult<()> {
    println!("{}", "📒 Rollup - Workbook sheets".bold().green());
    println!("   File: {}\n", file.display());

    let mut cache = SheetCache::default();
    let workbook = cache.get_or_load(&file)?;

    if workbook.sheets.is_empty() {
        println!("{}", "   No readable sheets".yellow());
        return Ok(());
    }

    for sheet in &workbook.sheets {
        println!(
            "   {} {}",
            sheet.name.bright_blue().bold(),
            format!("({} rows)", sheet.row_count()).dimmed()
        );
        if !sheet.headers.is_empty() {
            println!("      {}", sheet.headers.join(" | "));
        }
    }
    Ok(())
}

/// Execute the aggregate command - roll one sheet up into period buckets
pub fn aggregate_sheet(
    source: RecordSource,
    options: RollupOptions,
    output: Option<PathBuf>,
    verbose: bool,
) -> RollupResult<()> {
    println!("{}", "📊 Rollup - Period aggregation".bold().green());
    println!("   File: {}", source.workbook.display());
    println!(
        "   Period: {} on '{}'\n",
        format!("{:?}", options.period).to_lowercase().bright_yellow(),
        options.date_field
    );

    let mut cache = SheetCache::default();
    let records = load_records(&mut cache, &source)?;
    if verbose {
        println!("   {} records after filters", records.len().to_string().cyan());
    }

    let buckets = options.run(&records);

    match output {
        Some(path) => {
            write_series(&path, &options, &buckets)?;
            println!(
                "{}",
                format!("✅ Series exported to {}", path.display())
                    .bold()
                    .green()
            );
        }
        None => print_series_table(&buckets, &options.measures, &options.distinct),
    }
    Ok(())
}

/// Execute the variance command - budget vs actual per period
#[allow(clippy::too_many_arguments)]
pub fn variance(
    budget: RecordSource,
    actual: RecordSource,
    mut options: RollupOptions,
    measure: String,
    threshold: f64,
    lower_is_better: bool,
    output: Option<PathBuf>,
    verbose: bool,
) -> RollupResult<()> {
    println!("{}", "📊 Rollup - Variance Analysis".bold().green());
    println!("   Budget: {}", budget.workbook.display());
    println!("   Actual: {}", actual.workbook.display());
    println!("   Measure: {}", measure.bright_blue());
    println!("   Threshold: {}%\n", threshold);

    let mut cache = SheetCache::default();
    let report = cache.init(&[budget.workbook.clone(), actual.workbook.clone()]);
    if let Some((path, err)) = report.failed.into_iter().next() {
        return Err(RollupError::Excel(format!(
            "Failed to load {}: {}",
            path.display(),
            err
        )));
    }

    if !options.measures.contains(&measure) {
        options.measures.push(measure.clone());
    }

    let budget_records = load_records(&mut cache, &budget)?;
    let actual_records = load_records(&mut cache, &actual)?;
    if verbose {
        println!(
            "   {} budget records, {} actual records",
            budget_records.len().to_string().cyan(),
            actual_records.len().to_string().cyan()
        );
    }

    let favorability = if lower_is_better {
        Favorability::LowerIsBetter
    } else {
        Favorability::for_measure(&measure)
    };
    let variances = compare(
        &options.run(&budget_records),
        &options.run(&actual_records),
        &measure,
        threshold,
        favorability,
    );

    match output {
        Some(path) => {
            write_variance(&path, &measure, &variances, threshold)?;
            println!(
                "{}",
                format!("✅ Variance report exported to {}", path.display())
                    .bold()
                    .green()
            );
        }
        None => print_variance_table(&variances, threshold),
    }

    let favorable_count = variances.iter().filter(|v| v.is_favorable).count();
    let unfavorable_count = variances.len() - favorable_count;
    let alert_count = variances.iter().filter(|v| v.exceeds_threshold).count();

    println!();
    println!(
        "   {} Favorable: {}  {} Unfavorable: {}  {} Alerts (>{:.0}%): {}",
        "✅".green(),
        favorable_count.to_string().green(),
        "❌".red(),
        unfavorable_count.to_string().red(),
        "⚠️".yellow(),
        threshold,
        alert_count.to_string().yellow()
    );
    Ok(())
}

/// Execute the update command - write cell edits back to the workbook
pub fn update(file: PathBuf, sheet: String, updates: Vec<CellUpdate>) -> RollupResult<()> {
    println!("{}", "✏️  Rollup - Updating cells".bold().green());
    println!("   File: {}", file.display());
    println!("   Sheet: {}\n", sheet.bright_blue());

    if updates.is_empty() {
        println!("{}", "   Nothing to update".yellow());
        return Ok(());
    }

    let applied = update_cells(&file, &sheet, &updates)?;
    println!(
        "{}",
        format!("✅ Applied {} update(s)", applied).bold().green()
    );
    Ok(())
}

//==============================================================================
// Record loading
//==============================================================================

/// Load, extract, filter and optionally classify the records of one sheet
pub fn load_records(cache: &mut SheetCache, source: &RecordSource) -> RollupResult<Vec<Record>> {
    let layout = build_layout(source)?;
    let workbook = cache.get_or_load(&source.workbook)?;
    let sheet = select_sheet(&workbook, source.sheet.as_deref().or(layout.sheet.as_deref()))?;

    let map = layout.resolve(sheet)?;
    let records = extract_all(sheet, &map);
    let extracted = records.len();
    let mut records = filter::apply(records, &source.filters);

    if let Some(kind) = source.revenue_type {
        let field = source
            .classify_field
            .as_deref()
            .unwrap_or(DEFAULT_CLASSIFY_FIELD);
        let classifier = KeywordClassifier::new(field)?;
        records = classify::partition(records, &classifier)
            .remove(&kind)
            .unwrap_or_default();
    }

    info!(
        sheet = %sheet.name,
        extracted,
        kept = records.len(),
        "loaded records"
    );
    Ok(records)
}

/// Named layout from the layouts file, overlaid with inline fields
fn build_layout(source: &RecordSource) -> RollupResult<SheetLayout> {
    let mut layout = match (&source.layout, &source.layouts) {
        (Some(name), Some(path)) => load_layouts(path)?.get(name)?.clone(),
        (Some(name), None) => {
            return Err(RollupError::Layout(format!(
                "Layout '{}' requested but no layouts file given (--layouts or ROLLUP_LAYOUTS)",
                name
            )))
        }
        (None, _) => SheetLayout::default(),
    };

    for arg in &source.fields {
        let (name, field) = parse_field_arg(arg)?;
        layout.fields.insert(name, field);
    }

    if layout.fields.is_empty() {
        return Err(RollupError::Layout(
            "No fields to extract: pass --layout or --field".to_string(),
        ));
    }
    Ok(layout)
}

fn select_sheet<'a>(workbook: &'a Workbook, name: Option<&str>) -> RollupResult<&'a Sheet> {
    match name {
        Some(name) => workbook.sheet(name).ok_or_else(|| {
            RollupError::Excel(format!(
                "Sheet '{}' not found (sheets: {})",
                name,
                workbook.sheet_names().join(", ")
            ))
        }),
        None => {
            let sheet = workbook
                .sheets
                .first()
                .ok_or_else(|| RollupError::Excel("Workbook has no readable sheets".to_string()))?;
            debug!(sheet = %sheet.name, "no sheet given, using the first");
            Ok(sheet)
        }
    }
}

//==============================================================================
// Output
//==============================================================================

fn output_extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

/// Write a series as .xlsx, .yaml or .json depending on the extension
fn write_series(path: &Path, options: &RollupOptions, buckets: &[PeriodBucket]) -> RollupResult<()> {
    match output_extension(path) {
        "xlsx" => ExcelExporter::export_series(path, "Rollup", buckets),
        ext @ ("yaml" | "yml" | "json") => {
            let report = SeriesReport {
                granularity: options.period,
                date_field: &options.date_field,
                buckets,
                totals: totals(buckets),
            };
            let content = if ext == "json" {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_yaml::to_string(&report)?
            };
            fs::write(path, content)?;
            Ok(())
        }
        other => Err(RollupError::Export(format!(
            "Unsupported output format: '{}'. Use .xlsx, .yaml or .json",
            other
        ))),
    }
}

fn write_variance(
    path: &Path,
    measure: &str,
    variances: &[PeriodVariance],
    threshold: f64,
) -> RollupResult<()> {
    match output_extension(path) {
        "xlsx" => ExcelExporter::export_variance(path, measure, variances, threshold),
        ext @ ("yaml" | "yml" | "json") => {
            let report = VarianceReport {
                measure,
                threshold_pct: threshold,
                favorable_count: variances.iter().filter(|v| v.is_favorable).count(),
                alert_count: variances.iter().filter(|v| v.exceeds_threshold).count(),
                variances,
            };
            let content = if ext == "json" {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_yaml::to_string(&report)?
            };
            fs::write(path, content)?;
            Ok(())
        }
        other => Err(RollupError::Export(format!(
            "Unsupported output format: '{}'. Use .xlsx, .yaml or .json",
            other
        ))),
    }
}

fn print_series_table(buckets: &[PeriodBucket], measures: &[String], distinct: &[String]) {
    if buckets.is_empty() {
        println!("{}", "   No records to aggregate".yellow());
        return;
    }

    let width = 22 + 10 + 14 * measures.len() + 12 * distinct.len();
    println!("{}", "─".repeat(width));
    let mut header = format!("{:<22}{:>10}", "Period", "Entries");
    for m in measures {
        header.push_str(&format!("{:>14}", m));
    }
    for d in distinct {
        header.push_str(&format!("{:>12}", format!("#{}", d)));
    }
    println!("{}", header.bold());
    println!("{}", "─".repeat(width));

    for bucket in buckets {
        let label = format!("{:<22}", bucket.display_label());
        let label = if bucket.period().is_unknown() {
            label.yellow()
        } else {
            label.bright_blue()
        };
        let mut line = format!("{:>10}", bucket.entries());
        for m in measures {
            line.push_str(&format!("{:>14}", format_number(round2(bucket.sum(m)))));
        }
        for d in distinct {
            line.push_str(&format!("{:>12}", bucket.distinct_count(d)));
        }
        println!("{}{}", label, line);
    }

    let totals = totals(buckets);
    println!("{}", "─".repeat(width));
    let mut line = format!("{:>10}", totals.entries);
    for m in measures {
        let sum = totals.sums.get(m).copied().unwrap_or(0.0);
        line.push_str(&format!("{:>14}", format_number(round2(sum))));
    }
    println!("{}{}", format!("{:<22}", "Total").bold(), line.bold());
}

fn print_variance_table(variances: &[PeriodVariance], threshold: f64) {
    println!("\n{}", "📊 Budget vs Actual Variance:".bold().cyan());
    println!("{}", "─".repeat(85));
    println!(
        "{:<20} {:>12} {:>12} {:>12} {:>10} {:>8}",
        "Period".bold(),
        "Budget".bold(),
        "Actual".bold(),
        "Variance".bold(),
        "Var %".bold(),
        "Status".bold()
    );
    println!("{}", "─".repeat(85));

    for v in variances {
        let var_str = format_number(round2(v.variance));
        let pct_str = format!("{:.1}%", v.variance_pct);
        let status = match variance_status(v) {
            "ALERT - Unfavorable" => "⚠️ ❌",
            "ALERT - Favorable" => "⚠️ ✅",
            "Favorable" => "✅",
            _ => "❌",
        };
        let (var_colored, pct_colored) = if v.is_favorable {
            (var_str.green(), pct_str.green())
        } else {
            (var_str.red(), pct_str.red())
        };

        println!(
            "{:<20} {:>12} {:>12} {:>12} {:>10} {:>8}",
            v.period.label().bright_blue(),
            format_number(round2(v.budget)),
            format_number(round2(v.actual)),
            var_colored,
            pct_colored,
            status
        );
    }

    println!("{}", "─".repeat(85));
    println!("   {} = exceeds {:.0}% threshold", "⚠️".yellow(), threshold);
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
