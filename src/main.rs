use clap::{Args, Parser, Subcommand};
use sheet_rollup::cli::{self, RecordSource, RollupOptions};
use sheet_rollup::core::{FilterPredicate, Granularity, RevenueType};
use sheet_rollup::excel::CellUpdate;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollup")]
#[command(about = "Normalize spreadsheet rows and roll them up by period.")]
#[command(long_about = "Rollup - spreadsheet normalization and period aggregation

Reads Excel workbooks, maps columns to typed fields, filters records and
sums measures per day, week, month, quarter or year.

COMMANDS:
  sheets     - List sheets, headers and row counts
  aggregate  - Roll a sheet up into period buckets
  variance   - Budget vs actual per period
  update     - Write cell edits back to a workbook

FIELDS:
  Fields come from a layouts file (--layouts / ROLLUP_LAYOUTS with --layout)
  or inline as name=COLUMN[:kind]. COLUMN is a zero-based index, a column
  letter or header text; kind is text (default), number or date.

EXAMPLES:
  rollup sheets projects.xlsx
  rollup aggregate tx.xlsx --field date=A:date --field hours=Quantity:number \\
      --measure hours --period week
  rollup aggregate tx.xlsx --layout transactions --filter project=P100 -o series.json
  rollup variance budget.xlsx actual.xlsx --layout transactions --measure hours
  rollup update projects.xlsx --sheet Projects 1,2=1500")]
#[command(version)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which columns become which fields, and which records survive
#[derive(Args)]
struct SourceArgs {
    /// Layouts file (YAML)
    #[arg(long, env = "ROLLUP_LAYOUTS")]
    layouts: Option<PathBuf>,

    /// Named layout from the layouts file
    #[arg(short, long)]
    layout: Option<String>,

    /// Inline field: name=COLUMN[:kind]; overrides the layout's field of the same name
    #[arg(short, long = "field")]
    fields: Vec<String>,

    /// Keep records where field=value (exact) or field~value (contains, any case)
    #[arg(long = "filter")]
    filters: Vec<FilterPredicate>,

    /// Keep only one revenue type: te, fixed or unknown
    #[arg(long)]
    revenue_type: Option<RevenueType>,

    /// Text field holding the contract type (default: contract)
    #[arg(long)]
    classify_field: Option<String>,
}

impl SourceArgs {
    fn into_source(self, workbook: PathBuf, sheet: Option<String>) -> RecordSource {
        RecordSource {
            workbook,
            sheet,
            layouts: self.layouts,
            layout: self.layout,
            fields: self.fields,
            filters: self.filters,
            revenue_type: self.revenue_type,
            classify_field: self.classify_field,
        }
    }
}

#[derive(Args)]
struct PeriodArgs {
    /// Date field that keys the periods
    #[arg(short, long, default_value = "date")]
    date: String,

    /// day, week, month, quarter or year
    #[arg(short, long, default_value = "month")]
    period: Granularity,

    /// Fold records in this many parallel partitions
    #[arg(long)]
    parallel: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// List sheets with their headers and row counts
    Sheets {
        /// Excel workbook (.xlsx, .xlsm)
        file: PathBuf,
    },

    #[command(long_about = "Roll one sheet up into period buckets.

Each record is keyed by the period its date falls in. Records without a
usable date land in a trailing 'Unknown' bucket. Every bucket reports its
entry count and, per measure, the sum, average and share of the series
total, plus distinct counts for --distinct fields.

OUTPUT FORMATS:
  Terminal table (default)
  -o series.xlsx | series.yaml | series.json")]
    /// Aggregate a sheet into period buckets
    Aggregate {
        /// Excel workbook (.xlsx, .xlsm)
        file: PathBuf,

        /// Sheet name (default: the layout's sheet, then the first sheet)
        #[arg(short, long)]
        sheet: Option<String>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        periods: PeriodArgs,

        /// Numeric field to sum (repeatable)
        #[arg(short, long = "measure")]
        measures: Vec<String>,

        /// Field whose distinct values are counted per bucket (repeatable)
        #[arg(long = "distinct")]
        distinct: Vec<String>,

        /// Output file (.xlsx, .yaml or .json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    #[command(long_about = "Compare budget vs actual per period for one measure.

Both workbooks are read with the same fields and filters, aggregated with
the same period, and joined on period. A period missing on one side counts
as 0 there.

VARIANCE TYPES:
  Measures named like cost/expense/cogs: actual < budget = favorable
  Everything else: actual > budget = favorable
  --lower-is-better forces the first rule.")]
    /// Budget vs actual variance per period
    Variance {
        /// Budget workbook
        budget: PathBuf,

        /// Actual workbook
        actual: PathBuf,

        /// Sheet in the budget workbook
        #[arg(long)]
        budget_sheet: Option<String>,

        /// Sheet in the actual workbook
        #[arg(long)]
        actual_sheet: Option<String>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        periods: PeriodArgs,

        /// Measure to compare
        #[arg(short, long)]
        measure: String,

        /// Variance threshold percentage for alerts
        #[arg(short, long, default_value = "10")]
        threshold: f64,

        /// Treat actual below budget as favorable
        #[arg(long)]
        lower_is_better: bool,

        /// Output file (.xlsx, .yaml or .json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write cell edits (ROW,COL=VALUE; ROW is 1-based over data rows) back to a workbook
    Update {
        /// Excel workbook to rewrite
        file: PathBuf,

        /// Sheet to edit
        #[arg(short, long)]
        sheet: String,

        /// Edits as ROW,COL=VALUE
        #[arg(required = true)]
        updates: Vec<CellUpdate>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "sheet_rollup=debug"
    } else {
        "sheet_rollup=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Sheets { file } => cli::sheets(file)?,

        Commands::Aggregate {
            file,
            sheet,
            source,
            periods,
            measures,
            distinct,
            output,
        } => {
            let options = RollupOptions {
                date_field: periods.date,
                period: periods.period,
                measures,
                distinct,
                partitions: periods.parallel,
            };
            cli::aggregate_sheet(source.into_source(file, sheet), options, output, cli.verbose)?
        }

        Commands::Variance {
            budget,
            actual,
            budget_sheet,
            actual_sheet,
            source,
            periods,
            measure,
            threshold,
            lower_is_better,
            output,
        } => {
            let options = RollupOptions {
                date_field: periods.date,
                period: periods.period,
                measures: vec![measure.clone()],
                distinct: Vec::new(),
                partitions: periods.parallel,
            };
            let budget_source = source.into_source(budget, budget_sheet);
            let actual_source = RecordSource {
                workbook: actual,
                sheet: actual_sheet,
                ..budget_source.clone()
            };
            cli::variance(
                budget_source,
                actual_source,
                options,
                measure,
                threshold,
                lower_is_better,
                output,
                cli.verbose,
            )?
        }

        Commands::Update {
            file,
            sheet,
            updates,
        } => cli::update(file, sheet, updates)?,
    }
    Ok(())
}
