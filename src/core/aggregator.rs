//! Period aggregation
//!
//! Records are grouped by a period key (day, ISO week, month, quarter, year)
//! derived from a date field. Each bucket sums the configured numeric
//! measures, counts its entries and collects distinct values for grouping
//! dimensions such as project or activity IDs.
//!
//! Aggregation runs in two phases. Records fold into a [`PartialSeries`] of
//! open accumulators; [`PartialSeries::finalize`] then closes every bucket,
//! computing averages, shares of the series total and distinct counts. A
//! finalized [`PeriodBucket`] exposes read-only accessors only.
//!
//! Partial series merge by summing measures and counts and unioning distinct
//! sets, so independent partitions can be folded in parallel and combined
//! in any grouping ([`aggregate_parallel`]).

use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::core::dates;
use crate::types::{Record, Value};

/// Label of the bucket that collects records without a usable date
pub const UNKNOWN_PERIOD: &str = "Unknown";

//==============================================================================
// Period keys
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    /// ISO week, starting Monday
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    /// First day of the period containing `date`
    pub fn truncate(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => dates::week_start(date),
            Granularity::Month => dates::month_start(date),
            Granularity::Quarter => dates::quarter_start(date),
            Granularity::Year => dates::year_start(date),
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "week" | "weekly" => Ok(Granularity::Week),
            "month" | "monthly" => Ok(Granularity::Month),
            "quarter" | "quarterly" => Ok(Granularity::Quarter),
            "year" | "yearly" | "annual" => Ok(Granularity::Year),
            other => Err(format!(
                "unknown period '{}' (use day, week, month, quarter or year)",
                other
            )),
        }
    }
}

/// Bucket key. Dated periods order chronologically; `Unknown` sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodKey {
    Period {
        start: NaiveDate,
        granularity: Granularity,
    },
    Unknown,
}

impl PeriodKey {
    pub fn for_date(date: NaiveDate, granularity: Granularity) -> Self {
        PeriodKey::Period {
            start: granularity.truncate(date),
            granularity,
        }
    }

    /// Key for an optional date; no date means `Unknown`
    pub fn for_value(value: Option<&Value>, granularity: Granularity) -> Self {
        value
            .and_then(Value::as_date)
            .map_or(PeriodKey::Unknown, |d| PeriodKey::for_date(d, granularity))
    }

    pub fn start(&self) -> Option<NaiveDate> {
        match self {
            PeriodKey::Period { start, .. } => Some(*start),
            PeriodKey::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PeriodKey::Unknown)
    }

    /// Sortable label: `2024-01-15`, `2024-01`, `2024-Q1`, `2024`
    pub fn label(&self) -> String {
        match self {
            PeriodKey::Period { start, granularity } => match granularity {
                Granularity::Day | Granularity::Week => start.format("%Y-%m-%d").to_string(),
                Granularity::Month => start.format("%Y-%m").to_string(),
                Granularity::Quarter => {
                    format!("{}-Q{}", start.year(), start.month0() / 3 + 1)
                }
                Granularity::Year => start.year().to_string(),
            },
            PeriodKey::Unknown => UNKNOWN_PERIOD.to_string(),
        }
    }

    /// Human label: `Jan 15, 2024`, `Week of 2024-01-15`, `Jan 2024`, `Q1 2024`
    pub fn display_label(&self) -> String {
        match self {
            PeriodKey::Period { start, granularity } => match granularity {
                Granularity::Day => start.format("%b %d, %Y").to_string(),
                Granularity::Week => format!("Week of {}", start.format("%Y-%m-%d")),
                Granularity::Month => start.format("%b %Y").to_string(),
                Granularity::Quarter => {
                    format!("Q{} {}", start.month0() / 3 + 1, start.year())
                }
                Granularity::Year => start.year().to_string(),
            },
            PeriodKey::Unknown => UNKNOWN_PERIOD.to_string(),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for PeriodKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

//==============================================================================
// Aggregation request
//==============================================================================

/// What to aggregate: the date field, the period size, measures and dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub date_field: String,
    pub granularity: Granularity,
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub distinct: Vec<String>,
}

impl AggregationSpec {
    pub fn new(date_field: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            date_field: date_field.into(),
            granularity,
            measures: Vec::new(),
            distinct: Vec::new(),
        }
    }

    #[must_use]
    pub fn measure(mut self, field: impl Into<String>) -> Self {
        self.measures.push(field.into());
        self
    }

    #[must_use]
    pub fn distinct(mut self, field: impl Into<String>) -> Self {
        self.distinct.push(field.into());
        self
    }

    pub fn key_for(&self, record: &Record) -> PeriodKey {
        PeriodKey::for_value(record.get(&self.date_field), self.granularity)
    }
}

//==============================================================================
// Open accumulators
//==============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct Accumulator {
    entries: usize,
    sums: BTreeMap<String, f64>,
    distinct: BTreeMap<String, BTreeSet<String>>,
}

impl Accumulator {
    fn fold(&mut self, record: &Record, measures: &[String], distinct: &[String]) {
        self.entries += 1;
        for measure in measures {
            let value = record
                .get(measure)
                .and_then(Value::as_number)
                .unwrap_or(0.0);
            *self.sums.entry(measure.clone()).or_insert(0.0) += value;
        }
        for field in distinct {
            let set = self.distinct.entry(field.clone()).or_default();
            if let Some(value) = record.get(field) {
                let rendered = value.render();
                if !rendered.trim().is_empty() {
                    set.insert(rendered);
                }
            }
        }
    }

    fn merge(&mut self, other: Accumulator) {
        self.entries += other.entries;
        for (measure, sum) in other.sums {
            *self.sums.entry(measure).or_insert(0.0) += sum;
        }
        for (field, values) in other.distinct {
            self.distinct.entry(field).or_default().extend(values);
        }
    }
}

/// Buckets still open for folding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialSeries {
    buckets: BTreeMap<PeriodKey, Accumulator>,
}

impl PartialSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into the bucket for `key`
    pub fn fold(&mut self, key: PeriodKey, record: &Record, measures: &[String], distinct: &[String]) {
        self.buckets
            .entry(key)
            .or_default()
            .fold(record, measures, distinct);
    }

    /// Combine two partial series; order of combination does not matter
    #[must_use]
    pub fn merge(mut self, other: PartialSeries) -> PartialSeries {
        for (key, acc) in other.buckets {
            match self.buckets.get_mut(&key) {
                Some(existing) => existing.merge(acc),
                None => {
                    self.buckets.insert(key, acc);
                }
            }
        }
        self
    }

    /// Records folded so far across all buckets
    pub fn entries(&self) -> usize {
        self.buckets.values().map(|a| a.entries).sum()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Close every bucket, in chronological order with `Unknown` last
    pub fn finalize(self) -> Vec<PeriodBucket> {
        let mut grand_totals: BTreeMap<&str, f64> = BTreeMap::new();
        for acc in self.buckets.values() {
            for (measure, sum) in &acc.sums {
                *grand_totals.entry(measure.as_str()).or_insert(0.0) += sum;
            }
        }

        let mut finalized = Vec::with_capacity(self.buckets.len());
        for (key, acc) in &self.buckets {
            let measures = acc
                .sums
                .iter()
                .map(|(measure, &sum)| {
                    let total = grand_totals.get(measure.as_str()).copied().unwrap_or(0.0);
                    let stats = MeasureStats {
                        sum,
                        average: ratio(sum, acc.entries as f64),
                        share: ratio(sum, total),
                    };
                    (measure.clone(), stats)
                })
                .collect();
            let distinct_counts = acc
                .distinct
                .iter()
                .map(|(field, values)| (field.clone(), values.len()))
                .collect();
            finalized.push(PeriodBucket {
                period: *key,
                display: key.display_label(),
                entries: acc.entries,
                measures,
                distinct_counts,
            });
        }
        finalized
    }
}

/// `numerator / denominator`, defined as 0 when the denominator is 0
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

//==============================================================================
// Finalized buckets
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeasureStats {
    pub sum: f64,
    /// Sum per entry in this bucket
    pub average: f64,
    /// Fraction of the measure's total across the whole series
    pub share: f64,
}

/// One closed period of an aggregated series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodBucket {
    period: PeriodKey,
    display: String,
    entries: usize,
    measures: BTreeMap<String, MeasureStats>,
    distinct_counts: BTreeMap<String, usize>,
}

impl PeriodBucket {
    pub fn period(&self) -> PeriodKey {
        self.period
    }

    pub fn label(&self) -> String {
        self.period.label()
    }

    pub fn display_label(&self) -> &str {
        &self.display
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn stats(&self, measure: &str) -> Option<&MeasureStats> {
        self.measures.get(measure)
    }

    /// Sum of a measure; 0 when the measure was not tracked
    pub fn sum(&self, measure: &str) -> f64 {
        self.stats(measure).map_or(0.0, |s| s.sum)
    }

    pub fn average(&self, measure: &str) -> f64 {
        self.stats(measure).map_or(0.0, |s| s.average)
    }

    pub fn share(&self, measure: &str) -> f64 {
        self.stats(measure).map_or(0.0, |s| s.share)
    }

    pub fn distinct_count(&self, field: &str) -> usize {
        self.distinct_counts.get(field).copied().unwrap_or(0)
    }

    pub fn measures(&self) -> impl Iterator<Item = (&str, &MeasureStats)> {
        self.measures.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn distinct_counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.distinct_counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Grand totals of a finalized series
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesTotals {
    pub entries: usize,
    pub sums: BTreeMap<String, f64>,
}

pub fn totals(buckets: &[PeriodBucket]) -> SeriesTotals {
    let mut totals = SeriesTotals::default();
    for bucket in buckets {
        totals.entries += bucket.entries;
        for (measure, stats) in &bucket.measures {
            *totals.sums.entry(measure.clone()).or_insert(0.0) += stats.sum;
        }
    }
    totals
}

//==============================================================================
// Entry points
//==============================================================================

/// Aggregate records into period buckets
pub fn aggregate(records: &[Record], spec: &AggregationSpec) -> Vec<PeriodBucket> {
    aggregate_by(records, |r| spec.key_for(r), &spec.measures, &spec.distinct)
}

/// Aggregate with a caller-supplied period key function
pub fn aggregate_by<F>(
    records: &[Record],
    key_fn: F,
    measures: &[String],
    distinct: &[String],
) -> Vec<PeriodBucket>
where
    F: Fn(&Record) -> PeriodKey,
{
    let mut partial = PartialSeries::new();
    for record in records {
        partial.fold(key_fn(record), record, measures, distinct);
    }
    debug!(
        records = records.len(),
        buckets = partial.len(),
        "aggregated records"
    );
    partial.finalize()
}

/// Aggregate by folding `partitions` slices in parallel and merging the partials.
///
/// Produces the same buckets as [`aggregate`].
pub fn aggregate_parallel(
    records: &[Record],
    spec: &AggregationSpec,
    partitions: usize,
) -> Vec<PeriodBucket> {
    if records.is_empty() {
        return Vec::new();
    }
    let chunk_size = records.len().div_ceil(partitions.max(1)).max(1);
    let partial = records
        .par_chunks(chunk_size)
        .map(|chunk| {
            let mut partial = PartialSeries::new();
            for record in chunk {
                partial.fold(spec.key_for(record), record, &spec.measures, &spec.distinct);
            }
            partial
        })
        .reduce(PartialSeries::new, PartialSeries::merge);
    debug!(
        records = records.len(),
        partitions,
        buckets = partial.len(),
        "aggregated records in parallel"
    );
    partial.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(date: Value, project: &str, hours: f64) -> Record {
        Record::from_iter([
            ("date", date),
            ("project_id", Value::Text(project.to_string())),
            ("hours", Value::Number(hours)),
        ])
    }

    fn monthly_hours() -> AggregationSpec {
        AggregationSpec::new("date", Granularity::Month)
            .measure("hours")
            .distinct("project_id")
    }

    #[test]
    fn test_basic_monthly_rollup() {
        let records = vec![
            entry(Value::Date(ymd(2024, 1, 15)), "P100", 3.0),
            entry(Value::Date(ymd(2024, 1, 20)), "P100", 5.0),
            entry(Value::Date(ymd(2024, 2, 1)), "P200", 2.0),
        ];
        let buckets = aggregate(&records, &monthly_hours());

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].label(), "2024-01");
        assert_eq!(buckets[0].sum("hours"), 8.0);
        assert_eq!(buckets[0].entries(), 2);
        assert_eq!(buckets[0].average("hours"), 4.0);
        assert_eq!(buckets[0].distinct_count("project_id"), 1);
        assert_eq!(buckets[0].display_label(), "Jan 2024");
        assert_eq!(buckets[1].label(), "2024-02");
        assert_eq!(buckets[1].sum("hours"), 2.0);
        assert_eq!(buckets[1].entries(), 1);
        assert_eq!(buckets[0].share("hours"), 0.8);
        assert_eq!(buckets[1].share("hours"), 0.2);
    }

    #[test]
    fn test_unparsable_date_goes_to_unknown_bucket() {
        let records = vec![
            entry(Value::Text("N/A".into()), "P100", 1.0),
            entry(Value::Date(ymd(2024, 3, 3)), "P100", 2.0),
            entry(Value::Null, "P300", 4.0),
        ];
        let buckets = aggregate(&records, &monthly_hours());
        assert_eq!(buckets.len(), 2);
        let last = buckets.last().unwrap();
        assert_eq!(last.label(), UNKNOWN_PERIOD);
        assert!(last.period().is_unknown());
        assert_eq!(last.entries(), 2);
        assert_eq!(last.sum("hours"), 5.0);
        assert_eq!(buckets.iter().map(|b| b.entries()).sum::<usize>(), 3);
    }

    #[test]
    fn test_missing_date_field_goes_to_unknown() {
        let record = Record::from_iter([("hours", Value::Number(1.0))]);
        let buckets = aggregate(&[record], &monthly_hours());
        assert_eq!(buckets[0].label(), UNKNOWN_PERIOD);
    }

    #[test]
    fn test_serial_and_text_dates_are_resolved() {
        let records = vec![
            entry(Value::Number(45292.0), "P1", 1.0),
            entry(Value::Text("2024-01-31".into()), "P2", 1.0),
        ];
        let buckets = aggregate(&records, &monthly_hours());
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].label(), "2024-01");
        assert_eq!(buckets[0].distinct_count("project_id"), 2);
    }

    #[test]
    fn test_non_numeric_measures_count_as_zero() {
        let records = vec![
            Record::from_iter([
                ("date", Value::Date(ymd(2024, 1, 2))),
                ("hours", Value::Null),
            ]),
            Record::from_iter([
                ("date", Value::Date(ymd(2024, 1, 3))),
                ("hours", Value::Text("lots".into())),
            ]),
            Record::from_iter([("date", Value::Date(ymd(2024, 1, 4)))]),
        ];
        let buckets = aggregate(&records, &monthly_hours());
        assert_eq!(buckets[0].entries(), 3);
        assert_eq!(buckets[0].sum("hours"), 0.0);
        assert_eq!(buckets[0].average("hours"), 0.0);
        assert_eq!(buckets[0].share("hours"), 0.0);
        assert_eq!(buckets[0].distinct_count("project_id"), 0);
    }

    #[test]
    fn test_ordering_is_chronological_for_any_input_order() {
        let dates = [
            ymd(2023, 12, 31),
            ymd(2024, 2, 10),
            ymd(2024, 1, 5),
            ymd(2022, 7, 1),
        ];
        let mut records: Vec<Record> = dates
            .iter()
            .map(|d| entry(Value::Date(*d), "P", 1.0))
            .collect();
        records.insert(1, entry(Value::Text("N/A".into()), "P", 1.0));

        let expected = aggregate(&records, &monthly_hours());
        let labels: Vec<String> = expected.iter().map(|b| b.label()).collect();
        assert_eq!(
            labels,
            vec!["2022-07", "2023-12", "2024-01", "2024-02", "Unknown"]
        );

        for rotation in 0..records.len() {
            let mut permuted = records.clone();
            permuted.rotate_left(rotation);
            permuted.reverse();
            assert_eq!(aggregate(&permuted, &monthly_hours()), expected);
        }
    }

    #[test]
    fn test_week_buckets_start_monday() {
        let records = vec![
            entry(Value::Date(ymd(2024, 1, 15)), "P", 1.0),
            entry(Value::Date(ymd(2024, 1, 21)), "P", 1.0),
            entry(Value::Date(ymd(2024, 1, 22)), "P", 1.0),
        ];
        let spec = AggregationSpec::new("date", Granularity::Week).measure("hours");
        let buckets = aggregate(&records, &spec);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].label(), "2024-01-15");
        assert_eq!(buckets[0].entries(), 2);
        assert_eq!(buckets[0].display_label(), "Week of 2024-01-15");
        assert_eq!(buckets[1].label(), "2024-01-22");
    }

    #[test]
    fn test_quarter_and_year_labels() {
        let key = PeriodKey::for_date(ymd(2024, 8, 9), Granularity::Quarter);
        assert_eq!(key.label(), "2024-Q3");
        assert_eq!(key.display_label(), "Q3 2024");
        let key = PeriodKey::for_date(ymd(2024, 8, 9), Granularity::Year);
        assert_eq!(key.label(), "2024");
        let key = PeriodKey::for_date(ymd(2024, 8, 9), Granularity::Day);
        assert_eq!(key.display_label(), "Aug 09, 2024");
    }

    #[test]
    fn test_unknown_sorts_after_all_periods() {
        let late = PeriodKey::for_date(ymd(2200, 12, 31), Granularity::Day);
        assert!(late < PeriodKey::Unknown);
    }

    #[test]
    fn test_granularity_from_str() {
        assert_eq!("Monthly".parse::<Granularity>(), Ok(Granularity::Month));
        assert_eq!("week".parse::<Granularity>(), Ok(Granularity::Week));
        assert!("fortnight".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_aggregate_by_custom_key() {
        let records = vec![
            entry(Value::Date(ymd(2024, 1, 15)), "P100", 3.0),
            entry(Value::Date(ymd(2024, 6, 20)), "P100", 5.0),
        ];
        let everything_in_2024 = |_: &Record| PeriodKey::for_date(ymd(2024, 1, 1), Granularity::Year);
        let buckets = aggregate_by(&records, everything_in_2024, &["hours".to_string()], &[]);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].sum("hours"), 8.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let records: Vec<Record> = (0..200)
            .map(|i| {
                let date = if i % 17 == 0 {
                    Value::Null
                } else {
                    Value::Number(45292.0 + f64::from(i * 3))
                };
                entry(date, &format!("P{}", i % 7), f64::from(i % 5) * 0.5)
            })
            .collect();
        let spec = monthly_hours();
        let sequential = aggregate(&records, &spec);
        for partitions in [1, 2, 3, 8, 64, 500] {
            assert_eq!(aggregate_parallel(&records, &spec, partitions), sequential);
        }
        assert!(aggregate_parallel(&[], &spec, 4).is_empty());
    }

    #[test]
    fn test_merge_is_commutative() {
        let spec = monthly_hours();
        let fold = |records: &[Record]| {
            let mut p = PartialSeries::new();
            for r in records {
                p.fold(spec.key_for(r), r, &spec.measures, &spec.distinct);
            }
            p
        };
        let a = fold(&[
            entry(Value::Date(ymd(2024, 1, 1)), "P1", 1.0),
            entry(Value::Null, "P1", 1.0),
        ]);
        let b = fold(&[
            entry(Value::Date(ymd(2024, 1, 9)), "P2", 2.0),
            entry(Value::Date(ymd(2024, 3, 9)), "P2", 2.0),
        ]);
        let ab = a.clone().merge(b.clone());
        let ba = b.merge(a);
        assert_eq!(ab, ba);
        assert_eq!(ab.entries(), 4);
        let buckets = ab.finalize();
        assert_eq!(buckets[0].distinct_count("project_id"), 2);
    }

    #[test]
    fn test_totals() {
        let records = vec![
            entry(Value::Date(ymd(2024, 1, 15)), "P100", 3.0),
            entry(Value::Date(ymd(2024, 2, 20)), "P100", 5.0),
            entry(Value::Null, "P100", 1.5),
        ];
        let t = totals(&aggregate(&records, &monthly_hours()));
        assert_eq!(t.entries, 3);
        assert_eq!(t.sums.get("hours"), Some(&9.5));
    }

    #[test]
    fn test_bucket_serializes_period_label() {
        let records = vec![entry(Value::Date(ymd(2024, 1, 15)), "P100", 3.0)];
        let buckets = aggregate(&records, &monthly_hours());
        let json = serde_json::to_value(&buckets[0]).unwrap();
        assert_eq!(json["period"], "2024-01");
        assert_eq!(json["entries"], 1);
        assert_eq!(json["measures"]["hours"]["sum"], 3.0);
        assert_eq!(json["distinct_counts"]["project_id"], 1);
    }
}
