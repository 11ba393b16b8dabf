//! Normalization and aggregation engine
//!
//! rows → [`extractor::extract`] → [`filter::matches`] → [`aggregator::aggregate`]

pub mod aggregator;
pub mod classify;
pub mod dates;
pub mod extractor;
pub mod filter;
pub mod normalizer;
pub mod variance;

pub use aggregator::{
    aggregate, aggregate_by, aggregate_parallel, totals, AggregationSpec, Granularity,
    PartialSeries, PeriodBucket, PeriodKey, SeriesTotals,
};
pub use classify::{RevenueClassifier, RevenueType};
pub use dates::resolve_date;
pub use extractor::{extract, extract_all, ColumnMap, FieldSpec};
pub use filter::{matches, FilterOp, FilterPredicate};
pub use normalizer::normalize;
pub use variance::{compare, Favorability, PeriodVariance};
