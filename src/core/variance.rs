//! Budget vs actual comparison of two aggregated series

use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::aggregator::{PeriodBucket, PeriodKey};

/// Which direction of variance is good news for a measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Favorability {
    /// Revenue, hours billed: actual above budget is favorable
    HigherIsBetter,
    /// Cost, expense: actual below budget is favorable
    LowerIsBetter,
}

impl Favorability {
    /// Guess from the measure name: costs and expenses prefer lower actuals
    pub fn for_measure(measure: &str) -> Self {
        let name = measure.to_lowercase();
        if name.contains("expense") || name.contains("cost") || name.contains("cogs") {
            Favorability::LowerIsBetter
        } else {
            Favorability::HigherIsBetter
        }
    }
}

/// Budget and actual for one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodVariance {
    pub period: PeriodKey,
    pub budget: f64,
    pub actual: f64,
    pub variance: f64,
    /// Percent of budget; 0 when the budget is 0
    pub variance_pct: f64,
    pub is_favorable: bool,
    pub exceeds_threshold: bool,
}

/// Join two finished series on period key and compare one measure.
///
/// A period present on only one side counts as 0 on the other. Output is in
/// period order with `Unknown` last.
pub fn compare(
    budget: &[PeriodBucket],
    actual: &[PeriodBucket],
    measure: &str,
    threshold_pct: f64,
    favorability: Favorability,
) -> Vec<PeriodVariance> {
    let mut joined: BTreeMap<PeriodKey, (f64, f64)> = BTreeMap::new();
    for bucket in budget {
        joined.entry(bucket.period()).or_default().0 += bucket.sum(measure);
    }
    for bucket in actual {
        joined.entry(bucket.period()).or_default().1 += bucket.sum(measure);
    }

    joined
        .into_iter()
        .map(|(period, (budget_val, actual_val))| {
            let variance = actual_val - budget_val;
            let variance_pct = if budget_val.abs() > 0.0001 {
                (variance / budget_val) * 100.0
            } else {
                0.0
            };
            let is_favorable = match favorability {
                Favorability::LowerIsBetter => actual_val <= budget_val,
                Favorability::HigherIsBetter => actual_val >= budget_val,
            };
            PeriodVariance {
                period,
                budget: budget_val,
                actual: actual_val,
                variance,
                variance_pct,
                is_favorable,
                exceeds_threshold: variance_pct.abs() >= threshold_pct,
            }
        })
        .collect()
}
