use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::{string_column, timestamp_column, FilteredView, CATEGORY, DATE_CREATED};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// One populated calendar month, keyed by its first day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyCount {
    pub month: NaiveDate,
    pub count: u64,
}

/// Rows per Category, largest first; equal counts keep first-seen order.
/// Rows with no Category are skipped.
pub fn count_by_category(view: &FilteredView) -> Result<Vec<CategoryCount>> {
    let values = string_column(view.batch(), CATEGORY)?;

    // category -> (first row, count)
    let mut counts: HashMap<&str, (usize, u64)> = HashMap::new();
    for (row, value) in values.iter().enumerate() {
        if let Some(category) = value {
            counts.entry(category).or_insert((row, 0)).1 += 1;
        }
    }

    let mut ordered: Vec<(&str, usize, u64)> = counts
        .into_iter()
        .map(|(category, (first, count))| (category, first, count))
        .collect();
    ordered.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)));

    Ok(ordered
        .into_iter()
        .map(|(category, _, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect())
}

/// Rows per calendar month of `Date_Created`, oldest first. Months without
/// rows are absent, not zero.
pub fn count_by_month(view: &FilteredView) -> Result<Vec<MonthlyCount>> {
    let dates = timestamp_column(view.batch(), DATE_CREATED)?;

    let mut buckets: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for micros in dates.iter().flatten() {
        let ts = DateTime::from_timestamp_micros(micros)
            .ok_or_else(|| anyhow!("`{}` value {} out of range", DATE_CREATED, micros))?;
        let month = NaiveDate::from_ymd_opt(ts.year(), ts.month(), 1)
            .ok_or_else(|| anyhow!("no first day for {}", ts))?;
        *buckets.entry(month).or_default() += 1;
    }

    Ok(buckets
        .into_iter()
        .map(|(month, count)| MonthlyCount { month, count })
        .collect())
}
