use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::normalize::{DATE_TIME, PCODE, RESULT, STATION_ID};

pub const STATION: &str = "Station";
pub const DATES: &str = "Dates";

/// How the `Result` values sharing a date and PCode collapse to one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
    Sum,
    First,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
            Aggregation::Sum => "sum",
            Aggregation::First => "first",
        }
    }

    /// Nulls are ignored. A group without values is null, except for `sum`.
    pub fn apply(&self, values: &[Option<f64>]) -> Option<f64> {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        match self {
            Aggregation::Sum => Some(present.iter().sum()),
            _ if present.is_empty() => None,
            Aggregation::Mean => Some(present.iter().sum::<f64>() / present.len() as f64),
            Aggregation::Median => {
                let mut sorted = present;
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Some(sorted[mid])
                }
            }
            Aggregation::First => present.first().copied(),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            "sum" => Ok(Aggregation::Sum),
            "first" => Ok(Aggregation::First),
            other => Err(PipelineError::Config(format!(
                "unknown aggregation '{other}' (expected mean, median, sum or first)"
            ))),
        }
    }
}

/// Pivots one station's measurements into a date x PCode table.
///
/// `df` must be normalized. With `template_columns` the value columns follow
/// the template (duplicates dropped, absent PCodes null, unknown PCodes
/// discarded); otherwise they are the station's PCodes in sorted order.
pub fn pivot_station(
    df: &DataFrame,
    station: &str,
    template_columns: Option<&[String]>,
    aggregation: Aggregation,
) -> Result<DataFrame> {
    let stations = df.column(STATION_ID)?.str()?;
    let timestamps = df.column(DATE_TIME)?.datetime()?;
    let pcodes = df.column(PCODE)?.str()?;
    let results = df.column(RESULT)?.f64()?;

    let mut groups: BTreeMap<NaiveDate, BTreeMap<String, Vec<Option<f64>>>> = BTreeMap::new();
    let mut seen_pcodes: BTreeSet<String> = BTreeSet::new();

    for idx in 0..df.height() {
        if stations.get(idx) != Some(station) {
            continue;
        }
        let (Some(micros), Some(pcode)) = (timestamps.get(idx), pcodes.get(idx)) else {
            continue;
        };
        let Some(date) = DateTime::from_timestamp_micros(micros).map(|dt| dt.date_naive()) else {
            continue;
        };

        seen_pcodes.insert(pcode.to_string());
        groups
            .entry(date)
            .or_default()
            .entry(pcode.to_string())
            .or_default()
            .push(results.get(idx));
    }

    let value_columns: Vec<String> = match template_columns {
        Some(template) => {
            let mut unique = BTreeSet::new();
            template
                .iter()
                .filter(|name| unique.insert(name.as_str()))
                .cloned()
                .collect()
        }
        None => seen_pcodes.into_iter().collect(),
    };

    let dates: Vec<String> = groups
        .keys()
        .map(|date| date.format("%Y-%m-%d").to_string())
        .collect();

    let mut columns: Vec<Column> = Vec::with_capacity(value_columns.len() + 2);
    columns.push(Series::new(STATION.into(), vec![station; dates.len()]).into());
    columns.push(Series::new(DATES.into(), dates).into());

    for name in &value_columns {
        let cells: Vec<Option<f64>> = groups
            .values()
            .map(|by_pcode| {
                by_pcode
                    .get(name)
                    .and_then(|values| aggregation.apply(values))
            })
            .collect();
        columns.push(Series::new(name.as_str().into(), cells).into());
    }

    Ok(DataFrame::new(columns)?)
}
