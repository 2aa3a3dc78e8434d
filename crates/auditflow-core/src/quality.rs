use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use auditflow_parser::parse_optional_f64;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::normalize::text_values;

/// Thresholds for data-quality alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DqRules {
    pub max_missing: f64,
    pub max_outliers: usize,
    pub z_threshold: f64,
}

impl Default for DqRules {
    fn default() -> Self {
        Self {
            max_missing: 0.2,
            max_outliers: 10,
            z_threshold: 3.0,
        }
    }
}

impl DqRules {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| PipelineError::storage("reading data-quality rules", path, err))?;
        Self::from_toml_str(&raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    MissingRate {
        column: String,
        rate: f64,
        threshold: f64,
    },
    Outliers {
        column: String,
        count: usize,
        threshold: usize,
    },
}

/// Share of null cells per column. An empty table reports zero everywhere.
pub fn compute_missing_rates(df: &DataFrame) -> BTreeMap<String, f64> {
    let height = df.height();
    df.get_columns()
        .iter()
        .map(|column| {
            let rate = if height == 0 {
                0.0
            } else {
                column.null_count() as f64 / height as f64
            };
            (column.name().to_string(), rate)
        })
        .collect()
}

/// Counts values whose z-score magnitude exceeds `z_threshold`.
///
/// Values are coerced to numbers and non-numeric cells ignored. The standard
/// deviation is the population one; a zero or undefined deviation counts
/// nothing. Missing columns are an error.
pub fn detect_outliers_zscore(
    df: &DataFrame,
    columns: &[String],
    z_threshold: f64,
) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for name in columns {
        let values = numeric_values(df, name)?;
        counts.insert(name.clone(), count_outliers(&values, z_threshold));
    }
    Ok(counts)
}

fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df.column(name)?;
    if column.dtype().is_primitive_numeric() {
        let floats = column.cast(&DataType::Float64)?;
        return Ok(floats.f64()?.into_iter().flatten().collect());
    }
    Ok(text_values(df, name)?
        .into_iter()
        .filter_map(|value| value.as_deref().and_then(parse_optional_f64))
        .collect())
}

fn count_outliers(values: &[f64], z_threshold: f64) -> usize {
    if values.is_empty() {
        return 0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if std == 0.0 || std.is_nan() {
        return 0;
    }
    values
        .iter()
        .filter(|v| ((*v - mean) / std).abs() > z_threshold)
        .count()
}

/// Alerts for every column at or above a threshold.
pub fn check_thresholds(
    missing_rates: &BTreeMap<String, f64>,
    outlier_counts: &BTreeMap<String, usize>,
    rules: &DqRules,
) -> Vec<Alert> {
    let mut alerts = Vec::new();
    for (column, rate) in missing_rates {
        if *rate >= rules.max_missing {
            alerts.push(Alert::MissingRate {
                column: column.clone(),
                rate: *rate,
                threshold: rules.max_missing,
            });
        }
    }
    for (column, count) in outlier_counts {
        if *count >= rules.max_outliers {
            alerts.push(Alert::Outliers {
                column: column.clone(),
                count: *count,
                threshold: rules.max_outliers,
            });
        }
    }
    alerts
}

/// Runs the missing-rate and outlier checks over `columns` and returns alerts.
pub fn assess(df: &DataFrame, columns: &[String], rules: &DqRules) -> Result<Vec<Alert>> {
    let missing = compute_missing_rates(df);
    let outliers = detect_outliers_zscore(df, columns, rules.z_threshold)?;
    let alerts = check_thresholds(&missing, &outliers, rules);
    emit_alerts(&alerts);
    Ok(alerts)
}

pub fn emit_alerts(alerts: &[Alert]) {
    for alert in alerts {
        match alert {
            Alert::MissingRate {
                column,
                rate,
                threshold,
            } => warn!(column = %column, rate, threshold, "missing-rate alert"),
            Alert::Outliers {
                column,
                count,
                threshold,
            } => warn!(column = %column, count, threshold, "outlier alert"),
        }
    }
}
