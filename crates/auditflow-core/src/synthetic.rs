use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::normalize::{DATE_TIME, PCODE, RESULT, STATION_ID};

const NULL_PROBABILITY: f64 = 0.05;
const SCALE: f64 = 2.0;

/// Parameters for a generated raw measurement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSpec {
    pub days: u32,
    pub stations: Vec<String>,
    pub pcode_count: u32,
    pub seed: u64,
    pub start: NaiveDate,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            days: 60,
            stations: vec!["CT".to_string(), "TUS".to_string()],
            pcode_count: 12,
            seed: 42,
            start: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or_default(),
        }
    }
}

/// Builds a raw table (`Station_ID`, `Date_Time`, `PCode`, `Result`) with one
/// row per station, day and PCode. Identical parameters always yield the same table.
pub fn generate(spec: &SyntheticSpec) -> Result<DataFrame> {
    if spec.stations.is_empty() {
        return Err(PipelineError::Config("at least one station is required".into()));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let capacity = spec.stations.len() * spec.days as usize * spec.pcode_count as usize;
    let mut stations = Vec::with_capacity(capacity);
    let mut dates = Vec::with_capacity(capacity);
    let mut pcodes = Vec::with_capacity(capacity);
    let mut results: Vec<Option<f64>> = Vec::with_capacity(capacity);

    for station in &spec.stations {
        let offset = station_offset(station);
        for day in 0..spec.days {
            let date = (spec.start + Duration::days(day as i64))
                .format("%Y-%m-%d")
                .to_string();
            for pcode in 1..=spec.pcode_count {
                let mean = 10.0 + offset + (pcode % 7) as f64;
                let value = mean + SCALE * standard_normal(&mut rng);
                let value = (rng.gen::<f64>() >= NULL_PROBABILITY).then_some(value);

                stations.push(station.clone());
                dates.push(date.clone());
                pcodes.push(format!("Data {pcode}"));
                results.push(value);
            }
        }
    }

    Ok(DataFrame::new(vec![
        Series::new(STATION_ID.into(), stations).into(),
        Series::new(DATE_TIME.into(), dates).into(),
        Series::new(PCODE.into(), pcodes).into(),
        Series::new(RESULT.into(), results).into(),
    ])?)
}

/// Stable 0..5 shift per station name.
fn station_offset(station: &str) -> f64 {
    (station.bytes().map(u64::from).sum::<u64>() % 5) as f64
}

/// Box-Muller transform over two uniform draws.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
