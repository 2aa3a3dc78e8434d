use std::fmt;

use serde::Serialize;

const CT_INDICATORS: &[&str] = &[
    "dates",
    "date",
    "timestamp",
    "time",
    "amount",
    "transaction_amount",
    "value",
    "price",
    "customer",
    "client",
    "account",
    "user",
    "transaction",
    "payment",
    "transfer",
    "status",
    "type",
    "category",
];

const TUS_INDICATORS: &[&str] = &[
    "dates",
    "date",
    "timestamp",
    "time",
    "test",
    "result",
    "outcome",
    "score",
    "user",
    "patient",
    "subject",
    "participant",
    "analysis",
    "evaluation",
    "assessment",
    "metric",
    "measurement",
    "value",
];

const RAW_INDICATORS: &[&str] = &[
    "date_time",
    "datetime",
    "timestamp",
    "amount",
    "value",
    "price",
    "cost",
    "description",
    "details",
    "notes",
    "id",
    "reference",
    "code",
];

const MATCH_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    CtAnalysis,
    TusAnalysis,
    RawData,
    Unknown,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::CtAnalysis => "ct_analysis",
            DatasetKind::TusAnalysis => "tus_analysis",
            DatasetKind::RawData => "raw_data",
            DatasetKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionScores {
    pub ct: usize,
    pub tus: usize,
    pub raw: usize,
}

/// Counts how many indicator keywords appear inside any (lowercased) column name.
pub fn score_columns<S: AsRef<str>>(columns: &[S]) -> DetectionScores {
    let normalized: Vec<String> = columns
        .iter()
        .map(|c| c.as_ref().trim().to_lowercase())
        .collect();

    let score = |indicators: &[&str]| {
        indicators
            .iter()
            .filter(|indicator| normalized.iter().any(|col| col.contains(*indicator)))
            .count()
    };

    DetectionScores {
        ct: score(CT_INDICATORS),
        tus: score(TUS_INDICATORS),
        raw: score(RAW_INDICATORS),
    }
}

/// Every kind scoring at least three indicators; failing that, the single best
/// non-zero score (ties go CT, then TUS); failing that, `Unknown`.
pub fn detect_dataset_kinds<S: AsRef<str>>(columns: &[S]) -> Vec<DatasetKind> {
    let scores = score_columns(columns);

    let mut kinds = Vec::new();
    if scores.ct >= MATCH_THRESHOLD {
        kinds.push(DatasetKind::CtAnalysis);
    }
    if scores.tus >= MATCH_THRESHOLD {
        kinds.push(DatasetKind::TusAnalysis);
    }
    if scores.raw >= MATCH_THRESHOLD {
        kinds.push(DatasetKind::RawData);
    }

    if kinds.is_empty() {
        let fallback = if scores.ct > 0 && scores.ct >= scores.tus && scores.ct >= scores.raw {
            DatasetKind::CtAnalysis
        } else if scores.tus > 0 && scores.tus >= scores.raw {
            DatasetKind::TusAnalysis
        } else if scores.raw > 0 {
            DatasetKind::RawData
        } else {
            DatasetKind::Unknown
        };
        kinds.push(fallback);
    }

    kinds
}
