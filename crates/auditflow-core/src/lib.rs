pub mod atomic;
pub mod config;
pub mod error;
pub mod hashing;
pub mod lineage;
pub mod normalize;
pub mod outputs;
pub mod pipeline;
pub mod pivot;
pub mod preprocess;
pub mod quality;
pub mod row;
pub mod synthetic;

pub use config::{PipelineConfig, Strictness};
pub use error::PipelineError;
pub use hashing::{hash_row, ColumnOrder};
pub use lineage::{LineageLog, LineageRecord, LineageRecorder, LineageSummary};
pub use row::{Row, Value};
