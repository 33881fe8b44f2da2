//! FitBank Points - Sample-to-timeline normalization and zone scoring
//!
//! Turns irregular wearable samples into a clean per-user timeline and scores
//! it for a fitness competition through a deterministic pipeline:
//! validation → bucketing → aggregation → gap interpolation → scoring →
//! reconciliation against persisted records.
//!
//! ## Series
//!
//! - **Heart rate**: one-minute buckets, mean BPM, short gaps interpolated,
//!   0-3 points per minute by zone
//! - **Steps**: one-hour buckets, summed counts, one point per 200 steps,
//!   higher reading wins on resubmission

pub mod aggregator;
pub mod bucketer;
pub mod config;
pub mod error;
pub mod interpolator;
pub mod pipeline;
pub mod reconciler;
pub mod schema;
pub mod scorer;
pub mod settings;
pub mod store;
pub mod types;

pub use config::PipelineConfig;
pub use error::{IngestError, SettingsError, StoreError};
pub use pipeline::{heart_rate_batch, steps_batch, PointsProcessor};
pub use settings::{resolve_thresholds, SettingsStore, StaticSettings};
pub use store::{MemoryRecordStore, RecordStore};
pub use types::{BatchResponse, ResponseBody, SeriesKind};

// Schema exports
pub use schema::{PayloadAdapter, ValidationError};

/// Version reported by the CLI and doctor checks
pub const INGEST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name
pub const PRODUCER_NAME: &str = "fitbank-points";
