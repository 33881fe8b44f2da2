//! Core types for the FitBank points pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw samples, bucketed values, interpolated series points, scored
//! buckets, persisted records and the outbound batch response.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default zone thresholds used when the settings store cannot supply them
pub const DEFAULT_Z1: i64 = 125;
pub const DEFAULT_Z2: i64 = 150;
pub const DEFAULT_Z3: i64 = 165;

/// The two series a participant can submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    HeartRate,
    Steps,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::HeartRate => "heart_rate",
            SeriesKind::Steps => "steps",
        }
    }

    /// Name of the value field in inbound payloads
    pub fn value_field(&self) -> &'static str {
        match self {
            SeriesKind::HeartRate => "bpm",
            SeriesKind::Steps => "steps",
        }
    }

    /// Human-readable label used in messages
    pub fn label(&self) -> &'static str {
        match self {
            SeriesKind::HeartRate => "Heart rate",
            SeriesKind::Steps => "Steps",
        }
    }

    /// Width of one bucket on the normalized timeline
    pub fn bucket_width(&self) -> Duration {
        match self {
            SeriesKind::HeartRate => Duration::minutes(1),
            SeriesKind::Steps => Duration::hours(1),
        }
    }

    /// How a freshly computed bucket replaces a persisted one
    pub fn write_mode(&self) -> WriteMode {
        match self {
            SeriesKind::HeartRate => WriteMode::Replace,
            SeriesKind::Steps => WriteMode::HigherWins,
        }
    }

    /// Message returned when a batch completes
    pub fn success_message(&self) -> &'static str {
        match self {
            SeriesKind::HeartRate => "Heart rate data saved successfully.",
            SeriesKind::Steps => "Steps data processed successfully.",
        }
    }
}

/// A validated inbound reading. Input-only, discarded after bucketing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub value: i64,
}

/// One aggregated value per bucket for a single user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketValue {
    pub bucket_start: DateTime<Utc>,
    pub value: i64,
    /// Number of raw samples collapsed into this bucket
    pub sample_count: usize,
}

/// Whether a point was observed or synthesized by interpolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointOrigin {
    Observed,
    Interpolated,
}

/// A point on one user's regular timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesPoint {
    pub bucket_start: DateTime<Utc>,
    pub value: i64,
    pub origin: PointOrigin,
}

impl SeriesPoint {
    pub fn observed(bucket_start: DateTime<Utc>, value: i64) -> Self {
        Self {
            bucket_start,
            value,
            origin: PointOrigin::Observed,
        }
    }

    pub fn interpolated(bucket_start: DateTime<Utc>, value: i64) -> Self {
        Self {
            bucket_start,
            value,
            origin: PointOrigin::Interpolated,
        }
    }
}

/// A scored bucket ready for reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedBucket {
    pub username: String,
    pub bucket_start: DateTime<Utc>,
    pub value: i64,
    pub points: i64,
    pub origin: PointOrigin,
}

impl AggregatedBucket {
    pub fn key(&self) -> BucketKey {
        BucketKey {
            username: self.username.clone(),
            bucket_start: self.bucket_start,
        }
    }
}

/// Heart-rate zone thresholds, `z1 < z2 < z3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneThresholds {
    pub z1: i64,
    pub z2: i64,
    pub z3: i64,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            z1: DEFAULT_Z1,
            z2: DEFAULT_Z2,
            z3: DEFAULT_Z3,
        }
    }
}

impl ZoneThresholds {
    /// Build thresholds, returning `None` unless strictly increasing
    pub fn new(z1: i64, z2: i64, z3: i64) -> Option<Self> {
        let thresholds = Self { z1, z2, z3 };
        thresholds.is_ordered().then_some(thresholds)
    }

    pub fn is_ordered(&self) -> bool {
        self.z1 < self.z2 && self.z2 < self.z3
    }
}

/// Natural primary key of a persisted bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub username: String,
    pub bucket_start: DateTime<Utc>,
}

/// A row held by the record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub value: i64,
    pub points: i64,
}

/// Write policy requested from the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Insert or replace by key
    Replace,
    /// Insert, or replace only when the new value is strictly greater
    HigherWins,
}

/// What the record store did with a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Per-entry status reported in batch responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Inserted,
    Updated,
    Dropped,
    Failed,
}

/// Outcome of one bucket key within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryResult {
    pub status: EntryStatus,
    pub message: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub value: i64,
    pub points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Body of an outbound batch response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Success {
        message: String,
        records_processed: usize,
        batch_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        results: Option<Vec<EntryResult>>,
    },
    Failure {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

/// Transport-agnostic response: an HTTP-equivalent status and a JSON body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl BatchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn failure(status: u16, error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status,
            body: ResponseBody::Failure {
                error: error.into(),
                details,
            },
        }
    }

    /// Serialize the body to JSON
    pub fn body_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.body)
    }
}
