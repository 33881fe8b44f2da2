//! Reconciliation against persisted records
//!
//! Decides per bucket key whether a freshly computed bucket is written:
//! - no persisted row: insert
//! - steps: update only when the new count is strictly higher, otherwise skip
//! - heart rate: upsert unconditionally (replace-by-key)
//!
//! The decisions are hints for the persister. Atomicity, including the
//! higher-wins rule under concurrent writers, belongs to the record store.

use crate::types::{AggregatedBucket, SeriesKind, StoredRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Action planned for one bucket key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Insert,
    Update,
    Upsert,
    Skip,
}

impl ReconcileAction {
    pub fn writes(&self) -> bool {
        !matches!(self, ReconcileAction::Skip)
    }
}

/// A bucket paired with its planned action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub bucket: AggregatedBucket,
    pub action: ReconcileAction,
    /// Value persisted under the same key before this batch, if any
    pub existing_value: Option<i64>,
}

impl PlannedWrite {
    /// Row to hand to the record store
    pub fn to_record(&self) -> StoredRecord {
        StoredRecord {
            username: self.bucket.username.clone(),
            timestamp: self.bucket.bucket_start,
            value: self.bucket.value,
            points: self.bucket.points,
        }
    }
}

pub struct Reconciler;

impl Reconciler {
    /// Decide the action for one bucket given the persisted row under its key
    pub fn decide(kind: SeriesKind, new_value: i64, existing: Option<&StoredRecord>) -> ReconcileAction {
        match (existing, kind) {
            (None, _) => ReconcileAction::Insert,
            (Some(_), SeriesKind::HeartRate) => ReconcileAction::Upsert,
            (Some(row), SeriesKind::Steps) if new_value > row.value => ReconcileAction::Update,
            (Some(_), SeriesKind::Steps) => ReconcileAction::Skip,
        }
    }

    /// Plan every bucket of one user. Buckets sharing a start keep the first.
    pub fn plan(
        kind: SeriesKind,
        buckets: Vec<AggregatedBucket>,
        existing: &BTreeMap<DateTime<Utc>, StoredRecord>,
    ) -> Vec<PlannedWrite> {
        let mut unique: BTreeMap<DateTime<Utc>, AggregatedBucket> = BTreeMap::new();
        for bucket in buckets {
            unique.entry(bucket.bucket_start).or_insert(bucket);
        }

        unique
            .into_values()
            .map(|bucket| {
                let persisted = existing.get(&bucket.bucket_start);
                PlannedWrite {
                    action: Self::decide(kind, bucket.value, persisted),
                    existing_value: persisted.map(|row| row.value),
                    bucket,
                }
            })
            .collect()
    }

    /// Split off buckets strictly older than the user's high-watermark.
    ///
    /// Returns the kept buckets and the discarded ones.
    pub fn apply_watermark(
        buckets: Vec<AggregatedBucket>,
        watermark: Option<DateTime<Utc>>,
    ) -> (Vec<AggregatedBucket>, Vec<AggregatedBucket>) {
        let Some(watermark) = watermark else {
            return (buckets, Vec::new());
        };
        buckets
            .into_iter()
            .partition(|bucket| bucket.bucket_start >= watermark)
    }
}
