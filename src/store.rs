//! Record store collaborator
//!
//! The persistence boundary of the pipeline. A store must provide an atomic
//! upsert keyed on `(username, bucket_start)` per series; the pipeline relies on
//! it rather than on in-process locking. `WriteMode::HigherWins` is enforced
//! inside the store so that racing step writers cannot regress a count.

use crate::error::StoreError;
use crate::types::{BucketKey, SeriesKind, StoredRecord, WriteMode, WriteOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

/// Read/write interface of the persistent record store
pub trait RecordStore {
    /// Fetch the row stored under `key`
    fn get(&self, kind: SeriesKind, key: &BucketKey) -> Result<Option<StoredRecord>, StoreError>;

    /// Latest persisted bucket start for a user
    fn latest_timestamp(
        &self,
        kind: SeriesKind,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Insert or replace the row keyed by `(record.username, record.timestamp)`.
    ///
    /// `Replace` always writes but reports `Unchanged` when the stored row was
    /// already identical. `HigherWins` writes only a strictly greater value.
    fn upsert(
        &self,
        kind: SeriesKind,
        record: &StoredRecord,
        mode: WriteMode,
    ) -> Result<WriteOutcome, StoreError>;

    /// Record that a participant exists; idempotent
    fn register_participant(&self, username: &str) -> Result<(), StoreError>;

    /// All rows of one user, newest first
    fn records_for(&self, kind: SeriesKind, username: &str) -> Result<Vec<StoredRecord>, StoreError>;
}

type Series = BTreeMap<DateTime<Utc>, StoredRecord>;

#[derive(Debug, Default)]
struct StoreState {
    participants: BTreeSet<String>,
    series: BTreeMap<(SeriesKind, String), Series>,
}

/// Serialized form of a [`MemoryRecordStore`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreSnapshot {
    #[serde(default)]
    participants: Vec<String>,
    #[serde(default)]
    heart_rate: Vec<StoredRecord>,
    #[serde(default)]
    steps: Vec<StoredRecord>,
}

/// In-process record store guarded by a mutex, with JSON snapshots
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<StoreState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("record store lock poisoned".to_string()))
    }

    /// Number of rows held for a series
    pub fn len(&self, kind: SeriesKind) -> Result<usize, StoreError> {
        let state = self.lock()?;
        Ok(state
            .series
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, rows)| rows.len())
            .sum())
    }

    pub fn participants(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.participants.iter().cloned().collect())
    }

    /// Load a store from a JSON snapshot
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)?;
        let mut state = StoreState {
            participants: snapshot.participants.into_iter().collect(),
            ..Default::default()
        };

        for (kind, rows) in [
            (SeriesKind::HeartRate, snapshot.heart_rate),
            (SeriesKind::Steps, snapshot.steps),
        ] {
            for row in rows {
                state
                    .series
                    .entry((kind, row.username.clone()))
                    .or_default()
                    .insert(row.timestamp, row);
            }
        }

        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Serialize the store to a JSON snapshot
    pub fn to_json(&self) -> Result<String, StoreError> {
        let state = self.lock()?;
        let mut snapshot = StoreSnapshot {
            participants: state.participants.iter().cloned().collect(),
            ..Default::default()
        };

        for ((kind, _), rows) in &state.series {
            let target = match kind {
                SeriesKind::HeartRate => &mut snapshot.heart_rate,
                SeriesKind::Steps => &mut snapshot.steps,
            };
            target.extend(rows.values().cloned());
        }

        Ok(serde_json::to_string_pretty(&snapshot)?)
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, kind: SeriesKind, key: &BucketKey) -> Result<Option<StoredRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .series
            .get(&(kind, key.username.clone()))
            .and_then(|rows| rows.get(&key.bucket_start))
            .cloned())
    }

    fn latest_timestamp(
        &self,
        kind: SeriesKind,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .series
            .get(&(kind, username.to_string()))
            .and_then(|rows| rows.keys().next_back().copied()))
    }

    fn upsert(
        &self,
        kind: SeriesKind,
        record: &StoredRecord,
        mode: WriteMode,
    ) -> Result<WriteOutcome, StoreError> {
        let mut state = self.lock()?;
        let rows = state
            .series
            .entry((kind, record.username.clone()))
            .or_default();

        let outcome = match rows.get(&record.timestamp) {
            None => WriteOutcome::Inserted,
            Some(existing) => match mode {
                WriteMode::Replace if existing == record => WriteOutcome::Unchanged,
                WriteMode::Replace => WriteOutcome::Updated,
                WriteMode::HigherWins if record.value > existing.value => WriteOutcome::Updated,
                WriteMode::HigherWins => WriteOutcome::Unchanged,
            },
        };

        if mode == WriteMode::Replace || outcome != WriteOutcome::Unchanged {
            rows.insert(record.timestamp, record.clone());
        }

        Ok(outcome)
    }

    fn register_participant(&self, username: &str) -> Result<(), StoreError> {
        self.lock()?.participants.insert(username.to_string());
        Ok(())
    }

    fn records_for(&self, kind: SeriesKind, username: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .series
            .get(&(kind, username.to_string()))
            .map(|rows| rows.values().rev().cloned().collect())
            .unwrap_or_default())
    }
}
