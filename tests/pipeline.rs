//! End-to-end tests for batch ingestion against in-memory collaborators

use chrono::{DateTime, Duration, TimeZone, Utc};
use fitbank_points::error::StoreError;
use fitbank_points::pipeline::{heart_rate_batch, steps_batch, PointsProcessor};
use fitbank_points::settings::StaticSettings;
use fitbank_points::store::{MemoryRecordStore, RecordStore};
use fitbank_points::types::{
    BatchResponse, BucketKey, EntryStatus, ResponseBody, SeriesKind, StoredRecord, WriteMode,
    WriteOutcome,
};
use fitbank_points::PipelineConfig;
use pretty_assertions::assert_eq;
use std::fs;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 1, 10, 0, 0).unwrap()
}

fn default_thresholds() -> StaticSettings {
    StaticSettings::new()
        .with("z1", "125")
        .with("z2", "150")
        .with("z3", "165")
}

fn rows(store: &MemoryRecordStore, kind: SeriesKind, username: &str) -> Vec<(i64, i64, i64)> {
    let mut rows: Vec<(i64, i64, i64)> = store
        .records_for(kind, username)
        .unwrap()
        .into_iter()
        .map(|r| ((r.timestamp - t0()).num_minutes(), r.value, r.points))
        .collect();
    rows.sort();
    rows
}

fn success(response: &BatchResponse) -> (String, usize) {
    match &response.body {
        ResponseBody::Success {
            message,
            records_processed,
            ..
        } => (message.clone(), *records_processed),
        other => panic!("expected success, got {other:?}"),
    }
}

/// Record store that refuses every read and write for one user
struct FlakyStore {
    inner: MemoryRecordStore,
    broken_user: String,
}

impl FlakyStore {
    fn new(broken_user: &str) -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            broken_user: broken_user.to_string(),
        }
    }

    fn check(&self, username: &str) -> Result<(), StoreError> {
        if username == self.broken_user {
            Err(StoreError::Rejected {
                username: username.to_string(),
                reason: "connection reset".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl RecordStore for FlakyStore {
    fn get(&self, kind: SeriesKind, key: &BucketKey) -> Result<Option<StoredRecord>, StoreError> {
        self.check(&key.username)?;
        self.inner.get(kind, key)
    }

    fn latest_timestamp(
        &self,
        kind: SeriesKind,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.check(username)?;
        self.inner.latest_timestamp(kind, username)
    }

    fn upsert(
        &self,
        kind: SeriesKind,
        record: &StoredRecord,
        mode: WriteMode,
    ) -> Result<WriteOutcome, StoreError> {
        self.check(&record.username)?;
        self.inner.upsert(kind, record, mode)
    }

    fn register_participant(&self, username: &str) -> Result<(), StoreError> {
        self.inner.register_participant(username)
    }

    fn records_for(&self, kind: SeriesKind, username: &str) -> Result<Vec<StoredRecord>, StoreError> {
        self.inner.records_for(kind, username)
    }
}

#[test]
fn test_steps_higher_reading_wins() {
    let store = MemoryRecordStore::new();
    let settings = default_thresholds();

    let first = steps_batch(
        r#"{ "username": "u1", "timestamp": "2025-12-01T10:15:00Z", "steps": "1000" }"#,
        &store,
        &settings,
    );
    assert_eq!(first.status, 201);
    assert_eq!(success(&first), ("Steps data processed successfully.".to_string(), 1));

    let second = steps_batch(
        r#"{ "username": "u1", "timestamp": "2025-12-01T10:40:00Z", "steps": "800" }"#,
        &store,
        &settings,
    );
    assert_eq!(second.status, 200);
    assert_eq!(rows(&store, SeriesKind::Steps, "u1"), vec![(0, 1000, 5)]);

    let third = steps_batch(
        r#"{ "username": "u1", "timestamp": "2025-12-01T10:05:00Z", "steps": 1400 }"#,
        &store,
        &settings,
    );
    assert_eq!(third.status, 201);
    assert_eq!(rows(&store, SeriesKind::Steps, "u1"), vec![(0, 1400, 7)]);
}

#[test]
fn test_heart_rate_resubmission_is_idempotent() {
    let store = MemoryRecordStore::new();
    let body = r#"{
        "username": "testuser_jest",
        "timestamp": "2025-12-01T10:00:00Z\n2025-12-01T10:01:00Z",
        "bpm": "160\n170"
    }"#;

    let first = heart_rate_batch(body, &store, &default_thresholds());
    let snapshot = rows(&store, SeriesKind::HeartRate, "testuser_jest");
    let second = heart_rate_batch(body, &store, &default_thresholds());

    assert_eq!(first.status, 201);
    assert_eq!(success(&first), ("Heart rate data saved successfully.".to_string(), 2));
    assert_eq!(second.status, 200);
    assert_eq!(success(&second).1, 2);
    assert_eq!(snapshot, vec![(0, 160, 2), (1, 170, 3)]);
    assert_eq!(rows(&store, SeriesKind::HeartRate, "testuser_jest"), snapshot);
}

#[test]
fn test_failed_user_does_not_abort_batch() {
    let store = FlakyStore::new("b");
    let body = r#"[
        { "username": "a", "timestamp": "2025-12-01T10:00:00Z", "bpm": 130 },
        { "username": "b", "timestamp": "2025-12-01T10:00:00Z", "bpm": 140 },
        { "username": "a", "timestamp": "2025-12-01T10:01:00Z", "bpm": 170 }
    ]"#;

    let response = heart_rate_batch(body, &store, &default_thresholds());
    assert_eq!(response.status, 201);

    let results = match &response.body {
        ResponseBody::Success {
            results: Some(results),
            records_processed,
            ..
        } => {
            assert_eq!(*records_processed, 2);
            results.clone()
        }
        other => panic!("expected per-entry results, got {other:?}"),
    };

    let statuses: Vec<(String, EntryStatus)> = results
        .iter()
        .map(|r| (r.username.clone(), r.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("a".to_string(), EntryStatus::Inserted),
            ("a".to_string(), EntryStatus::Inserted),
            ("b".to_string(), EntryStatus::Failed),
        ]
    );
    assert!(results[2].details.as_deref().unwrap().contains("connection reset"));
    assert_eq!(store.inner.len(SeriesKind::HeartRate).unwrap(), 2);
}

#[test]
fn test_single_user_failure_is_server_error() {
    let store = FlakyStore::new("u1");
    let body = r#"{ "username": "u1", "timestamp": "2025-12-01T10:00:00Z", "steps": "900" }"#;

    let response = steps_batch(body, &store, &default_thresholds());

    assert_eq!(response.status, 500);
    match response.body {
        ResponseBody::Failure { error, details } => {
            assert_eq!(error, "Failed to process steps data");
            assert!(details.unwrap().contains("connection reset"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_long_gap_is_not_interpolated() {
    let store = MemoryRecordStore::new();
    let body = r#"{
        "username": "u1",
        "timestamp": "2025-12-01T10:00:00Z\n2025-12-01T10:13:00Z",
        "bpm": "115\n151"
    }"#;

    let response = heart_rate_batch(body, &store, &default_thresholds());

    assert_eq!(success(&response).1, 2);
    assert_eq!(rows(&store, SeriesKind::HeartRate, "u1"), vec![(0, 115, 0), (13, 151, 2)]);
}

#[test]
fn test_short_gap_is_interpolated() {
    let store = MemoryRecordStore::new();
    let body = r#"[
        { "username": "u1", "timestamp": "2025-12-01T10:00:00Z", "bpm": 100 },
        { "username": "u1", "timestamp": "2025-12-01T10:02:00Z", "bpm": 140 }
    ]"#;

    let response = heart_rate_batch(body, &store, &default_thresholds());

    assert_eq!(response.status, 201);
    assert_eq!(success(&response).1, 3);
    assert_eq!(
        rows(&store, SeriesKind::HeartRate, "u1"),
        vec![(0, 100, 0), (1, 120, 0), (2, 140, 1)]
    );
}

#[test]
fn test_extreme_bpm_is_interpolated_without_overflow() {
    let store = MemoryRecordStore::new();
    let body = r#"{
        "username": "u1",
        "timestamp": "2025-12-01T10:00:00Z\n2025-12-01T10:02:00Z",
        "bpm": "-9223372036854775808\n100"
    }"#;

    let response = heart_rate_batch(body, &store, &default_thresholds());

    assert_eq!(response.status, 201);
    let stored = rows(&store, SeriesKind::HeartRate, "u1");
    assert_eq!(stored.len(), 3);
    assert!(stored[1].1 > i64::MIN && stored[1].1 < 100);
    assert_eq!(stored[1].2, 0);
}

#[test]
fn test_heart_rate_change_is_reported_per_entry() {
    let store = MemoryRecordStore::new();
    let first = r#"[
        { "username": "a", "timestamp": "2025-12-01T10:00:00Z", "bpm": 130 },
        { "username": "b", "timestamp": "2025-12-01T10:00:00Z", "bpm": 140 }
    ]"#;
    let second = r#"[
        { "username": "a", "timestamp": "2025-12-01T10:00:10Z", "bpm": 130 },
        { "username": "b", "timestamp": "2025-12-01T10:00:20Z", "bpm": 170 }
    ]"#;

    heart_rate_batch(first, &store, &default_thresholds());
    let response = heart_rate_batch(second, &store, &default_thresholds());

    assert_eq!(response.status, 201);
    let statuses: Vec<EntryStatus> = match &response.body {
        ResponseBody::Success {
            results: Some(results),
            ..
        } => results.iter().map(|r| r.status).collect(),
        other => panic!("expected per-entry results, got {other:?}"),
    };
    assert_eq!(statuses, vec![EntryStatus::Dropped, EntryStatus::Updated]);
    assert_eq!(rows(&store, SeriesKind::HeartRate, "b"), vec![(0, 170, 3)]);
}

#[test]
fn test_custom_gap_limit() {
    let store = MemoryRecordStore::new();
    let processor = PointsProcessor::with_config(PipelineConfig::default().with_max_gap(1));
    let body = r#"{
        "username": "u1",
        "timestamp": "2025-12-01T10:00:00Z\n2025-12-01T10:02:00Z",
        "bpm": "100\n140"
    }"#;

    processor.handle(SeriesKind::HeartRate, body, &store, &default_thresholds());

    assert_eq!(rows(&store, SeriesKind::HeartRate, "u1"), vec![(0, 100, 0), (2, 140, 1)]);
}

#[test]
fn test_samples_collapse_into_one_bucket() {
    let store = MemoryRecordStore::new();
    let body = r#"{
        "username": "u1",
        "timestamp": "2025-12-01T10:05:00Z\n2025-12-01T10:35:00+00:00\n2025-12-01T12:50:00+01:00\n",
        "steps": "300\n150\n100\n"
    }"#;

    let response = steps_batch(body, &store, &default_thresholds());

    assert_eq!(success(&response).1, 2);
    assert_eq!(
        rows(&store, SeriesKind::Steps, "u1"),
        vec![(0, 450, 2), (60, 100, 0)]
    );
}

#[test]
fn test_mismatched_lists_are_rejected() {
    let store = MemoryRecordStore::new();
    let body = r#"{
        "username": "u1",
        "timestamp": "2025-12-01T10:05:00Z\n2025-12-01T11:05:00Z",
        "steps": "300"
    }"#;

    let response = steps_batch(body, &store, &default_thresholds());

    assert_eq!(response.status, 400);
    match response.body {
        ResponseBody::Failure { error, details } => {
            assert_eq!(error, "Invalid request data");
            assert!(details
                .unwrap()
                .starts_with("Timestamp and Steps arrays must have the same length after parsing."));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(store.participants().unwrap().is_empty());
}

#[test]
fn test_non_numeric_steps_are_rejected() {
    let store = MemoryRecordStore::new();
    let body = r#"{ "username": "u1", "timestamp": "2025-12-01T10:05:00Z", "steps": "lots" }"#;

    let response = steps_batch(body, &store, &default_thresholds());

    assert_eq!(response.status, 400);
    match response.body {
        ResponseBody::Failure { details, .. } => {
            assert!(details
                .unwrap()
                .contains("One or more steps values are not valid numbers"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn test_state_survives_snapshot_files() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.json");
    let settings_path = dir.path().join("settings.json");
    fs::write(&settings_path, r#"{ "z1": "100", "z2": "120", "z3": "140" }"#).unwrap();

    let settings = StaticSettings::from_json(&fs::read_to_string(&settings_path).unwrap()).unwrap();

    let store = MemoryRecordStore::new();
    heart_rate_batch(
        r#"{ "username": "u1", "timestamp": "2025-12-01T10:00:30Z", "bpm": "121" }"#,
        &store,
        &settings,
    );
    steps_batch(
        r#"{ "username": "u1", "timestamp": "2025-12-01T10:00:30Z", "steps": "1000" }"#,
        &store,
        &settings,
    );
    fs::write(&store_path, store.to_json().unwrap()).unwrap();

    let reloaded = MemoryRecordStore::from_json(&fs::read_to_string(&store_path).unwrap()).unwrap();
    let response = steps_batch(
        r#"{ "username": "u1", "timestamp": "2025-12-01T10:20:00Z", "steps": "800" }"#,
        &reloaded,
        &settings,
    );

    assert_eq!(response.status, 200);
    assert_eq!(rows(&reloaded, SeriesKind::HeartRate, "u1"), vec![(0, 121, 2)]);
    assert_eq!(rows(&reloaded, SeriesKind::Steps, "u1"), vec![(0, 1000, 5)]);
    assert_eq!(reloaded.participants().unwrap(), vec!["u1".to_string()]);
}

#[test]
fn test_history_is_newest_first() {
    let store = MemoryRecordStore::new();
    let body = r#"[
        { "username": "u1", "timestamp": "2025-12-01T10:00:00Z", "steps": 200 },
        { "username": "u1", "timestamp": "2025-12-01T12:00:00Z", "steps": 600 },
        { "username": "u2", "timestamp": "2025-12-01T11:00:00Z", "steps": 999 }
    ]"#;

    let response = steps_batch(body, &store, &default_thresholds());
    assert_eq!(response.status, 201);

    let history = store.records_for(SeriesKind::Steps, "u1").unwrap();
    let timestamps: Vec<DateTime<Utc>> = history.iter().map(|r| r.timestamp).collect();
    assert_eq!(timestamps, vec![t0() + Duration::hours(2), t0()]);
}
