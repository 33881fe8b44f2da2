//! Pipeline orchestration
//!
//! This module provides the public API for FitBank points ingestion.
//! It orchestrates a batch from request body to persisted rows:
//! validate → bucket → aggregate → interpolate (heart rate) → score →
//! reconcile → persist.
//!
//! Users are processed independently: a read or write failure for one user is
//! recorded against that user's entries and the rest of the batch proceeds.

use crate::aggregator::BucketAggregator;
use crate::bucketer::bucket_samples;
use crate::config::PipelineConfig;
use crate::error::{IngestError, StoreError};
use crate::interpolator::{GapInterpolator, SegmentBoundary};
use crate::reconciler::{PlannedWrite, Reconciler};
use crate::schema::PayloadAdapter;
use crate::scorer::Scorer;
use crate::settings::{resolve_thresholds, SettingsStore};
use crate::store::RecordStore;
use crate::types::{
    AggregatedBucket, BatchResponse, EntryResult, EntryStatus, PointOrigin, RawSample,
    ResponseBody, SeriesKind, SeriesPoint, WriteOutcome,
};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Ingest a heart-rate request body with default configuration.
///
/// # Example
/// ```ignore
/// let response = heart_rate_batch(body, &store, &settings);
/// assert_eq!(response.status, 201);
/// ```
pub fn heart_rate_batch(
    body: &str,
    store: &dyn RecordStore,
    settings: &dyn SettingsStore,
) -> BatchResponse {
    PointsProcessor::new().handle(SeriesKind::HeartRate, body, store, settings)
}

/// Ingest a steps request body with default configuration.
pub fn steps_batch(body: &str, store: &dyn RecordStore, settings: &dyn SettingsStore) -> BatchResponse {
    PointsProcessor::new().handle(SeriesKind::Steps, body, store, settings)
}

/// One user's normalized and scored timeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedSeries {
    pub buckets: Vec<AggregatedBucket>,
    /// Heart-rate gaps left unfilled; always empty for steps
    pub boundaries: Vec<SegmentBoundary>,
}

/// Processor holding the pipeline policy for a sequence of batches
pub struct PointsProcessor {
    config: PipelineConfig,
    interpolator: GapInterpolator,
}

impl Default for PointsProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PointsProcessor {
    /// Create a processor with default settings
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            interpolator: GapInterpolator::new(config.max_interpolation_gap_minutes),
            config,
        }
    }

    /// Load the processor configuration from JSON
    pub fn from_config_json(json: &str) -> Result<Self, IngestError> {
        let config = PipelineConfig::from_json(json).map_err(|e| IngestError::Config(e.to_string()))?;
        Ok(Self::with_config(config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate and ingest a raw request body
    pub fn handle(
        &self,
        kind: SeriesKind,
        body: &str,
        store: &dyn RecordStore,
        settings: &dyn SettingsStore,
    ) -> BatchResponse {
        match PayloadAdapter::parse(body, kind) {
            Ok(samples) => self.ingest(kind, samples, store, settings),
            Err(e) => rejection(e),
        }
    }

    /// Ingest samples that already passed validation
    pub fn ingest(
        &self,
        kind: SeriesKind,
        samples: Vec<RawSample>,
        store: &dyn RecordStore,
        settings: &dyn SettingsStore,
    ) -> BatchResponse {
        let batch_id = Uuid::new_v4().to_string();
        let scorer = Scorer::new(resolve_thresholds(settings).thresholds);

        let by_user = group_by_user(samples);
        let user_count = by_user.len();
        let mut entries = Vec::new();

        for (username, user_samples) in &by_user {
            let series = self.normalize_user(kind, username, user_samples, &scorer);
            entries.extend(self.persist_user(kind, username, series.buckets, store));
        }

        let summary = summarize(&entries);
        log::info!(
            "batch {}: {} {} user(s), {} inserted, {} updated, {} dropped, {} failed",
            batch_id,
            kind.as_str(),
            user_count,
            summary.inserted,
            summary.updated,
            summary.dropped,
            summary.failed
        );

        if summary.failed > 0 && user_count == 1 {
            let details = entries
                .iter()
                .find_map(|entry| entry.details.clone())
                .unwrap_or_else(|| "Unknown error".to_string());
            return BatchResponse::failure(
                500,
                format!("Failed to process {} data", kind.label().to_lowercase()),
                Some(details),
            );
        }

        let status = if summary.inserted + summary.updated > 0 { 201 } else { 200 };

        BatchResponse {
            status,
            body: ResponseBody::Success {
                message: kind.success_message().to_string(),
                records_processed: summary.inserted + summary.updated + summary.dropped,
                batch_id,
                results: (user_count > 1).then_some(entries),
            },
        }
    }

    /// Run the pure stages for every user in `samples`
    pub fn normalize(
        &self,
        kind: SeriesKind,
        samples: Vec<RawSample>,
        scorer: &Scorer,
    ) -> BTreeMap<String, NormalizedSeries> {
        group_by_user(samples)
            .into_iter()
            .map(|(username, user_samples)| {
                let series = self.normalize_user(kind, &username, &user_samples, scorer);
                (username, series)
            })
            .collect()
    }

    /// Bucket, aggregate, interpolate and score one user's samples
    pub fn normalize_user(
        &self,
        kind: SeriesKind,
        username: &str,
        samples: &[RawSample],
        scorer: &Scorer,
    ) -> NormalizedSeries {
        let buckets = BucketAggregator::aggregate(&bucket_samples(samples, kind), kind);

        let (points, boundaries) = match kind {
            SeriesKind::HeartRate => {
                for bucket in buckets.iter().filter(|b| !self.config.is_plausible_bpm(b.value)) {
                    log::debug!(
                        "{}: implausible bpm {} at {} scored as submitted",
                        username,
                        bucket.value,
                        bucket.bucket_start
                    );
                }
                let series = self.interpolator.interpolate(&buckets);
                (series.points, series.boundaries)
            }
            SeriesKind::Steps => (
                buckets
                    .iter()
                    .map(|b| SeriesPoint::observed(b.bucket_start, b.value))
                    .collect(),
                Vec::new(),
            ),
        };

        NormalizedSeries {
            buckets: scorer.score_series(kind, username, &points),
            boundaries,
        }
    }

    /// Reconcile and write one user's buckets, isolating failures to this user
    fn persist_user(
        &self,
        kind: SeriesKind,
        username: &str,
        buckets: Vec<AggregatedBucket>,
        store: &dyn RecordStore,
    ) -> Vec<EntryResult> {
        let plan = match self.plan_user(kind, username, buckets.clone(), store) {
            Ok(plan) => plan,
            Err(e) => {
                log::error!("{}: {} batch failed before writing: {}", username, kind.as_str(), e);
                let details = e.to_string();
                return buckets
                    .iter()
                    .map(|bucket| failed_entry(kind, bucket, &details))
                    .collect();
            }
        };

        let mut entries: Vec<EntryResult> = plan
            .writes
            .iter()
            .map(|write| execute(kind, write, store))
            .collect();
        entries.extend(plan.stale.iter().map(|bucket| stale_entry(kind, bucket)));
        entries.sort_by_key(|entry| entry.timestamp);
        entries
    }

    fn plan_user(
        &self,
        kind: SeriesKind,
        username: &str,
        buckets: Vec<AggregatedBucket>,
        store: &dyn RecordStore,
    ) -> Result<UserPlan, StoreError> {
        store.register_participant(username)?;

        let (buckets, stale) = if self.config.watermark_prefilter {
            let watermark = store.latest_timestamp(kind, username)?;
            let (kept, stale) = Reconciler::apply_watermark(buckets, watermark);
            if !stale.is_empty() {
                log::debug!(
                    "{}: {} bucket(s) older than watermark skipped",
                    username,
                    stale.len()
                );
            }
            (kept, stale)
        } else {
            (buckets, Vec::new())
        };

        let mut existing = BTreeMap::new();
        for bucket in &buckets {
            if let Some(row) = store.get(kind, &bucket.key())? {
                existing.insert(bucket.bucket_start, row);
            }
        }

        Ok(UserPlan {
            writes: Reconciler::plan(kind, buckets, &existing),
            stale,
        })
    }
}

/// Reconciliation result for one user
struct UserPlan {
    writes: Vec<PlannedWrite>,
    /// Buckets older than the user's watermark, never sent to the store
    stale: Vec<AggregatedBucket>,
}

/// Apply one planned write; a store error fails only this entry
fn execute(kind: SeriesKind, write: &PlannedWrite, store: &dyn RecordStore) -> EntryResult {
    if !write.action.writes() {
        return entry(kind, &write.bucket, EntryStatus::Dropped, None);
    }

    match store.upsert(kind, &write.to_record(), kind.write_mode()) {
        Ok(WriteOutcome::Inserted) => entry(kind, &write.bucket, EntryStatus::Inserted, None),
        Ok(WriteOutcome::Updated) => entry(kind, &write.bucket, EntryStatus::Updated, None),
        Ok(WriteOutcome::Unchanged) => entry(kind, &write.bucket, EntryStatus::Dropped, None),
        Err(e) => {
            log::error!(
                "{}: write of {} bucket {} failed: {}",
                write.bucket.username,
                kind.as_str(),
                write.bucket.bucket_start,
                e
            );
            failed_entry(kind, &write.bucket, &e.to_string())
        }
    }
}

fn rejection(error: IngestError) -> BatchResponse {
    match error {
        IngestError::MalformedPayload(details) => {
            BatchResponse::failure(400, "Malformed JSON payload", Some(details))
        }
        IngestError::Validation(e) => {
            BatchResponse::failure(400, "Invalid request data", Some(e.to_string()))
        }
        other => BatchResponse::failure(500, "Failed to process request", Some(other.to_string())),
    }
}

fn group_by_user(samples: Vec<RawSample>) -> BTreeMap<String, Vec<RawSample>> {
    let mut by_user: BTreeMap<String, Vec<RawSample>> = BTreeMap::new();
    for sample in samples {
        by_user.entry(sample.username.clone()).or_default().push(sample);
    }
    by_user
}

fn entry_message(kind: SeriesKind, status: EntryStatus) -> String {
    match (kind, status) {
        (_, EntryStatus::Inserted) => format!("{} data inserted successfully.", kind.label()),
        (SeriesKind::Steps, EntryStatus::Updated) => {
            "Steps data updated successfully (higher reading).".to_string()
        }
        (SeriesKind::HeartRate, EntryStatus::Updated) => {
            "Heart rate data replaced for this minute.".to_string()
        }
        (SeriesKind::Steps, EntryStatus::Dropped) => {
            "Steps data dropped (lower or equal reading).".to_string()
        }
        (SeriesKind::HeartRate, EntryStatus::Dropped) => {
            "Heart rate data unchanged (same reading).".to_string()
        }
        (SeriesKind::Steps, EntryStatus::Failed) => {
            "Failed to process individual step entry.".to_string()
        }
        (SeriesKind::HeartRate, EntryStatus::Failed) => {
            "Failed to process individual heart rate entry.".to_string()
        }
    }
}

fn entry(
    kind: SeriesKind,
    bucket: &AggregatedBucket,
    status: EntryStatus,
    details: Option<String>,
) -> EntryResult {
    let mut message = entry_message(kind, status);
    if bucket.origin == PointOrigin::Interpolated && status != EntryStatus::Failed {
        message.push_str(" (interpolated)");
    }
    EntryResult {
        status,
        message,
        username: bucket.username.clone(),
        timestamp: bucket.bucket_start,
        value: bucket.value,
        points: bucket.points,
        details,
    }
}

fn failed_entry(kind: SeriesKind, bucket: &AggregatedBucket, details: &str) -> EntryResult {
    entry(kind, bucket, EntryStatus::Failed, Some(details.to_string()))
}

fn stale_entry(kind: SeriesKind, bucket: &AggregatedBucket) -> EntryResult {
    EntryResult {
        message: format!("{} data dropped (older than latest stored reading).", kind.label()),
        ..entry(
            kind,
            bucket,
            EntryStatus::Dropped,
            Some("bucket precedes the latest stored bucket".to_string()),
        )
    }
}

#[derive(Debug, Default)]
struct BatchSummary {
    inserted: usize,
    updated: usize,
    dropped: usize,
    failed: usize,
}

fn summarize(entries: &[EntryResult]) -> BatchSummary {
    entries
        .iter()
        .fold(BatchSummary::default(), |mut summary, entry| {
            match entry.status {
                EntryStatus::Inserted => summary.inserted += 1,
                EntryStatus::Updated => summary.updated += 1,
                EntryStatus::Dropped => summary.dropped += 1,
                EntryStatus::Failed => summary.failed += 1,
            }
            summary
        })
}
