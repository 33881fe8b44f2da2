//! Time bucketing
//!
//! Aligns an instant to the start of its bucket: truncate-to-minute for heart
//! rate, truncate-to-hour for steps. Truncation happens on the UTC timeline.

use crate::types::{RawSample, SeriesKind};
use chrono::{DateTime, Duration, Utc};

/// Start of the bucket containing `timestamp`
pub fn bucket_start(timestamp: DateTime<Utc>, kind: SeriesKind) -> DateTime<Utc> {
    truncate(timestamp, kind.bucket_width())
}

/// Truncate an instant down to a multiple of `width` since the epoch
fn truncate(timestamp: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    let width_secs = width.num_seconds().max(1);
    let overshoot_secs = timestamp.timestamp().rem_euclid(width_secs);
    let subsec = Duration::nanoseconds(i64::from(timestamp.timestamp_subsec_nanos()));
    timestamp - Duration::seconds(overshoot_secs) - subsec
}

/// Pair every sample with its bucket start, keeping the reading
pub fn bucket_samples(samples: &[RawSample], kind: SeriesKind) -> Vec<(DateTime<Utc>, i64)> {
    samples
        .iter()
        .map(|sample| (bucket_start(sample.timestamp, kind), sample.value))
        .collect()
}
