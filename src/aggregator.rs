//! Bucket aggregation
//!
//! Collapses every raw reading that landed in the same bucket into one value:
//! the rounded mean for heart rate, the sum for steps. The bucket start is the
//! canonical key of the result; original sample instants are not retained.

use crate::types::{BucketValue, SeriesKind};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Aggregator for one user's bucketed readings
pub struct BucketAggregator;

impl BucketAggregator {
    /// Aggregate `(bucket_start, value)` pairs, returning buckets in time order
    pub fn aggregate(pairs: &[(DateTime<Utc>, i64)], kind: SeriesKind) -> Vec<BucketValue> {
        let mut by_bucket: BTreeMap<DateTime<Utc>, Vec<i64>> = BTreeMap::new();
        for (bucket_start, value) in pairs {
            by_bucket.entry(*bucket_start).or_default().push(*value);
        }

        by_bucket
            .into_iter()
            .map(|(bucket_start, values)| BucketValue {
                bucket_start,
                value: match kind {
                    SeriesKind::HeartRate => rounded_mean(&values),
                    SeriesKind::Steps => saturating_sum(&values),
                },
                sample_count: values.len(),
            })
            .collect()
    }
}

/// Mean rounded half away from zero
fn rounded_mean(values: &[i64]) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let sum: i128 = values.iter().map(|v| i128::from(*v)).sum();
    let mean = sum as f64 / values.len() as f64;
    mean.round() as i64
}

fn saturating_sum(values: &[i64]) -> i64 {
    values.iter().fold(0i64, |acc, v| acc.saturating_add(*v))
}
