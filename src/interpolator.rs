//! Gap interpolation for heart-rate timelines
//!
//! Wearables report at irregular intervals. Scoring is defined per minute, so
//! short gaps between two observed minutes are filled by linear interpolation.
//! A gap longer than the configured maximum is treated as a device dropout:
//! nothing is synthesized and a [`SegmentBoundary`] records the decision.

use crate::types::{BucketValue, PointOrigin, SeriesPoint};
use chrono::{DateTime, Duration, Utc};

/// Longest gap, in minutes, that is still bridged by interpolation
pub const MAX_INTERPOLATION_GAP_MINUTES: i64 = 5;

/// A gap that was deliberately left unfilled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentBoundary {
    /// Last observed bucket of the earlier segment
    pub after: DateTime<Utc>,
    /// First observed bucket of the next segment
    pub before: DateTime<Utc>,
    pub gap_minutes: i64,
}

/// One user's per-minute timeline after interpolation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpolatedSeries {
    /// Observed and synthetic points in ascending time order
    pub points: Vec<SeriesPoint>,
    /// Gaps that exceeded the maximum and were left empty
    pub boundaries: Vec<SegmentBoundary>,
}

impl InterpolatedSeries {
    /// Number of synthesized points
    pub fn synthetic_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.origin == PointOrigin::Interpolated)
            .count()
    }
}

/// Linear gap filler with a maximum-gap cutoff
#[derive(Debug, Clone, Copy)]
pub struct GapInterpolator {
    max_gap_minutes: i64,
}

impl Default for GapInterpolator {
    fn default() -> Self {
        Self::new(MAX_INTERPOLATION_GAP_MINUTES)
    }
}

impl GapInterpolator {
    pub fn new(max_gap_minutes: i64) -> Self {
        Self { max_gap_minutes }
    }

    pub fn max_gap_minutes(&self) -> i64 {
        self.max_gap_minutes
    }

    /// Fill whole-minute gaps between consecutive observed buckets.
    ///
    /// Buckets sharing a start keep the first value only.
    pub fn interpolate(&self, buckets: &[BucketValue]) -> InterpolatedSeries {
        let mut ordered: Vec<&BucketValue> = buckets.iter().collect();
        ordered.sort_by_key(|b| b.bucket_start);

        let mut series = InterpolatedSeries::default();
        let mut previous: Option<&BucketValue> = None;

        for current in ordered {
            if let Some(prev) = previous {
                let gap_minutes = (current.bucket_start - prev.bucket_start).num_minutes();

                if gap_minutes <= 0 {
                    continue;
                }

                if gap_minutes > self.max_gap_minutes && gap_minutes > 1 {
                    log::debug!(
                        "segment boundary: {} minute gap between {} and {} left unfilled",
                        gap_minutes,
                        prev.bucket_start,
                        current.bucket_start
                    );
                    series.boundaries.push(SegmentBoundary {
                        after: prev.bucket_start,
                        before: current.bucket_start,
                        gap_minutes,
                    });
                } else {
                    for offset in 1..gap_minutes {
                        let minute = prev.bucket_start + Duration::minutes(offset);
                        series
                            .points
                            .push(SeriesPoint::interpolated(minute, linear(prev, current, minute)));
                    }
                }
            }

            series
                .points
                .push(SeriesPoint::observed(current.bucket_start, current.value));
            previous = Some(current);
        }

        series
    }
}

/// Linear estimate at `at` between two observed buckets, rounded
fn linear(prev: &BucketValue, next: &BucketValue, at: DateTime<Utc>) -> i64 {
    let span = (next.bucket_start - prev.bucket_start).num_seconds() as f64;
    if span <= 0.0 {
        return prev.value;
    }
    let factor = ((at - prev.bucket_start).num_seconds() as f64 / span).clamp(0.0, 1.0);
    let delta = next.value as f64 - prev.value as f64;
    (prev.value as f64 + factor * delta).round() as i64
}
