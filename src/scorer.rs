//! Point scoring
//!
//! Heart rate earns 0-3 points per minute depending on the zone the BPM falls
//! in. Steps earn one point per 200 steps in an hour, floored.

use crate::types::{AggregatedBucket, SeriesKind, SeriesPoint, ZoneThresholds};

/// Steps needed for one point (a rate of 0.005 points per step)
pub const STEPS_PER_POINT: i64 = 200;

/// Points for one minute at `bpm`, given zone thresholds `z1 < z2 < z3`
pub fn score_heart_rate(bpm: i64, z1: i64, z2: i64, z3: i64) -> i64 {
    if bpm >= z3 {
        3
    } else if bpm >= z2 {
        2
    } else if bpm >= z1 {
        1
    } else {
        0
    }
}

/// Points for an hourly step count, `floor(steps * 0.005)`, never negative
pub fn score_steps(steps: i64) -> i64 {
    steps.max(0) / STEPS_PER_POINT
}

/// Scorer bound to the thresholds resolved for one batch
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    thresholds: ZoneThresholds,
}

impl Scorer {
    pub fn new(thresholds: ZoneThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> ZoneThresholds {
        self.thresholds
    }

    /// Points for a value of the given series
    pub fn points(&self, kind: SeriesKind, value: i64) -> i64 {
        match kind {
            SeriesKind::HeartRate => {
                let ZoneThresholds { z1, z2, z3 } = self.thresholds;
                score_heart_rate(value, z1, z2, z3)
            }
            SeriesKind::Steps => score_steps(value),
        }
    }

    /// Attach points to one user's timeline
    pub fn score_series(
        &self,
        kind: SeriesKind,
        username: &str,
        points: &[SeriesPoint],
    ) -> Vec<AggregatedBucket> {
        points
            .iter()
            .map(|point| AggregatedBucket {
                username: username.to_string(),
                bucket_start: point.bucket_start,
                value: point.value,
                points: self.points(kind, point.value),
                origin: point.origin,
            })
            .collect()
    }
}
