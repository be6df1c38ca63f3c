use chrono::{DateTime, Utc};

use super::LayeredCandidate;
use crate::utils::time_decay_score;

/// Freshness Layer - half-life decay from creation time (layer 4)
pub struct FreshnessLayer {
    half_life_days: u32,
}

impl FreshnessLayer {
    pub fn new(half_life_days: u32) -> Self {
        Self { half_life_days }
    }

    pub fn apply(&self, candidates: &mut [LayeredCandidate], now: DateTime<Utc>) {
        for candidate in candidates.iter_mut() {
            candidate.breakdown.freshness = time_decay_score(
                candidate.activity.reference_time(),
                now,
                100.0,
                self.half_life_days,
            );
        }
    }
}
