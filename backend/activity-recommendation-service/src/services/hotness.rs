use std::collections::HashMap;
use tracing::{debug, warn};

use super::LayeredCandidate;
use crate::metrics;
use crate::models::{ActivityId, EngagementStats};
use crate::utils::{hotness_score, normalize_score, HotnessWeights};

/// Hotness Layer - popularity from views, fill ratio and ratings (layer 2)
pub struct HotnessLayer;

impl HotnessLayer {
    pub fn new() -> Self {
        Self
    }

    /// Registrations over capacity; zero when capacity is unknown
    pub fn registration_ratio(registrations: i64, max_participants: i32) -> f64 {
        if max_participants <= 0 {
            return 0.0;
        }
        registrations.max(0) as f64 / f64::from(max_participants)
    }

    /// Fill in hotness and sort by it, descending. The sort is stable.
    pub fn rank(
        &self,
        candidates: Vec<LayeredCandidate>,
        stats: &HashMap<ActivityId, EngagementStats>,
        weights: &HotnessWeights,
    ) -> Vec<LayeredCandidate> {
        let mut ranked: Vec<LayeredCandidate> = candidates
            .into_iter()
            .filter_map(|mut candidate| {
                let s = stats
                    .get(&candidate.activity.activity_id)
                    .copied()
                    .unwrap_or_default();
                let ratio =
                    Self::registration_ratio(s.registrations, candidate.activity.max_participants);
                let hotness =
                    hotness_score(s.views, ratio, s.average_rating.unwrap_or(0.0), weights);

                if !hotness.is_finite() {
                    warn!(
                        activity_id = candidate.activity.activity_id,
                        "Non-finite hotness, skipping candidate"
                    );
                    metrics::record_skipped_candidate("hotness");
                    return None;
                }

                // Custom weights may push the blend past 100
                candidate.breakdown.hotness = normalize_score(hotness, 0.0, 100.0);
                Some(candidate)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.breakdown
                .hotness
                .partial_cmp(&a.breakdown.hotness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!(count = ranked.len(), "Hotness ranking completed");
        ranked
    }
}

impl Default for HotnessLayer {
    fn default() -> Self {
        Self::new()
    }
}
