use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::config::RecommendationConfig;
use crate::models::{ActivityId, ActivityStatus, ScoredActivity};
use crate::utils::round_to;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostProcessConfig {
    /// Multiplier per matching viewed/registered flag; two matches stack
    pub penalty_factor: f64,
    /// Relative noise amplitude; 0 disables shuffling
    pub noise_factor: f64,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            penalty_factor: 0.7,
            noise_factor: 0.08,
        }
    }
}

impl From<&RecommendationConfig> for PostProcessConfig {
    fn from(config: &RecommendationConfig) -> Self {
        Self {
            penalty_factor: config.penalty_factor,
            noise_factor: config.noise_factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostProcessFlags {
    pub exclude_viewed: bool,
    pub exclude_registered: bool,
    pub exclude_ended: bool,
}

impl Default for PostProcessFlags {
    fn default() -> Self {
        Self {
            exclude_viewed: true,
            exclude_registered: true,
            exclude_ended: true,
        }
    }
}

/// Post-processing - demotion, ended filter and diversity noise
///
/// Viewed/registered items are demoted rather than removed so a short
/// catalogue still yields a full list.
pub struct RecommendationPostProcessor {
    config: PostProcessConfig,
}

impl RecommendationPostProcessor {
    pub fn new(config: PostProcessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PostProcessConfig {
        &self.config
    }

    pub fn process<R: Rng + ?Sized>(
        &self,
        items: Vec<ScoredActivity>,
        viewed: &HashSet<ActivityId>,
        registered: &HashSet<ActivityId>,
        flags: &PostProcessFlags,
        count: usize,
        rng: &mut R,
    ) -> Vec<ScoredActivity> {
        let input_count = items.len();

        let mut processed = self.apply_penalties(items, viewed, registered, flags);
        sort_by_score(&mut processed);

        self.inject_noise(&mut processed, rng);
        sort_by_score(&mut processed);
        processed.truncate(count);

        debug!(
            input_count,
            output_count = processed.len(),
            "Post-processing completed"
        );
        processed
    }

    /// Drop ended activities and demote already-seen ones
    pub fn apply_penalties(
        &self,
        items: Vec<ScoredActivity>,
        viewed: &HashSet<ActivityId>,
        registered: &HashSet<ActivityId>,
        flags: &PostProcessFlags,
    ) -> Vec<ScoredActivity> {
        items
            .into_iter()
            .filter(|item| !(flags.exclude_ended && item.activity.status == ActivityStatus::Ended))
            .map(|mut item| {
                let id = item.activity.activity_id;
                if flags.exclude_viewed && viewed.contains(&id) {
                    item.composite_score *= self.config.penalty_factor;
                }
                if flags.exclude_registered && registered.contains(&id) {
                    item.composite_score *= self.config.penalty_factor;
                }
                item
            })
            .collect()
    }

    /// Perturb each score by up to `noise_factor` of itself, clamped at zero
    pub fn inject_noise<R: Rng + ?Sized>(&self, items: &mut [ScoredActivity], rng: &mut R) {
        let amplitude = self.config.noise_factor;
        if amplitude <= 0.0 {
            return;
        }

        for item in items.iter_mut() {
            let noise = rng.gen_range(-amplitude..=amplitude) * item.composite_score;
            item.composite_score = round_to((item.composite_score + noise).max(0.0), 2);
        }
    }
}

fn sort_by_score(items: &mut [ScoredActivity]) {
    items.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityCandidate, ScoreBreakdown, TargetAudience};
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn item(id: ActivityId, score: f64, status: ActivityStatus) -> ScoredActivity {
        let now = Utc::now();
        ScoredActivity {
            activity: ActivityCandidate {
                activity_id: id,
                title: String::new(),
                description: String::new(),
                location: String::new(),
                cover_image: String::new(),
                created_at: None,
                start_time: now,
                end_time: now,
                max_participants: 0,
                current_participants: 0,
                tags: Default::default(),
                target_audience: TargetAudience::default(),
                views_count: 0,
                status,
                is_deleted: false,
            },
            breakdown: ScoreBreakdown::default(),
            composite_score: score,
            reasons: Vec::new(),
        }
    }

    fn ids(items: &[ScoredActivity]) -> Vec<ActivityId> {
        items.iter().map(|i| i.activity.activity_id).collect()
    }

    #[test]
    fn test_penalties_stack() {
        let processor = RecommendationPostProcessor::new(PostProcessConfig::default());
        let both: HashSet<ActivityId> = [1].into_iter().collect();

        let out = processor.apply_penalties(
            vec![item(1, 100.0, ActivityStatus::Published)],
            &both,
            &both,
            &PostProcessFlags::default(),
        );
        assert!((out[0].composite_score - 49.0).abs() < 1e-9);
    }

    #[test]
    fn test_flags_off_leave_scores() {
        let processor = RecommendationPostProcessor::new(PostProcessConfig::default());
        let seen: HashSet<ActivityId> = [1].into_iter().collect();
        let flags = PostProcessFlags {
            exclude_viewed: false,
            exclude_registered: false,
            exclude_ended: false,
        };

        let out = processor.apply_penalties(
            vec![
                item(1, 80.0, ActivityStatus::Published),
                item(2, 60.0, ActivityStatus::Ended),
            ],
            &seen,
            &seen,
            &flags,
        );
        assert_eq!(ids(&out), vec![1, 2]);
        assert_eq!(out[0].composite_score, 80.0);
    }

    #[test]
    fn test_ended_removed_and_demoted_resorted() {
        let processor = RecommendationPostProcessor::new(PostProcessConfig {
            penalty_factor: 0.7,
            noise_factor: 0.0,
        });
        let viewed: HashSet<ActivityId> = [1].into_iter().collect();

        let out = processor.process(
            vec![
                item(1, 90.0, ActivityStatus::Published),
                item(2, 80.0, ActivityStatus::Ongoing),
                item(3, 95.0, ActivityStatus::Ended),
            ],
            &viewed,
            &HashSet::new(),
            &PostProcessFlags::default(),
            5,
            &mut StdRng::seed_from_u64(7),
        );
        // 90 * 0.7 = 63 falls below 80
        assert_eq!(ids(&out), vec![2, 1]);
    }

    #[test]
    fn test_noise_is_bounded_and_truncates() {
        let processor = RecommendationPostProcessor::new(PostProcessConfig::default());
        let mut rng = StdRng::seed_from_u64(42);
        let items: Vec<ScoredActivity> = (1..=10)
            .map(|id| item(id, 50.0, ActivityStatus::Published))
            .collect();

        let out = processor.process(
            items,
            &HashSet::new(),
            &HashSet::new(),
            &PostProcessFlags::default(),
            3,
            &mut rng,
        );

        assert_eq!(out.len(), 3);
        for window in out.windows(2) {
            assert!(window[0].composite_score >= window[1].composite_score);
        }
        for scored in &out {
            assert!(scored.composite_score >= 46.0 && scored.composite_score <= 54.0);
        }
    }

    #[test]
    fn test_noise_never_negative() {
        let processor = RecommendationPostProcessor::new(PostProcessConfig::default());
        let mut items = vec![item(1, 0.0, ActivityStatus::Published)];
        processor.inject_noise(&mut items, &mut StdRng::seed_from_u64(1));
        assert_eq!(items[0].composite_score, 0.0);
    }
}
