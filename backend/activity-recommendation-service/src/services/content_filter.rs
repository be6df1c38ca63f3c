// ============================================
// Content Filter Layer (layer 1)
// ============================================
//
// Scores each recommendable activity against the user profile:
// - tag/category overlap with hobbies (Jaccard)
// - grade targeting
// - how soon the activity starts
//
// Candidates under the match threshold are dropped. Activities the user has
// already viewed or registered for stay in, demoted by the repeat factor.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use super::LayeredCandidate;
use crate::metrics;
use crate::models::{ActivityCandidate, ActivityId, ScoreBreakdown, UserProfile};
use crate::utils::{
    grade_match_score, round_to, tag_match_score, time_proximity_score, weighted_fusion,
    ScoringError,
};

/// Sub-score weights for the content match
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentWeights {
    pub grade: f64,
    pub tags: f64,
    pub time: f64,
}

impl Default for ContentWeights {
    fn default() -> Self {
        Self {
            grade: 0.25,
            tags: 0.50,
            time: 0.25,
        }
    }
}

impl ContentWeights {
    fn to_map(self) -> HashMap<&'static str, f64> {
        [("grade", self.grade), ("tags", self.tags), ("time", self.time)]
            .into_iter()
            .collect()
    }
}

pub struct ContentFilterLayer {
    weights: ContentWeights,
    repeat_factor: f64,
    proximity_days_ahead: i64,
}

impl ContentFilterLayer {
    pub fn new(repeat_factor: f64, proximity_days_ahead: i64) -> Self {
        Self {
            weights: ContentWeights::default(),
            repeat_factor,
            proximity_days_ahead,
        }
    }

    /// Raw content match for one activity, before repeat demotion
    pub fn score(
        &self,
        activity: &ActivityCandidate,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<f64, ScoringError> {
        let tags = tag_match_score(&profile.hobby, &activity.tags, &activity.activity_classes());
        let grade = grade_match_score(
            profile.grade.as_deref(),
            &activity.target_audience.targeted_grades,
        );
        let time = time_proximity_score(activity.start_time, now, self.proximity_days_ahead);

        let scores: HashMap<&'static str, f64> = [("grade", grade), ("tags", tags), ("time", time)]
            .into_iter()
            .collect();
        let fused = weighted_fusion(&scores, &self.weights.to_map(), true);

        if !fused.is_finite() {
            return Err(ScoringError::NonFinite("content_match"));
        }
        if !(0.0..=100.0).contains(&fused) {
            warn!(
                activity_id = activity.activity_id,
                score = fused,
                "Content match out of range, clamping"
            );
        }
        Ok(fused.clamp(0.0, 100.0))
    }

    /// Score, threshold and demote. `threshold` is on a 0-1 scale.
    pub fn filter(
        &self,
        activities: Vec<ActivityCandidate>,
        profile: &UserProfile,
        engaged: &HashSet<ActivityId>,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Vec<LayeredCandidate> {
        let input_count = activities.len();
        let cutoff = threshold * 100.0;

        let survivors: Vec<LayeredCandidate> = activities
            .into_iter()
            .filter_map(|activity| {
                let score = match self.score(&activity, profile, now) {
                    Ok(score) => score,
                    Err(e) => {
                        warn!(
                            activity_id = activity.activity_id,
                            "Skipping candidate in content filter: {}", e
                        );
                        metrics::record_skipped_candidate("content_filter");
                        return None;
                    }
                };

                if score < cutoff {
                    return None;
                }

                let previously_engaged = engaged.contains(&activity.activity_id);
                let content_match = if previously_engaged {
                    round_to(score * self.repeat_factor, 2)
                } else {
                    score
                };

                Some(LayeredCandidate {
                    activity,
                    previously_engaged,
                    breakdown: ScoreBreakdown {
                        content_match,
                        ..Default::default()
                    },
                })
            })
            .collect();

        info!(
            user_id = profile.user_id,
            input_count,
            output_count = survivors.len(),
            "Content filter completed"
        );

        survivors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityStatus, TargetAudience};
    use chrono::Duration;

    fn profile(hobby: &[&str], grade: Option<&str>) -> UserProfile {
        UserProfile {
            user_id: 1,
            grade: grade.map(str::to_string),
            hobby: hobby.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn activity(id: i64, tags: &[&str], grades: &[&str], start: DateTime<Utc>) -> ActivityCandidate {
        ActivityCandidate {
            activity_id: id,
            title: format!("activity {}", id),
            description: String::new(),
            location: String::new(),
            cover_image: String::new(),
            created_at: None,
            start_time: start,
            end_time: start + Duration::hours(2),
            max_participants: 50,
            current_participants: 0,
            tags: tags.iter().map(|s| s.to_string()).collect(),
            target_audience: TargetAudience {
                targeted_grades: grades.iter().map(|s| s.to_string()).collect(),
                activity_classes: Vec::new(),
            },
            views_count: 0,
            status: ActivityStatus::Published,
            is_deleted: false,
        }
    }

    #[test]
    fn test_score_blends_sub_scores() {
        let now = Utc::now();
        let layer = ContentFilterLayer::new(0.5, 30);
        // tags 100, grade 100, starts in ~15 days -> time 50
        let a = activity(1, &["music"], &["Y1"], now + Duration::days(15) + Duration::hours(1));
        let score = layer.score(&a, &profile(&["music"], Some("Y1")), now).unwrap();
        assert_eq!(score, 87.5);
    }

    #[test]
    fn test_filter_drops_below_threshold() {
        let now = Utc::now();
        let layer = ContentFilterLayer::new(0.5, 30);
        // started already (time 0), no tag overlap (0), wrong grade (0)
        let miss = activity(1, &["sports"], &["Y2"], now - Duration::hours(1));
        let hit = activity(2, &["music"], &[], now + Duration::days(1));

        let out = layer.filter(
            vec![miss, hit],
            &profile(&["music"], Some("Y1")),
            &HashSet::new(),
            0.1,
            now,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].activity.activity_id, 2);
    }

    #[test]
    fn test_engaged_activity_is_demoted() {
        let now = Utc::now();
        let layer = ContentFilterLayer::new(0.5, 30);
        let a = activity(3, &["music"], &[], now + Duration::days(1));
        let user = profile(&["music"], None);
        let raw = layer.score(&a, &user, now).unwrap();

        let engaged: HashSet<ActivityId> = [3].into_iter().collect();
        let out = layer.filter(vec![a], &user, &engaged, 0.1, now);

        assert!(out[0].previously_engaged);
        assert_eq!(out[0].breakdown.content_match, round_to(raw * 0.5, 2));
    }

    #[test]
    fn test_zero_threshold_keeps_everything() {
        let now = Utc::now();
        let layer = ContentFilterLayer::new(0.5, 30);
        let a = activity(1, &["sports"], &["Y2"], now - Duration::hours(1));
        let out = layer.filter(vec![a], &profile(&[], Some("Y1")), &HashSet::new(), 0.0, now);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].breakdown.content_match, 0.0);
    }
}
