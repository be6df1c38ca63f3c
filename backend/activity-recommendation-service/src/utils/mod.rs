// Scoring utilities for activity-recommendation-service
//
// Pure functions shared by every recommendation layer. All layer scores live
// on a 0-100 scale; similarity measures live on 0-1.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use thiserror::Error;

/// Score given to activities starting further out than the proximity window
pub const FAR_FUTURE_PROXIMITY_SCORE: f64 = 20.0;

/// Score returned by grade matching when either side carries no information
pub const NEUTRAL_GRADE_SCORE: f64 = 50.0;

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("Vector dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Non-finite {0} score")]
    NonFinite(&'static str),
}

/// Weights for the hotness blend. They are applied as-is, never renormalized.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HotnessWeights {
    pub views: f64,
    pub registration: f64,
    pub rating: f64,
    pub max_views: u32,
}

impl Default for HotnessWeights {
    fn default() -> Self {
        Self {
            views: 0.3,
            registration: 0.4,
            rating: 0.3,
            max_views: 1000,
        }
    }
}

/// Weights for the behavioral engagement blend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngagementWeights {
    pub views: f64,
    pub registrations: f64,
    pub attended: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            views: 0.2,
            registrations: 0.3,
            attended: 0.5,
        }
    }
}

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Clamp a score into `[min, max]`
pub fn normalize_score(score: f64, min: f64, max: f64) -> f64 {
    round_to(score.max(min).min(max), 2)
}

/// Jaccard overlap between user tags and the activity's tags plus categories, scaled to 0-100
pub fn tag_match_score(
    user_tags: &BTreeSet<String>,
    activity_tags: &BTreeSet<String>,
    activity_categories: &BTreeSet<String>,
) -> f64 {
    if user_tags.is_empty() {
        return 0.0;
    }

    let features: BTreeSet<&String> = activity_tags.union(activity_categories).collect();
    if features.is_empty() {
        return 0.0;
    }

    let intersection = user_tags.iter().filter(|t| features.contains(t)).count();
    let union = user_tags.len() + features.len() - intersection;

    if union == 0 {
        return 0.0;
    }

    round_to(intersection as f64 / union as f64 * 100.0, 2)
}

/// Popularity blend of views, registration fill ratio and average rating (0-5)
pub fn hotness_score(
    views: i64,
    registration_ratio: f64,
    average_rating: f64,
    weights: &HotnessWeights,
) -> f64 {
    let max_views = weights.max_views.max(1) as f64;
    let views_score = (views.max(0) as f64 / max_views).min(1.0) * 100.0;
    let registration_score = registration_ratio.max(0.0).min(1.0) * 100.0;
    let rating_score = (average_rating / 5.0) * 100.0;

    round_to(
        views_score * weights.views
            + registration_score * weights.registration
            + rating_score * weights.rating,
        2,
    )
}

/// Exponential freshness decay: `base * 0.5^(days / half_life)`
///
/// Days are whole elapsed days; a reference time in the future counts as zero days.
pub fn time_decay_score(
    reference: DateTime<Utc>,
    now: DateTime<Utc>,
    base_score: f64,
    half_life_days: u32,
) -> f64 {
    let days_elapsed = (now - reference).num_days().max(0) as f64;
    let half_life = half_life_days.max(1) as f64;
    let decayed = base_score * 0.5f64.powf(days_elapsed / half_life);

    round_to(decayed.min(base_score).max(0.0), 2)
}

/// Cosine similarity of two equal-length vectors
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, ScoringError> {
    if a.len() != b.len() {
        return Err(ScoringError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(round_to(dot / (norm_a * norm_b), 3))
}

/// Intersection over union. Two empty sets are identical.
pub fn jaccard_similarity<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;

    round_to(intersection as f64 / union as f64, 3)
}

/// Weighted sum of named scores
///
/// Keys missing from `weights` contribute nothing. With `normalize`, the sum is
/// divided by the total weight whenever that total is not 1.0.
pub fn weighted_fusion<K: Eq + Hash>(
    scores: &HashMap<K, f64>,
    weights: &HashMap<K, f64>,
    normalize: bool,
) -> f64 {
    if scores.is_empty() || weights.is_empty() {
        return 0.0;
    }

    let total_weight: f64 = weights.values().sum();
    if total_weight <= 0.0 {
        return 0.0;
    }

    let mut total = 0.0;
    for (key, score) in scores {
        total += score * weights.get(key).copied().unwrap_or(0.0);
    }

    if normalize && (total_weight - 1.0).abs() > f64::EPSILON {
        total /= total_weight;
    }

    round_to(total, 2)
}

/// 100 on a grade hit, 0 on a miss, neutral 50 when either side is unknown
pub fn grade_match_score(user_grade: Option<&str>, target_grades: &[String]) -> f64 {
    let grade = match user_grade {
        Some(g) if !g.is_empty() => g,
        _ => return NEUTRAL_GRADE_SCORE,
    };

    if target_grades.is_empty() {
        return NEUTRAL_GRADE_SCORE;
    }

    if target_grades.iter().any(|t| t == grade) {
        100.0
    } else {
        0.0
    }
}

/// Linear ramp from 100 (starting now) to 0 at `days_ahead`; already-started activities score 0
pub fn time_proximity_score(
    activity_start: DateTime<Utc>,
    now: DateTime<Utc>,
    days_ahead: i64,
) -> f64 {
    if activity_start <= now {
        return 0.0;
    }
    if days_ahead <= 0 {
        return FAR_FUTURE_PROXIMITY_SCORE;
    }

    let days_diff = (activity_start - now).num_days();
    let score = if days_diff <= days_ahead {
        (1.0 - days_diff as f64 / days_ahead as f64) * 100.0
    } else {
        FAR_FUTURE_PROXIMITY_SCORE
    };

    round_to(score.max(0.0), 2)
}

/// Behavioral engagement; saturates at 50 views, 20 registrations, 10 attendances
pub fn engagement_score(
    views: i64,
    registrations: i64,
    attended: i64,
    weights: &EngagementWeights,
) -> f64 {
    let saturate = |count: i64, cap: f64| (count.max(0) as f64 / cap).min(1.0) * 100.0;

    round_to(
        saturate(views, 50.0) * weights.views
            + saturate(registrations, 20.0) * weights.registrations
            + saturate(attended, 10.0) * weights.attended,
        2,
    )
}
