// ============================================
// Recommendation Engine
// ============================================
//
// Four-layer pipeline per user:
//   1. content filter  (profile match, threshold, repeat demotion)
//   2. hotness         (views, fill ratio, rating)
//   3. collaborative   (similar users' engagement)
//   4. freshness       (half-life decay)
// followed by weighted fusion of the four layer scores and explanation.
//
// Layers 2 and 3 only depend on layer 1's survivors and run concurrently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::collaborative::CollaborativeLayer;
use super::content_filter::ContentFilterLayer;
use super::freshness::FreshnessLayer;
use super::hotness::HotnessLayer;
use super::LayeredCandidate;
use crate::config::RecommendationConfig;
use crate::db::RecommendationDataSource;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    ActivityCandidate, ActivityId, BehaviorIntensity, ScoreBreakdown, ScoredActivity, UserId,
};
use crate::utils::{weighted_fusion, HotnessWeights};

pub const REASON_CONTENT: &str = "matches your interests";
pub const REASON_HOTNESS: &str = "popular and well-rated";
pub const REASON_FRESHNESS: &str = "newly posted";
pub const REASON_COLLABORATIVE: &str = "liked by similar users";
pub const REASON_FALLBACK: &str = "worth a try";

/// Fusion weights for the four layers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerWeights {
    pub content_filter: f64,
    pub hotness: f64,
    pub collaborative: f64,
    pub freshness: f64,
}

impl Default for LayerWeights {
    fn default() -> Self {
        Self {
            content_filter: 0.35,
            hotness: 0.20,
            collaborative: 0.25,
            freshness: 0.20,
        }
    }
}

impl LayerWeights {
    pub fn to_map(&self) -> HashMap<&'static str, f64> {
        [
            ("content_filter", self.content_filter),
            ("hotness", self.hotness),
            ("collaborative", self.collaborative),
            ("freshness", self.freshness),
        ]
        .into_iter()
        .collect()
    }

    pub fn total(&self) -> f64 {
        self.content_filter + self.hotness + self.collaborative + self.freshness
    }

    pub fn validate(&self) -> Result<()> {
        let all = [
            self.content_filter,
            self.hotness,
            self.collaborative,
            self.freshness,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AppError::ValidationError(
                "layer weights must be finite and non-negative".to_string(),
            ));
        }
        if self.total() <= 0.0 {
            return Err(AppError::ValidationError(
                "layer weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn breakdown_map(breakdown: &ScoreBreakdown) -> HashMap<&'static str, f64> {
    [
        ("content_filter", breakdown.content_match),
        ("hotness", breakdown.hotness),
        ("collaborative", breakdown.collaborative),
        ("freshness", breakdown.freshness),
    ]
    .into_iter()
    .collect()
}

/// Layer weights for a behavior level: heavy users lean on collaborative
/// signal, light users on their profile
pub fn adjust_weights(intensity: BehaviorIntensity) -> LayerWeights {
    match intensity {
        BehaviorIntensity::High => LayerWeights {
            content_filter: 0.25,
            hotness: 0.15,
            collaborative: 0.40,
            freshness: 0.20,
        },
        BehaviorIntensity::Low => LayerWeights {
            content_filter: 0.50,
            hotness: 0.15,
            collaborative: 0.10,
            freshness: 0.25,
        },
        BehaviorIntensity::Medium => LayerWeights::default(),
    }
}

/// Human-readable reasons, in fixed order, with a fallback when nothing stands out
pub fn explain(breakdown: &ScoreBreakdown) -> Vec<String> {
    let mut reasons = Vec::new();
    if breakdown.content_match > 70.0 {
        reasons.push(REASON_CONTENT.to_string());
    }
    if breakdown.hotness > 65.0 {
        reasons.push(REASON_HOTNESS.to_string());
    }
    if breakdown.freshness > 70.0 {
        reasons.push(REASON_FRESHNESS.to_string());
    }
    if breakdown.collaborative > 30.0 {
        reasons.push(REASON_COLLABORATIVE.to_string());
    }
    if reasons.is_empty() {
        reasons.push(REASON_FALLBACK.to_string());
    }
    reasons
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendOptions {
    pub count: usize,
    pub layer_weights: Option<LayerWeights>,
    /// 0-1; compared against content match / 100
    pub content_match_threshold: f64,
    pub hotness_weights: Option<HotnessWeights>,
    pub collaborative_users_limit: usize,
    pub freshness_half_life_days: u32,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            count: 5,
            layer_weights: None,
            content_match_threshold: 0.1,
            hotness_weights: None,
            collaborative_users_limit: 5,
            freshness_half_life_days: 30,
        }
    }
}

impl RecommendOptions {
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(AppError::ValidationError(
                "count must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.content_match_threshold) {
            return Err(AppError::ValidationError(
                "content_match_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.collaborative_users_limit == 0 {
            return Err(AppError::ValidationError(
                "collaborative_users_limit must be positive".to_string(),
            ));
        }
        if self.freshness_half_life_days == 0 {
            return Err(AppError::ValidationError(
                "freshness_half_life must be positive".to_string(),
            ));
        }
        if let Some(weights) = &self.layer_weights {
            weights.validate()?;
        }
        Ok(())
    }

    pub fn effective_layer_weights(&self) -> LayerWeights {
        self.layer_weights.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub content_repeat_factor: f64,
    pub proximity_days_ahead: i64,
    pub defaults: RecommendOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            content_repeat_factor: 0.5,
            proximity_days_ahead: 30,
            defaults: RecommendOptions::default(),
        }
    }
}

impl From<&RecommendationConfig> for EngineConfig {
    fn from(config: &RecommendationConfig) -> Self {
        Self {
            content_repeat_factor: config.content_repeat_factor,
            proximity_days_ahead: config.proximity_days_ahead,
            defaults: RecommendOptions {
                count: config.default_count,
                layer_weights: None,
                content_match_threshold: config.content_match_threshold,
                hotness_weights: None,
                collaborative_users_limit: config.collaborative_users_limit,
                freshness_half_life_days: config.freshness_half_life_days,
            },
        }
    }
}

/// Ranked items plus the user history the pipeline read to produce them
#[derive(Debug, Clone, Default)]
pub struct Recommendations {
    pub items: Vec<ScoredActivity>,
    pub viewed: HashSet<ActivityId>,
    pub registered: HashSet<ActivityId>,
}

pub struct RecommendationEngine {
    data_source: Arc<dyn RecommendationDataSource>,
    config: EngineConfig,
    content_filter: ContentFilterLayer,
    hotness: HotnessLayer,
    collaborative: CollaborativeLayer,
}

impl RecommendationEngine {
    pub fn new(data_source: Arc<dyn RecommendationDataSource>, config: EngineConfig) -> Self {
        Self {
            content_filter: ContentFilterLayer::new(
                config.content_repeat_factor,
                config.proximity_days_ahead,
            ),
            hotness: HotnessLayer::new(),
            collaborative: CollaborativeLayer::new(Arc::clone(&data_source)),
            data_source,
            config,
        }
    }

    /// Options seeded from service config
    pub fn default_options(&self) -> RecommendOptions {
        self.config.defaults.clone()
    }

    pub async fn recommend(
        &self,
        user_id: UserId,
        options: &RecommendOptions,
    ) -> Result<Vec<ScoredActivity>> {
        self.recommend_at(user_id, options, Utc::now()).await
    }

    /// Run the pipeline with an explicit clock
    pub async fn recommend_at(
        &self,
        user_id: UserId,
        options: &RecommendOptions,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredActivity>> {
        Ok(self.generate_at(user_id, options, now).await?.items)
    }

    pub async fn generate(
        &self,
        user_id: UserId,
        options: &RecommendOptions,
    ) -> Result<Recommendations> {
        self.generate_at(user_id, options, Utc::now()).await
    }

    /// Like [`recommend_at`](Self::recommend_at), also handing back the viewed and
    /// registered sets so post-processing does not read them again
    pub async fn generate_at(
        &self,
        user_id: UserId,
        options: &RecommendOptions,
        now: DateTime<Utc>,
    ) -> Result<Recommendations> {
        options.validate()?;
        let start = Instant::now();

        let profile = match self.data_source.get_user_profile(user_id).await? {
            Some(profile) => profile,
            None => {
                info!(user_id, "Unknown user, no recommendations");
                return Ok(Recommendations::default());
            }
        };

        let (viewed, registered, activities) = tokio::try_join!(
            self.data_source.get_user_viewed_activity_ids(user_id),
            self.data_source.get_user_registered_activity_ids(user_id),
            self.data_source.get_recommendable_activities(),
        )?;

        let engaged: HashSet<ActivityId> = viewed.union(&registered).copied().collect();
        let candidates = dedup_recommendable(activities);

        // Layer 1
        let layered = self.content_filter.filter(
            candidates,
            &profile,
            &engaged,
            options.content_match_threshold,
            now,
        );
        metrics::observe_stage("content_filter", start.elapsed());

        if layered.is_empty() {
            info!(user_id, "No activities passed the content filter");
            return Ok(Recommendations {
                items: Vec::new(),
                viewed,
                registered,
            });
        }

        // Layers 2 and 3
        let ids: Vec<ActivityId> = layered.iter().map(|c| c.activity.activity_id).collect();
        let (stats, collaborative) = tokio::try_join!(
            self.data_source.get_engagement_stats(&ids),
            self.collaborative
                .scores(user_id, &engaged, options.collaborative_users_limit),
        )?;
        metrics::observe_stage("signals", start.elapsed());

        let hotness_weights = options.hotness_weights.unwrap_or_default();
        let mut ranked = self.hotness.rank(layered, &stats, &hotness_weights);

        for candidate in ranked.iter_mut() {
            candidate.breakdown.collaborative = collaborative
                .get(&candidate.activity.activity_id)
                .copied()
                .unwrap_or(0.0);
        }

        // Layer 4
        FreshnessLayer::new(options.freshness_half_life_days).apply(&mut ranked, now);

        let results = self.synthesize(ranked, &options.effective_layer_weights(), options.count);
        metrics::observe_stage("total", start.elapsed());

        info!(
            user_id,
            engaged = engaged.len(),
            returned = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Recommendations generated"
        );

        Ok(Recommendations {
            items: results,
            viewed,
            registered,
        })
    }

    fn synthesize(
        &self,
        candidates: Vec<LayeredCandidate>,
        weights: &LayerWeights,
        count: usize,
    ) -> Vec<ScoredActivity> {
        let weight_map = weights.to_map();

        let mut scored: Vec<ScoredActivity> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let composite = weighted_fusion(&breakdown_map(&candidate.breakdown), &weight_map, true);
                if !composite.is_finite() {
                    warn!(
                        activity_id = candidate.activity.activity_id,
                        "Non-finite composite score, skipping candidate"
                    );
                    metrics::record_skipped_candidate("synthesis");
                    return None;
                }

                let reasons = explain(&candidate.breakdown);
                Some(ScoredActivity {
                    activity: candidate.activity,
                    breakdown: candidate.breakdown,
                    composite_score: composite,
                    reasons,
                })
            })
            .collect();

        // Stable: equal composites keep hotness order
        scored.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(count);

        debug!(count = scored.len(), "Synthesis completed");
        scored
    }
}

fn dedup_recommendable(activities: Vec<ActivityCandidate>) -> Vec<ActivityCandidate> {
    let mut seen = HashSet::new();
    activities
        .into_iter()
        .filter(|a| a.is_recommendable() && seen.insert(a.activity_id))
        .collect()
}
