use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::db::RecommendationDataSource;
use crate::error::Result;
use crate::models::{BehaviorIntensity, BehaviorStats, UserId};

pub const TOP_FEATURES_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCount {
    pub name: String,
    pub count: u64,
}

/// Snapshot of what the engine knows about a user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPreferenceProfile {
    pub user_id: UserId,
    pub interests: Vec<String>,
    pub grade: Option<String>,
    pub major: Option<String>,
    pub college: Option<String>,
    pub viewed_activities_count: usize,
    pub registered_activities_count: usize,
    pub behavior_intensity: BehaviorIntensity,
    pub behavior_stats: BehaviorStats,
    pub top_tags: Vec<FeatureCount>,
    pub top_categories: Vec<FeatureCount>,
}

pub struct PreferenceProfileBuilder {
    data_source: Arc<dyn RecommendationDataSource>,
}

impl PreferenceProfileBuilder {
    pub fn new(data_source: Arc<dyn RecommendationDataSource>) -> Self {
        Self { data_source }
    }

    /// `None` for unknown users
    pub async fn build(&self, user_id: UserId) -> Result<Option<UserPreferenceProfile>> {
        let profile = match self.data_source.get_user_profile(user_id).await? {
            Some(profile) => profile,
            None => return Ok(None),
        };

        let (viewed, registered, behavior_stats, tags, categories) = tokio::try_join!(
            self.data_source.get_user_viewed_activity_ids(user_id),
            self.data_source.get_user_registered_activity_ids(user_id),
            self.data_source.get_user_behavior_stats(user_id),
            self.data_source.get_tag_frequency(user_id, TOP_FEATURES_LIMIT),
            self.data_source
                .get_category_frequency(user_id, TOP_FEATURES_LIMIT),
        )?;

        let behavior_intensity =
            BehaviorIntensity::from_action_count(viewed.len() + registered.len());

        debug!(
            user_id,
            intensity = behavior_intensity.as_str(),
            "Preference profile built"
        );

        Ok(Some(UserPreferenceProfile {
            user_id,
            interests: profile.interests,
            grade: profile.grade,
            major: profile.major,
            college: profile.college,
            viewed_activities_count: viewed.len(),
            registered_activities_count: registered.len(),
            behavior_intensity,
            behavior_stats,
            top_tags: into_feature_counts(tags),
            top_categories: into_feature_counts(categories),
        }))
    }
}

fn into_feature_counts(ranked: Vec<(String, u64)>) -> Vec<FeatureCount> {
    ranked
        .into_iter()
        .map(|(name, count)| FeatureCount { name, count })
        .collect()
}
