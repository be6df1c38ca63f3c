/// Read-side data access for the recommendation pipeline
///
/// The engine only talks to [`RecommendationDataSource`]; Postgres and the
/// in-memory index are interchangeable behind it.
pub mod memory;
pub mod recommendation_repo;

pub use memory::{InMemoryDataSource, RegistrationRecord};
pub use recommendation_repo::PgRecommendationRepo;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::models::{
    ActivityCandidate, ActivityId, BehaviorStats, EngagementStats, SimilarityEntry, UserId,
    UserProfile,
};

pub const DEFAULT_MIN_COMMON_ACTIVITIES: usize = 2;

/// Operation type used for activity views in `user_operation_logs`
pub const VIEW_OPERATION: &str = "view_activity";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecommendationDataSource: Send + Sync {
    async fn get_user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>>;

    async fn get_user_viewed_activity_ids(&self, user_id: UserId) -> Result<HashSet<ActivityId>>;

    async fn get_user_registered_activity_ids(
        &self,
        user_id: UserId,
    ) -> Result<HashSet<ActivityId>>;

    /// Non-deleted activities in `published` or `ongoing` state
    async fn get_recommendable_activities(&self) -> Result<Vec<ActivityCandidate>>;

    async fn get_engagement_stats(
        &self,
        activity_ids: &[ActivityId],
    ) -> Result<HashMap<ActivityId, EngagementStats>>;

    /// Users whose engaged set overlaps the target's by at least `min_common_activities`,
    /// most similar (Jaccard) first. A floor of 0 also admits users with no overlap at
    /// similarity 0, provided the target has engaged with something.
    async fn find_similar_users(
        &self,
        user_id: UserId,
        min_common_activities: usize,
        limit: usize,
    ) -> Result<Vec<SimilarityEntry>>;

    async fn get_user_behavior_stats(&self, user_id: UserId) -> Result<BehaviorStats>;

    async fn get_tag_frequency(&self, user_id: UserId, limit: usize) -> Result<Vec<(String, u64)>>;

    async fn get_category_frequency(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<(String, u64)>>;

    /// Viewed or registered
    async fn get_user_engaged_activity_ids(&self, user_id: UserId) -> Result<HashSet<ActivityId>> {
        let mut engaged = self.get_user_viewed_activity_ids(user_id).await?;
        engaged.extend(self.get_user_registered_activity_ids(user_id).await?);
        Ok(engaged)
    }

    /// Raw collaborative scores: for every activity engaged by a similar user but not by
    /// the target, the sum of those users' similarities. Callers normalize.
    async fn get_activities_from_similar_users(
        &self,
        user_id: UserId,
        similar_users_limit: usize,
    ) -> Result<HashMap<ActivityId, f64>> {
        let own = self.get_user_engaged_activity_ids(user_id).await?;
        self.get_activities_from_similar_users_excluding(user_id, &own, similar_users_limit)
            .await
    }

    /// Same as [`get_activities_from_similar_users`](Self::get_activities_from_similar_users)
    /// with the target's engaged set supplied by a caller that already holds it
    async fn get_activities_from_similar_users_excluding(
        &self,
        user_id: UserId,
        own: &HashSet<ActivityId>,
        similar_users_limit: usize,
    ) -> Result<HashMap<ActivityId, f64>> {
        let similar_users = self
            .find_similar_users(user_id, DEFAULT_MIN_COMMON_ACTIVITIES, similar_users_limit)
            .await?;

        if similar_users.is_empty() {
            return Ok(HashMap::new());
        }

        let mut scores: HashMap<ActivityId, f64> = HashMap::new();

        for similar in &similar_users {
            let engaged = self
                .get_user_engaged_activity_ids(similar.other_user_id)
                .await?;
            for activity_id in engaged.difference(own) {
                *scores.entry(*activity_id).or_insert(0.0) += similar.jaccard_similarity;
            }
        }

        Ok(scores)
    }
}

/// Write side for "shown by recommendation" view events
#[async_trait]
pub trait ViewRecorder: Send + Sync {
    async fn record_recommendation_views(
        &self,
        user_id: UserId,
        activity_ids: &[ActivityId],
        source: &str,
    ) -> Result<()>;
}

/// Count occurrences and keep the `limit` most frequent, ties broken by name
pub(crate) fn rank_frequencies<I>(values: I, limit: usize) -> Vec<(String, u64)>
where
    I: IntoIterator<Item = String>,
{
    let mut counts: HashMap<String, u64> = HashMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Jaccard from set sizes and overlap, rounded to 3 decimals
pub(crate) fn jaccard_from_counts(common: usize, left: usize, right: usize) -> f64 {
    let union = left + right - common;
    if union == 0 {
        return 0.0;
    }
    crate::utils::round_to(common as f64 / union as f64, 3)
}

/// Sort by similarity (desc), then overlap (desc), then user id for stable output
pub(crate) fn sort_similarity_entries(entries: &mut [SimilarityEntry]) {
    entries.sort_by(|a, b| {
        b.jaccard_similarity
            .partial_cmp(&a.jaccard_similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.common_activity_count.cmp(&a.common_activity_count))
            .then_with(|| a.other_user_id.cmp(&b.other_user_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_frequencies_orders_and_truncates() {
        let values = ["music", "sports", "music", "art", "sports", "music"]
            .iter()
            .map(|s| s.to_string());
        let ranked = rank_frequencies(values, 2);
        assert_eq!(
            ranked,
            vec![("music".to_string(), 3), ("sports".to_string(), 2)]
        );
    }

    #[test]
    fn test_jaccard_from_counts() {
        assert_eq!(jaccard_from_counts(2, 4, 3), 0.4);
        assert_eq!(jaccard_from_counts(0, 0, 0), 0.0);
    }
}
