use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::RecommendationDataSource;
use crate::error::Result;
use crate::models::{ActivityId, UserId};
use crate::utils::round_to;

/// Collaborative Layer - activities engaged by similar users (layer 3)
///
/// Similarity comes from shared views/registrations; raw per-activity sums are
/// rescaled so the strongest activity scores 100.
pub struct CollaborativeLayer {
    data_source: Arc<dyn RecommendationDataSource>,
}

impl CollaborativeLayer {
    pub fn new(data_source: Arc<dyn RecommendationDataSource>) -> Self {
        Self { data_source }
    }

    /// `engaged` is the target's viewed-or-registered set, excluded from the result
    pub async fn scores(
        &self,
        user_id: UserId,
        engaged: &HashSet<ActivityId>,
        similar_users_limit: usize,
    ) -> Result<HashMap<ActivityId, f64>> {
        let raw = self
            .data_source
            .get_activities_from_similar_users_excluding(user_id, engaged, similar_users_limit)
            .await?;

        if raw.is_empty() {
            debug!(user_id, "No similar-user signal");
            return Ok(HashMap::new());
        }

        let normalized = Self::normalize(raw);
        info!(
            user_id,
            activities = normalized.len(),
            "Collaborative scores computed"
        );
        Ok(normalized)
    }

    /// Divide by the max so the top activity is exactly 100
    pub fn normalize(raw: HashMap<ActivityId, f64>) -> HashMap<ActivityId, f64> {
        let max = raw
            .values()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, f64::max);

        if max <= 0.0 {
            return raw.into_keys().map(|id| (id, 0.0)).collect();
        }

        raw.into_iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(id, v)| (id, round_to((v / max * 100.0).clamp(0.0, 100.0), 2)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryDataSource;

    #[test]
    fn test_normalize_top_is_100() {
        let raw: HashMap<ActivityId, f64> = [(1, 0.4), (2, 1.6), (3, 0.8)].into_iter().collect();
        let normalized = CollaborativeLayer::normalize(raw);
        assert_eq!(normalized[&2], 100.0);
        assert_eq!(normalized[&1], 25.0);
        assert_eq!(normalized[&3], 50.0);
    }

    #[test]
    fn test_normalize_zero_max() {
        let raw: HashMap<ActivityId, f64> = [(1, 0.0)].into_iter().collect();
        assert_eq!(CollaborativeLayer::normalize(raw)[&1], 0.0);
        assert!(CollaborativeLayer::normalize(HashMap::new()).is_empty());
    }

    #[tokio::test]
    async fn test_scores_empty_without_similar_users() {
        let source = Arc::new(InMemoryDataSource::new());
        source.record_view(1, 1).unwrap();
        let layer = CollaborativeLayer::new(source);
        let engaged: HashSet<ActivityId> = [1].into_iter().collect();
        assert!(layer.scores(1, &engaged, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scores_skip_supplied_engaged_set() {
        let source = Arc::new(InMemoryDataSource::new());
        for user in [1, 2] {
            for id in [1, 2] {
                source.record_view(user, id).unwrap();
            }
        }
        source.record_view(2, 3).unwrap();
        source.record_view(2, 4).unwrap();

        let layer = CollaborativeLayer::new(source);
        // Activity 3 counts as engaged even though the store has not seen it yet
        let engaged: HashSet<ActivityId> = [1, 2, 3].into_iter().collect();
        let scores = layer.scores(1, &engaged, 5).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[&4], 100.0);
    }
}
