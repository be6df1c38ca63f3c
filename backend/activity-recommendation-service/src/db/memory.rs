use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use super::{
    jaccard_from_counts, rank_frequencies, sort_similarity_entries, RecommendationDataSource,
    ViewRecorder,
};
use crate::error::{AppError, Result};
use crate::models::{
    ActivityCandidate, ActivityId, BehaviorStats, EngagementStats, SimilarityEntry, UserId,
    UserProfile,
};
use crate::utils::round_to;

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRecord {
    pub user_id: UserId,
    pub activity_id: ActivityId,
    pub attended: bool,
    pub rating: Option<u8>,
}

#[derive(Default)]
struct Snapshot {
    users: HashMap<UserId, UserProfile>,
    activities: BTreeMap<ActivityId, ActivityCandidate>,
    /// Raw view log, duplicates kept
    views: Vec<(UserId, ActivityId)>,
    registrations: Vec<RegistrationRecord>,
    /// activity -> users that viewed or registered it
    engaged_users: HashMap<ActivityId, BTreeSet<UserId>>,
    /// user -> activities viewed or registered
    engaged_activities: HashMap<UserId, BTreeSet<ActivityId>>,
}

impl Snapshot {
    fn index_engagement(&mut self, user_id: UserId, activity_id: ActivityId) {
        self.engaged_users
            .entry(activity_id)
            .or_default()
            .insert(user_id);
        self.engaged_activities
            .entry(user_id)
            .or_default()
            .insert(activity_id);
    }

    fn engaged_candidates(&self, user_id: UserId) -> impl Iterator<Item = &ActivityCandidate> {
        self.engaged_activities
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.activities.get(id))
    }
}

/// In-memory behavior snapshot with an activity -> users inverted index
///
/// Used by tests and local runs in place of Postgres. Also records
/// recommendation views so they show up in later reads.
#[derive(Default)]
pub struct InMemoryDataSource {
    inner: RwLock<Snapshot>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Snapshot>> {
        self.inner
            .read()
            .map_err(|_| AppError::Internal("in-memory snapshot lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Snapshot>> {
        self.inner
            .write()
            .map_err(|_| AppError::Internal("in-memory snapshot lock poisoned".to_string()))
    }

    pub fn insert_user(&self, profile: UserProfile) -> Result<()> {
        self.write()?.users.insert(profile.user_id, profile);
        Ok(())
    }

    pub fn insert_activity(&self, activity: ActivityCandidate) -> Result<()> {
        self.write()?
            .activities
            .insert(activity.activity_id, activity);
        Ok(())
    }

    pub fn record_view(&self, user_id: UserId, activity_id: ActivityId) -> Result<()> {
        let mut snapshot = self.write()?;
        snapshot.views.push((user_id, activity_id));
        snapshot.index_engagement(user_id, activity_id);
        Ok(())
    }

    pub fn record_registration(&self, record: RegistrationRecord) -> Result<()> {
        let mut snapshot = self.write()?;
        snapshot.index_engagement(record.user_id, record.activity_id);
        snapshot.registrations.push(record);
        Ok(())
    }

    pub fn view_count(&self) -> Result<usize> {
        Ok(self.read()?.views.len())
    }
}

#[async_trait]
impl RecommendationDataSource for InMemoryDataSource {
    async fn get_user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.read()?.users.get(&user_id).cloned())
    }

    async fn get_user_viewed_activity_ids(&self, user_id: UserId) -> Result<HashSet<ActivityId>> {
        Ok(self
            .read()?
            .views
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, aid)| *aid)
            .collect())
    }

    async fn get_user_registered_activity_ids(
        &self,
        user_id: UserId,
    ) -> Result<HashSet<ActivityId>> {
        Ok(self
            .read()?
            .registrations
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.activity_id)
            .collect())
    }

    async fn get_user_engaged_activity_ids(&self, user_id: UserId) -> Result<HashSet<ActivityId>> {
        Ok(self
            .read()?
            .engaged_activities
            .get(&user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn get_recommendable_activities(&self) -> Result<Vec<ActivityCandidate>> {
        Ok(self
            .read()?
            .activities
            .values()
            .filter(|a| a.is_recommendable())
            .cloned()
            .collect())
    }

    async fn get_engagement_stats(
        &self,
        activity_ids: &[ActivityId],
    ) -> Result<HashMap<ActivityId, EngagementStats>> {
        let snapshot = self.read()?;
        let mut stats: HashMap<ActivityId, EngagementStats> = activity_ids
            .iter()
            .map(|id| (*id, EngagementStats::default()))
            .collect();

        for (_, activity_id) in &snapshot.views {
            if let Some(entry) = stats.get_mut(activity_id) {
                entry.views += 1;
            }
        }

        let mut ratings: HashMap<ActivityId, Vec<f64>> = HashMap::new();
        for record in &snapshot.registrations {
            if let Some(entry) = stats.get_mut(&record.activity_id) {
                entry.registrations += 1;
                if record.attended {
                    entry.attended += 1;
                }
                if let Some(rating) = record.rating {
                    ratings
                        .entry(record.activity_id)
                        .or_default()
                        .push(f64::from(rating));
                }
            }
        }

        for (activity_id, values) in ratings {
            if let Some(entry) = stats.get_mut(&activity_id) {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                entry.average_rating = Some(round_to(mean, 2));
            }
        }

        Ok(stats)
    }

    async fn find_similar_users(
        &self,
        user_id: UserId,
        min_common_activities: usize,
        limit: usize,
    ) -> Result<Vec<SimilarityEntry>> {
        let snapshot = self.read()?;
        let target = match snapshot.engaged_activities.get(&user_id) {
            Some(set) if !set.is_empty() => set,
            _ => return Ok(Vec::new()),
        };

        // Walk the inverted index: only users sharing an activity are counted
        let mut overlap: HashMap<UserId, usize> = HashMap::new();
        for activity_id in target {
            if let Some(users) = snapshot.engaged_users.get(activity_id) {
                for other in users.iter().filter(|u| **u != user_id) {
                    *overlap.entry(*other).or_insert(0) += 1;
                }
            }
        }

        // With no overlap floor every other known user qualifies at similarity 0
        if min_common_activities == 0 {
            let known = snapshot
                .users
                .keys()
                .chain(snapshot.engaged_activities.keys());
            for other in known.filter(|u| **u != user_id) {
                overlap.entry(*other).or_insert(0);
            }
        }

        let mut entries: Vec<SimilarityEntry> = overlap
            .into_iter()
            .filter(|(_, common)| *common >= min_common_activities)
            .map(|(other_user_id, common)| {
                let other_total = snapshot
                    .engaged_activities
                    .get(&other_user_id)
                    .map(BTreeSet::len)
                    .unwrap_or(0);
                SimilarityEntry {
                    other_user_id,
                    jaccard_similarity: jaccard_from_counts(common, target.len(), other_total),
                    common_activity_count: common,
                }
            })
            .collect();

        sort_similarity_entries(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn get_user_behavior_stats(&self, user_id: UserId) -> Result<BehaviorStats> {
        let snapshot = self.read()?;
        let view_count = snapshot.views.iter().filter(|(u, _)| *u == user_id).count() as i64;

        let own: Vec<&RegistrationRecord> = snapshot
            .registrations
            .iter()
            .filter(|r| r.user_id == user_id)
            .collect();

        let rated: Vec<&RegistrationRecord> =
            own.iter().copied().filter(|r| r.rating.is_some()).collect();
        let rated_activities: HashSet<ActivityId> = rated.iter().map(|r| r.activity_id).collect();
        let average_rating = if rated.is_empty() {
            0.0
        } else {
            let total: f64 = rated
                .iter()
                .filter_map(|r| r.rating)
                .map(f64::from)
                .sum();
            round_to(total / rated.len() as f64, 2)
        };

        Ok(BehaviorStats {
            view_count,
            registration_count: own.len() as i64,
            attended_count: own.iter().filter(|r| r.attended).count() as i64,
            rated_activities_count: rated_activities.len() as i64,
            average_rating,
        })
    }

    async fn get_tag_frequency(&self, user_id: UserId, limit: usize) -> Result<Vec<(String, u64)>> {
        let snapshot = self.read()?;
        let tags = snapshot
            .engaged_candidates(user_id)
            .flat_map(|a| a.tags.iter().cloned());
        Ok(rank_frequencies(tags, limit))
    }

    async fn get_category_frequency(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<(String, u64)>> {
        let snapshot = self.read()?;
        let categories = snapshot
            .engaged_candidates(user_id)
            .flat_map(|a| a.target_audience.activity_classes.iter().cloned());
        Ok(rank_frequencies(categories, limit))
    }
}

#[async_trait]
impl ViewRecorder for InMemoryDataSource {
    async fn record_recommendation_views(
        &self,
        user_id: UserId,
        activity_ids: &[ActivityId],
        _source: &str,
    ) -> Result<()> {
        for activity_id in activity_ids {
            self.record_view(user_id, *activity_id)?;
        }
        Ok(())
    }
}
