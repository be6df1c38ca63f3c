/// Recommendation Repository
///
/// Postgres-backed read side for the recommendation engine. Behavior comes from
/// `user_operation_logs` (views) and `registrations`; candidates from `activities`.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, error, warn};

use super::{
    jaccard_from_counts, rank_frequencies, sort_similarity_entries, RecommendationDataSource,
    ViewRecorder, VIEW_OPERATION,
};
use crate::error::{AppError, Result};
use crate::models::{
    ActivityCandidate, ActivityId, ActivityStatus, BehaviorStats, EngagementStats,
    ProfileAttributes, SimilarityEntry, TargetAudience, UserId, UserProfile,
};
use crate::utils::round_to;

/// Upper bound on overlapping users pulled back before Jaccard ranking
pub const DEFAULT_SIMILAR_USERS_POOL_LIMIT: i64 = 500;

#[derive(Debug, sqlx::FromRow)]
struct ActivityRow {
    id: i64,
    title: String,
    description: Option<String>,
    location: Option<String>,
    cover_image: Option<String>,
    created_at: Option<DateTime<Utc>>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    max_participants: Option<i32>,
    current_participants: Option<i32>,
    tags: Option<Value>,
    target_audience: Option<Value>,
    views_count: Option<i32>,
    status: String,
    is_deleted: bool,
}

impl From<ActivityRow> for ActivityCandidate {
    fn from(row: ActivityRow) -> Self {
        let target_audience = row
            .target_audience
            .map(parse_target_audience)
            .unwrap_or_default();

        Self {
            activity_id: row.id,
            title: row.title,
            description: row.description.unwrap_or_default(),
            location: row.location.unwrap_or_default(),
            cover_image: row.cover_image.unwrap_or_default(),
            created_at: row.created_at,
            start_time: row.start_time,
            end_time: row.end_time,
            max_participants: row.max_participants.unwrap_or(0),
            current_participants: row.current_participants.unwrap_or(0),
            tags: row.tags.map(parse_tags).unwrap_or_default(),
            target_audience,
            views_count: row.views_count.unwrap_or(0),
            status: ActivityStatus::from_db(&row.status),
            is_deleted: row.is_deleted,
        }
    }
}

/// Tags are stored as a JSON array of strings; anything else is ignored
fn parse_tags(value: Value) -> BTreeSet<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => BTreeSet::new(),
    }
}

fn parse_target_audience(value: Value) -> TargetAudience {
    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!("Malformed target_audience, treating as untargeted: {}", e);
        TargetAudience::default()
    })
}

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    error!("{}: {}", context, e);
    AppError::Database(e.to_string())
}

pub struct PgRecommendationRepo {
    pool: PgPool,
    similar_users_pool_limit: i64,
}

impl PgRecommendationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            similar_users_pool_limit: DEFAULT_SIMILAR_USERS_POOL_LIMIT,
        }
    }

    pub fn with_similar_users_pool_limit(mut self, limit: i64) -> Self {
        self.similar_users_pool_limit = limit.max(1);
        self
    }

    /// Tag and audience-category JSON of the user's engaged activities
    async fn engaged_activity_features(
        &self,
        user_id: UserId,
    ) -> Result<Vec<(Option<Value>, Option<Value>)>> {
        let engaged: Vec<i64> = self
            .get_user_engaged_activity_ids(user_id)
            .await?
            .into_iter()
            .collect();

        if engaged.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, (Option<Value>, Option<Value>)>(
            r#"
            SELECT tags, target_audience
            FROM activities
            WHERE id = ANY($1)
            "#,
        )
        .bind(&engaged)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load engaged activity features", e))
    }
}

#[async_trait]
impl RecommendationDataSource for PgRecommendationRepo {
    async fn get_user_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, (i64, Option<Value>)>(
            r#"
            SELECT id::BIGINT, profile_attributes
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load user profile", e))?;

        Ok(row.map(|(id, attributes)| {
            let attrs = attributes
                .map(|value| {
                    serde_json::from_value::<ProfileAttributes>(value).unwrap_or_else(|e| {
                        warn!(user_id = id, "Malformed profile_attributes: {}", e);
                        ProfileAttributes::default()
                    })
                })
                .unwrap_or_default();
            UserProfile::from_attributes(id, attrs)
        }))
    }

    async fn get_user_viewed_activity_ids(&self, user_id: UserId) -> Result<HashSet<ActivityId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT activity_id::BIGINT
            FROM user_operation_logs
            WHERE user_id = $1
                AND operation_type = $2
                AND activity_id IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(VIEW_OPERATION)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load viewed activities", e))?;

        Ok(ids.into_iter().collect())
    }

    async fn get_user_registered_activity_ids(
        &self,
        user_id: UserId,
    ) -> Result<HashSet<ActivityId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT activity_id::BIGINT
            FROM registrations
            WHERE participant_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load registered activities", e))?;

        Ok(ids.into_iter().collect())
    }

    async fn get_recommendable_activities(&self) -> Result<Vec<ActivityCandidate>> {
        // Naive timestamps are read as UTC (session time zone)
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT
                id::BIGINT AS id,
                title,
                description,
                location,
                cover_image,
                created_at::TIMESTAMPTZ AS created_at,
                start_time::TIMESTAMPTZ AS start_time,
                end_time::TIMESTAMPTZ AS end_time,
                max_participants,
                current_participants,
                tags,
                target_audience,
                views_count,
                status,
                is_deleted
            FROM activities
            WHERE is_deleted = FALSE
                AND status IN ('published', 'ongoing')
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load recommendable activities", e))?;

        debug!(count = rows.len(), "Loaded recommendable activities");

        Ok(rows.into_iter().map(ActivityCandidate::from).collect())
    }

    async fn get_engagement_stats(
        &self,
        activity_ids: &[ActivityId],
    ) -> Result<HashMap<ActivityId, EngagementStats>> {
        if activity_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<
            _,
            (
                i64,         // activity_id
                i64,         // views
                i64,         // registrations
                i64,         // attended
                Option<f64>, // average_rating
            ),
        >(
            r#"
            SELECT
                a.id AS activity_id,
                COALESCE(v.views, 0) AS views,
                COALESCE(r.registrations, 0) AS registrations,
                COALESCE(r.attended, 0) AS attended,
                r.average_rating
            FROM UNNEST($1::BIGINT[]) AS a(id)
            LEFT JOIN (
                SELECT activity_id::BIGINT AS activity_id, COUNT(*) AS views
                FROM user_operation_logs
                WHERE operation_type = $2
                    AND activity_id = ANY($1)
                GROUP BY activity_id
            ) v ON v.activity_id = a.id
            LEFT JOIN (
                SELECT
                    activity_id::BIGINT AS activity_id,
                    COUNT(*) AS registrations,
                    COUNT(check_out_time) AS attended,
                    AVG(rating)::FLOAT8 AS average_rating
                FROM registrations
                WHERE activity_id = ANY($1)
                GROUP BY activity_id
            ) r ON r.activity_id = a.id
            "#,
        )
        .bind(activity_ids)
        .bind(VIEW_OPERATION)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load engagement stats", e))?;

        Ok(rows
            .into_iter()
            .map(|(id, views, registrations, attended, average_rating)| {
                (
                    id,
                    EngagementStats {
                        views,
                        registrations,
                        attended,
                        average_rating: average_rating.map(|r| round_to(r, 2)),
                    },
                )
            })
            .collect())
    }

    async fn find_similar_users(
        &self,
        user_id: UserId,
        min_common_activities: usize,
        limit: usize,
    ) -> Result<Vec<SimilarityEntry>> {
        // Overlap is join-driven; zero-overlap users only join in when the floor is 0
        let rows = sqlx::query_as::<
            _,
            (
                i64, // other_user_id
                i64, // common_count
                i64, // other_total
                i64, // target_total
            ),
        >(
            r#"
            WITH engaged AS (
                SELECT user_id::BIGINT AS user_id, activity_id::BIGINT AS activity_id
                FROM user_operation_logs
                WHERE operation_type = $2
                    AND activity_id IS NOT NULL
                UNION
                SELECT participant_id::BIGINT, activity_id::BIGINT
                FROM registrations
            ),
            target AS (
                SELECT activity_id FROM engaged WHERE user_id = $1
            ),
            shared AS (
                SELECT e.user_id, COUNT(*) AS common_count
                FROM engaged e
                JOIN target t ON t.activity_id = e.activity_id
                WHERE e.user_id <> $1
                GROUP BY e.user_id
            ),
            overlap AS (
                SELECT user_id, common_count
                FROM shared
                WHERE common_count >= $3
                UNION ALL
                SELECT u.id::BIGINT, 0
                FROM users u
                LEFT JOIN shared sh ON sh.user_id = u.id
                WHERE $3 = 0
                    AND u.id <> $1
                    AND sh.user_id IS NULL
                    AND EXISTS (SELECT 1 FROM target)
                ORDER BY common_count DESC
                LIMIT $4
            ),
            sizes AS (
                SELECT user_id, COUNT(*) AS total
                FROM engaged
                WHERE user_id IN (SELECT user_id FROM overlap)
                GROUP BY user_id
            )
            SELECT
                o.user_id,
                o.common_count,
                COALESCE(s.total, 0) AS other_total,
                (SELECT COUNT(*) FROM target) AS target_total
            FROM overlap o
            LEFT JOIN sizes s ON s.user_id = o.user_id
            "#,
        )
        .bind(user_id)
        .bind(VIEW_OPERATION)
        .bind(min_common_activities as i64)
        .bind(self.similar_users_pool_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find similar users", e))?;

        let mut entries: Vec<SimilarityEntry> = rows
            .into_iter()
            .map(|(other_user_id, common, other_total, target_total)| {
                let common = common.max(0) as usize;
                SimilarityEntry {
                    other_user_id,
                    jaccard_similarity: jaccard_from_counts(
                        common,
                        target_total.max(0) as usize,
                        other_total.max(0) as usize,
                    ),
                    common_activity_count: common,
                }
            })
            .collect();

        sort_similarity_entries(&mut entries);
        entries.truncate(limit);

        debug!(user_id, similar_users = entries.len(), "Similar users found");

        Ok(entries)
    }

    async fn get_user_behavior_stats(&self, user_id: UserId) -> Result<BehaviorStats> {
        let (view_count, registration_count, attended_count, rated_count, average_rating) =
            sqlx::query_as::<_, (i64, i64, i64, i64, Option<f64>)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM user_operation_logs
                        WHERE user_id = $1 AND operation_type = $2),
                    (SELECT COUNT(*) FROM registrations
                        WHERE participant_id = $1),
                    (SELECT COUNT(*) FROM registrations
                        WHERE participant_id = $1 AND check_out_time IS NOT NULL),
                    (SELECT COUNT(DISTINCT activity_id) FROM registrations
                        WHERE participant_id = $1 AND rating IS NOT NULL),
                    (SELECT AVG(rating)::FLOAT8 FROM registrations
                        WHERE participant_id = $1 AND rating IS NOT NULL)
                "#,
            )
            .bind(user_id)
            .bind(VIEW_OPERATION)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load behavior stats", e))?;

        Ok(BehaviorStats {
            view_count,
            registration_count,
            attended_count,
            rated_activities_count: rated_count,
            average_rating: round_to(average_rating.unwrap_or(0.0), 2),
        })
    }

    async fn get_tag_frequency(&self, user_id: UserId, limit: usize) -> Result<Vec<(String, u64)>> {
        let features = self.engaged_activity_features(user_id).await?;
        let tags = features
            .into_iter()
            .filter_map(|(tags, _)| tags)
            .flat_map(parse_tags);

        Ok(rank_frequencies(tags, limit))
    }

    async fn get_category_frequency(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<(String, u64)>> {
        let features = self.engaged_activity_features(user_id).await?;
        let categories = features
            .into_iter()
            .filter_map(|(_, audience)| audience)
            .flat_map(|audience| parse_target_audience(audience).activity_classes);

        Ok(rank_frequencies(categories, limit))
    }
}

#[async_trait]
impl ViewRecorder for PgRecommendationRepo {
    async fn record_recommendation_views(
        &self,
        user_id: UserId,
        activity_ids: &[ActivityId],
        source: &str,
    ) -> Result<()> {
        if activity_ids.is_empty() {
            return Ok(());
        }

        let extra_data = serde_json::json!({ "source": source });

        sqlx::query(
            r#"
            INSERT INTO user_operation_logs (user_id, activity_id, operation_type, created_at, extra_data)
            SELECT $1, ids.id, $3, NOW(), $4
            FROM UNNEST($2::BIGINT[]) AS ids(id)
            "#,
        )
        .bind(user_id)
        .bind(activity_ids)
        .bind(VIEW_OPERATION)
        .bind(extra_data)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record recommendation views", e))?;

        Ok(())
    }
}
