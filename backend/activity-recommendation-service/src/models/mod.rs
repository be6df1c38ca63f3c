use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type UserId = i64;
pub type ActivityId = i64;

/// Activity lifecycle state as stored by the activity service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Draft,
    Published,
    Ongoing,
    Ended,
    Cancelled,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Ongoing => "ongoing",
            Self::Ended => "ended",
            Self::Cancelled => "cancelled",
        }
    }

    /// Unknown values fall back to draft, which is never recommended
    pub fn from_db(value: &str) -> Self {
        match value {
            "published" => Self::Published,
            "ongoing" => Self::Ongoing,
            "ended" => Self::Ended,
            "cancelled" => Self::Cancelled,
            _ => Self::Draft,
        }
    }

    pub fn is_recommendable(&self) -> bool {
        matches!(self, Self::Published | Self::Ongoing)
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audience targeting stored in `activities.target_audience`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetAudience {
    #[serde(rename = "Targeted_people", default)]
    pub targeted_grades: Vec<String>,
    #[serde(rename = "Activity_class", default)]
    pub activity_classes: Vec<String>,
}

/// Free-form profile attributes stored in `users.profile_attributes`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileAttributes {
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default)]
    pub college: Option<String>,
    #[serde(default)]
    pub hobby: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub grade: Option<String>,
    pub major: Option<String>,
    pub college: Option<String>,
    pub hobby: BTreeSet<String>,
    pub interests: Vec<String>,
}

impl UserProfile {
    pub fn from_attributes(user_id: UserId, attrs: ProfileAttributes) -> Self {
        Self {
            user_id,
            grade: attrs.grade,
            major: attrs.major,
            college: attrs.college,
            hobby: attrs.hobby.into_iter().collect(),
            interests: attrs.interests,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityCandidate {
    pub activity_id: ActivityId,
    pub title: String,
    pub description: String,
    pub location: String,
    pub cover_image: String,
    pub created_at: Option<DateTime<Utc>>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_participants: i32,
    pub current_participants: i32,
    pub tags: BTreeSet<String>,
    pub target_audience: TargetAudience,
    pub views_count: i32,
    pub status: ActivityStatus,
    pub is_deleted: bool,
}

impl ActivityCandidate {
    pub fn is_recommendable(&self) -> bool {
        !self.is_deleted && self.status.is_recommendable()
    }

    /// Creation time, or the start time when the record predates creation tracking
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(self.start_time)
    }

    pub fn activity_classes(&self) -> BTreeSet<String> {
        self.target_audience.activity_classes.iter().cloned().collect()
    }
}

/// Per-activity behavior counts, computed from logs and registrations
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EngagementStats {
    pub views: i64,
    pub registrations: i64,
    pub attended: i64,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityEntry {
    pub other_user_id: UserId,
    pub jaccard_similarity: f64,
    pub common_activity_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub content_match: f64,
    pub hotness: f64,
    pub collaborative: f64,
    pub freshness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredActivity {
    pub activity: ActivityCandidate,
    pub breakdown: ScoreBreakdown,
    pub composite_score: f64,
    pub reasons: Vec<String>,
}

/// Aggregate behavior of one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BehaviorStats {
    pub view_count: i64,
    pub registration_count: i64,
    pub attended_count: i64,
    pub rated_activities_count: i64,
    pub average_rating: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorIntensity {
    Low,
    Medium,
    High,
}

impl BehaviorIntensity {
    /// Classify by viewed + registered activity count
    pub fn from_action_count(actions: usize) -> Self {
        match actions {
            0..=9 => Self::Low,
            10..=29 => Self::Medium,
            _ => Self::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}
