#![allow(dead_code)]

use activity_recommendation_service::db::{InMemoryDataSource, RegistrationRecord};
use activity_recommendation_service::models::{
    ActivityCandidate, ActivityId, ActivityStatus, TargetAudience, UserProfile,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

pub const STUDENT: i64 = 1;
pub const PEER_A: i64 = 2;
pub const PEER_B: i64 = 3;
pub const UNKNOWN_USER: i64 = 404;

pub const JAZZ_NIGHT: ActivityId = 1;
pub const RUST_WORKSHOP: ActivityId = 2;
pub const FOOTBALL: ActivityId = 3;
pub const ENDED_CONCERT: ActivityId = 4;
pub const DELETED_GIG: ActivityId = 5;
pub const HACKATHON: ActivityId = 6;

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub struct ActivityFixture<'a> {
    pub id: ActivityId,
    pub title: &'a str,
    pub tags: &'a [&'a str],
    pub classes: &'a [&'a str],
    pub grades: &'a [&'a str],
    pub starts_in: Duration,
    pub created_ago: Duration,
    pub max_participants: i32,
    pub status: ActivityStatus,
    pub is_deleted: bool,
}

pub fn activity(fixture: ActivityFixture<'_>) -> ActivityCandidate {
    let now = fixed_now();
    ActivityCandidate {
        activity_id: fixture.id,
        title: fixture.title.to_string(),
        description: format!("{} on campus", fixture.title),
        location: "Main Hall".to_string(),
        cover_image: String::new(),
        created_at: Some(now - fixture.created_ago),
        start_time: now + fixture.starts_in,
        end_time: now + fixture.starts_in + Duration::hours(3),
        max_participants: fixture.max_participants,
        current_participants: 0,
        tags: fixture.tags.iter().map(|s| s.to_string()).collect(),
        target_audience: TargetAudience {
            targeted_grades: strings(fixture.grades),
            activity_classes: strings(fixture.classes),
        },
        views_count: 0,
        status: fixture.status,
        is_deleted: fixture.is_deleted,
    }
}

/// A small campus: one student with music/coding hobbies, two peers who
/// share the student's history and also joined the hackathon.
pub fn campus() -> Arc<InMemoryDataSource> {
    let source = InMemoryDataSource::new();

    source
        .insert_user(UserProfile {
            user_id: STUDENT,
            grade: Some("Y2".to_string()),
            major: Some("Computer Science".to_string()),
            college: Some("Engineering".to_string()),
            hobby: ["music", "coding"].iter().map(|s| s.to_string()).collect(),
            interests: Vec::new(),
        })
        .unwrap();
    for peer in [PEER_A, PEER_B] {
        source
            .insert_user(UserProfile {
                user_id: peer,
                ..Default::default()
            })
            .unwrap();
    }

    let fixtures = [
        ActivityFixture {
            id: JAZZ_NIGHT,
            title: "Jazz Night",
            tags: &["music"],
            classes: &["culture"],
            grades: &["Y2"],
            starts_in: Duration::days(3),
            created_ago: Duration::days(1),
            max_participants: 50,
            status: ActivityStatus::Published,
            is_deleted: false,
        },
        ActivityFixture {
            id: RUST_WORKSHOP,
            title: "Rust Workshop",
            tags: &["coding"],
            classes: &["tech"],
            grades: &[],
            starts_in: Duration::days(10),
            created_ago: Duration::days(40),
            max_participants: 20,
            status: ActivityStatus::Published,
            is_deleted: false,
        },
        ActivityFixture {
            id: FOOTBALL,
            title: "Football Match",
            tags: &["sports"],
            classes: &[],
            grades: &["Y1"],
            starts_in: -Duration::hours(1),
            created_ago: Duration::days(5),
            max_participants: 22,
            status: ActivityStatus::Ongoing,
            is_deleted: false,
        },
        ActivityFixture {
            id: ENDED_CONCERT,
            title: "Spring Concert",
            tags: &["music"],
            classes: &["culture"],
            grades: &["Y2"],
            starts_in: Duration::days(2),
            created_ago: Duration::days(1),
            max_participants: 100,
            status: ActivityStatus::Ended,
            is_deleted: false,
        },
        ActivityFixture {
            id: DELETED_GIG,
            title: "Cancelled Gig",
            tags: &["music", "coding"],
            classes: &[],
            grades: &["Y2"],
            starts_in: Duration::days(2),
            created_ago: Duration::days(1),
            max_participants: 10,
            status: ActivityStatus::Published,
            is_deleted: true,
        },
        ActivityFixture {
            id: HACKATHON,
            title: "Campus Hackathon",
            tags: &["coding", "music"],
            classes: &["tech"],
            grades: &["Y2"],
            starts_in: Duration::days(20),
            created_ago: Duration::days(2),
            max_participants: 30,
            status: ActivityStatus::Published,
            is_deleted: false,
        },
    ];
    for fixture in fixtures {
        source.insert_activity(activity(fixture)).unwrap();
    }

    for id in [JAZZ_NIGHT, RUST_WORKSHOP] {
        source.record_view(STUDENT, id).unwrap();
    }
    for peer in [PEER_A, PEER_B] {
        for id in [JAZZ_NIGHT, RUST_WORKSHOP, HACKATHON] {
            source.record_view(peer, id).unwrap();
        }
    }
    source
        .record_registration(RegistrationRecord {
            user_id: PEER_A,
            activity_id: HACKATHON,
            attended: true,
            rating: Some(5),
        })
        .unwrap();

    Arc::new(source)
}
