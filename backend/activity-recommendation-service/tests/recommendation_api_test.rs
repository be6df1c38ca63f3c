mod common;

use activity_recommendation_service::handlers::{self, RecommendationHandlerState, USER_ID_HEADER};
use activity_recommendation_service::{
    EngineConfig, InMemoryDataSource, PostProcessConfig, PreferenceProfileBuilder,
    RecommendationDataSource, RecommendationEngine, RecommendationPostProcessor, ViewRecorder,
};
use actix_web::{http::StatusCode, test, web, App};
use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn state(source: Arc<InMemoryDataSource>) -> web::Data<RecommendationHandlerState> {
    let data_source: Arc<dyn RecommendationDataSource> = source.clone();
    let recorder: Arc<dyn ViewRecorder> = source;
    web::Data::new(RecommendationHandlerState {
        engine: Arc::new(RecommendationEngine::new(
            Arc::clone(&data_source),
            EngineConfig::default(),
        )),
        post_processor: RecommendationPostProcessor::new(PostProcessConfig::default()),
        profiles: PreferenceProfileBuilder::new(data_source),
        view_recorder: Some(recorder),
        max_count: 20,
    })
}

#[actix_web::test]
async fn test_missing_user_header_is_unauthorized() {
    let app = test::init_service(
        App::new()
            .app_data(state(campus()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/recommendations/for-me")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_zero_count_is_bad_request() {
    let app = test::init_service(
        App::new()
            .app_data(state(campus()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/recommendations/for-me")
        .insert_header((USER_ID_HEADER, STUDENT.to_string()))
        .set_json(json!({ "count": 0 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], 400);
}

#[actix_web::test]
async fn test_unknown_user_gets_empty_list() {
    let app = test::init_service(
        App::new()
            .app_data(state(campus()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/recommendations/for-me")
        .insert_header((USER_ID_HEADER, UNKNOWN_USER.to_string()))
        .set_json(json!({}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["success"], true);
    assert_eq!(body["total_count"], 0);
    assert!(body["recommendations"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_for_me_returns_ranked_activities() {
    let app = test::init_service(
        App::new()
            .app_data(state(campus()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/recommendations/for-me")
        .insert_header((USER_ID_HEADER, STUDENT.to_string()))
        .set_json(json!({ "count": 2 }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["user_id"], STUDENT);
    assert_eq!(body["total_count"], 2);
    assert_eq!(body["parameters_used"]["count"], 2);
    assert_eq!(body["parameters_used"]["exclude_viewed"], true);

    let recommendations = body["recommendations"].as_array().unwrap();
    let first = &recommendations[0];
    assert_eq!(first["activity"]["activity_id"], HACKATHON);
    assert_eq!(
        first["recommendation_score"],
        first["score_breakdown"]["final_score"]
    );
    assert!(first["score_breakdown"]["collaborative_score"].as_f64().unwrap() > 0.0);
    assert!(!first["reasons"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_debug_includes_profile_and_counts() {
    let app = test::init_service(
        App::new()
            .app_data(state(campus()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/recommendations/debug")
        .insert_header((USER_ID_HEADER, STUDENT.to_string()))
        .set_json(json!({
            "count": 5,
            "content_match_threshold": 0.2,
            "freshness_half_life": 14,
            "adaptive_weights": true
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["success"], true);
    assert_eq!(body["user_profile"]["grade"], "Y2");
    assert_eq!(body["user_profile"]["viewed_activities_count"], 2);
    assert_eq!(body["user_profile"]["behavior_intensity"], "low");

    let debug = &body["debug_info"];
    assert_eq!(debug["generated_count"], 3);
    assert_eq!(debug["after_filtering_count"], 3);
    assert_eq!(debug["parameters"]["freshness_half_life_days"], 14);
    // Low intensity leans on the profile
    assert_eq!(debug["parameters"]["layer_weights"]["content_filter"], 0.5);
    assert_eq!(debug["filters"]["exclude_ended"], true);
}

async fn wait_for_views(source: &InMemoryDataSource, expected: usize) -> usize {
    for _ in 0..50 {
        let count = source.view_count().unwrap();
        if count >= expected {
            return count;
        }
        actix_web::rt::time::sleep(Duration::from_millis(10)).await;
    }
    source.view_count().unwrap()
}

#[actix_web::test]
async fn test_both_endpoints_record_views() {
    let source = campus();
    let baseline = source.view_count().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(state(source.clone()))
            .configure(handlers::configure),
    )
    .await;

    for uri in [
        "/api/v1/recommendations/for-me",
        "/api/v1/recommendations/debug",
    ] {
        let before = source.view_count().unwrap();
        let req = test::TestRequest::post()
            .uri(uri)
            .insert_header((USER_ID_HEADER, STUDENT.to_string()))
            .set_json(json!({ "count": 1 }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_count"], 1);
        assert_eq!(wait_for_views(&source, before + 1).await, before + 1);
    }

    assert_eq!(source.view_count().unwrap(), baseline + 2);
    let viewed = source.get_user_viewed_activity_ids(STUDENT).await.unwrap();
    assert!(viewed.contains(&HACKATHON));
}

#[actix_web::test]
async fn test_debug_rejects_out_of_range_threshold() {
    let app = test::init_service(
        App::new()
            .app_data(state(campus()))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/recommendations/debug")
        .insert_header((USER_ID_HEADER, STUDENT.to_string()))
        .set_json(json!({ "content_match_threshold": 1.5 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_health() {
    let app = test::init_service(App::new().configure(handlers::configure)).await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, web::Bytes::from_static(b"OK"));
}
