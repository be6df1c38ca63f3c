/// Recommendation API Handlers
///
/// HTTP endpoints for personalized activity recommendations. The gateway
/// authenticates callers and forwards the user id in `x-user-id`.
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::db::ViewRecorder;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{ActivityCandidate, ActivityId, ScoredActivity, UserId};
use crate::services::{
    adjust_weights, LayerWeights, PostProcessConfig, PostProcessFlags, PreferenceProfileBuilder,
    RecommendOptions, RecommendationEngine, RecommendationPostProcessor, UserPreferenceProfile,
};
use crate::utils::HotnessWeights;

pub const USER_ID_HEADER: &str = "x-user-id";

/// `extra_data.source` written with recommendation views
pub const VIEW_SOURCE: &str = "recommendation";

fn default_true() -> bool {
    true
}

/// Request body for POST /api/v1/recommendations/for-me
#[derive(Debug, Deserialize)]
pub struct ForMeRequest {
    /// Number of activities to return (default from config, 1..=max)
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default = "default_true")]
    pub exclude_viewed: bool,
    #[serde(default = "default_true")]
    pub exclude_registered: bool,
    #[serde(default = "default_true")]
    pub exclude_ended: bool,
}

/// Request body for POST /api/v1/recommendations/debug
#[derive(Debug, Deserialize)]
pub struct DebugRequest {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default = "default_true")]
    pub exclude_viewed: bool,
    #[serde(default = "default_true")]
    pub exclude_registered: bool,
    #[serde(default = "default_true")]
    pub exclude_ended: bool,
    #[serde(default)]
    pub layer_weights: Option<LayerWeights>,
    /// Derive layer weights from behavior intensity when no explicit weights are given
    #[serde(default)]
    pub adaptive_weights: bool,
    #[serde(default)]
    pub content_match_threshold: Option<f64>,
    #[serde(default)]
    pub hotness_weights: Option<HotnessWeights>,
    #[serde(default)]
    pub collaborative_users_limit: Option<usize>,
    #[serde(default)]
    pub freshness_half_life: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ScoreBreakdownResponse {
    pub content_filter_score: f64,
    pub hotness_score: f64,
    pub collaborative_score: f64,
    pub freshness_score: f64,
    pub final_score: f64,
}

#[derive(Debug, Serialize)]
pub struct RecommendedActivity {
    pub activity: ActivityCandidate,
    pub recommendation_score: f64,
    pub reasons: Vec<String>,
    pub score_breakdown: ScoreBreakdownResponse,
}

impl From<ScoredActivity> for RecommendedActivity {
    fn from(scored: ScoredActivity) -> Self {
        Self {
            score_breakdown: ScoreBreakdownResponse {
                content_filter_score: scored.breakdown.content_match,
                hotness_score: scored.breakdown.hotness,
                collaborative_score: scored.breakdown.collaborative,
                freshness_score: scored.breakdown.freshness,
                final_score: scored.composite_score,
            },
            recommendation_score: scored.composite_score,
            reasons: scored.reasons,
            activity: scored.activity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ParametersUsed {
    pub count: usize,
    pub exclude_viewed: bool,
    pub exclude_registered: bool,
    pub exclude_ended: bool,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub success: bool,
    pub user_id: UserId,
    pub recommendations: Vec<RecommendedActivity>,
    pub total_count: usize,
    pub parameters_used: ParametersUsed,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct EffectiveParameters {
    pub layer_weights: LayerWeights,
    pub hotness_weights: HotnessWeights,
    pub content_match_threshold: f64,
    pub collaborative_users_limit: usize,
    pub freshness_half_life_days: u32,
}

#[derive(Debug, Serialize)]
pub struct DebugInfo {
    pub parameters: EffectiveParameters,
    pub generated_count: usize,
    pub after_filtering_count: usize,
    pub filters: PostProcessFlags,
    pub post_processing: PostProcessConfig,
}

#[derive(Debug, Serialize)]
pub struct DebugResponse {
    #[serde(flatten)]
    pub recommendation: RecommendationResponse,
    pub user_profile: Option<UserPreferenceProfile>,
    pub debug_info: DebugInfo,
}

/// Handler state for recommendation endpoints
pub struct RecommendationHandlerState {
    pub engine: Arc<RecommendationEngine>,
    pub post_processor: RecommendationPostProcessor,
    pub profiles: PreferenceProfileBuilder,
    /// `None` disables view logging
    pub view_recorder: Option<Arc<dyn ViewRecorder>>,
    pub max_count: usize,
}

/// Result of one pipeline run, before response shaping
struct PipelineOutput {
    items: Vec<ScoredActivity>,
    generated_count: usize,
}

fn extract_user_id(req: &HttpRequest) -> Result<UserId> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<UserId>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::Authentication("Missing or invalid user id".to_string()))
}

fn resolve_count(requested: Option<usize>, default: usize, max: usize) -> Result<usize> {
    let count = requested.unwrap_or(default);
    if count == 0 || count > max {
        return Err(AppError::ValidationError(format!(
            "count must be between 1 and {}",
            max
        )));
    }
    Ok(count)
}

impl RecommendationHandlerState {
    async fn run_pipeline(
        &self,
        user_id: UserId,
        options: &RecommendOptions,
        flags: &PostProcessFlags,
    ) -> Result<PipelineOutput> {
        let generated = self.engine.generate(user_id, options).await?;
        let generated_count = generated.items.len();

        if generated.items.is_empty() {
            return Ok(PipelineOutput {
                items: generated.items,
                generated_count,
            });
        }

        let items = self.post_processor.process(
            generated.items,
            &generated.viewed,
            &generated.registered,
            flags,
            options.count,
            &mut rand::thread_rng(),
        );

        Ok(PipelineOutput {
            items,
            generated_count,
        })
    }

    /// Fire-and-forget; failures are logged and counted only
    fn record_views(&self, user_id: UserId, items: &[ScoredActivity]) {
        let Some(recorder) = self.view_recorder.clone() else {
            return;
        };
        let activity_ids: Vec<ActivityId> = items.iter().map(|i| i.activity.activity_id).collect();
        if activity_ids.is_empty() {
            return;
        }

        tokio::spawn(async move {
            if let Err(e) = recorder
                .record_recommendation_views(user_id, &activity_ids, VIEW_SOURCE)
                .await
            {
                warn!(user_id, "Failed to record recommendation views: {}", e);
                metrics::record_view_log_failure();
            }
        });
    }
}

fn build_response(
    user_id: UserId,
    items: Vec<ScoredActivity>,
    parameters_used: ParametersUsed,
) -> RecommendationResponse {
    let message = if items.is_empty() {
        "No recommendations available".to_string()
    } else {
        format!("Found {} recommended activities", items.len())
    };

    RecommendationResponse {
        success: true,
        user_id,
        total_count: items.len(),
        recommendations: items.into_iter().map(RecommendedActivity::from).collect(),
        parameters_used,
        message,
    }
}

/// POST /api/v1/recommendations/for-me
/// Personalized recommendations for the calling user
#[post("/api/v1/recommendations/for-me")]
pub async fn recommend_for_me(
    req: HttpRequest,
    body: web::Json<ForMeRequest>,
    state: web::Data<RecommendationHandlerState>,
) -> Result<HttpResponse> {
    let user_id = extract_user_id(&req)?;

    let mut options = state.engine.default_options();
    options.count = resolve_count(body.count, options.count, state.max_count)?;

    let flags = PostProcessFlags {
        exclude_viewed: body.exclude_viewed,
        exclude_registered: body.exclude_registered,
        exclude_ended: body.exclude_ended,
    };

    debug!(user_id, count = options.count, "Getting recommendations");

    let output = match state.run_pipeline(user_id, &options, &flags).await {
        Ok(output) => output,
        Err(err) => {
            error!(user_id, "Failed to get recommendations: {:?}", err);
            metrics::record_request("for_me", "error");
            return Err(err);
        }
    };

    state.record_views(user_id, &output.items);
    metrics::record_returned(output.items.len());
    metrics::record_request(
        "for_me",
        if output.items.is_empty() { "empty" } else { "success" },
    );

    Ok(HttpResponse::Ok().json(build_response(
        user_id,
        output.items,
        ParametersUsed {
            count: options.count,
            exclude_viewed: flags.exclude_viewed,
            exclude_registered: flags.exclude_registered,
            exclude_ended: flags.exclude_ended,
        },
    )))
}

/// POST /api/v1/recommendations/debug
/// Recommendations with tunable parameters, the user profile and pipeline counts
#[post("/api/v1/recommendations/debug")]
pub async fn recommend_debug(
    req: HttpRequest,
    body: web::Json<DebugRequest>,
    state: web::Data<RecommendationHandlerState>,
) -> Result<HttpResponse> {
    let user_id = extract_user_id(&req)?;
    let body = body.into_inner();

    let mut options = state.engine.default_options();
    options.count = resolve_count(body.count, options.count, state.max_count)?;
    if let Some(threshold) = body.content_match_threshold {
        options.content_match_threshold = threshold;
    }
    if let Some(limit) = body.collaborative_users_limit {
        options.collaborative_users_limit = limit;
    }
    if let Some(half_life) = body.freshness_half_life {
        options.freshness_half_life_days = half_life;
    }
    options.hotness_weights = body.hotness_weights;
    options.layer_weights = body.layer_weights;
    options.validate()?;

    let user_profile = state.profiles.build(user_id).await?;

    if options.layer_weights.is_none() && body.adaptive_weights {
        if let Some(profile) = &user_profile {
            options.layer_weights = Some(adjust_weights(profile.behavior_intensity));
        }
    }

    let flags = PostProcessFlags {
        exclude_viewed: body.exclude_viewed,
        exclude_registered: body.exclude_registered,
        exclude_ended: body.exclude_ended,
    };

    let output = match state.run_pipeline(user_id, &options, &flags).await {
        Ok(output) => output,
        Err(err) => {
            error!(user_id, "Failed to get debug recommendations: {:?}", err);
            metrics::record_request("debug", "error");
            return Err(err);
        }
    };
    state.record_views(user_id, &output.items);
    metrics::record_request("debug", "success");

    let debug_info = DebugInfo {
        parameters: EffectiveParameters {
            layer_weights: options.effective_layer_weights(),
            hotness_weights: options.hotness_weights.unwrap_or_default(),
            content_match_threshold: options.content_match_threshold,
            collaborative_users_limit: options.collaborative_users_limit,
            freshness_half_life_days: options.freshness_half_life_days,
        },
        generated_count: output.generated_count,
        after_filtering_count: output.items.len(),
        filters: flags,
        post_processing: *state.post_processor.config(),
    };

    let recommendation = build_response(
        user_id,
        output.items,
        ParametersUsed {
            count: options.count,
            exclude_viewed: flags.exclude_viewed,
            exclude_registered: flags.exclude_registered,
            exclude_ended: flags.exclude_ended,
        },
    );

    Ok(HttpResponse::Ok().json(DebugResponse {
        recommendation,
        user_profile,
        debug_info,
    }))
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_extract_user_id() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "17"))
            .to_http_request();
        assert_eq!(extract_user_id(&req).unwrap(), 17);

        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "abc"))
            .to_http_request();
        assert!(matches!(
            extract_user_id(&req),
            Err(AppError::Authentication(_))
        ));

        let req = TestRequest::default().to_http_request();
        assert!(extract_user_id(&req).is_err());
    }

    #[test]
    fn test_resolve_count() {
        assert_eq!(resolve_count(None, 5, 20).unwrap(), 5);
        assert_eq!(resolve_count(Some(20), 5, 20).unwrap(), 20);
        assert!(resolve_count(Some(0), 5, 20).is_err());
        assert!(resolve_count(Some(21), 5, 20).is_err());
    }
}
