use actix_web::{web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use activity_recommendation_service::handlers::{self, RecommendationHandlerState};
use activity_recommendation_service::{
    Config, EngineConfig, PgRecommendationRepo, PostProcessConfig, PreferenceProfileBuilder,
    RecommendationDataSource, RecommendationEngine, RecommendationPostProcessor, ViewRecorder,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.app.log_filter().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    info!(
        "Starting activity-recommendation-service v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Environment: {}", config.app.env);

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database.url)
        .await
        .context("Failed to create database pool")?;

    let repo = Arc::new(
        PgRecommendationRepo::new(pool)
            .with_similar_users_pool_limit(config.recommendation.similar_users_pool_limit),
    );
    let data_source: Arc<dyn RecommendationDataSource> = repo.clone();
    let view_recorder: Option<Arc<dyn ViewRecorder>> = if config.recommendation.view_logging_enabled
    {
        Some(repo as Arc<dyn ViewRecorder>)
    } else {
        info!("Recommendation view logging disabled by configuration");
        None
    };

    let engine = Arc::new(RecommendationEngine::new(
        Arc::clone(&data_source),
        EngineConfig::from(&config.recommendation),
    ));

    let state = web::Data::new(RecommendationHandlerState {
        engine,
        post_processor: RecommendationPostProcessor::new(PostProcessConfig::from(
            &config.recommendation,
        )),
        profiles: PreferenceProfileBuilder::new(data_source),
        view_recorder,
        max_count: config.recommendation.max_count,
    });

    let bind_addr = format!("{}:{}", config.app.host, config.app.port);
    info!("HTTP server listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await?;

    Ok(())
}
