pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use db::{InMemoryDataSource, PgRecommendationRepo, RecommendationDataSource, ViewRecorder};
pub use error::{AppError, Result};
pub use services::{
    EngineConfig, PostProcessConfig, PreferenceProfileBuilder, RecommendOptions,
    RecommendationEngine, RecommendationPostProcessor,
};
