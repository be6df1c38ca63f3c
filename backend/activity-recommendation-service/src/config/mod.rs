use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub recommendation: RecommendationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Tunables for the recommendation pipeline and the request surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub default_count: usize,
    pub max_count: usize,
    pub content_match_threshold: f64,
    pub collaborative_users_limit: usize,
    pub freshness_half_life_days: u32,
    /// Days ahead over which time proximity ramps down
    pub proximity_days_ahead: i64,
    pub similar_users_pool_limit: i64,
    /// Content-layer demotion for activities the user already engaged with
    pub content_repeat_factor: f64,
    /// Post-processing demotion per matching viewed/registered flag
    pub penalty_factor: f64,
    pub noise_factor: f64,
    pub view_logging_enabled: bool,
}

impl AppConfig {
    /// Fallback tracing directive when `RUST_LOG` is unset
    pub fn log_filter(&self) -> String {
        format!("{},actix_web=info", self.log_level)
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            default_count: 5,
            max_count: 20,
            content_match_threshold: 0.1,
            collaborative_users_limit: 5,
            freshness_half_life_days: 30,
            proximity_days_ahead: 30,
            similar_users_pool_limit: 500,
            content_repeat_factor: 0.5,
            penalty_factor: 0.7,
            noise_factor: 0.08,
            view_logging_enabled: true,
        }
    }
}

impl RecommendationConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_count == 0 || self.default_count == 0 || self.default_count > self.max_count {
            return Err(AppError::Configuration(format!(
                "RECOMMENDATION_DEFAULT_COUNT must be within 1..={}",
                self.max_count
            )));
        }
        if !(0.0..=1.0).contains(&self.content_match_threshold) {
            return Err(AppError::Configuration(
                "CONTENT_MATCH_THRESHOLD must be within [0, 1]".to_string(),
            ));
        }
        if self.freshness_half_life_days == 0 || self.collaborative_users_limit == 0 {
            return Err(AppError::Configuration(
                "FRESHNESS_HALF_LIFE_DAYS and COLLABORATIVE_USERS_LIMIT must be positive"
                    .to_string(),
            ));
        }
        for (name, factor) in [
            ("CONTENT_REPEAT_FACTOR", self.content_repeat_factor),
            ("PENALTY_FACTOR", self.penalty_factor),
        ] {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(AppError::Configuration(format!(
                    "{} must be within (0, 1]",
                    name
                )));
            }
        }
        if !(0.0..1.0).contains(&self.noise_factor) {
            return Err(AppError::Configuration(
                "NOISE_FACTOR must be within [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let defaults = RecommendationConfig::default();

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                host: env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("APP_PORT", 8012)?,
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|_| AppError::Configuration("DATABASE_URL must be set".to_string()))?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            recommendation: RecommendationConfig {
                default_count: env_or("RECOMMENDATION_DEFAULT_COUNT", defaults.default_count)?,
                max_count: env_or("RECOMMENDATION_MAX_COUNT", defaults.max_count)?,
                content_match_threshold: env_or(
                    "CONTENT_MATCH_THRESHOLD",
                    defaults.content_match_threshold,
                )?,
                collaborative_users_limit: env_or(
                    "COLLABORATIVE_USERS_LIMIT",
                    defaults.collaborative_users_limit,
                )?,
                freshness_half_life_days: env_or(
                    "FRESHNESS_HALF_LIFE_DAYS",
                    defaults.freshness_half_life_days,
                )?,
                proximity_days_ahead: env_or(
                    "PROXIMITY_DAYS_AHEAD",
                    defaults.proximity_days_ahead,
                )?,
                similar_users_pool_limit: env_or(
                    "SIMILAR_USERS_POOL_LIMIT",
                    defaults.similar_users_pool_limit,
                )?,
                content_repeat_factor: env_or(
                    "CONTENT_REPEAT_FACTOR",
                    defaults.content_repeat_factor,
                )?,
                penalty_factor: env_or("PENALTY_FACTOR", defaults.penalty_factor)?,
                noise_factor: env_or("NOISE_FACTOR", defaults.noise_factor)?,
                view_logging_enabled: env_or(
                    "VIEW_LOGGING_ENABLED",
                    defaults.view_logging_enabled,
                )?,
            },
        };

        config.recommendation.validate()?;
        Ok(config)
    }
}

/// Read and parse an env var, falling back to `default` when unset
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RecommendationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_factors() {
        let config = RecommendationConfig {
            penalty_factor: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Configuration(_))));

        let config = RecommendationConfig {
            noise_factor: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RecommendationConfig {
            default_count: 25,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_filter_uses_log_level() {
        let app = AppConfig {
            env: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8012,
            log_level: "debug".to_string(),
        };
        assert_eq!(app.log_filter(), "debug,actix_web=info");
    }

    #[test]
    fn test_env_or_parses_and_falls_back() {
        env::set_var("ACTIVITY_REC_TEST_LIMIT", " 42 ");
        assert_eq!(env_or("ACTIVITY_REC_TEST_LIMIT", 5usize).unwrap(), 42);

        env::set_var("ACTIVITY_REC_TEST_BAD", "abc");
        assert!(env_or("ACTIVITY_REC_TEST_BAD", 1.0f64).is_err());

        assert_eq!(env_or("ACTIVITY_REC_TEST_UNSET", 7u32).unwrap(), 7);
    }
}
