pub mod recommendation;

pub use recommendation::{
    health, recommend_debug, recommend_for_me, RecommendationHandlerState, USER_ID_HEADER,
};

use actix_web::web;

/// Register every route served by this service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(recommend_for_me)
        .service(recommend_debug)
        .service(health)
        .service(crate::metrics::metrics_handler);
}
