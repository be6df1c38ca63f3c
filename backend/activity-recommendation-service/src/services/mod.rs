pub mod collaborative;
pub mod content_filter;
pub mod engine;
pub mod freshness;
pub mod hotness;
pub mod post_processor;
pub mod profile;

pub use collaborative::CollaborativeLayer;
pub use content_filter::{ContentFilterLayer, ContentWeights};
pub use engine::{
    adjust_weights, explain, EngineConfig, LayerWeights, RecommendOptions, RecommendationEngine,
    Recommendations,
};
pub use freshness::FreshnessLayer;
pub use hotness::HotnessLayer;
pub use post_processor::{PostProcessConfig, PostProcessFlags, RecommendationPostProcessor};
pub use profile::{FeatureCount, PreferenceProfileBuilder, UserPreferenceProfile};

use crate::models::{ActivityCandidate, ScoreBreakdown};

/// A candidate as it moves through the layers, accumulating its breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct LayeredCandidate {
    pub activity: ActivityCandidate,
    /// Viewed or registered before this request
    pub previously_engaged: bool,
    pub breakdown: ScoreBreakdown,
}
