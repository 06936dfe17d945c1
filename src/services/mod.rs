pub mod adaptation;
pub mod conversation;
pub mod market_config;
pub mod pricing;
pub mod product_cache;
pub mod products;
pub mod providers;
pub mod recommendations;
pub mod signals;

pub use adaptation::{AdaptationError, MarketAdaptationEngine};
pub use conversation::{ResponseGenerator, TemplateResponseGenerator};
pub use market_config::MarketConfigurationProvider;
pub use pricing::ConversionTable;
pub use product_cache::{MarketAwareProductCache, WarmSettings};
pub use products::ProductService;
pub use recommendations::{HybridRecommender, RecommendationRequest, RecommendationResponse};
