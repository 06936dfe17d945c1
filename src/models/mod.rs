mod market;
mod product;
mod recommendation;

pub use market::{
    LocalizationPreferences, Market, MarketConfiguration, PriceRounding, RequestContext,
    ScoringWeights, TtlOverrides,
};
pub use product::{MarketProduct, ProductRecord};
pub use recommendation::{MarketAwareRecommendation, MarketFactors, RecommendationRecord};
