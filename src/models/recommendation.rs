use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MarketProduct, ProductRecord};

/// Raw, market-agnostic recommendation from a base source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub product: ProductRecord,
    /// Relevance in [0, 1]
    pub score: f64,
    #[serde(default)]
    pub reason: String,
}

/// Metadata attached during adaptation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketFactors {
    pub market_id: String,
    pub currency: String,
    pub adapted_at: DateTime<Utc>,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default)]
    pub mcp_enhanced: bool,
}

/// A scored recommendation localized for one market
///
/// Lists of these are ranked by `market_score`, highest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAwareRecommendation {
    pub product: MarketProduct,
    pub score: f64,
    pub market_score: f64,
    pub reason: String,
    pub market_factors: MarketFactors,
    pub viability_score: f64,
}
