use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::{
    db::normalize_market_id,
    models::{
        MarketAwareRecommendation, MarketConfiguration, MarketFactors, MarketProduct,
        ProductRecord, RecommendationRecord,
    },
    services::{
        market_config::MarketConfigurationProvider,
        pricing::{landed_price, ConversionTable},
        providers::AvailabilityOracle,
        signals::{GlossaryLocalizer, PopularitySource, RatingPopularity, TextLocalizer},
    },
};

/// Viability at a market score of zero; it rises linearly to 1.0
const VIABILITY_FLOOR: f64 = 0.6;

const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_millis(500);

/// Why a single item could not be adapted
#[derive(thiserror::Error, Debug)]
pub enum AdaptationError {
    #[error("Invalid base price: {0}")]
    InvalidPrice(f64),

    #[error("Invalid relevance score: {0}")]
    InvalidScore(f64),

    #[error("Product {product_id} is not available in {market_id}")]
    Unavailable {
        product_id: String,
        market_id: String,
    },

    #[error("No usable conversion rate from {from} to {to}")]
    Conversion { from: String, to: String },
}

/// Turns market-agnostic recommendations into localized, ranked ones
///
/// Per item: availability check, landed price, market-weighted score, optional
/// text localization, metadata. Items that fail any step are dropped from the
/// output rather than shown with a broken price.
pub struct MarketAdaptationEngine {
    config: Arc<MarketConfigurationProvider>,
    rates: ConversionTable,
    availability: Option<Arc<dyn AvailabilityOracle>>,
    popularity: Arc<dyn PopularitySource>,
    localizer: Arc<dyn TextLocalizer>,
    oracle_timeout: Duration,
}

impl MarketAdaptationEngine {
    pub fn new(config: Arc<MarketConfigurationProvider>, rates: ConversionTable) -> Self {
        Self {
            config,
            rates,
            availability: None,
            popularity: Arc::new(RatingPopularity::default()),
            localizer: Arc::new(GlossaryLocalizer),
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    pub fn with_availability(mut self, oracle: Arc<dyn AvailabilityOracle>) -> Self {
        self.availability = Some(oracle);
        self
    }

    pub fn with_popularity(mut self, source: Arc<dyn PopularitySource>) -> Self {
        self.popularity = source;
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn TextLocalizer>) -> Self {
        self.localizer = localizer;
        self
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Adapts and ranks a recommendation list for a market
    ///
    /// The result is sorted by `market_score`, highest first; the sort is
    /// stable so ties keep their input order.
    pub async fn adapt(
        &self,
        recommendations: &[RecommendationRecord],
        market_id: &str,
    ) -> Vec<MarketAwareRecommendation> {
        let market_id = normalize_market_id(market_id);
        let config = self.config.get_market_config(&market_id).await;

        let mut adapted = Vec::with_capacity(recommendations.len());
        for record in recommendations {
            match self.adapt_item(record, &market_id, &config).await {
                Ok(item) => adapted.push(item),
                Err(e) => {
                    tracing::debug!(
                        product_id = %record.product.id,
                        market_id = %market_id,
                        error = %e,
                        "Dropping recommendation that failed adaptation"
                    );
                }
            }
        }

        adapted.sort_by(|a, b| {
            b.market_score
                .partial_cmp(&a.market_score)
                .unwrap_or(Ordering::Equal)
        });

        tracing::debug!(
            market_id = %market_id,
            input = recommendations.len(),
            output = adapted.len(),
            "Adapted recommendations"
        );

        adapted
    }

    /// Localizes a single product for a market
    pub async fn adapt_product(
        &self,
        record: &ProductRecord,
        market_id: &str,
    ) -> Result<MarketProduct, AdaptationError> {
        let market_id = normalize_market_id(market_id);
        let config = self.config.get_market_config(&market_id).await;
        self.localize_product(record, &market_id, &config).await
    }

    async fn adapt_item(
        &self,
        record: &RecommendationRecord,
        market_id: &str,
        config: &MarketConfiguration,
    ) -> Result<MarketAwareRecommendation, AdaptationError> {
        if !record.score.is_finite() {
            return Err(AdaptationError::InvalidScore(record.score));
        }

        let product = self.localize_product(&record.product, market_id, config).await?;

        let popularity = self.popularity.popularity(&record.product, market_id).await;
        let market_score = market_score(record.score, popularity, record.product.margin, config);

        Ok(MarketAwareRecommendation {
            product,
            score: record.score,
            market_score,
            reason: record.reason.clone(),
            market_factors: MarketFactors {
                market_id: market_id.to_string(),
                currency: config.currency.clone(),
                adapted_at: Utc::now(),
                from_cache: false,
                mcp_enhanced: false,
            },
            viability_score: viability_score(market_score),
        })
    }

    async fn localize_product(
        &self,
        record: &ProductRecord,
        market_id: &str,
        config: &MarketConfiguration,
    ) -> Result<MarketProduct, AdaptationError> {
        if !record.available || !self.is_available(&record.id, market_id).await {
            return Err(AdaptationError::Unavailable {
                product_id: record.id.clone(),
                market_id: market_id.to_string(),
            });
        }

        let market_price = landed_price(record.price, &record.currency, config, &self.rates)?;

        let (localized_title, localized_description) = if record.language != config.language {
            let title = self
                .localizer
                .localize(&record.title, &record.language, &config.language)
                .await;
            let description = if record.description.is_empty() {
                None
            } else {
                self.localizer
                    .localize(&record.description, &record.language, &config.language)
                    .await
            };
            (title, description)
        } else {
            (None, None)
        };

        Ok(MarketProduct {
            id: record.id.clone(),
            title: record.title.clone(),
            localized_title,
            description: record.description.clone(),
            localized_description,
            base_price: record.price,
            base_currency: record.currency.to_ascii_uppercase(),
            market_price,
            currency: config.currency.clone(),
            availability: true,
            category: record.category.clone(),
            images: record.images.clone(),
            rating: record.rating,
            review_count: record.review_count,
            language: record.language.clone(),
            margin: record.margin,
        })
    }

    /// Asks the oracle, treating a slow or failing oracle as "available"
    async fn is_available(&self, product_id: &str, market_id: &str) -> bool {
        let Some(oracle) = &self.availability else {
            return true;
        };

        match tokio::time::timeout(self.oracle_timeout, oracle.is_available(product_id, market_id))
            .await
        {
            Ok(Ok(available)) => available,
            Ok(Err(e)) => {
                tracing::warn!(product_id = %product_id, error = %e, "Availability oracle failed, assuming available");
                true
            }
            Err(_) => {
                tracing::warn!(product_id = %product_id, "Availability oracle timed out, assuming available");
                true
            }
        }
    }
}

/// Market-weighted blend of relevance, popularity and (when known) margin, in [0, 1]
pub fn market_score(
    base_score: f64,
    popularity: f64,
    margin: Option<f64>,
    config: &MarketConfiguration,
) -> f64 {
    let weights = &config.scoring_weights;
    let popularity = if popularity.is_finite() { popularity } else { 0.0 };
    let margin_term = margin
        .filter(|m| m.is_finite())
        .map(|m| m.clamp(0.0, 1.0) * weights.profit_margin)
        .unwrap_or(0.0);

    let score = base_score * weights.relevance + popularity * weights.popularity + margin_term;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else if score > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Sales viability in [0, 1], increasing with the market score
pub fn viability_score(market_score: f64) -> f64 {
    (VIABILITY_FLOOR + (1.0 - VIABILITY_FLOOR) * market_score.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Cache, MemoryStore};
    use crate::models::Market;
    use crate::services::market_config::static_market_config;
    use crate::services::providers::SourceError;

    /// Popularity fixed per product id, for predictable rankings
    struct FixedPopularity(f64);

    #[async_trait::async_trait]
    impl PopularitySource for FixedPopularity {
        async fn popularity(&self, _product: &ProductRecord, _market_id: &str) -> f64 {
            self.0
        }
    }

    struct DenyList(Vec<String>);

    #[async_trait::async_trait]
    impl AvailabilityOracle for DenyList {
        async fn is_available(&self, product_id: &str, _market_id: &str) -> Result<bool, SourceError> {
            Ok(!self.0.iter().any(|id| id == product_id))
        }
    }

    struct SlowOracle;

    #[async_trait::async_trait]
    impl AvailabilityOracle for SlowOracle {
        async fn is_available(&self, _product_id: &str, _market_id: &str) -> Result<bool, SourceError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(false)
        }
    }

    fn provider() -> Arc<MarketConfigurationProvider> {
        let cache = Cache::new(Arc::new(MemoryStore::new()), Duration::from_millis(250));
        Arc::new(MarketConfigurationProvider::new(cache, None, Duration::from_secs(1)))
    }

    fn engine() -> MarketAdaptationEngine {
        MarketAdaptationEngine::new(provider(), ConversionTable::default())
            .with_popularity(Arc::new(FixedPopularity(0.5)))
    }

    fn record(id: &str, price: f64, score: f64) -> RecommendationRecord {
        RecommendationRecord {
            product: ProductRecord {
                id: id.to_string(),
                title: "Black Shirt".to_string(),
                description: "Cotton shirt".to_string(),
                price,
                currency: "USD".to_string(),
                available: true,
                category: "apparel".to_string(),
                images: vec![format!("https://cdn.example.com/{}.jpg", id)],
                rating: Some(4.0),
                review_count: Some(10),
                language: "en".to_string(),
                margin: None,
            },
            score,
            reason: "similar to recent views".to_string(),
        }
    }

    #[tokio::test]
    async fn test_adapt_sorts_by_market_score_descending() {
        let records = vec![
            record("low", 10.0, 0.1),
            record("high", 10.0, 0.9),
            record("mid", 10.0, 0.5),
        ];

        let adapted = engine().adapt(&records, "US").await;
        let ids: Vec<&str> = adapted.iter().map(|r| r.product.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);

        for pair in adapted.windows(2) {
            assert!(pair[0].market_score >= pair[1].market_score);
        }
    }

    #[tokio::test]
    async fn test_adapt_ties_keep_input_order() {
        let records = vec![
            record("first", 10.0, 0.4),
            record("second", 10.0, 0.4),
            record("third", 10.0, 0.4),
        ];

        let adapted = engine().adapt(&records, "ES").await;
        let ids: Vec<&str> = adapted.iter().map(|r| r.product.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_adapt_drops_broken_items() {
        let records = vec![
            record("ok", 10.0, 0.5),
            record("no-price", 0.0, 0.5),
            record("nan-score", 10.0, f64::NAN),
            record("negative", -3.0, 0.9),
        ];

        let adapted = engine().adapt(&records, "MX").await;
        assert_eq!(adapted.len(), 1);
        assert_eq!(adapted[0].product.id, "ok");
    }

    #[tokio::test]
    async fn test_adapt_prices_for_mexico() {
        let adapted = engine().adapt(&[record("sku-1", 100.0, 0.5)], "MX").await;
        let product = &adapted[0].product;

        assert_eq!(product.market_price, 2087.99);
        assert_eq!(product.currency, "MXN");
        assert_eq!(product.base_price, 100.0);
        assert_eq!(adapted[0].market_factors.market_id, "MX");
        assert_eq!(adapted[0].market_factors.currency, "MXN");
    }

    #[tokio::test]
    async fn test_localization_only_when_language_differs() {
        let engine = engine();

        let us = engine.adapt(&[record("sku-1", 10.0, 0.5)], "US").await;
        assert_eq!(us[0].product.localized_title, None);
        assert_eq!(us[0].product.localized_description, None);

        let es = engine.adapt(&[record("sku-1", 10.0, 0.5)], "ES").await;
        assert_eq!(es[0].product.localized_title, Some("Negro Camisa".to_string()));
        assert_eq!(es[0].product.localized_description, Some("Algodón camisa".to_string()));
    }

    #[tokio::test]
    async fn test_unavailable_items_are_skipped() {
        let engine = engine().with_availability(Arc::new(DenyList(vec!["blocked".to_string()])));

        let mut hidden = record("hidden", 10.0, 0.5);
        hidden.product.available = false;

        let adapted = engine
            .adapt(&[record("blocked", 10.0, 0.9), record("open", 10.0, 0.5), hidden], "US")
            .await;
        assert_eq!(adapted.len(), 1);
        assert_eq!(adapted[0].product.id, "open");
    }

    #[tokio::test]
    async fn test_slow_oracle_counts_as_available() {
        let engine = engine()
            .with_availability(Arc::new(SlowOracle))
            .with_oracle_timeout(Duration::from_millis(10));

        let adapted = engine.adapt(&[record("sku-1", 10.0, 0.5)], "US").await;
        assert_eq!(adapted.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_market_uses_default_config() {
        let adapted = engine().adapt(&[record("sku-1", 10.0, 0.5)], "BR").await;
        assert_eq!(adapted[0].market_factors.market_id, "BR");
        assert_eq!(adapted[0].product.currency, "USD");
    }

    #[test]
    fn test_market_score_is_clamped() {
        let config = static_market_config(Market::Us);
        assert_eq!(market_score(50.0, 40.0, Some(3.0), &config), 1.0);
        assert_eq!(market_score(-50.0, -1.0, None, &config), 0.0);
        assert_eq!(market_score(f64::INFINITY, 0.5, None, &config), 1.0);
        assert_eq!(market_score(0.5, f64::NAN, None, &config), 0.25);
    }

    #[test]
    fn test_market_score_blend() {
        let config = static_market_config(Market::Us);
        // 0.8 * 0.5 + 0.6 * 0.3 = 0.58
        assert!((market_score(0.8, 0.6, None, &config) - 0.58).abs() < 1e-9);
        // plus margin 0.5 * 0.2
        assert!((market_score(0.8, 0.6, Some(0.5), &config) - 0.68).abs() < 1e-9);
    }

    #[test]
    fn test_viability_is_monotonic_and_bounded() {
        assert_eq!(viability_score(0.0), VIABILITY_FLOOR);
        assert!((viability_score(0.5) - 0.8).abs() < 1e-9);
        assert_eq!(viability_score(1.0), 1.0);
        assert!(viability_score(0.7) > viability_score(0.6));
        assert_eq!(viability_score(7.0), 1.0);
    }
}
