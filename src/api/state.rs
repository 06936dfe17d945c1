use std::sync::Arc;

use crate::{
    config::Config,
    db::{Cache, KeyValueStore},
    services::{
        providers::{ProductSource, RecommendationSource},
        ConversionTable, HybridRecommender, MarketAdaptationEngine, MarketAwareProductCache,
        MarketConfigurationProvider, ProductService, WarmSettings,
    },
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub markets: Arc<MarketConfigurationProvider>,
    pub cache: Arc<MarketAwareProductCache>,
    pub products: Arc<ProductService>,
    pub recommender: Arc<HybridRecommender>,
}

impl AppState {
    /// Wires the services over a store and the upstream collaborators
    ///
    /// Each recommendation source comes with its blend weight and whether it is
    /// the managed service.
    pub fn new(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        product_source: Arc<dyn ProductSource>,
        recommendation_sources: Vec<(Arc<dyn RecommendationSource>, f64, bool)>,
    ) -> Self {
        let cache = Cache::new(store, config.store_timeout());

        let markets = Arc::new(MarketConfigurationProvider::new(
            cache.clone(),
            config.market_config_dir.clone(),
            config.source_timeout(),
        ));
        let engine = Arc::new(MarketAdaptationEngine::new(
            markets.clone(),
            ConversionTable::default(),
        ));

        let product_cache = Arc::new(
            MarketAwareProductCache::new(
                cache,
                markets.clone(),
                engine.clone(),
                product_source.clone(),
            )
            .with_warm_settings(WarmSettings {
                batch_size: config.warm_batch_size,
                batch_delay: config.warm_batch_delay(),
                source_timeout: config.source_timeout(),
            }),
        );

        let products = Arc::new(ProductService::new(
            product_cache.clone(),
            product_source,
            engine.clone(),
            config.source_timeout(),
        ));

        let recommender = recommendation_sources.into_iter().fold(
            HybridRecommender::new(
                markets.clone(),
                engine,
                product_cache.clone(),
                config.source_timeout(),
            ),
            |recommender, (source, weight, managed)| recommender.with_source(source, weight, managed),
        );

        Self {
            markets,
            cache: product_cache,
            products,
            recommender: Arc::new(recommender),
        }
    }
}
