use std::sync::Arc;
use std::time::Duration;

use crate::{
    models::MarketProduct,
    services::{
        adaptation::MarketAdaptationEngine,
        product_cache::MarketAwareProductCache,
        providers::{with_timeout, ProductSource},
    },
};

/// Market product lookups backed by the cache and the catalog
pub struct ProductService {
    cache: Arc<MarketAwareProductCache>,
    source: Arc<dyn ProductSource>,
    engine: Arc<MarketAdaptationEngine>,
    source_timeout: Duration,
}

impl ProductService {
    pub fn new(
        cache: Arc<MarketAwareProductCache>,
        source: Arc<dyn ProductSource>,
        engine: Arc<MarketAdaptationEngine>,
        source_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            engine,
            source_timeout,
        }
    }

    /// Fetches a product localized for a market
    ///
    /// Cache first; on a miss the catalog is asked and the adapted product is
    /// cached. Any failure along the way means "not found".
    pub async fn get_product(&self, product_id: &str, market_id: &str) -> Option<MarketProduct> {
        if let Some(product) = self.cache.get_market_product(product_id, market_id).await {
            return Some(product);
        }

        let ids = [product_id.to_string()];
        let records = match with_timeout(self.source_timeout, self.source.get_products(&ids)).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    product_id = %product_id,
                    source = self.source.name(),
                    error = %e,
                    "Product source failed"
                );
                return None;
            }
        };

        let record = records.into_iter().find(|r| r.id == product_id)?;

        match self.engine.adapt_product(&record, market_id).await {
            Ok(product) => {
                self.cache
                    .set_market_product(product_id, market_id, &product, None)
                    .await;
                Some(product)
            }
            Err(e) => {
                tracing::debug!(product_id = %product_id, market_id = %market_id, error = %e, "Product not sellable in market");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Cache, MemoryStore};
    use crate::models::ProductRecord;
    use crate::services::market_config::MarketConfigurationProvider;
    use crate::services::pricing::ConversionTable;
    use crate::services::providers::{MockProductSource, SourceError};

    fn record(id: &str) -> ProductRecord {
        ProductRecord {
            id: id.to_string(),
            title: "Chair".to_string(),
            description: String::new(),
            price: 50.0,
            currency: "USD".to_string(),
            available: true,
            category: "home".to_string(),
            images: Vec::new(),
            rating: None,
            review_count: None,
            language: "en".to_string(),
            margin: None,
        }
    }

    fn service(source: MockProductSource) -> (ProductService, Arc<MarketAwareProductCache>) {
        let cache = Cache::new(Arc::new(MemoryStore::new()), Duration::from_millis(250));
        let config = Arc::new(MarketConfigurationProvider::new(
            cache.clone(),
            None,
            Duration::from_secs(1),
        ));
        let engine = Arc::new(MarketAdaptationEngine::new(config.clone(), ConversionTable::default()));
        let source: Arc<dyn ProductSource> = Arc::new(source);
        let products = Arc::new(MarketAwareProductCache::new(
            cache,
            config,
            engine.clone(),
            source.clone(),
        ));

        (
            ProductService::new(products.clone(), source, engine, Duration::from_millis(200)),
            products,
        )
    }

    #[tokio::test]
    async fn test_miss_fetches_adapts_and_caches() {
        let mut source = MockProductSource::new();
        source
            .expect_get_products()
            .times(1)
            .returning(|ids: &[String]| Ok(ids.iter().map(|id| record(id)).collect()));

        let (service, products) = service(source);

        let first = service.get_product("chair-1", "ES").await.unwrap();
        assert_eq!(first.currency, "EUR");

        // second call is served from the cache; the mock allows one fetch only
        let second = service.get_product("chair-1", "ES").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(products.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_source_failure_is_not_found() {
        let mut source = MockProductSource::new();
        source
            .expect_get_products()
            .returning(|_: &[String]| Err(SourceError::Upstream("502".to_string())));
        source.expect_name().return_const("mock");

        let (service, _) = service(source);
        assert_eq!(service.get_product("chair-1", "US").await, None);
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let mut source = MockProductSource::new();
        source
            .expect_get_products()
            .returning(|_: &[String]| Ok(Vec::new()));

        let (service, _) = service(source);
        assert_eq!(service.get_product("missing", "MX").await, None);
    }
}
