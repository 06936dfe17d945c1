use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    db::{normalize_market_id, Cache, CacheKey, ContextHash, EntityKind, StoreError, GLOBAL_MARKET},
    models::{Market, MarketAwareRecommendation, MarketProduct, ProductRecord},
    services::{
        adaptation::{AdaptationError, MarketAdaptationEngine},
        market_config::MarketConfigurationProvider,
        providers::{with_timeout, ProductSource},
    },
};

pub mod stats;
pub mod ttl;

pub use stats::{CacheStats, CacheStatsSnapshot};
pub use ttl::{base_ttl, resolve_ttl};

/// Keys deleted per store round trip during invalidation
const DELETE_CHUNK: usize = 500;

/// Where a cached product was found
#[derive(Debug, Clone, PartialEq)]
pub enum ProductLookup {
    Market(MarketProduct),
    /// Found only in the cross-market slot; not yet adapted for the requested market
    Global(MarketProduct),
}

#[derive(thiserror::Error, Debug)]
pub enum LookupError {
    #[error("Not cached")]
    Miss,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Batching for cache warming
#[derive(Debug, Clone, Copy)]
pub struct WarmSettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub source_timeout: Duration,
}

impl Default for WarmSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_delay: Duration::from_millis(100),
            source_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarmReport {
    pub market_id: String,
    pub requested: usize,
    pub cached: usize,
    /// Products the source returned but that could not be adapted or written
    pub skipped: usize,
    pub failed_batches: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityCacheStats {
    pub key_count: usize,
    /// Remaining TTL of one sampled key
    pub sample_ttl: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketCacheStats {
    pub market_id: String,
    pub entities: BTreeMap<EntityKind, EntityCacheStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsReport {
    #[serde(flatten)]
    pub totals: CacheStatsSnapshot,
    pub store_errors: u64,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<MarketCacheStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Empty,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    pub backend: &'static str,
    pub markets_with_keys: Vec<String>,
    pub store_errors: u64,
    pub checked_at: DateTime<Utc>,
}

/// Product and recommendation cache segmented by market
///
/// Product reads cascade from the market slot to the global slot, adapting and
/// promoting global entries on the way. None of the public operations fail:
/// store problems read as misses, writes report `false`.
pub struct MarketAwareProductCache {
    cache: Cache,
    config: Arc<MarketConfigurationProvider>,
    engine: Arc<MarketAdaptationEngine>,
    source: Arc<dyn ProductSource>,
    stats: CacheStats,
    warm: WarmSettings,
}

impl MarketAwareProductCache {
    pub fn new(
        cache: Cache,
        config: Arc<MarketConfigurationProvider>,
        engine: Arc<MarketAdaptationEngine>,
        source: Arc<dyn ProductSource>,
    ) -> Self {
        Self {
            cache,
            config,
            engine,
            source,
            stats: CacheStats::new(),
            warm: WarmSettings::default(),
        }
    }

    pub fn with_warm_settings(mut self, warm: WarmSettings) -> Self {
        self.warm = WarmSettings {
            batch_size: warm.batch_size.max(1),
            ..warm
        };
        self
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    async fn ttl_for(&self, market_id: &str, kind: EntityKind, explicit: Option<u64>) -> u64 {
        let config = self.config.get_market_config(market_id).await;
        resolve_ttl(market_id, kind, &config.cache_ttl, explicit)
    }

    pub async fn get_market_product(&self, product_id: &str, market_id: &str) -> Option<MarketProduct> {
        match self.lookup_product(product_id, market_id).await {
            Ok(ProductLookup::Market(product)) => {
                self.stats.record_hit();
                tracing::debug!(product_id = %product_id, market_id = %market_id, "Product cache hit");
                Some(product)
            }
            Ok(ProductLookup::Global(global)) => {
                match self.promote(product_id, market_id, &global).await {
                    Ok(product) => {
                        self.stats.record_hit();
                        tracing::debug!(product_id = %product_id, market_id = %market_id, "Product served from global slot");
                        Some(product)
                    }
                    Err(e) => {
                        self.stats.record_miss();
                        tracing::debug!(
                            product_id = %product_id,
                            market_id = %market_id,
                            error = %e,
                            "Global entry could not be adapted"
                        );
                        None
                    }
                }
            }
            Err(LookupError::Miss) => {
                self.stats.record_miss();
                tracing::debug!(product_id = %product_id, market_id = %market_id, "Product cache miss");
                None
            }
            Err(LookupError::Store(e)) => {
                self.stats.record_miss();
                tracing::warn!(product_id = %product_id, market_id = %market_id, error = %e, "Product lookup degraded to miss");
                None
            }
        }
    }

    /// Read phase: market slot, then the global slot. No writes.
    pub async fn lookup_product(
        &self,
        product_id: &str,
        market_id: &str,
    ) -> Result<ProductLookup, LookupError> {
        let market_key = CacheKey::product(market_id, product_id).to_string();
        if let Some(product) = self.cache.try_get::<MarketProduct>(&market_key).await? {
            return Ok(ProductLookup::Market(product));
        }

        if normalize_market_id(market_id) != GLOBAL_MARKET {
            let global_key = CacheKey::global_product(product_id).to_string();
            if let Some(product) = self.cache.try_get::<MarketProduct>(&global_key).await? {
                return Ok(ProductLookup::Global(product));
            }
        }

        Err(LookupError::Miss)
    }

    /// Write phase: adapts a global entry for `market_id` and stores it in the market slot
    ///
    /// A failed write is logged and the adapted product is still returned.
    pub async fn promote(
        &self,
        product_id: &str,
        market_id: &str,
        global: &MarketProduct,
    ) -> Result<MarketProduct, AdaptationError> {
        let adapted = self
            .engine
            .adapt_product(&ProductRecord::from(global), market_id)
            .await?;

        let key = CacheKey::product(market_id, product_id).to_string();
        let ttl = self.ttl_for(market_id, EntityKind::Product, None).await;
        if self.cache.set(&key, &adapted, ttl).await {
            self.stats.record_set();
        } else {
            tracing::warn!(key = %key, "Failed to promote global product into market slot");
        }

        Ok(adapted)
    }

    /// Stores a product for a market and refreshes the global slot at twice the TTL
    ///
    /// Returns whether the market-specific write succeeded.
    pub async fn set_market_product(
        &self,
        product_id: &str,
        market_id: &str,
        product: &MarketProduct,
        ttl_override: Option<u64>,
    ) -> bool {
        let ttl = self.ttl_for(market_id, EntityKind::Product, ttl_override).await;

        let key = CacheKey::product(market_id, product_id).to_string();
        let stored = self.cache.set(&key, product, ttl).await;
        if stored {
            self.stats.record_set();
        }

        if normalize_market_id(market_id) != GLOBAL_MARKET {
            let global_key = CacheKey::global_product(product_id).to_string();
            if !self.cache.set(&global_key, product, ttl.saturating_mul(2)).await {
                tracing::warn!(key = %global_key, "Failed to refresh global product slot");
            }
        }

        tracing::debug!(product_id = %product_id, market_id = %market_id, ttl = ttl, stored = stored, "Cached product");
        stored
    }

    pub async fn get_market_recommendations(
        &self,
        user_id: &str,
        context_hash: &ContextHash,
        market_id: &str,
    ) -> Option<Vec<MarketAwareRecommendation>> {
        let key = CacheKey::recommendations(market_id, user_id, context_hash.clone()).to_string();

        match self.cache.get::<Vec<MarketAwareRecommendation>>(&key).await {
            Some(recommendations) => {
                self.stats.record_hit();
                tracing::debug!(key = %key, count = recommendations.len(), "Recommendation cache hit");
                Some(recommendations)
            }
            None => {
                self.stats.record_miss();
                tracing::debug!(key = %key, "Recommendation cache miss");
                None
            }
        }
    }

    /// Recommendation lists have no global fallback; they are tied to one market
    pub async fn set_market_recommendations(
        &self,
        user_id: &str,
        context_hash: &ContextHash,
        market_id: &str,
        recommendations: &[MarketAwareRecommendation],
        ttl_override: Option<u64>,
    ) -> bool {
        let key = CacheKey::recommendations(market_id, user_id, context_hash.clone()).to_string();
        let ttl = self
            .ttl_for(market_id, EntityKind::Recommendations, ttl_override)
            .await;

        let stored = self.cache.set(&key, &recommendations, ttl).await;
        if stored {
            self.stats.record_set();
        }
        stored
    }

    async fn delete_keys(&self, keys: &[String]) -> u64 {
        let mut deleted = 0;
        for chunk in keys.chunks(DELETE_CHUNK) {
            deleted += self.cache.delete(chunk).await;
        }
        deleted
    }

    /// Deletes every key of a market, or only one entity kind of it
    pub async fn invalidate_market(&self, market_id: &str, kind: Option<EntityKind>) -> u64 {
        let mut keys = Vec::new();
        for pattern in CacheKey::market_patterns(market_id, kind) {
            keys.extend(self.cache.scan_keys(&pattern, None).await);
        }
        let deleted = self.delete_keys(&keys).await;
        self.stats.record_invalidations(deleted);

        tracing::info!(market_id = %market_id, kind = ?kind, deleted = deleted, "Invalidated market cache");
        deleted
    }

    /// Deletes one market's entry for a product, or every market's (global included)
    pub async fn invalidate_product(&self, product_id: &str, market_id: Option<&str>) -> u64 {
        let keys = match market_id {
            Some(market_id) => vec![CacheKey::product(market_id, product_id).to_string()],
            None => {
                self.cache
                    .scan_keys(&CacheKey::product_pattern(product_id), None)
                    .await
            }
        };

        let deleted = self.delete_keys(&keys).await;
        self.stats.record_invalidations(deleted);

        tracing::info!(product_id = %product_id, market_id = ?market_id, deleted = deleted, "Invalidated product");
        deleted
    }

    pub async fn get_cache_stats(&self, market_id: Option<&str>) -> CacheStatsReport {
        let market = match market_id {
            Some(market_id) => Some(self.market_stats(market_id).await),
            None => None,
        };

        CacheStatsReport {
            totals: self.stats.snapshot(),
            store_errors: self.cache.error_count(),
            backend: self.cache.backend(),
            market,
        }
    }

    async fn market_stats(&self, market_id: &str) -> MarketCacheStats {
        let mut entities = BTreeMap::new();

        for kind in EntityKind::ALL {
            let keys = self
                .cache
                .scan_keys(&CacheKey::market_pattern(market_id, kind), None)
                .await;
            let sample_ttl = match keys.first() {
                Some(key) => self.cache.ttl(key).await,
                None => None,
            };
            entities.insert(
                kind,
                EntityCacheStats {
                    key_count: keys.len(),
                    sample_ttl,
                },
            );
        }

        MarketCacheStats {
            market_id: normalize_market_id(market_id),
            entities,
        }
    }

    /// Fetches, adapts and caches `priority_products` in batches
    ///
    /// A failed batch is logged and skipped; warming never fails as a whole.
    pub async fn warm_cache_for_market(&self, market_id: &str, priority_products: &[String]) -> WarmReport {
        let mut seen = HashSet::new();
        let ids: Vec<String> = priority_products
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .map(str::to_string)
            .collect();

        let mut report = WarmReport {
            market_id: normalize_market_id(market_id),
            requested: ids.len(),
            ..WarmReport::default()
        };

        tracing::info!(
            market_id = %report.market_id,
            products = ids.len(),
            batch_size = self.warm.batch_size,
            "Warming market cache"
        );

        for (index, batch) in ids.chunks(self.warm.batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.warm.batch_delay).await;
            }

            let records = match with_timeout(self.warm.source_timeout, self.source.get_products(batch)).await {
                Ok(records) => records,
                Err(e) => {
                    report.failed_batches += 1;
                    tracing::warn!(
                        market_id = %report.market_id,
                        batch = index,
                        size = batch.len(),
                        error = %e,
                        "Warm batch failed, continuing"
                    );
                    continue;
                }
            };

            for record in records {
                match self.engine.adapt_product(&record, market_id).await {
                    Ok(product) => {
                        if self.set_market_product(&product.id, market_id, &product, None).await {
                            report.cached += 1;
                        } else {
                            report.skipped += 1;
                        }
                    }
                    Err(e) => {
                        report.skipped += 1;
                        tracing::debug!(product_id = %record.id, error = %e, "Skipping product during warm");
                    }
                }
            }
        }

        tracing::info!(
            market_id = %report.market_id,
            cached = report.cached,
            skipped = report.skipped,
            failed_batches = report.failed_batches,
            "Market cache warm finished"
        );

        report
    }

    pub async fn health_check(&self) -> CacheHealth {
        let reachable = self.cache.ping().await;

        let mut markets_with_keys = Vec::new();
        if reachable {
            let markets = Market::ALL
                .iter()
                .map(|market| market.id())
                .chain(std::iter::once(GLOBAL_MARKET));
            for market_id in markets {
                for pattern in CacheKey::market_patterns(market_id, None) {
                    if !self.cache.scan_keys(&pattern, Some(1)).await.is_empty() {
                        markets_with_keys.push(normalize_market_id(market_id));
                        break;
                    }
                }
            }
        }

        let status = match (reachable, markets_with_keys.is_empty()) {
            (false, _) => HealthStatus::Unhealthy,
            (true, true) => HealthStatus::Empty,
            (true, false) => HealthStatus::Healthy,
        };

        if status == HealthStatus::Unhealthy {
            tracing::warn!(backend = self.cache.backend(), "Cache store unreachable");
        }

        CacheHealth {
            status,
            backend: self.cache.backend(),
            markets_with_keys,
            store_errors: self.cache.error_count(),
            checked_at: Utc::now(),
        }
    }
}
