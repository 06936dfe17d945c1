use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    db::ContextHash,
    models::{MarketAwareRecommendation, RecommendationRecord, RequestContext},
    services::{
        adaptation::MarketAdaptationEngine,
        conversation::{respond, ResponseContext, ResponseGenerator, TemplateResponseGenerator},
        market_config::MarketConfigurationProvider,
        product_cache::MarketAwareProductCache,
        providers::{with_timeout, RecommendationSource},
    },
};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: String,
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Ask for a conversational message alongside the list
    #[serde(default)]
    pub conversational: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub market_id: String,
    pub recommendations: Vec<MarketAwareRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub from_cache: bool,
}

/// Everything that shapes a cached recommendation list
///
/// The query only feeds the conversational message, which is rebuilt on
/// every call, so it stays out of the hash.
#[derive(Serialize)]
struct CacheContext {
    limit: usize,
    sources: Vec<SourceContext>,
}

#[derive(Serialize)]
struct SourceContext {
    name: &'static str,
    weight: f64,
    managed: bool,
}

/// A base recommendation source and its blend weight
pub struct WeightedSource {
    pub source: Arc<dyn RecommendationSource>,
    pub weight: f64,
    /// Results come from the managed recommendation service
    pub managed: bool,
}

/// Blends base recommendation sources and localizes the result per market
///
/// Lists are cached per user, market and context hash. Failing sources are
/// skipped; with no usable source the response is an empty list.
pub struct HybridRecommender {
    sources: Vec<WeightedSource>,
    config: Arc<MarketConfigurationProvider>,
    engine: Arc<MarketAdaptationEngine>,
    cache: Arc<MarketAwareProductCache>,
    generator: Arc<dyn ResponseGenerator>,
    source_timeout: Duration,
}

impl HybridRecommender {
    pub fn new(
        config: Arc<MarketConfigurationProvider>,
        engine: Arc<MarketAdaptationEngine>,
        cache: Arc<MarketAwareProductCache>,
        source_timeout: Duration,
    ) -> Self {
        Self {
            sources: Vec::new(),
            config,
            engine,
            cache,
            generator: Arc::new(TemplateResponseGenerator),
            source_timeout,
        }
    }

    /// Adds a source; non-positive or non-finite weights are ignored
    pub fn with_source(mut self, source: Arc<dyn RecommendationSource>, weight: f64, managed: bool) -> Self {
        if weight.is_finite() && weight > 0.0 {
            self.sources.push(WeightedSource {
                source,
                weight: weight.min(1.0),
                managed,
            });
        } else {
            tracing::warn!(source = source.name(), weight = weight, "Ignoring source with invalid weight");
        }
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ResponseGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub async fn recommend(&self, request: &RecommendationRequest) -> RecommendationResponse {
        let market_id = self
            .config
            .detect_market(&RequestContext {
                market_id: request.market_id.clone(),
                country_code: request.country_code.clone(),
                user_id: Some(request.user_id.clone()),
            })
            .await;
        let limit = request.limit.clamp(1, MAX_LIMIT);

        let context = CacheContext {
            limit,
            sources: self
                .sources
                .iter()
                .map(|s| SourceContext {
                    name: s.source.name(),
                    weight: s.weight,
                    managed: s.managed,
                })
                .collect(),
        };
        let context_hash = match ContextHash::of(&context) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(error = %e, "Could not hash recommendation context, skipping cache");
                None
            }
        };

        if let Some(hash) = &context_hash {
            if let Some(mut cached) = self
                .cache
                .get_market_recommendations(&request.user_id, hash, &market_id)
                .await
            {
                for recommendation in &mut cached {
                    recommendation.market_factors.from_cache = true;
                }
                let message = self.message(request, &market_id, &cached).await;
                return RecommendationResponse {
                    market_id,
                    recommendations: cached,
                    message,
                    from_cache: true,
                };
            }
        }

        let (records, managed) = self.gather(&request.user_id, limit).await;
        let mut recommendations = self.engine.adapt(&records, &market_id).await;
        recommendations.truncate(limit);
        for recommendation in &mut recommendations {
            recommendation.market_factors.mcp_enhanced = managed.contains(&recommendation.product.id);
        }

        if let Some(hash) = &context_hash {
            if !recommendations.is_empty() {
                self.cache
                    .set_market_recommendations(&request.user_id, hash, &market_id, &recommendations, None)
                    .await;
            }
        }

        tracing::info!(
            user_id = %request.user_id,
            market_id = %market_id,
            count = recommendations.len(),
            "Recommendations generated"
        );

        let message = self.message(request, &market_id, &recommendations).await;
        RecommendationResponse {
            market_id,
            recommendations,
            message,
            from_cache: false,
        }
    }

    /// Merges every source's output, keeping the best weighted score per product
    ///
    /// Also returns the ids whose kept record came from a managed source.
    async fn gather(&self, user_id: &str, limit: usize) -> (Vec<RecommendationRecord>, HashSet<String>) {
        let mut merged: Vec<(RecommendationRecord, bool)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for weighted in &self.sources {
            let records = match with_timeout(self.source_timeout, weighted.source.recommend(user_id, limit)).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(source = weighted.source.name(), error = %e, "Recommendation source failed");
                    continue;
                }
            };

            for mut record in records {
                if !record.score.is_finite() {
                    continue;
                }
                record.score = (record.score * weighted.weight).clamp(0.0, 1.0);

                match positions.get(&record.product.id) {
                    Some(&index) => {
                        if record.score > merged[index].0.score {
                            merged[index] = (record, weighted.managed);
                        }
                    }
                    None => {
                        positions.insert(record.product.id.clone(), merged.len());
                        merged.push((record, weighted.managed));
                    }
                }
            }
        }

        let managed = merged
            .iter()
            .filter(|(_, managed)| *managed)
            .map(|(record, _)| record.product.id.clone())
            .collect();
        let records = merged.into_iter().map(|(record, _)| record).collect();
        (records, managed)
    }

    async fn message(
        &self,
        request: &RecommendationRequest,
        market_id: &str,
        recommendations: &[MarketAwareRecommendation],
    ) -> Option<String> {
        if !request.conversational {
            return None;
        }

        let market = self.config.get_market_config(market_id).await;
        let context = ResponseContext {
            query: request.query.as_deref(),
            market: &market,
            recommendations,
        };
        Some(respond(self.generator.as_ref(), &context, self.source_timeout).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Cache, MemoryStore};
    use crate::models::ProductRecord;
    use crate::services::pricing::ConversionTable;
    use crate::services::providers::{MockProductSource, SourceError};

    struct StaticSource {
        name: &'static str,
        items: Vec<(&'static str, f64)>,
    }

    #[async_trait::async_trait]
    impl RecommendationSource for StaticSource {
        async fn recommend(&self, _user_id: &str, _limit: usize) -> Result<Vec<RecommendationRecord>, SourceError> {
            Ok(self
                .items
                .iter()
                .map(|(id, score)| RecommendationRecord {
                    product: ProductRecord {
                        id: id.to_string(),
                        title: "Lamp".to_string(),
                        description: String::new(),
                        price: 20.0,
                        currency: "USD".to_string(),
                        available: true,
                        category: "home".to_string(),
                        images: Vec::new(),
                        rating: None,
                        review_count: None,
                        language: "en".to_string(),
                        margin: None,
                    },
                    score: *score,
                    reason: self.name.to_string(),
                })
                .collect())
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    struct DownSource;

    #[async_trait::async_trait]
    impl RecommendationSource for DownSource {
        async fn recommend(&self, _user_id: &str, _limit: usize) -> Result<Vec<RecommendationRecord>, SourceError> {
            Err(SourceError::Upstream("service unavailable".to_string()))
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    fn recommender() -> HybridRecommender {
        recommender_on(Cache::new(Arc::new(MemoryStore::new()), Duration::from_millis(250)))
    }

    fn recommender_on(cache: Cache) -> HybridRecommender {
        let config = Arc::new(MarketConfigurationProvider::new(
            cache.clone(),
            None,
            Duration::from_secs(1),
        ));
        let engine = Arc::new(MarketAdaptationEngine::new(config.clone(), ConversionTable::default()));
        let products = Arc::new(MarketAwareProductCache::new(
            cache,
            config.clone(),
            engine.clone(),
            Arc::new(MockProductSource::new()),
        ));
        HybridRecommender::new(config, engine, products, Duration::from_millis(200))
    }

    fn request(market_id: &str) -> RecommendationRequest {
        RecommendationRequest {
            user_id: "user-1".to_string(),
            market_id: Some(market_id.to_string()),
            country_code: None,
            query: None,
            limit: 10,
            conversational: false,
        }
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let recommender = recommender().with_source(
            Arc::new(StaticSource {
                name: "content",
                items: vec![("a", 0.9), ("b", 0.4)],
            }),
            1.0,
            false,
        );

        let first = recommender.recommend(&request("ES")).await;
        assert!(!first.from_cache);
        assert_eq!(first.market_id, "ES");
        assert_eq!(first.recommendations.len(), 2);
        assert!(first.recommendations.iter().all(|r| !r.market_factors.from_cache));

        let second = recommender.recommend(&request("ES")).await;
        assert!(second.from_cache);
        assert!(second.recommendations.iter().all(|r| r.market_factors.from_cache));

        // another market gets its own list
        assert!(!recommender.recommend(&request("MX")).await.from_cache);
    }

    #[tokio::test]
    async fn test_sources_are_blended_and_deduplicated() {
        let recommender = recommender()
            .with_source(
                Arc::new(StaticSource {
                    name: "content",
                    items: vec![("a", 0.9), ("b", 0.8)],
                }),
                0.5,
                false,
            )
            .with_source(
                Arc::new(StaticSource {
                    name: "managed",
                    items: vec![("b", 0.9), ("c", 0.2)],
                }),
                1.0,
                true,
            );

        let response = recommender.recommend(&request("US")).await;
        let ids: Vec<&str> = response
            .recommendations
            .iter()
            .map(|r| r.product.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        let b = &response.recommendations[0];
        assert_eq!(b.score, 0.9);
        assert!(b.market_factors.mcp_enhanced);
        assert!(!response.recommendations[1].market_factors.mcp_enhanced);
    }

    #[tokio::test]
    async fn test_failing_sources_yield_empty_list() {
        let recommender = recommender().with_source(Arc::new(DownSource), 1.0, true);

        let response = recommender.recommend(&request("CL")).await;
        assert!(response.recommendations.is_empty());
        assert!(!response.from_cache);
    }

    #[tokio::test]
    async fn test_limit_and_conversational_message() {
        let recommender = recommender().with_source(
            Arc::new(StaticSource {
                name: "content",
                items: vec![("a", 0.9), ("b", 0.8), ("c", 0.7)],
            }),
            1.0,
            false,
        );

        let mut req = request("US");
        req.limit = 2;
        req.conversational = true;

        let response = recommender.recommend(&req).await;
        assert_eq!(response.recommendations.len(), 2);
        assert!(response.message.unwrap().starts_with("We recommend: Lamp"));
    }

    #[tokio::test]
    async fn test_blend_weights_get_separate_cache_entries() {
        let cache = Cache::new(Arc::new(MemoryStore::new()), Duration::from_millis(250));
        let source = || {
            Arc::new(StaticSource {
                name: "content",
                items: vec![("a", 0.9)],
            })
        };
        let full = recommender_on(cache.clone()).with_source(source(), 1.0, false);
        let damped = recommender_on(cache).with_source(source(), 0.2, false);

        let first = full.recommend(&request("US")).await;
        assert_eq!(first.recommendations[0].score, 0.9);

        let second = damped.recommend(&request("US")).await;
        assert!(!second.from_cache);
        assert!((second.recommendations[0].score - 0.18).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_query_does_not_split_the_cache() {
        let recommender = recommender().with_source(
            Arc::new(StaticSource {
                name: "content",
                items: vec![("a", 0.9)],
            }),
            1.0,
            false,
        );

        let mut req = request("ES");
        req.query = Some("lamp".to_string());
        assert!(!recommender.recommend(&req).await.from_cache);

        req.query = Some("desk lamp".to_string());
        req.conversational = true;
        let response = recommender.recommend(&req).await;
        assert!(response.from_cache);
        assert!(response.message.unwrap().starts_with("Para \"desk lamp\""));
    }

    #[tokio::test]
    async fn test_managed_flag_follows_the_kept_record() {
        let recommender = recommender()
            .with_source(
                Arc::new(StaticSource {
                    name: "content",
                    items: vec![("b", 0.95)],
                }),
                1.0,
                false,
            )
            .with_source(
                Arc::new(StaticSource {
                    name: "managed",
                    items: vec![("b", 0.5)],
                }),
                1.0,
                true,
            );

        let response = recommender.recommend(&request("US")).await;
        assert_eq!(response.recommendations.len(), 1);
        assert_eq!(response.recommendations[0].score, 0.95);
        assert!(!response.recommendations[0].market_factors.mcp_enhanced);
    }

    #[test]
    fn test_invalid_weights_are_ignored() {
        let recommender = recommender()
            .with_source(Arc::new(DownSource), 0.0, false)
            .with_source(Arc::new(DownSource), f64::NAN, false);
        assert!(recommender.sources.is_empty());
    }
}
