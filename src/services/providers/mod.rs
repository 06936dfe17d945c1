/// Upstream collaborator abstractions
///
/// The catalog, availability and base recommendation services are external.
/// Each sits behind a trait so the cache and adaptation layers can be exercised
/// without network access, and so a slow or failing upstream can be wrapped in
/// a timeout and degraded instead of propagating.
use std::time::Duration;

use crate::models::{ProductRecord, RecommendationRecord};

pub mod catalog;
pub mod recommendations;

pub use catalog::HttpProductSource;
pub use recommendations::HttpRecommendationSource;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
}

/// Runs an upstream call under a timeout
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, SourceError>
where
    F: std::future::Future<Output = Result<T, SourceError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| SourceError::Timeout(timeout))?
}

/// Catalog lookup by product id
///
/// Ids the catalog does not know are simply absent from the result.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProductSource: Send + Sync {
    async fn get_products(&self, ids: &[String]) -> Result<Vec<ProductRecord>, SourceError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Whether a product can be sold in a market
#[async_trait::async_trait]
pub trait AvailabilityOracle: Send + Sync {
    async fn is_available(&self, product_id: &str, market_id: &str) -> Result<bool, SourceError>;
}

/// Base recommendation source (content similarity, managed service, ...)
#[async_trait::async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn recommend(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RecommendationRecord>, SourceError>;

    fn name(&self) -> &'static str;
}
