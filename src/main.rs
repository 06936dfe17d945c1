use std::sync::Arc;

use mercado_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_redis_client, RedisStore},
    services::providers::{HttpProductSource, HttpRecommendationSource, RecommendationSource},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.init_logging();

    let redis_client = create_redis_client(&config.redis_url)?;
    let store = Arc::new(RedisStore::new(redis_client));

    let product_source = Arc::new(HttpProductSource::new(
        config.catalog_api_url.clone(),
        config.catalog_api_key.clone(),
    ));

    let mut recommendation_sources: Vec<(Arc<dyn RecommendationSource>, f64, bool)> = Vec::new();
    if let Some(url) = &config.recommendation_api_url {
        let managed: Arc<dyn RecommendationSource> = Arc::new(HttpRecommendationSource::new(url.clone()));
        recommendation_sources.push((managed, 1.0, true));
    } else {
        tracing::warn!("No recommendation service configured; recommendations will be empty");
    }

    let state = AppState::new(&config, store, product_source, recommendation_sources);
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
