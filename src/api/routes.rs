use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Markets
        .route("/api/v1/markets", get(handlers::list_markets))
        .route("/api/v1/markets/detect", get(handlers::detect_market))
        .route("/api/v1/markets/:market_id/config", get(handlers::market_config))
        .route("/api/v1/users/:user_id/market", put(handlers::set_user_market))
        // Products and recommendations
        .route("/api/v1/products/:product_id", get(handlers::get_product))
        .route("/api/v1/recommendations", post(handlers::recommend))
        // Cache administration
        .route("/api/v1/cache/stats", get(handlers::cache_stats))
        .route("/api/v1/cache/invalidate", post(handlers::invalidate))
        .route("/api/v1/cache/warm", post(handlers::warm))
        // Outermost first: the request id must exist before the trace span is made
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}
