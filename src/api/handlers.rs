use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::EntityKind,
    error::{AppError, AppResult},
    models::{MarketConfiguration, MarketProduct, RequestContext},
    services::{
        product_cache::{CacheHealth, CacheStatsReport, WarmReport},
        RecommendationRequest, RecommendationResponse,
    },
};

use super::AppState;

/// Most product ids accepted by one warm request
const MAX_WARM_PRODUCTS: usize = 5_000;

// Request/Response types

#[derive(Debug, Serialize)]
pub struct DetectedMarketResponse {
    pub market_id: String,
    pub config: MarketConfiguration,
}

#[derive(Debug, Deserialize)]
pub struct SetUserMarketRequest {
    pub market_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub market_id: Option<String>,
    pub country_code: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub market_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub market_id: Option<String>,
    pub product_id: Option<String>,
    pub entity_type: Option<EntityKind>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct WarmRequest {
    pub market_id: String,
    pub product_ids: Vec<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// Handlers

/// Cache health; always 200 so a cold or broken cache does not take the service down
pub async fn health_check(State(state): State<AppState>) -> Json<CacheHealth> {
    Json(state.cache.health_check().await)
}

pub async fn list_markets(State(state): State<AppState>) -> Json<Vec<MarketConfiguration>> {
    Json(state.markets.get_supported_markets().await)
}

pub async fn detect_market(
    State(state): State<AppState>,
    Query(context): Query<RequestContext>,
) -> Json<DetectedMarketResponse> {
    let market_id = state.markets.detect_market(&context).await;
    let config = state.markets.get_market_config(&market_id).await;
    Json(DetectedMarketResponse { market_id, config })
}

pub async fn market_config(
    State(state): State<AppState>,
    Path(market_id): Path<String>,
) -> Json<MarketConfiguration> {
    Json(state.markets.get_market_config(&market_id).await)
}

pub async fn set_user_market(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<SetUserMarketRequest>,
) -> AppResult<StatusCode> {
    if request.market_id.trim().is_empty() {
        return Err(AppError::InvalidInput("market_id must not be empty".to_string()));
    }

    if state.markets.set_user_market(&user_id, &request.market_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Internal("Could not store market preference".to_string()))
    }
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<MarketProduct>> {
    let market_id = state
        .markets
        .detect_market(&RequestContext {
            market_id: non_empty(query.market_id),
            country_code: non_empty(query.country_code),
            user_id: non_empty(query.user_id),
        })
        .await;

    state
        .products
        .get_product(&product_id, &market_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Product {} in market {}", product_id, market_id)))
}

pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::InvalidInput("user_id must not be empty".to_string()));
    }

    Ok(Json(state.recommender.recommend(&request).await))
}

pub async fn cache_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Json<CacheStatsReport> {
    let market_id = non_empty(query.market_id);
    Json(state.cache.get_cache_stats(market_id.as_deref()).await)
}

/// Invalidates a product (optionally in one market) or a whole market
pub async fn invalidate(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> AppResult<Json<InvalidateResponse>> {
    let market_id = non_empty(request.market_id);

    let deleted = match (non_empty(request.product_id), market_id) {
        (Some(product_id), market_id) => {
            state
                .cache
                .invalidate_product(&product_id, market_id.as_deref())
                .await
        }
        (None, Some(market_id)) => {
            state
                .cache
                .invalidate_market(&market_id, request.entity_type)
                .await
        }
        (None, None) => {
            return Err(AppError::InvalidInput(
                "Either market_id or product_id is required".to_string(),
            ))
        }
    };

    Ok(Json(InvalidateResponse { deleted }))
}

pub async fn warm(
    State(state): State<AppState>,
    Json(request): Json<WarmRequest>,
) -> AppResult<Json<WarmReport>> {
    if request.market_id.trim().is_empty() {
        return Err(AppError::InvalidInput("market_id must not be empty".to_string()));
    }
    if request.product_ids.len() > MAX_WARM_PRODUCTS {
        return Err(AppError::InvalidInput(format!(
            "At most {} products can be warmed per request",
            MAX_WARM_PRODUCTS
        )));
    }

    Ok(Json(
        state
            .cache
            .warm_cache_for_market(&request.market_id, &request.product_ids)
            .await,
    ))
}
