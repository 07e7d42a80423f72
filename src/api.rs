use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    db::{self, RelayFilter},
    error::AppError,
    models::{AppState, Relay, RelayStats, SharedState},
};

/// Read-only HTTP API over the relay store
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/relays", get(get_relays))
        .route("/relays/geolocated", get(get_geolocated_relays))
        .route("/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Query parameters for filtering relays
#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub alive: Option<bool>,
    pub country: Option<String>,
    pub limit: Option<i64>,
}

/// List relays, newest first
pub async fn get_relays(
    state: SharedState,
    Query(query): Query<RelayQuery>,
) -> Result<Json<Vec<Relay>>, AppError> {
    if query.limit.is_some_and(|l| l < 0) {
        return Err(AppError::ValidationError(
            "limit must not be negative".to_string(),
        ));
    }

    let filter = RelayFilter {
        alive: query.alive,
        country: query.country.filter(|c| !c.is_empty()),
        limit: query.limit,
    };

    let relays = db::list_relays(&state.db_pool, &filter).await?;
    Ok(Json(relays))
}

/// Relays with known coordinates
pub async fn get_geolocated_relays(state: SharedState) -> Result<Json<Vec<Relay>>, AppError> {
    let relays = db::get_geolocated_relays(&state.db_pool).await?;
    Ok(Json(relays))
}

/// Get relay statistics
pub async fn get_stats(state: SharedState) -> Result<Json<RelayStats>, AppError> {
    let stats = db::get_relay_stats(&state.db_pool).await?;
    Ok(Json(stats))
}
