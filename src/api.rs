use std::sync::Arc;

use axum::{Router, extract::State, response::Json, routing::get};
use serde_json::{Value, json};

use crate::aggregator::CityAggregator;
use crate::models::AirQualityReport;

pub const AIR_QUALITY_PATH: &str = "/api/calidad-aire";

#[derive(Clone)]
struct ApiState {
    aggregator: Arc<CityAggregator>,
}

pub fn router(aggregator: Arc<CityAggregator>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route(AIR_QUALITY_PATH, get(get_air_quality))
        .with_state(ApiState { aggregator })
}

/// Always 200: failing cities are reported inside the body
async fn get_air_quality(State(state): State<ApiState>) -> Json<AirQualityReport> {
    Json(state.aggregator.aggregate().await)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "Air Quality API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            AIR_QUALITY_PATH: "Get air quality data for all cities",
            "/health": "Health check endpoint"
        }
    }))
}
