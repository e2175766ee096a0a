// src/lib.rs

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use services::{health_monitor::HealthMonitor, price_oracle::PriceOracle};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub oracle: Arc<PriceOracle>,
    pub health: Arc<HealthMonitor>,
}

pub mod config;
pub mod error;

pub mod services {
    pub mod cache_store;
    pub mod clock;
    pub mod coingecko;
    pub mod conversion;
    pub mod failure_ledger;
    pub mod health_monitor;
    pub mod price_alerts;
    pub mod price_feed;
    pub mod price_oracle;
    pub mod price_proxy;
    pub mod price_source;
    pub mod task_handle;
}

pub mod models;
pub mod handlers;
pub mod jobs;

async fn banner() -> &'static str {
    "Token price oracle is running"
}

/// Read-only status API over the oracle and health monitor.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/api/price", get(handlers::price::get_current_price))
        .route("/api/price/history/{period}", get(handlers::price::get_price_history))
        .route("/api/price/convert", get(handlers::price::convert))
        .route("/api/price/refresh", post(handlers::price::refresh_price))
        .route("/api/health", get(handlers::health::get_health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
