use std::sync::Arc;
use token_price_oracle::{
    build_router,
    config::OracleConfig,
    jobs::price_watch::start_price_watch_job,
    services::{
        health_monitor::HealthMonitor,
        price_feed::{FeedSettings, PriceFeed},
        price_oracle::PriceOracle,
    },
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,token_price_oracle=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = OracleConfig::from_env().expect("Invalid configuration");
    tracing::info!(
        "Tracking {} via {} (proxy: {})",
        config.token_id,
        config.provider_base_url,
        config.proxy_url.as_deref().unwrap_or("none")
    );

    let oracle = Arc::new(PriceOracle::from_config(&config).expect("Failed to build price oracle"));
    let health = Arc::new(HealthMonitor::from_config(&config).expect("Failed to build health monitor"));

    // Background work; both handles must outlive the server
    let _health_job = health.clone().spawn(config.health_check_interval);
    let feed = PriceFeed::new(oracle.clone(), FeedSettings::from(&config));
    let _price_watch = start_price_watch_job(&feed, config.alert_threshold_pct);

    let app = build_router(AppState { oracle, health });

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listener");

    tracing::info!(
        "Server listening on {}",
        listener.local_addr().expect("Listener has no local address")
    );

    axum::serve(listener, app).await.expect("Server error");
}
