//! Drives the real reqwest clients against a local axum server that plays the
//! CoinGecko API and the price proxy.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use token_price_oracle::config::OracleConfig;
use token_price_oracle::models::price::{Period, PriceSource};
use token_price_oracle::services::health_monitor::HealthMonitor;
use token_price_oracle::services::price_oracle::PriceOracle;

type Queries = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Address nothing listens on.
async fn closed_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn config(base_url: String, proxy_url: Option<String>) -> OracleConfig {
    OracleConfig {
        provider_base_url: base_url,
        proxy_url,
        fetch_timeout: Duration::from_secs(2),
        health_timeout: Duration::from_secs(2),
        ..OracleConfig::default()
    }
}

fn simple_price_route(body: Value, queries: Queries) -> Router {
    Router::new().route(
        "/simple/price",
        get(move |Query(query): Query<HashMap<String, String>>| {
            let body = body.clone();
            let queries = queries.clone();
            async move {
                queries.lock().push(query);
                Json(body)
            }
        }),
    )
}

#[tokio::test]
async fn test_end_to_end_spot_price_with_missing_fields() {
    let queries: Queries = Arc::default();
    let body = json!({ "gooddollar": { "usd": 0.0000712, "usd_24h_change": 1.5 } });
    let base = serve(simple_price_route(body, queries.clone())).await;

    let oracle = PriceOracle::from_config(&config(base, None)).unwrap();
    let price = oracle.get_current_price().await;

    assert_eq!(price.usd, 0.0000712);
    assert_eq!(price.change_24h_pct, 1.5);
    assert_eq!(price.market_cap_usd, 0.0);
    assert_eq!(price.volume_24h_usd, 0.0);
    assert_eq!(price.source, PriceSource::Upstream);
    assert!(!price.defaulted.change_24h);
    assert!(price.defaulted.market_cap && price.defaulted.volume_24h);

    let recorded = queries.lock().clone();
    assert_eq!(recorded.len(), 1);
    let expected: HashMap<String, String> = [
        ("ids", "gooddollar"),
        ("vs_currencies", "usd"),
        ("include_24hr_change", "true"),
        ("include_market_cap", "true"),
        ("include_24hr_vol", "true"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    assert_eq!(recorded[0], expected);
}

#[tokio::test]
async fn test_proxy_answer_is_preferred() {
    let queries: Queries = Arc::default();
    let router = simple_price_route(json!({ "gooddollar": { "usd": 9.0 } }), queries.clone()).route(
        "/api/price",
        get(|| async { Json(json!({ "gooddollar": { "usd": 0.00007, "usd_market_cap": 1200.0 } })) }),
    );
    let base = serve(router).await;

    let oracle = PriceOracle::from_config(&config(base.clone(), Some(format!("{}/api/price", base)))).unwrap();
    assert_eq!(oracle.spot_source_names(), vec!["proxy", "coingecko"]);

    let price = oracle.get_current_price().await;
    assert_eq!(price.usd, 0.00007);
    assert_eq!(price.market_cap_usd, 1200.0);
    assert_eq!(price.source, PriceSource::Proxy);
    assert!(queries.lock().is_empty());
}

#[tokio::test]
async fn test_proxy_fallback_body_skips_direct_tier() {
    let queries: Queries = Arc::default();
    let router = simple_price_route(json!({ "gooddollar": { "usd": 9.0 } }), queries.clone()).route(
        "/api/price",
        get(|| async {
            Json(json!({
                "gooddollar": {
                    "usd": 0.0001, "usd_24h_change": 0, "usd_market_cap": 0, "usd_24h_vol": 0,
                    "_fallback": true, "_error": "CoinGecko returned 429"
                }
            }))
        }),
    );
    let base = serve(router).await;

    let oracle = PriceOracle::from_config(&config(base.clone(), Some(format!("{}/api/price", base)))).unwrap();
    let price = oracle.get_current_price().await;

    assert_eq!(price.source, PriceSource::ProxyFallback);
    assert_eq!(price.fallback_reason.as_deref(), Some("CoinGecko returned 429"));
    assert!(queries.lock().is_empty());
}

#[tokio::test]
async fn test_proxy_error_status_falls_back_to_upstream() {
    let queries: Queries = Arc::default();
    let router = simple_price_route(json!({ "gooddollar": { "usd": 0.5 } }), queries.clone()).route(
        "/api/price",
        get(|| async { (StatusCode::BAD_GATEWAY, "bad gateway") }),
    );
    let base = serve(router).await;

    let oracle = PriceOracle::from_config(&config(base.clone(), Some(format!("{}/api/price", base)))).unwrap();
    let price = oracle.get_current_price().await;

    assert_eq!(price.usd, 0.5);
    assert_eq!(price.source, PriceSource::Upstream);
    assert_eq!(queries.lock().len(), 1);
}

#[tokio::test]
async fn test_missing_token_in_body_is_a_fallback() {
    let queries: Queries = Arc::default();
    let base = serve(simple_price_route(json!({ "bitcoin": { "usd": 95000.0 } }), queries)).await;

    let oracle = PriceOracle::from_config(&config(base, None)).unwrap();
    let price = oracle.get_current_price().await;

    assert!(price.is_fallback());
    assert_eq!(price.usd, OracleConfig::default().fallback_price);
    assert_eq!(oracle.failure_count("current-price"), 1);
}

#[tokio::test]
async fn test_market_chart_query_and_volume_join() {
    let queries: Queries = Arc::default();
    let recorded = queries.clone();
    let router = Router::new().route(
        "/coins/{id}/market_chart",
        get(move |Path(id): Path<String>, Query(query): Query<HashMap<String, String>>| {
            let recorded = recorded.clone();
            async move {
                let mut query = query;
                query.insert("id".to_string(), id);
                recorded.lock().push(query);
                Json(json!({
                    "prices": [[1000, 1.0], [2000, 1.1], [3000, 1.2]],
                    "market_caps": [],
                    "total_volumes": [[1000, 10.0], [3000, 30.0]]
                }))
            }
        }),
    );
    let base = serve(router).await;

    let oracle = PriceOracle::from_config(&config(base, None)).unwrap();
    let series = oracle.get_historical_prices(Period::SevenDays).await;

    assert!(!series.is_fallback);
    let volumes: Vec<f64> = series.points.iter().map(|p| p.volume_usd).collect();
    assert_eq!(volumes, vec![10.0, 0.0, 30.0]);

    let query = queries.lock()[0].clone();
    assert_eq!(query.get("id").map(String::as_str), Some("gooddollar"));
    assert_eq!(query.get("vs_currency").map(String::as_str), Some("usd"));
    assert_eq!(query.get("days").map(String::as_str), Some("7"));
    assert_eq!(query.get("interval").map(String::as_str), Some("daily"));
}

#[tokio::test]
async fn test_malformed_market_chart_synthesizes_series() {
    let router = Router::new().route(
        "/coins/{id}/market_chart",
        get(|| async { Json(json!({ "prices": "rate limited" })) }),
    );
    let base = serve(router).await;

    let oracle = PriceOracle::from_config(&config(base, None)).unwrap();
    let series = oracle.get_historical_prices(Period::OneYear).await;

    assert!(series.is_fallback);
    assert_eq!(series.points.len(), 365);
}

#[tokio::test]
async fn test_health_uses_proxy_head() {
    let pings = Arc::new(AtomicUsize::new(0));
    let counter = pings.clone();
    let router = Router::new()
        .route("/api/price", get(|| async { Json(json!({})) }))
        .route(
            "/ping",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { "pong" }
            }),
        );
    let base = serve(router).await;

    let monitor = HealthMonitor::from_config(&config(base.clone(), Some(format!("{}/api/price", base)))).unwrap();
    let status = monitor.check_health().await;

    assert!(status.is_healthy, "{:?}", status.error);
    assert!(status.response_time_millis.is_some());
    assert_eq!(pings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_health_falls_back_to_ping_when_proxy_unreachable() {
    let base = serve(Router::new().route("/ping", get(|| async { "pong" }))).await;
    let proxy = format!("{}/api/price", closed_address().await);

    let monitor = HealthMonitor::from_config(&config(base, Some(proxy))).unwrap();
    let status = monitor.check_health().await;

    assert!(status.is_healthy, "{:?}", status.error);
}

#[tokio::test]
async fn test_slow_ping_exceeds_configured_latency_threshold() {
    let base = serve(Router::new().route(
        "/ping",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            "pong"
        }),
    ))
    .await;

    let mut config = config(base, None);
    config.health_latency_threshold = Duration::from_millis(100);

    let monitor = HealthMonitor::from_config(&config).unwrap();
    let status = monitor.check_health().await;

    assert!(!status.is_healthy);
    assert!(status.response_time_millis.unwrap() >= 300);
    assert!(status.error.unwrap().contains("limit 100 ms"));
}

#[tokio::test]
async fn test_unreachable_provider_is_unhealthy() {
    let monitor = HealthMonitor::from_config(&config(closed_address().await, None)).unwrap();
    let status = monitor.check_health().await;

    assert!(!status.is_healthy);
    assert!(status.error.unwrap().starts_with("coingecko-ping"));
}
