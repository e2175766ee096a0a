use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::ConversionError,
    models::{
        api::{ConvertDirection, ConvertQuery, ErrorResponse},
        price::{ConversionResult, Period, PricePoint, PriceSeries},
    },
    AppState,
};

/// Handler for GET /api/price
pub async fn get_current_price(State(state): State<AppState>) -> Json<PricePoint> {
    Json(state.oracle.get_current_price().await)
}

/// Handler for GET /api/price/history/{period}
pub async fn get_price_history(
    State(state): State<AppState>,
    Path(period): Path<String>,
) -> Result<Json<PriceSeries>, (StatusCode, Json<ErrorResponse>)> {
    let period = period.parse::<Period>().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: e.to_string() }),
        )
    })?;

    Ok(Json(state.oracle.get_historical_prices(period).await))
}

/// Handler for GET /api/price/convert?amount=&direction=to_fiat|to_token
pub async fn convert(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> Result<Json<ConversionResult>, (StatusCode, Json<ErrorResponse>)> {
    tracing::debug!("Converting with query: {:?}", query);

    let result = match query.direction.unwrap_or_default() {
        ConvertDirection::ToFiat => state.oracle.quote_to_fiat(query.amount).await,
        ConvertDirection::ToToken => state.oracle.quote_to_token(query.amount).await,
    };

    result.map(Json).map_err(|e| {
        let status = match e {
            ConversionError::ZeroRate => StatusCode::SERVICE_UNAVAILABLE,
            ConversionError::NegativeAmount(_) | ConversionError::NotFinite => StatusCode::BAD_REQUEST,
        };
        (status, Json(ErrorResponse { error: e.to_string() }))
    })
}

/// Handler for POST /api/price/refresh
/// Clears cached prices and failure counters, then fetches a fresh spot price
pub async fn refresh_price(State(state): State<AppState>) -> Json<PricePoint> {
    tracing::info!("Manual price refresh requested");
    state.oracle.clear_cache();
    Json(state.oracle.get_current_price().await)
}
