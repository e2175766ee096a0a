//! Token <-> USD conversion against a single observed rate.

use crate::error::ConversionError;
use crate::models::price::{ConversionResult, PricePoint};

/// Reject negative and non-finite amounts before any rate is fetched.
pub fn validate_amount(amount: f64) -> Result<(), ConversionError> {
    if !amount.is_finite() {
        return Err(ConversionError::NotFinite);
    }
    if amount < 0.0 {
        return Err(ConversionError::NegativeAmount(amount));
    }
    Ok(())
}

fn usable_rate(price: &PricePoint) -> Result<f64, ConversionError> {
    if price.usd > 0.0 && price.usd.is_finite() {
        Ok(price.usd)
    } else {
        Err(ConversionError::ZeroRate)
    }
}

pub fn token_to_fiat(token_amount: f64, price: &PricePoint) -> Result<ConversionResult, ConversionError> {
    validate_amount(token_amount)?;
    let rate = usable_rate(price)?;
    Ok(ConversionResult {
        token_amount,
        fiat_amount: token_amount * rate,
        rate,
        rate_observed_at_millis: price.observed_at_millis,
    })
}

pub fn fiat_to_token(fiat_amount: f64, price: &PricePoint) -> Result<ConversionResult, ConversionError> {
    validate_amount(fiat_amount)?;
    let rate = usable_rate(price)?;
    Ok(ConversionResult {
        token_amount: fiat_amount / rate,
        fiat_amount,
        rate,
        rate_observed_at_millis: price.observed_at_millis,
    })
}
