//! Error types shared across the oracle, its sources and the status API.

use thiserror::Error;

/// Failure of a single network tier (proxy, direct upstream, health probe).
///
/// Every variant is recoverable: the oracle answers any of them by moving to
/// the next tier or by synthesizing fallback data.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Rejected conversion request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Amount must not be negative (got {0})")]
    NegativeAmount(f64),

    #[error("Amount must be a finite number")]
    NotFinite,

    #[error("No usable exchange rate (rate is zero)")]
    ZeroRate,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown price period '{0}' (expected one of 1h, 24h, 7d, 30d, 90d, 1y)")]
pub struct PeriodParseError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}
