use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvertDirection {
    #[default]
    ToFiat,
    ToToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertQuery {
    pub amount: f64,
    pub direction: Option<ConvertDirection>,
}
