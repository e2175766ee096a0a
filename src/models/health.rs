use serde::{Deserialize, Serialize};

/// Result of the most recent provider probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub last_check_millis: i64,
    pub response_time_millis: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    /// State before the first probe has completed.
    pub fn unchecked() -> Self {
        Self {
            is_healthy: false,
            last_check_millis: 0,
            response_time_millis: None,
            error: Some("Health has not been checked yet".to_string()),
        }
    }
}
