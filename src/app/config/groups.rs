use serde::{Deserialize, Serialize};

/// Settings of the optional Prometheus endpoint, derived from the flat CLI
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
            path: "/metrics".to_string(),
        }
    }
}
