use super::{Config, ConfigError};
use url::Url;

fn validate_http_url(label: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {label} URL '{value}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidUrl(format!(
            "Invalid {label} URL '{value}': unsupported scheme '{scheme}'"
        ))),
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("endpoint", &self.endpoint)?;
        validate_http_url("batch endpoint", &self.resolved_batch_endpoint)?;

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.batch_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch interval must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(max_queue_len) = self.max_queue_len
            && max_queue_len < self.batch_size
        {
            return Err(ConfigError::InvalidConfig(format!(
                "Max queue length ({max_queue_len}) must be at least as large as batch size ({})",
                self.batch_size
            )));
        }

        if self.beacon_max_payload_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "Beacon payload limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
