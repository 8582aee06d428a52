use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Failed to start delivery worker: {0}")]
    WorkerSpawn(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Target of both batch and teardown deliveries.
    pub batch_endpoint: String,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub max_idle_connections: usize,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            batch_endpoint: "http://localhost:8080/api/events/batch".to_string(),
            timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            max_idle_connections: 4,
            user_agent: format!("edgekite-agent/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            batch_endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parse and check the batch endpoint. Only http and https are accepted.
    pub fn batch_url(&self) -> Result<Url, TransportError> {
        let url: Url = self.batch_endpoint.parse().map_err(|e| {
            TransportError::InvalidConfiguration(format!("Invalid batch endpoint URL: {e}"))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(TransportError::InvalidConfiguration(format!(
                "Unsupported URL scheme '{other}' for batch endpoint"
            ))),
        }
    }

    /// Blocking client for unload-time sends. Must be built and used off the
    /// async runtime's worker threads.
    pub(crate) fn build_blocking(&self) -> Result<reqwest::blocking::Client, TransportError> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connection_timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| {
                TransportError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })
    }
}

/// Pooled async HTTP client bound to the batch endpoint.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: ClientConfig,
    batch_url: Url,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let batch_url = config.batch_url()?;

        // The request timeout is enforced by the transport so that it can be
        // reported as its own failure kind.
        let client = ClientBuilder::new()
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_idle_connections)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                TransportError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            batch_url,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn batch_url(&self) -> &Url {
        &self.batch_url
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.batch_endpoint, "http://localhost:8080/api/events/batch");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("edgekite-agent/"));
    }

    #[test]
    fn test_batch_url_rejects_non_http_schemes() {
        assert!(ClientConfig::with_endpoint("ftp://collector/batch").batch_url().is_err());
        assert!(ClientConfig::with_endpoint("not a url").batch_url().is_err());
        assert!(ClientConfig::with_endpoint("https://collector/api/events/batch").batch_url().is_ok());
    }

    #[test]
    fn test_http_client_keeps_endpoint() {
        let client = HttpClient::new(ClientConfig::with_endpoint("http://127.0.0.1:9/batch")).unwrap();
        assert_eq!(client.batch_url().as_str(), "http://127.0.0.1:9/batch");
    }
}
