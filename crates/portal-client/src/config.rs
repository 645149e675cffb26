//! Client configuration and builder pattern.

use crate::error::{ClientError, Result};
use std::fmt;
use std::time::Duration;

/// Configuration for the portal client.
///
/// # Security
///
/// The `Debug` implementation masks the API key and Basic-auth password
/// to prevent accidental exposure in logs.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base address of the portal API (e.g. "http://x/api/rest").
    /// Stored without a trailing slash.
    pub base_url: String,
    /// Optional opaque API key. Sent in both the `Authorization` header
    /// and the `X-API-Key` header for compatibility with either server
    /// generation.
    pub api_key: Option<String>,
    /// Optional HTTP Basic credentials for a separate auth layer
    pub basic_auth: Option<(String, String)>,
    /// Request timeout (default: 30 seconds)
    pub timeout: Duration,
    /// Whether to verify TLS certificates (default: true)
    pub tls_verify: bool,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api/rest".to_string(),
            api_key: None,
            basic_auth: None,
            timeout: Duration::from_secs(30),
            tls_verify: true,
            user_agent: format!("portal-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***REDACTED***"))
            .field(
                "basic_auth",
                &self
                    .basic_auth
                    .as_ref()
                    .map(|(user, _)| (user.as_str(), "***REDACTED***")),
            )
            .field("timeout", &self.timeout)
            .field("tls_verify", &self.tls_verify)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url)
    }

    /// Minimum allowed timeout value.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ClientError::Config("base_url cannot be empty".to_string()));
        }

        url::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base_url: {}", e)))?;

        if let Some(ref key) = self.api_key {
            if key.is_empty() {
                return Err(ClientError::Config("api_key cannot be empty".to_string()));
            }
        }

        if self.timeout < Self::MIN_TIMEOUT {
            return Err(ClientError::Config(format!(
                "timeout ({:?}) must be >= {:?}",
                self.timeout,
                Self::MIN_TIMEOUT
            )));
        }

        Ok(())
    }
}

/// Builder for client configuration.
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with the given base URL. A trailing slash
    /// is stripped so resolution always joins on a single separator.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            config: ClientConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                ..Default::default()
            },
        }
    }

    /// Set the API key for authentication.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    /// Set HTTP Basic credentials.
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.basic_auth = Some((user.into(), password.into()));
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set whether to verify TLS certificates.
    pub fn tls_verify(mut self, verify: bool) -> Self {
        self.config.tls_verify = verify;
        self
    }

    /// Set a custom User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Build the configuration, validating all settings.
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:5000/api/rest");
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.tls_verify);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder("https://data.example.org/api/rest")
            .api_key("tester")
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(config.base_url, "https://data.example.org/api/rest");
        assert_eq!(config.api_key, Some("tester".to_string()));
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_trailing_slash_stripped() {
        let config = ClientConfig::builder("http://x/api/rest/").build().unwrap();
        assert_eq!(config.base_url, "http://x/api/rest");
    }

    #[test]
    fn test_invalid_url() {
        let result = ClientConfig::builder("not a valid url").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_url() {
        let result = ClientConfig::builder("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = ClientConfig::builder("http://x/api/rest").api_key("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_api_key_masked_in_debug() {
        let config = ClientConfig::builder("http://x/api/rest")
            .api_key("super_secret_key_12345")
            .basic_auth("alice", "hunter2")
            .build()
            .unwrap();

        let debug_output = format!("{:?}", config);

        assert!(
            !debug_output.contains("super_secret_key_12345"),
            "API key should not appear in debug output"
        );
        assert!(
            !debug_output.contains("hunter2"),
            "Basic password should not appear in debug output"
        );
        assert!(debug_output.contains("alice"));
        assert!(debug_output.contains("REDACTED"));
    }

    #[test]
    fn test_timeout_too_small() {
        let result = ClientConfig::builder("http://x/api/rest")
            .timeout(Duration::from_millis(50))
            .build();

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timeout"));
    }
}
