//! SDK configuration
//!
//! Endpoint, credentials and timeouts shared by every service client.

use crate::error::{SdkError, SdkResult};
use std::time::Duration;

/// Configuration for the service clients
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Base URL of the API, including the version segment
    pub base_url: String,

    /// Authentication method
    pub auth: AuthConfig,

    /// Project the requests are billed to
    pub project: Option<String>,

    /// Region of the project
    pub location: Option<String>,

    /// Request timeout
    pub timeout: Duration,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Log request and response bodies at debug level
    pub enable_logging: bool,

    /// Custom headers to add to all requests
    pub custom_headers: Vec<(String, String)>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            auth: AuthConfig::None,
            project: None,
            location: None,
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("genai-eval-sdk/{}", env!("CARGO_PKG_VERSION")),
            enable_logging: false,
            custom_headers: Vec::new(),
        }
    }
}

impl SdkConfig {
    /// Create a new configuration with the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.auth = AuthConfig::ApiKey(api_key.into());
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = AuthConfig::BearerToken(token.into());
        self
    }

    /// Scope requests to `projects/{project}/locations/{location}`
    pub fn with_project(mut self, project: impl Into<String>, location: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self.location = Some(location.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    /// Resource path prefix, empty when no project is configured
    pub fn parent(&self) -> Option<String> {
        match (&self.project, &self.location) {
            (Some(project), Some(location)) => {
                Some(format!("projects/{}/locations/{}", project, location))
            }
            _ => None,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> SdkResult<()> {
        if self.base_url.is_empty() {
            return Err(SdkError::ConfigurationError(
                "Base URL cannot be empty".to_string(),
            ));
        }

        url::Url::parse(&self.base_url)?;

        if self.timeout.is_zero() {
            return Err(SdkError::ConfigurationError(
                "Timeout cannot be zero".to_string(),
            ));
        }

        if self.project.is_some() != self.location.is_some() {
            return Err(SdkError::ConfigurationError(
                "Project and location must be set together".to_string(),
            ));
        }

        Ok(())
    }
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// No authentication
    None,

    /// API key sent in the `x-goog-api-key` header
    ApiKey(String),

    /// OAuth access token sent as a bearer token
    BearerToken(String),
}

impl AuthConfig {
    pub fn is_configured(&self) -> bool {
        !matches!(self, AuthConfig::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SdkConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert!(config.parent().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chained_configuration() {
        let config = SdkConfig::new("https://api.example.com/v1")
            .with_api_key("test-key")
            .with_project("my-project", "us-central1")
            .with_timeout(Duration::from_secs(60));

        assert_eq!(config.base_url, "https://api.example.com/v1");
        assert!(matches!(config.auth, AuthConfig::ApiKey(_)));
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(
            config.parent().as_deref(),
            Some("projects/my-project/locations/us-central1")
        );
    }

    #[test]
    fn test_invalid_config() {
        assert!(SdkConfig::new("").validate().is_err());
        assert!(SdkConfig::new("not a url").validate().is_err());

        let mut half_scoped = SdkConfig::new("https://api.example.com");
        half_scoped.project = Some("p".to_string());
        assert!(matches!(
            half_scoped.validate(),
            Err(SdkError::ConfigurationError(_))
        ));
    }
}
