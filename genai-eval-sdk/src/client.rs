//! HTTP client implementation
//!
//! A thin JSON-over-HTTP client. Transport failures are surfaced as [`SdkError`]
//! and retried by the evaluation workflow, not here.

use crate::config::{AuthConfig, SdkConfig};
use crate::error::{SdkError, SdkResult};
use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// The HTTP client shared by the service clients
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: Arc<SdkConfig>,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: SdkConfig) -> SdkResult<Self> {
        config.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        for (name, value) in &config.custom_headers {
            match (
                header::HeaderName::try_from(name.as_str()),
                header::HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "Skipping invalid custom header"),
            }
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(SdkError::NetworkError)?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Build the full URL for an endpoint
    pub fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    /// Path of a resource under the configured project, if any
    pub fn scoped_path(&self, resource: &str) -> String {
        match self.config.parent() {
            Some(parent) => format!("{}/{}", parent, resource),
            None => resource.to_string(),
        }
    }

    /// Make a POST request with a JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> SdkResult<T> {
        let url = self.url(path);
        let body_json = serde_json::to_string(body)?;

        if self.config.enable_logging {
            debug!("Request: POST {}", url);
            debug!("Request body: {}", body_json);
        }

        let request = self.add_auth(self.client.post(&url)).body(body_json);
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;

        if self.config.enable_logging {
            debug!("Response body: {}", text);
        }

        if status.is_success() {
            serde_json::from_str(&text).map_err(SdkError::SerializationError)
        } else {
            let error = SdkError::from_response(status.as_u16(), &text);
            debug!(status = status.as_u16(), error = %error, "Request failed");
            Err(error)
        }
    }

    /// Add authentication headers to a request
    fn add_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth {
            AuthConfig::None => request,
            AuthConfig::ApiKey(key) => request.header("x-goog-api-key", key),
            AuthConfig::BearerToken(token) => request.bearer_auth(token),
        }
    }
}
