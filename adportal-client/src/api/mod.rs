//! API client for the directory management backend
//!
//! This module provides the HTTP plumbing shared by every session API call:
//! client configuration, header setup, and decoding of the JSON envelope the
//! backend answers with.

use adportal_core::{ApiSettings, ErrorContext, PortalError, PortalResult};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use url::Url;

pub mod http;


pub use http::HttpSessionApi;

/// Header carrying the session identifier on authenticated requests
pub const SESSION_HEADER: &str = "X-Session-Id";

/// Backend endpoints, relative to the base URL
pub mod endpoints {
    pub const LOGIN: &str = "api/auth/login";
    pub const LOGOUT: &str = "api/auth/logout";
    pub const VALIDATE: &str = "api/auth/validate";
    pub const REFRESH: &str = "api/auth/refresh";
    pub const SESSION_INFO: &str = "api/auth/session";
    pub const PROFILE: &str = "api/user/profile";
    pub const ACCOUNT_STATUS: &str = "api/user/account-status";
    pub const CHANGE_PASSWORD: &str = "api/user/change-password";
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Additional headers
    pub headers: HashMap<String, String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self::from(&ApiSettings::default())
    }
}

impl From<&ApiSettings> for ApiClientConfig {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            timeout_seconds: settings.timeout_seconds,
            user_agent: settings.user_agent.clone(),
            headers: settings.headers.clone(),
        }
    }
}

impl ApiClientConfig {
    /// Create a configuration pointing at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set additional header
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Absolute URL of an endpoint
    pub fn endpoint_url(&self, endpoint: &str) -> PortalResult<Url> {
        // A trailing slash keeps any path prefix of the base URL when joining
        let base = format!("{}/", self.base_url.trim_end_matches('/'));
        let base = Url::parse(&base).map_err(|e| PortalError::Config {
            message: format!("Invalid API base URL '{}': {}", self.base_url, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("api_client")
                .with_operation("endpoint_url")
                .with_suggestion("Set api.base_url to an absolute http(s) URL"),
        })?;

        base.join(endpoint.trim_start_matches('/'))
            .map_err(|e| PortalError::Config {
                message: format!("Invalid endpoint '{}': {}", endpoint, e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("api_client").with_operation("endpoint_url"),
            })
    }
}

/// Helper function to create HTTP client with common configuration
pub(crate) fn create_http_client(config: &ApiClientConfig) -> PortalResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            PortalError::Config {
                message: format!("Invalid user agent: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            }
        })?,
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    // Add custom headers
    for (key, value) in &config.headers {
        let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            PortalError::Config {
                message: format!("Invalid header name '{}': {}", key, e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            }
        })?;

        let header_value =
            reqwest::header::HeaderValue::from_str(value).map_err(|e| PortalError::Config {
                message: format!("Invalid header value for '{}': {}", key, e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            })?;

        headers.insert(header_name, header_value);
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| PortalError::Config {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })?;

    Ok(client)
}

/// Decode the JSON envelope of a backend response.
///
/// 401 and 403 are rejections of the credentials or the session and become
/// authentication errors, keeping the server message when the body has one.
/// Any other status is decoded as the envelope; a body that is not the
/// expected JSON is a network error.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    body: &str,
    operation: &str,
) -> PortalResult<T> {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        let message = server_message(body).unwrap_or_else(|| {
            if operation == "login" {
                "Invalid username or password".to_string()
            } else {
                "Your session is no longer valid. Please sign in again.".to_string()
            }
        });

        return Err(PortalError::Authentication {
            message,
            context: ErrorContext::new("api_client")
                .with_operation(operation)
                .with_metadata("status", status.as_str()),
        });
    }

    serde_json::from_str(body).map_err(|e| PortalError::Network {
        message: format!(
            "Malformed response from server (HTTP {}): {}",
            status.as_u16(),
            e
        ),
        source: Some(Box::new(e)),
        context: ErrorContext::new("api_client")
            .with_operation(operation)
            .with_metadata("status", status.as_str())
            .with_suggestion(match status.as_u16() {
                404 => "Check api.base_url, the endpoint was not found",
                500..=599 => "The backend reported an internal error",
                _ => "Check network connectivity and API status",
            }),
    })
}

/// Non-empty `message` field of a JSON body, if any
fn server_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}
