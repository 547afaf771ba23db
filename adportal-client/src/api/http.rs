//! reqwest implementation of the session API

use adportal_core::{
    redact_session_id, AccountStatusResponse, ApiAck, ChangePasswordRequest, ErrorContext,
    LoginRequest, LoginResponse, PortalError, PortalResult, ProfileResponse, RefreshResponse,
    SessionApi, SessionInfoResponse, ValidateResponse,
};
use async_trait::async_trait;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{create_http_client, decode_envelope, endpoints, ApiClientConfig, SESSION_HEADER};

/// Session API client talking JSON over HTTP
pub struct HttpSessionApi {
    client: reqwest::Client,
    config: ApiClientConfig,
}

impl HttpSessionApi {
    /// Create a new API client
    pub fn new(config: ApiClientConfig) -> PortalResult<Self> {
        // Fail early on an unusable base URL
        config.endpoint_url(endpoints::LOGIN)?;
        let client = create_http_client(&config)?;

        info!("Created session API client for {}", config.base_url);

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        session_id: &str,
        operation: &str,
    ) -> PortalResult<T> {
        let url = self.config.endpoint_url(endpoint)?;
        debug!(
            "GET {} (session {})",
            url,
            redact_session_id(session_id)
        );

        let request = self.client.get(url).header(SESSION_HEADER, session_id);
        self.execute(request, operation).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        session_id: Option<&str>,
        body: &B,
        operation: &str,
    ) -> PortalResult<T> {
        let url = self.config.endpoint_url(endpoint)?;
        debug!("POST {}", url);

        let mut request = self.client.post(url).json(body);
        if let Some(session_id) = session_id {
            request = request.header(SESSION_HEADER, session_id);
        }
        self.execute(request, operation).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> PortalResult<T> {
        let response = request.send().await.map_err(|e| PortalError::Network {
            message: format!("Request to session API failed: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_session_api")
                .with_operation(operation)
                .with_suggestion("Check network connectivity and API status"),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PortalError::Network {
            message: format!("Failed to read response body: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_session_api").with_operation(operation),
        })?;

        debug!("{} answered with HTTP {}", operation, status.as_u16());
        decode_envelope(status, &body, operation)
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn login(&self, request: &LoginRequest) -> PortalResult<LoginResponse> {
        info!("Signing in as {}", request.username);
        self.post(endpoints::LOGIN, None, request, "login").await
    }

    async fn logout(&self, session_id: &str) -> PortalResult<ApiAck> {
        self.post(
            endpoints::LOGOUT,
            Some(session_id),
            &serde_json::json!({}),
            "logout",
        )
        .await
    }

    async fn validate_session(&self, session_id: &str) -> PortalResult<ValidateResponse> {
        self.get(endpoints::VALIDATE, session_id, "validate_session")
            .await
    }

    async fn refresh_session(&self, session_id: &str) -> PortalResult<RefreshResponse> {
        self.post(
            endpoints::REFRESH,
            Some(session_id),
            &serde_json::json!({}),
            "refresh_session",
        )
        .await
    }

    async fn session_info(&self, session_id: &str) -> PortalResult<SessionInfoResponse> {
        self.get(endpoints::SESSION_INFO, session_id, "session_info")
            .await
    }

    async fn get_profile(&self, session_id: &str) -> PortalResult<ProfileResponse> {
        self.get(endpoints::PROFILE, session_id, "get_profile").await
    }

    async fn get_account_status(&self, session_id: &str) -> PortalResult<AccountStatusResponse> {
        self.get(endpoints::ACCOUNT_STATUS, session_id, "get_account_status")
            .await
    }

    async fn change_password(
        &self,
        session_id: &str,
        request: &ChangePasswordRequest,
    ) -> PortalResult<ApiAck> {
        self.post(
            endpoints::CHANGE_PASSWORD,
            Some(session_id),
            request,
            "change_password",
        )
        .await
    }
}
