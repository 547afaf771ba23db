//! Core trait definitions

use crate::error::PortalResult;
use crate::types::*;
use async_trait::async_trait;

/// Remote session API exposed by the directory management backend.
///
/// Implementations return `Err` only when the request could not complete or
/// the response was unusable. A backend that answers with `success: false`
/// yields `Ok` with that response.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Authenticate and open a session
    async fn login(&self, request: &LoginRequest) -> PortalResult<LoginResponse>;

    /// Invalidate the session on the server
    async fn logout(&self, session_id: &str) -> PortalResult<ApiAck>;

    /// Check the session and fetch the current user record
    async fn validate_session(&self, session_id: &str) -> PortalResult<ValidateResponse>;

    /// Extend the session lifetime
    async fn refresh_session(&self, session_id: &str) -> PortalResult<RefreshResponse>;

    /// Fetch session expiry metadata
    async fn session_info(&self, session_id: &str) -> PortalResult<SessionInfoResponse>;

    /// Fetch the profile of the signed-in user
    async fn get_profile(&self, session_id: &str) -> PortalResult<ProfileResponse>;

    /// Fetch the directory account status of the signed-in user
    async fn get_account_status(&self, session_id: &str) -> PortalResult<AccountStatusResponse>;

    /// Change the password of the signed-in user
    async fn change_password(
        &self,
        session_id: &str,
        request: &ChangePasswordRequest,
    ) -> PortalResult<ApiAck>;
}

/// String key-value persistence that survives restarts
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> PortalResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> PortalResult<()>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> PortalResult<()>;
}
