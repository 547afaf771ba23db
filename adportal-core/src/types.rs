//! Core data type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::warn;

use crate::logging::LoggingConfig;

/// Directory user record returned by the backend.
///
/// The record is pass-through data: only the common attributes are named,
/// everything else the directory returns is kept in `attributes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// Name to show in the UI
    pub fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}

/// Account status view of the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub password_expired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_last_set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_logon: Option<String>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

/// Locally claimed session.
///
/// `expires_at` is `None` when the backend did not disclose an expiry; the
/// client then relies on server-side enforcement.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub user: Option<User>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, user: Option<User>) -> Self {
        Self {
            session_id: session_id.into(),
            user,
            expires_at: None,
        }
    }

    /// Remaining lifetime relative to `now`, if an expiry is known
    pub fn expires_in(&self, now: DateTime<Utc>) -> Option<ExpiresIn> {
        self.expires_at.map(|deadline| ExpiresIn::until(deadline, now))
    }

    /// Session id safe for log output
    pub fn redacted_id(&self) -> String {
        redact_session_id(&self.session_id)
    }
}

/// Session as persisted by the session store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub session_id: String,
    pub user: Option<User>,
}

pub fn redact_session_id(session_id: &str) -> String {
    let prefix: String = session_id.chars().take(6).collect();
    format!("{}…", prefix)
}

/// Time left until a session expires, clamped at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExpiresIn(Duration);

impl ExpiresIn {
    /// Build from a duration in seconds as reported by the backend.
    ///
    /// Returns `None` for non-finite or unrepresentable values. Negative
    /// values clamp to zero, which means "already expired".
    pub fn from_secs_f64(seconds: f64) -> Option<Self> {
        if !seconds.is_finite() {
            return None;
        }
        Duration::try_from_secs_f64(seconds.max(0.0)).ok().map(Self)
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    /// Remaining time between `now` and an absolute deadline
    pub fn until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self((deadline - now).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_zero()
    }

    /// Absolute deadline relative to `now`
    pub fn deadline_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.0)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Expiry metadata that several backend responses may carry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryMetadata {
    /// Seconds until expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<f64>,
    /// Absolute expiry as an RFC 3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl ExpiryMetadata {
    pub fn from_secs(seconds: f64) -> Self {
        Self {
            expires_in: Some(seconds),
            expires_at: None,
        }
    }

    pub fn from_deadline(deadline: DateTime<Utc>) -> Self {
        Self {
            expires_in: None,
            expires_at: Some(deadline.to_rfc3339()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.expires_in.is_none() && self.expires_at.is_none()
    }

    /// Resolve the remaining lifetime, preferring the explicit duration
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<ExpiresIn> {
        if let Some(expires_in) = self.expires_in.and_then(ExpiresIn::from_secs_f64) {
            return Some(expires_in);
        }

        let raw = self.expires_at.as_deref()?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(deadline) => Some(ExpiresIn::until(deadline.with_timezone(&Utc), now)),
            Err(e) => {
                warn!(expires_at = raw, error = %e, "Ignoring unparsable session expiry");
                None
            }
        }
    }
}

/// Login form submitted to the backend
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>, remember_me: bool) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            remember_me,
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

/// Password change submitted to the backend
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePasswordRequest")
            .field("current_password", &"<redacted>")
            .field("new_password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(flatten)]
    pub expiry: ExpiryMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Plain acknowledgement (logout, password change)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiAck {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Payload of a successful validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePayload {
    #[serde(default, alias = "User", skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(flatten)]
    pub expiry: ExpiryMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ValidatePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidateResponse {
    pub fn user(&self) -> Option<&User> {
        self.data.as_ref().and_then(|data| data.user.as_ref())
    }

    pub fn expiry(&self) -> Option<&ExpiryMetadata> {
        self.data.as_ref().map(|data| &data.expiry)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(flatten)]
    pub expiry: ExpiryMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(flatten)]
    pub expiry: ExpiryMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Envelope for endpoints returning a single record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct DataResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> DataResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

pub type ProfileResponse = DataResponse<User>;
pub type AccountStatusResponse = DataResponse<AccountStatus>;

/// Complete adportal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Session lifecycle timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Countdown tick cadence
    pub tick_interval_secs: u64,
    /// Length of the warning window before expiry
    pub warning_threshold_secs: u64,
    /// Auto-refresh period
    pub refresh_interval_secs: u64,
    /// Delay between a successful password change and the forced logout
    pub forced_logout_delay_ms: u64,
    pub min_password_length: usize,
}

impl SessionSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn warning_threshold(&self) -> Duration {
        Duration::from_secs(self.warning_threshold_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn forced_logout_delay(&self) -> Duration {
        Duration::from_millis(self.forced_logout_delay_ms)
    }
}

/// Local persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub data_dir: String,
}
