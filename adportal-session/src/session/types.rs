//! Session lifecycle types and the events published to the UI layer

use adportal_core::User;
use serde::{Deserialize, Serialize};

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Unauthenticated,
    /// A login, logout or validation call is in flight
    Transitioning,
    Authenticated,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }
}

/// Why the controller changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Login,
    Restored,
    Logout,
    Expired,
    Invalidated,
    PasswordChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Toast-style notice for the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
        }
    }

    pub(crate) fn signed_in(user: Option<&User>) -> Self {
        let message = match user {
            Some(user) => format!("Welcome, {}!", user.display_label()),
            None => "You are signed in.".to_string(),
        };
        Self::new("Signed In", message, Severity::Success)
    }

    pub(crate) fn signed_out() -> Self {
        Self::new("Signed Out", "You have been signed out.", Severity::Info)
    }

    pub(crate) fn session_expired() -> Self {
        Self::new(
            "Session Expired",
            "Your session has expired. Please sign in again.",
            Severity::Warning,
        )
    }

    pub(crate) fn session_rejected() -> Self {
        Self::new(
            "Session Expired",
            "Your session is no longer valid. Please sign in again.",
            Severity::Warning,
        )
    }

    pub(crate) fn password_changed() -> Self {
        Self::new(
            "Password Changed",
            "Your password has been changed. You will be signed out shortly.",
            Severity::Success,
        )
    }

    pub(crate) fn signed_out_after_password_change() -> Self {
        Self::new(
            "Signed Out",
            "Please sign in again with your new password.",
            Severity::Info,
        )
    }

    pub(crate) fn refresh_failed(message: String) -> Self {
        Self::new("Session Refresh Failed", message, Severity::Warning)
    }
}

/// Events published on the controller's broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        state: SessionState,
        user: Option<User>,
        reason: TransitionReason,
    },
    Notification(Notification),
    /// Emitted on every countdown tick inside the warning window
    SessionWarning { minutes_left: u64 },
    /// The auto-refresh succeeded; `expires_in` is the new lifetime if known
    Refreshed { expires_in: Option<u64> },
}

/// Snapshot of the scheduled activities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTimers {
    pub countdown: bool,
    pub auto_refresh: bool,
    pub forced_logout: bool,
}

impl ActiveTimers {
    pub fn none_active(&self) -> bool {
        !self.countdown && !self.auto_refresh && !self.forced_logout
    }
}
