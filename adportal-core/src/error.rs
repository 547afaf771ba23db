//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions, and the
//! mapping from internal failures to the messages shown to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type PortalResult<T> = Result<T, PortalError>;

/// Message used whenever a failure carries no server-provided text
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Error categories surfaced to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Client-side validation failed before any network call
    Validation,
    /// The backend rejected the credentials or the session
    Auth,
    /// The request could not complete or the response was unusable
    Network,
    /// The operation is not allowed in the current lifecycle state
    State,
    /// Local persistence, configuration or internal failures
    Internal,
}

/// Main error type for the adportal system
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Invalid session state: {message}")]
    State {
        message: String,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl PortalError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            PortalError::Validation { context, .. } => Some(context),
            PortalError::Authentication { context, .. } => Some(context),
            PortalError::Network { context, .. } => Some(context),
            PortalError::State { context, .. } => Some(context),
            PortalError::Storage { context, .. } => Some(context),
            PortalError::Config { context, .. } => Some(context),
            PortalError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Category used by the presentation layer
    pub fn kind(&self) -> ErrorKind {
        match self {
            PortalError::Validation { .. } => ErrorKind::Validation,
            PortalError::Authentication { .. } => ErrorKind::Auth,
            PortalError::Network { .. } => ErrorKind::Network,
            PortalError::State { .. } => ErrorKind::State,
            _ => ErrorKind::Internal,
        }
    }

    /// Human-readable message without any source chain.
    ///
    /// Validation, authentication and state errors carry messages written for
    /// the user. Everything else degrades to a fixed message.
    pub fn user_message(&self) -> String {
        match self {
            PortalError::Validation { message, .. }
            | PortalError::Authentication { message, .. }
            | PortalError::State { message, .. } => non_empty_or_generic(message),
            PortalError::Network { .. } => {
                "Unable to reach the server. Please check your connection and try again."
                    .to_string()
            }
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            PortalError::Network { .. } => true,
            PortalError::Authentication { .. } => false,
            PortalError::Validation { .. } => false,
            PortalError::State { .. } => false,
            PortalError::Config { .. } => false,
            _ => false,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            PortalError::Internal { .. } | PortalError::Storage { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Internal error occurred"
                );
            }
            PortalError::Validation { .. } | PortalError::State { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Request rejected before reaching the server"
                );
            }
            PortalError::Network { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Network error (may be recoverable)"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

fn non_empty_or_generic(message: &str) -> String {
    if message.trim().is_empty() {
        GENERIC_ERROR_MESSAGE.to_string()
    } else {
        message.to_string()
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::PortalError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[macro_export]
macro_rules! auth_error {
    ($msg:expr, $component:expr) => {
        $crate::PortalError::Authentication {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Sign in again with valid credentials"),
        }
    };
}

#[macro_export]
macro_rules! network_error {
    ($msg:expr, $component:expr) => {
        $crate::PortalError::Network {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check network connectivity and API status"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::PortalError::Network {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check network connectivity and API status"),
        }
    };
}

#[macro_export]
macro_rules! state_error {
    ($msg:expr, $component:expr) => {
        $crate::PortalError::State {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::PortalError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'adportal config --init' to create default config"),
        }
    };
}
