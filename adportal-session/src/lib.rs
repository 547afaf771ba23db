//! adportal Session - client-side session lifecycle
//!
//! Session storage, expiry countdown, auto-refresh and the lifecycle
//! controller that drives them, plus the form checks that run before any
//! request reaches the backend.

pub mod session;
pub mod validation;

pub use session::*;
pub use validation::{
    password_strength, validate_login_form, validate_password_change, PasswordStrength,
    StrengthLevel, DEFAULT_MIN_PASSWORD_LENGTH,
};
