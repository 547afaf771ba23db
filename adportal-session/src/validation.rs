//! Client-side form checks that run before any network call

use adportal_core::{validation_error, PortalResult};
use serde::{Deserialize, Serialize};

/// Minimum password length used when no configuration says otherwise
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// Both login fields must be filled in
pub fn validate_login_form(username: &str, password: &str) -> PortalResult<()> {
    if username.trim().is_empty() {
        return Err(validation_error!("Please enter your username", "username", "validation"));
    }
    if password.trim().is_empty() {
        return Err(validation_error!("Please enter your password", "password", "validation"));
    }
    Ok(())
}

/// Check a password change form
pub fn validate_password_change(
    current: &str,
    new: &str,
    confirm: &str,
    min_length: usize,
) -> PortalResult<()> {
    if current.is_empty() || new.is_empty() || confirm.is_empty() {
        return Err(validation_error!(
            "All password fields are required",
            "password",
            "validation"
        ));
    }

    if new != confirm {
        return Err(validation_error!(
            "New passwords do not match",
            "confirm_password",
            "validation"
        ));
    }

    if new.chars().count() < min_length {
        return Err(validation_error!(
            format!("Password must be at least {} characters long", min_length),
            "new_password",
            "validation"
        ));
    }

    if new == current {
        return Err(validation_error!(
            "New password must be different from the current password",
            "new_password",
            "validation"
        ));
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrengthLevel {
    Weak,
    Medium,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordStrength {
    /// 0 to 6
    pub score: u8,
    pub level: StrengthLevel,
}

impl PasswordStrength {
    pub fn label(&self) -> &'static str {
        match self.level {
            StrengthLevel::Weak => "Weak",
            StrengthLevel::Medium => "Medium",
            StrengthLevel::Strong => "Strong",
        }
    }
}

/// Score a password one point per satisfied rule
pub fn password_strength(password: &str) -> PasswordStrength {
    let length = password.chars().count();
    let rules = [
        length >= 8,
        length >= 12,
        password.chars().any(char::is_lowercase),
        password.chars().any(char::is_uppercase),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
    ];
    let score = rules.iter().filter(|&&passed| passed).count() as u8;

    let level = match score {
        0..=2 => StrengthLevel::Weak,
        3..=4 => StrengthLevel::Medium,
        _ => StrengthLevel::Strong,
    };

    PasswordStrength { score, level }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adportal_core::{ErrorKind, PortalError};

    fn field_of(error: PortalError) -> Option<String> {
        match error {
            PortalError::Validation { field, .. } => field,
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_login_form_requires_both_fields() {
        assert!(validate_login_form("alice", "pw").is_ok());

        let error = validate_login_form("  ", "pw").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(field_of(error).as_deref(), Some("username"));

        let error = validate_login_form("alice", "").unwrap_err();
        assert_eq!(field_of(error).as_deref(), Some("password"));
    }

    #[test]
    fn test_password_change_rules() {
        let min = DEFAULT_MIN_PASSWORD_LENGTH;
        assert!(validate_password_change("old-secret", "N3w-Secret!", "N3w-Secret!", min).is_ok());

        let missing = validate_password_change("", "N3w-Secret!", "N3w-Secret!", min).unwrap_err();
        assert_eq!(missing.user_message(), "All password fields are required");

        let mismatch = validate_password_change("old", "N3w-Secret!", "N3w-Secret?", min).unwrap_err();
        assert_eq!(field_of(mismatch).as_deref(), Some("confirm_password"));

        let short = validate_password_change("old", "short", "short", min).unwrap_err();
        assert_eq!(
            short.user_message(),
            "Password must be at least 8 characters long"
        );

        let reused = validate_password_change("SamePass1!", "SamePass1!", "SamePass1!", min).unwrap_err();
        assert_eq!(field_of(reused).as_deref(), Some("new_password"));
    }

    #[test]
    fn test_password_strength_levels() {
        let weak = password_strength("abc");
        assert_eq!(weak.score, 1);
        assert_eq!(weak.level, StrengthLevel::Weak);

        let medium = password_strength("abcdefgh1");
        assert_eq!(medium.score, 3);
        assert_eq!(medium.level, StrengthLevel::Medium);

        let strong = password_strength("Correct-Horse-7");
        assert_eq!(strong.score, 6);
        assert_eq!(strong.level, StrengthLevel::Strong);
        assert_eq!(strong.label(), "Strong");

        assert_eq!(password_strength("").score, 0);
    }
}
