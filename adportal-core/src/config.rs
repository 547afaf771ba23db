//! Configuration management

use crate::error::{PortalError, PortalResult};
use crate::logging::LoggingConfig;
use crate::types::{ApiSettings, PortalConfig, SessionSettings, StorageSettings};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            session: SessionSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_seconds: 30,
            user_agent: format!("adportal/{}", env!("CARGO_PKG_VERSION")),
            headers: HashMap::new(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            warning_threshold_secs: 5 * 60,
            refresh_interval_secs: 15 * 60,
            forced_logout_delay_ms: 2_500,
            min_password_length: 8,
        }
    }
}

impl SessionSettings {
    /// Check the timing values the session timers depend on
    pub fn validate(&self) -> PortalResult<()> {
        if self.tick_interval_secs == 0 {
            return Err(invalid(
                "session.tick_interval_secs must be greater than 0",
                "Set session.tick_interval_secs to a positive value",
            ));
        }

        // A cadence longer than the warning window could skip the warning entirely
        if self.warning_threshold_secs < self.tick_interval_secs {
            return Err(invalid(
                "session.warning_threshold_secs must not be shorter than the tick interval",
                "Increase session.warning_threshold_secs or lower session.tick_interval_secs",
            ));
        }

        if self.refresh_interval_secs == 0 {
            return Err(invalid(
                "session.refresh_interval_secs must be greater than 0",
                "Set session.refresh_interval_secs to a positive value",
            ));
        }

        if self.forced_logout_delay() >= self.refresh_interval() {
            return Err(invalid(
                "session.forced_logout_delay_ms must be shorter than the refresh interval",
                "Lower session.forced_logout_delay_ms",
            ));
        }

        if self.min_password_length == 0 {
            return Err(invalid(
                "session.min_password_length must be greater than 0",
                "Set session.min_password_length to a positive value",
            ));
        }

        Ok(())
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.adportal/data".to_string(),
        }
    }
}

impl StorageSettings {
    /// Data directory with a leading `~` expanded to the home directory
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }
}

fn expand_home(raw: &str) -> PathBuf {
    match (raw.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches(['/', '\\'])),
        _ => PathBuf::from(raw),
    }
}

impl PortalConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> PortalResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PortalError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: PortalConfig = toml::from_str(&content).map_err(|e| PortalError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> PortalResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| PortalError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content).map_err(|e| PortalError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: crate::ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> PortalResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(invalid("api.base_url must not be empty", "Set api.base_url"));
        }

        self.session.validate()
    }
}

fn invalid(message: &str, suggestion: &str) -> PortalError {
    PortalError::Config {
        message: message.to_string(),
        source: None,
        context: crate::ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PortalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.warning_threshold_secs, 300);
        assert_eq!(config.session.refresh_interval_secs, 900);
        assert_eq!(config.session.min_password_length, 8);
    }

    #[test]
    fn test_rejects_tick_longer_than_warning_window() {
        let mut config = PortalConfig::default();
        config.session.tick_interval_secs = 600;
        assert!(matches!(config.validate(), Err(PortalError::Config { .. })));
    }

    #[test]
    fn test_rejects_forced_logout_after_refresh() {
        let mut config = PortalConfig::default();
        config.session.forced_logout_delay_ms = 16 * 60 * 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_settings_reject_zero_tick() {
        let settings = SessionSettings {
            tick_interval_secs: 0,
            ..SessionSettings::default()
        };
        assert!(matches!(settings.validate(), Err(PortalError::Config { .. })));
        assert!(SessionSettings::default().validate().is_ok());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PortalConfig::default();
        config.api.base_url = "https://ad.example.com".to_string();
        config.session.refresh_interval_secs = 600;
        config.save_to_file(&path).unwrap();

        let loaded = PortalConfig::from_file(&path).unwrap();
        assert_eq!(loaded.api.base_url, "https://ad.example.com");
        assert_eq!(loaded.session.refresh_interval_secs, 600);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"https://ad.example.com\"\ntimeout_seconds = 5\nuser_agent = \"test\"\n",
        )
        .unwrap();

        let loaded = PortalConfig::from_file(&path).unwrap();
        assert_eq!(loaded.api.timeout_seconds, 5);
        assert_eq!(loaded.session.tick_interval_secs, 1);
    }

    #[test]
    fn test_expand_home() {
        let settings = StorageSettings {
            data_dir: "/var/lib/adportal".to_string(),
        };
        assert_eq!(settings.resolved_data_dir(), PathBuf::from("/var/lib/adportal"));

        if let Some(home) = dirs::home_dir() {
            let settings = StorageSettings::default();
            assert_eq!(
                settings.resolved_data_dir(),
                home.join(".adportal").join("data")
            );
        }
    }
}
