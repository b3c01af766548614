use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the maximum resolve depth
pub const MAX_RESOLVE_DEPTH_VAR: &str = "ELIF_IOC_MAX_RESOLVE_DEPTH";
/// Environment variable selecting the default registration policy
pub const DEFAULT_SELECTION_VAR: &str = "ELIF_IOC_DEFAULT_SELECTION";
/// Environment variable overriding the root scope tag
pub const ROOT_TAG_VAR: &str = "ELIF_IOC_ROOT_TAG";

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed for '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Which static registration answers a single-result resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultSelection {
    /// The most recently registered component wins
    LastRegistered,
    /// The first registered component wins
    FirstRegistered,
}

impl Default for DefaultSelection {
    fn default() -> Self {
        DefaultSelection::LastRegistered
    }
}

impl FromStr for DefaultSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "last" | "last_registered" => Ok(DefaultSelection::LastRegistered),
            "first" | "first_registered" => Ok(DefaultSelection::FirstRegistered),
            _ => Err(ConfigError::invalid_value(
                "default_selection",
                s,
                "last_registered or first_registered",
            )),
        }
    }
}

/// Container configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Nesting depth at which a resolve is aborted
    pub max_resolve_depth: usize,
    pub default_selection: DefaultSelection,
    /// Tag carried by the root lifetime scope
    pub root_tag: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_resolve_depth: 50,
            default_selection: DefaultSelection::default(),
            root_tag: "root".to_string(),
        }
    }
}

impl ContainerConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_resolve_depth = match get_env_optional(MAX_RESOLVE_DEPTH_VAR) {
            Some(value) => value.parse::<usize>().map_err(|_| {
                ConfigError::invalid_value("max_resolve_depth", &value, "a positive integer")
            })?,
            None => defaults.max_resolve_depth,
        };

        let default_selection = match get_env_optional(DEFAULT_SELECTION_VAR) {
            Some(value) => value.parse()?,
            None => defaults.default_selection,
        };

        let root_tag = get_env_optional(ROOT_TAG_VAR).unwrap_or(defaults.root_tag);

        let config = Self {
            max_resolve_depth,
            default_selection,
            root_tag,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_resolve_depth == 0 {
            return Err(ConfigError::validation_failed(
                "max_resolve_depth",
                "must be greater than zero",
            ));
        }

        if self.root_tag.trim().is_empty() {
            return Err(ConfigError::validation_failed(
                "root_tag",
                "root scope tag cannot be empty",
            ));
        }

        Ok(())
    }
}

fn get_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var(MAX_RESOLVE_DEPTH_VAR);
        env::remove_var(DEFAULT_SELECTION_VAR);
        env::remove_var(ROOT_TAG_VAR);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = ContainerConfig::from_env().unwrap();
        assert_eq!(config, ContainerConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var(MAX_RESOLVE_DEPTH_VAR, "12");
        env::set_var(DEFAULT_SELECTION_VAR, "first");
        env::set_var(ROOT_TAG_VAR, "application");

        let config = ContainerConfig::from_env().unwrap();
        assert_eq!(config.max_resolve_depth, 12);
        assert_eq!(config.default_selection, DefaultSelection::FirstRegistered);
        assert_eq!(config.root_tag, "application");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_depth() {
        clear_env();
        env::set_var(MAX_RESOLVE_DEPTH_VAR, "deep");
        assert!(matches!(
            ContainerConfig::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));

        env::set_var(MAX_RESOLVE_DEPTH_VAR, "0");
        assert!(matches!(
            ContainerConfig::from_env(),
            Err(ConfigError::ValidationFailed { .. })
        ));
        clear_env();
    }

    #[test]
    fn test_from_yaml_partial_document() {
        let config = ContainerConfig::from_yaml_str("default_selection: first_registered\n").unwrap();
        assert_eq!(config.default_selection, DefaultSelection::FirstRegistered);
        assert_eq!(config.max_resolve_depth, 50);
        assert_eq!(config.root_tag, "root");
    }

    #[test]
    fn test_default_selection_from_str() {
        assert_eq!(
            "LAST".parse::<DefaultSelection>().unwrap(),
            DefaultSelection::LastRegistered
        );
        assert!("newest".parse::<DefaultSelection>().is_err());
    }
}
