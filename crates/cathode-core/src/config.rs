//! Extraction configuration
//!
//! Handles configuration from environment variables and TOML files with
//! defaults tuned for sodium-ion cathode literature.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Chemistry profile (marker element, vocabulary overrides)
    pub profile: ProfileConfig,

    /// Formula cache configuration
    pub cache: CacheConfig,

    /// Abbreviation linker tuning
    pub linker: LinkerConfig,

    /// Property binder tuning
    pub binder: BinderConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ExtractorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(marker) = std::env::var("CATHODE_MARKER_ELEMENT") {
            config.profile.marker_element = marker;
        }
        if let Ok(flag) = std::env::var("CATHODE_TM_LIMIT") {
            config.profile.tm_limit = parse_bool("CATHODE_TM_LIMIT", &flag)?;
        }

        // Cache
        if let Ok(flag) = std::env::var("CATHODE_CACHE_ENABLED") {
            config.cache.enabled = parse_bool("CATHODE_CACHE_ENABLED", &flag)?;
        }
        if let Ok(capacity) = std::env::var("CATHODE_CACHE_CAPACITY") {
            config.cache.max_capacity =
                capacity.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "CATHODE_CACHE_CAPACITY".to_string(),
                    value: capacity,
                })?;
        }

        // Logging
        if let Ok(level) = std::env::var("CATHODE_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = Self::default();

        // Only override if env values differ from defaults
        if env_config.profile.marker_element != defaults.profile.marker_element {
            self.profile.marker_element = env_config.profile.marker_element;
        }
        if env_config.profile.tm_limit != defaults.profile.tm_limit {
            self.profile.tm_limit = env_config.profile.tm_limit;
        }
        if env_config.cache.enabled != defaults.cache.enabled {
            self.cache.enabled = env_config.cache.enabled;
        }
        if env_config.cache.max_capacity != defaults.cache.max_capacity {
            self.cache.max_capacity = env_config.cache.max_capacity;
        }
        if env_config.logging.level != defaults.logging.level {
            self.logging.level = env_config.logging.level;
        }

        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let marker = &self.profile.marker_element;
        let mut chars = marker.chars();
        let well_formed = matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
            && chars.all(|c| c.is_ascii_lowercase())
            && marker.len() <= 3;
        if !well_formed {
            return Err(ConfigError::InvalidValue {
                key: "profile.marker_element".to_string(),
                value: marker.clone(),
            });
        }
        if self.linker.search_window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "linker.search_window".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Chemistry profile: which battery chemistry is under study and extra vocabulary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Element whose presence marks a formula as a cathode candidate
    pub marker_element: String,

    /// Require a transition metal for a token to count as a compound formula
    pub tm_limit: bool,

    /// Extra solvent-name fragments
    pub extra_solvents: Vec<String>,

    /// Extra raw-material fragments
    pub extra_raw_materials: Vec<String>,

    /// Extra apparatus acronyms
    pub extra_apparatus: Vec<String>,

    /// Extra tokens that are never materials
    pub extra_other: Vec<String>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            marker_element: "Na".to_string(),
            tm_limit: false,
            extra_solvents: vec![],
            extra_raw_materials: vec![],
            extra_apparatus: vec![],
            extra_other: vec![],
        }
    }
}

/// Formula cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable memoization of parse/normalize/classify
    pub enabled: bool,

    /// Maximum number of entries, 0 for unbounded
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 0,
        }
    }
}

/// Abbreviation linker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Characters scanned outward when looking for an enclosing bracket
    pub search_window: usize,

    /// Maximum gap between a formula span and an adjacent abbreviation span
    pub adjacent_gap: usize,

    /// Uppercase-letter overlap required between abbreviation and formula
    pub relevance_threshold: i32,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            search_window: 25,
            adjacent_gap: 6,
            relevance_threshold: 2,
        }
    }
}

/// Property binder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderConfig {
    /// Capacities at or below this value (mAh/g) are ignored
    pub min_capacity: f64,

    /// Upper bound for a plausible cut-off voltage window
    pub max_voltage: f64,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            min_capacity: 10.0,
            max_voltage: 5.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExtractorConfig::default();
        assert_eq!(config.profile.marker_element, "Na");
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_capacity, 0);
        assert_eq!(config.linker.search_window, 25);
        assert_eq!(config.binder.min_capacity, 10.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ExtractorConfig = toml::from_str(
            r#"
            [profile]
            marker_element = "Li"

            [cache]
            max_capacity = 512
            "#,
        )
        .unwrap();
        assert_eq!(config.profile.marker_element, "Li");
        assert!(!config.profile.tm_limit);
        assert_eq!(config.cache.max_capacity, 512);
        assert!(config.cache.enabled);
        assert_eq!(config.linker.adjacent_gap, 6);
    }

    #[test]
    fn test_invalid_marker_rejected() {
        let mut config = ExtractorConfig::default();
        config.profile.marker_element = "sodium".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("K", "true").unwrap());
        assert!(!parse_bool("K", "0").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let err = ExtractorConfig::from_file("/nonexistent/cathode.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
