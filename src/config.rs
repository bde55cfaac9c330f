//! Transport configuration.
//!
//! Configuration is plain data with serde defaults, so it can be built in
//! code or loaded from a JSON file:
//!
//! ```json
//! {
//!   "use_cache": false,
//!   "http_headers": { "X-Build": "42" },
//!   "connect_timeout_secs": 30,
//!   "read_timeout_secs": 300
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reqwest::header::{HeaderName, HeaderValue};
use serde::Deserialize;
use thiserror::Error;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large artifacts).
pub const READ_TIMEOUT_SECS: u64 = 300;

const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=3600;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`TransportConfig`].
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A value is outside its accepted range or format.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Settings applied to every request of a transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Allow intermediate caches to answer GET requests.
    ///
    /// When false (the default) every GET carries `Pragma: no-cache`.
    pub use_cache: bool,
    /// Extra headers set on every request. They override built-in headers.
    pub http_headers: BTreeMap<String, String>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_timeout_secs: u64,
    /// User-Agent override.
    pub user_agent: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            use_cache: false,
            http_headers: BTreeMap::new(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            user_agent: None,
        }
    }
}

impl TransportConfig {
    /// Loads and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or
    /// validated.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Adds or replaces a header applied to every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_headers.insert(name.into(), value.into());
        self
    }

    /// Sets the cache flag.
    #[must_use]
    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Checks timeouts and header syntax.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        for (name, value) in &self.http_headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(ConfigError::Invalid {
                    field: "http_headers".to_string(),
                    reason: format!("'{name}' is not a valid header name"),
                });
            }
            if HeaderValue::from_str(value).is_err() {
                return Err(ConfigError::Invalid {
                    field: "http_headers".to_string(),
                    reason: format!("value of '{name}' is not a valid header value"),
                });
            }
        }

        if let Some(user_agent) = &self.user_agent
            && HeaderValue::from_str(user_agent).is_err()
        {
            return Err(ConfigError::Invalid {
                field: "user_agent".to_string(),
                reason: "not a valid header value".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: u64) -> Result<(), ConfigError> {
    if TIMEOUT_RANGE_SECS.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field: field.to_string(),
        reason: format!("{value}. Expected range: 1..=3600"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_disables_cache() {
        let config = TransportConfig::default();
        assert!(!config.use_cache);
        assert!(config.http_headers.is_empty());
        assert_eq!(config.connect_timeout_secs, CONNECT_TIMEOUT_SECS);
        assert_eq!(config.read_timeout_secs, READ_TIMEOUT_SECS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file_applies_defaults_for_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("transport.json");
        std::fs::write(
            &path,
            r#"{ "use_cache": true, "http_headers": { "X-Build": "42" } }"#,
        )
        .unwrap();

        let config = TransportConfig::from_json_file(&path).unwrap();
        assert!(config.use_cache);
        assert_eq!(config.http_headers.get("X-Build").map(String::as_str), Some("42"));
        assert_eq!(config.read_timeout_secs, READ_TIMEOUT_SECS);
    }

    #[test]
    fn test_from_json_file_rejects_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("transport.json");
        std::fs::write(&path, r#"{ "use_cahce": true }"#).unwrap();

        let err = TransportConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got: {err:?}");
    }

    #[test]
    fn test_from_json_file_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let err = TransportConfig::from_json_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_timeout() {
        let config = TransportConfig {
            read_timeout_secs: 0,
            ..TransportConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("read_timeout_secs"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_bad_header_name() {
        let config = TransportConfig::default().with_header("Bad Header", "x");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Bad Header"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_bad_header_value() {
        let config = TransportConfig::default().with_header("X-Token", "line\nbreak");
        assert!(config.validate().is_err());
    }
}
