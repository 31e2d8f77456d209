//! Runtime configuration for the control plane.
//!
//! [`RuntimeSettings`] carries the process-wide knobs shared by the
//! guardrails runtime, the interceptor, and the sandbox.  Settings are
//! resolved in the following order (later wins):
//!
//! 1. Compiled defaults (fail closed, audit on)
//! 2. Config file (`modelwarden.toml`, `.yaml`, or `.json`)
//! 3. Environment variables (`MODELWARDEN_*`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use modelwarden::config::SettingsBuilder;
//!
//! let settings = SettingsBuilder::new()
//!     .with_file("config/modelwarden.toml")?
//!     .with_env()
//!     .build()?;
//!
//! assert!(!settings.fail_open);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use validator::Validate;

/// Errors that can occur while resolving runtime settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file at {path}: {source}")]
    FileRead {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration.
    #[error("failed to parse {format} config: {source}")]
    Parse {
        /// Format that failed to parse (YAML, TOML, JSON).
        format: String,
        /// Underlying parse error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Unsupported configuration file extension.
    #[error("unsupported config file format: {message}")]
    UnsupportedFormat {
        /// Description of the problem.
        message: String,
    },

    /// Settings validation failed.
    #[error("settings validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {key}: {message}")]
    EnvParse {
        /// Environment variable key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Process-wide runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RuntimeSettings {
    /// Settings version for compatibility tracking.
    #[validate(length(min = 1))]
    pub version: String,

    /// Runtime-wide fail-open override. The safe default is `false`
    /// (fail closed — a timed-out or failing checkpoint blocks).
    pub fail_open: bool,

    /// Default per-checkpoint timeout budget in milliseconds.
    #[validate(range(min = 1))]
    pub default_timeout_ms: u64,

    /// Tool-call admissions allowed per session per minute.
    #[validate(range(min = 1))]
    pub rate_limit_per_minute: usize,

    /// Whether intercept verdicts are recorded in the audit ring buffer.
    pub enable_audit: bool,

    /// Guardrail result cache TTL in seconds.
    pub cache_ttl_seconds: u64,

    /// Maximum number of cached guardrail results.
    #[validate(range(min = 1))]
    pub max_cache_entries: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            fail_open: false,
            default_timeout_ms: 5_000,
            rate_limit_per_minute: 60,
            enable_audit: true,
            cache_ttl_seconds: 300,
            max_cache_entries: 10_000,
        }
    }
}

/// Builder that resolves [`RuntimeSettings`] from files and environment.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    base: RuntimeSettings,
    use_env: bool,
}

impl SettingsBuilder {
    /// Create a builder with the compiled defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: RuntimeSettings::default(),
            use_env: false,
        }
    }

    /// Load settings from a configuration file (YAML, TOML, or JSON).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let settings: RuntimeSettings = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                    format: "YAML".to_string(),
                    source: Box::new(e),
                })?
            }
            Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::Parse {
                format: "TOML".to_string(),
                source: Box::new(e),
            })?,
            Some("json") => serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                format: "JSON".to_string(),
                source: Box::new(e),
            })?,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    message: "file extension must be .yaml, .yml, .toml, or .json".to_string(),
                });
            }
        };

        self.base = settings;
        Ok(self)
    }

    /// Enable overrides from `MODELWARDEN_*` environment variables.
    ///
    /// Recognised keys:
    /// - `MODELWARDEN_FAIL_OPEN=true|false`
    /// - `MODELWARDEN_RATE_LIMIT_PER_MINUTE=<n>`
    /// - `MODELWARDEN_DEFAULT_TIMEOUT_MS=<n>`
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Build the final settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation fails or an environment
    /// variable cannot be parsed.
    pub fn build(mut self) -> Result<RuntimeSettings, ConfigError> {
        if self.use_env {
            dotenvy::dotenv().ok();

            if let Ok(raw) = std::env::var("MODELWARDEN_FAIL_OPEN") {
                self.base.fail_open = raw.parse().map_err(|_| ConfigError::EnvParse {
                    key: "MODELWARDEN_FAIL_OPEN".to_string(),
                    message: "must be 'true' or 'false'".to_string(),
                })?;
            }

            if let Ok(raw) = std::env::var("MODELWARDEN_RATE_LIMIT_PER_MINUTE") {
                self.base.rate_limit_per_minute =
                    raw.parse().map_err(|_| ConfigError::EnvParse {
                        key: "MODELWARDEN_RATE_LIMIT_PER_MINUTE".to_string(),
                        message: "must be a positive integer".to_string(),
                    })?;
            }

            if let Ok(raw) = std::env::var("MODELWARDEN_DEFAULT_TIMEOUT_MS") {
                self.base.default_timeout_ms = raw.parse().map_err(|_| ConfigError::EnvParse {
                    key: "MODELWARDEN_DEFAULT_TIMEOUT_MS".to_string(),
                    message: "must be a positive integer".to_string(),
                })?;
            }
        }

        self.base.validate()?;

        Ok(self.base)
    }
}
