//! Runtime configuration for the firewall core.
//!
//! [`RuntimeConfig`] carries the environment-driven knobs named in spec §6
//! (`CACHE_TTL_L1`, `CACHE_TTL_L2`, `CACHE_L1_SIZE`, `SEMANTIC_THRESHOLD`,
//! `DEADLINE_MS`, `MAX_PROMPT_BYTES`, `MAX_BATCH_SIZE`). [`ConfigError`] is
//! the shared error type for loading policy/pattern documents from disk
//! (YAML, TOML, or JSON), mirroring the teacher's `PolicyBuilder::with_file`
//! dispatch-by-extension approach.
//!
//! ## Configuration hierarchy
//!
//! 1. Compiled defaults (secure by default — see [`RuntimeConfig::default`])
//! 2. Environment variables (the unprefixed spec §6 keys — `CACHE_TTL_L1`,
//!    `CACHE_TTL_L2`, `CACHE_L1_SIZE`, `SEMANTIC_THRESHOLD`, `DEADLINE_MS`,
//!    `MAX_PROMPT_BYTES`, `MAX_BATCH_SIZE`), applied via [`RuntimeConfig::from_env`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use wg_firewall::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! assert!(config.deadline_ms > 0);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while loading a policy or pattern document from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file at {path}: {source}")]
    FileRead {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration contents.
    #[error("failed to parse {format} config: {source}")]
    ParseError {
        /// Format that failed to parse (YAML, TOML, JSON).
        format: String,
        /// Underlying parse error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Unsupported or unrecognised file extension.
    #[error("unsupported config file format: {message}")]
    UnsupportedFormat {
        /// Description of the problem.
        message: String,
    },

    /// Document failed structural validation.
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// An environment variable held a value that could not be parsed.
    #[error("failed to parse environment variable {key}: {message}")]
    EnvParse {
        /// Environment variable name.
        key: String,
        /// Description of the parse failure.
        message: String,
    },
}

/// Parse a file's contents as YAML, TOML, or JSON based on its extension.
///
/// Shared by [`crate::patterns::StaticPatternProvider::from_file`] and
/// [`crate::policy::StaticPolicyProvider::from_file`].
pub fn load_document<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            format: "YAML".to_string(),
            source: Box::new(e),
        }),
        Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            format: "TOML".to_string(),
            source: Box::new(e),
        }),
        Some("json") => serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            format: "JSON".to_string(),
            source: Box::new(e),
        }),
        _ => Err(ConfigError::UnsupportedFormat {
            message: "file extension must be .yaml, .yml, .toml, or .json".to_string(),
        }),
    }
}

/// Environment-driven runtime knobs (spec §5, §6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeConfig {
    /// L1 (process-local) cache entry TTL. Default 300s.
    pub cache_ttl_l1: Duration,
    /// L2 (shared) cache entry TTL. Default 3600s.
    pub cache_ttl_l2: Duration,
    /// L1 cache capacity (entry count). Default 1000.
    pub cache_l1_size: usize,
    /// Default semantic similarity threshold, overridable per-policy. Default 0.85.
    pub semantic_threshold: f32,
    /// Per-request deadline. Default 150ms.
    pub deadline_ms: u64,
    /// Maximum prompt size in bytes. Default 64 KiB.
    pub max_prompt_bytes: usize,
    /// Maximum number of prompts accepted in one batch call. Default 100.
    pub max_batch_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_ttl_l1: Duration::from_secs(300),
            cache_ttl_l2: Duration::from_secs(3600),
            cache_l1_size: 1000,
            semantic_threshold: 0.85,
            deadline_ms: crate::model::DEFAULT_DEADLINE_MS,
            max_prompt_bytes: crate::model::DEFAULT_MAX_PROMPT_BYTES,
            max_batch_size: 100,
        }
    }
}

impl RuntimeConfig {
    /// Build the default configuration, then apply `WG_FIREWALL_*`
    /// environment variable overrides if present. Loads a `.env` file
    /// first, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvParse`] if a present variable cannot be
    /// parsed as the expected type.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(v) = std::env::var("CACHE_TTL_L1") {
            config.cache_ttl_l1 = Duration::from_secs(parse_env("CACHE_TTL_L1", &v)?);
        }
        if let Ok(v) = std::env::var("CACHE_TTL_L2") {
            config.cache_ttl_l2 = Duration::from_secs(parse_env("CACHE_TTL_L2", &v)?);
        }
        if let Ok(v) = std::env::var("CACHE_L1_SIZE") {
            config.cache_l1_size = parse_env("CACHE_L1_SIZE", &v)?;
        }
        if let Ok(v) = std::env::var("SEMANTIC_THRESHOLD") {
            config.semantic_threshold = parse_env("SEMANTIC_THRESHOLD", &v)?;
        }
        if let Ok(v) = std::env::var("DEADLINE_MS") {
            config.deadline_ms = parse_env("DEADLINE_MS", &v)?;
        }
        if let Ok(v) = std::env::var("MAX_PROMPT_BYTES") {
            config.max_prompt_bytes = parse_env("MAX_PROMPT_BYTES", &v)?;
        }
        if let Ok(v) = std::env::var("MAX_BATCH_SIZE") {
            config.max_batch_size = parse_env("MAX_BATCH_SIZE", &v)?;
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::EnvParse {
        key: key.to_string(),
        message: format!("could not parse '{value}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = RuntimeConfig::default();
        assert_eq!(c.deadline_ms, 150);
        assert_eq!(c.max_prompt_bytes, 64 * 1024);
        assert_eq!(c.cache_l1_size, 1000);
        assert_eq!(c.max_batch_size, 100);
        assert!((c.semantic_threshold - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn env_overrides_apply() {
        // SAFETY-equivalent: tests run single-threaded per-process for env;
        // restore afterward to avoid cross-test interference.
        unsafe {
            std::env::set_var("DEADLINE_MS", "500");
            std::env::set_var("MAX_BATCH_SIZE", "25");
        }
        let c = RuntimeConfig::from_env().unwrap();
        assert_eq!(c.deadline_ms, 500);
        assert_eq!(c.max_batch_size, 25);
        unsafe {
            std::env::remove_var("DEADLINE_MS");
            std::env::remove_var("MAX_BATCH_SIZE");
        }
    }

    #[test]
    fn invalid_env_value_errors() {
        unsafe {
            std::env::set_var("CACHE_L1_SIZE", "not-a-number");
        }
        let result = RuntimeConfig::from_env();
        unsafe {
            std::env::remove_var("CACHE_L1_SIZE");
        }
        assert!(matches!(result, Err(ConfigError::EnvParse { .. })));
    }
}
