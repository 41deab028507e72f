//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::ratelimit::RulesConfig;

/// Prefix for environment overrides, e.g. `TURNSTILE__SERVER__BIND_ADDR`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Path to the admission rules file; built-in rules when unset
    #[serde(default)]
    pub rules_path: Option<PathBuf>,

    /// Idle partition sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Bound on a single counter store call in milliseconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Policies evaluated ahead of every route-resolved policy
    #[serde(default)]
    pub global_policies: Vec<String>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            sweep_interval_secs: default_sweep_interval(),
            store_timeout_ms: default_store_timeout(),
            global_policies: Vec::new(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_store_timeout() -> u64 {
    50
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Load configuration from an optional file layered under environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.limiter.sweep_interval_secs.max(1))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.limiter.store_timeout_ms)
    }

    /// The configured rules file, or the built-in rules.
    pub fn load_rules(&self) -> Result<RulesConfig> {
        match &self.limiter.rules_path {
            Some(path) => RulesConfig::from_file(path),
            None => Ok(RulesConfig::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.bind_addr.port(), 8080);
        assert_eq!(config.limiter.sweep_interval_secs, 60);
        assert_eq!(config.store_timeout(), Duration::from_millis(50));
        assert_eq!(config.logging.level, "info");
        assert!(config.limiter.global_policies.is_empty());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("turnstile-config-{}.yaml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "server:\n  bind_addr: 0.0.0.0:9000\nlimiter:\n  store_timeout_ms: 25\n  global_policies:\n    - api.general\n"
        )
        .unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server.bind_addr.port(), 9000);
        assert_eq!(config.store_timeout(), Duration::from_millis(25));
        assert_eq!(config.limiter.global_policies, vec!["api.general"]);
        assert_eq!(config.limiter.sweep_interval_secs, 60);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ServiceConfig::from_file("/nonexistent/turnstile.yaml").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_builtin_rules_when_unset() {
        let rules = ServiceConfig::default().load_rules().unwrap();
        assert!(rules.policies.contains_key("api.general"));
    }
}
