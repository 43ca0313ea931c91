//! Application configuration
//!
//! Loaded from a TOML file (default `~/.config/monera/config.toml`). A
//! missing file means defaults; every section and field is optional.
//! `JWT_SECRET` and `DATABASE_URL` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::security::{BackendFailurePolicy, RateLimitConfig};
use crate::infrastructure::crypto::password::DEFAULT_MIN_PASSWORD_LENGTH;
use crate::infrastructure::crypto::{JwtConfig, PasswordHasher};
use crate::infrastructure::DatabaseConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default config location: `<config dir>/monera/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("monera")
        .join("config.toml")
}

/// Upper bound for either token lifetime (365 days).
pub const MAX_TOKEN_TTL_SECS: i64 = 365 * 24 * 3600;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseSettings,
    pub security: SecurityConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_host: String,
    pub api_port: u16,
    /// Seconds to wait for in-flight requests on shutdown
    pub shutdown_timeout: u64,
    /// Count requests against the first `X-Forwarded-For` hop instead of
    /// the peer address. Only enable behind a proxy that overwrites it.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            shutdown_timeout: 30,
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        let defaults = DatabaseConfig::default();
        Self {
            url: defaults.url,
            max_connections: defaults.max_connections,
            connect_timeout_secs: defaults.connect_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HS256 signing secret. Empty means a random per-process secret.
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub bcrypt_cost: u32,
    pub min_password_length: usize,
    /// Deadline for every user store / cache call
    pub dependency_timeout_ms: u64,
    pub blacklist_sweep_interval_secs: u64,
    /// Blacklist behaviour when the cache is unreachable
    pub on_backend_error: BackendFailurePolicy,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        let jwt = JwtConfig::default();
        Self {
            jwt_secret: jwt.secret,
            jwt_issuer: jwt.issuer,
            access_token_ttl_secs: jwt.access_ttl_secs,
            refresh_token_ttl_secs: jwt.refresh_ttl_secs,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            dependency_timeout_ms: 5000,
            blacklist_sweep_interval_secs: 60,
            on_backend_error: BackendFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local; counters and revocations are lost on restart.
    #[default]
    Memory,
    /// `cache_entries` table; shared by every instance on the database.
    Database,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn`, `error`, or a full filter directive
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Read `path` (defaults if it does not exist), apply environment
    /// overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&raw)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            if !secret.is_empty() {
                self.security.jwt_secret = secret;
            }
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let security = &self.security;
        if !(4..=31).contains(&security.bcrypt_cost) {
            return Err(ConfigError::Invalid(format!(
                "security.bcrypt_cost must be between 4 and 31, got {}",
                security.bcrypt_cost
            )));
        }
        let ttls = [security.access_token_ttl_secs, security.refresh_token_ttl_secs];
        if ttls.iter().any(|ttl| !(1..=MAX_TOKEN_TTL_SECS).contains(ttl)) {
            return Err(ConfigError::Invalid(format!(
                "token TTLs must be between 1 and {} seconds",
                MAX_TOKEN_TTL_SECS
            )));
        }
        if security.dependency_timeout_ms == 0 || security.blacklist_sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "security.dependency_timeout_ms and blacklist_sweep_interval_secs must be positive".into(),
            ));
        }

        let rules = std::iter::once(("global", &self.rate_limit.global)).chain(
            self.rate_limit
                .endpoints
                .iter()
                .map(|(route, rule)| (route.as_str(), rule)),
        );
        for (scope, rule) in rules {
            if rule.max_requests == 0 || rule.window_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate limit for {} needs max_requests and window_secs above zero",
                    scope
                )));
            }
        }

        Ok(())
    }

    pub fn jwt_config(&self) -> JwtConfig {
        JwtConfig {
            secret: self.security.jwt_secret.clone(),
            issuer: self.security.jwt_issuer.clone(),
            access_ttl_secs: self.security.access_token_ttl_secs,
            refresh_ttl_secs: self.security.refresh_token_ttl_secs,
        }
    }

    pub fn password_hasher(&self) -> PasswordHasher {
        PasswordHasher::new(self.security.bcrypt_cost, self.security.min_password_length)
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            connect_timeout_secs: self.database.connect_timeout_secs,
        }
    }

    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.security.dependency_timeout_ms)
    }

    pub fn api_address(&self) -> String {
        format!("{}:{}", self.server.api_host, self.server.api_port)
    }
}
