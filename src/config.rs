use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
#[cfg(feature = "config")]
use std::fs;
#[cfg(feature = "config")]
use std::path::Path;

/// Environment type for configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Get environment from string
    pub fn from_name(env: &str) -> Self {
        match env.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// Get environment name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Prefix of every backend key
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub max_age: i64,

    #[serde(default)]
    pub secure: bool,

    #[serde(default = "default_http_only")]
    pub http_only: bool,

    #[serde(default = "default_same_site")]
    pub same_site: String,

    /// Seconds of inactivity before expiry; zero or less disables it
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: i64,

    /// Seconds from creation before expiry; zero or less disables it
    #[serde(default = "default_absolute_timeout")]
    pub absolute_timeout: i64,

    /// Live sessions allowed per principal; zero means unlimited
    #[serde(default)]
    pub max_concurrent_sessions: i64,

    /// Deadline applied to every backend call made by the store
    #[serde(default)]
    pub command_timeout_ms: Option<u64>,

    #[serde(default)]
    pub storage: SessionStorageConfig,
}

/// Session storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionStorageConfig {
    /// In-process storage (default)
    Memory {
        /// Seconds between sweeps of expired keys; zero disables the sweeper
        #[serde(default = "default_purge_interval")]
        purge_interval: u64,
    },
    /// Redis-based session storage
    Redis {
        url: String,
        #[serde(default = "default_redis_pool_size")]
        pool_size: usize,
        #[serde(default = "default_redis_connection_timeout")]
        connection_timeout: u64,
        #[serde(default = "default_redis_command_timeout")]
        command_timeout: u64,
    },
}

impl Default for SessionStorageConfig {
    fn default() -> Self {
        Self::Memory {
            purge_interval: default_purge_interval(),
        }
    }
}

fn default_cookie_name() -> String {
    crate::session::DEFAULT_NAME.to_string()
}
fn default_namespace() -> String {
    crate::session::store::DEFAULT_NAMESPACE.to_string()
}
fn default_path() -> String {
    "/".to_string()
}
fn default_http_only() -> bool {
    true
}
fn default_same_site() -> String {
    "Lax".to_string()
}
fn default_idle_timeout() -> i64 {
    900 // 15 minutes
}
fn default_absolute_timeout() -> i64 {
    1800 // 30 minutes
}
fn default_purge_interval() -> u64 {
    300
}
fn default_redis_pool_size() -> usize {
    10
}
fn default_redis_connection_timeout() -> u64 {
    5000
}
fn default_redis_command_timeout() -> u64 {
    3000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            namespace: default_namespace(),
            path: default_path(),
            domain: None,
            max_age: 0,
            secure: false,
            http_only: default_http_only(),
            same_site: default_same_site(),
            idle_timeout: default_idle_timeout(),
            absolute_timeout: default_absolute_timeout(),
            max_concurrent_sessions: 0,
            command_timeout_ms: None,
            storage: SessionStorageConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `config.toml` and `config.{env}.toml` from the working directory
    #[cfg(feature = "config")]
    pub fn load() -> Result<Self> {
        Self::load_with_base_dir(".")
    }

    /// Load configuration from a specific base directory
    ///
    /// The environment file is merged over the base file, then environment
    /// variables are applied on top.
    #[cfg(feature = "config")]
    pub fn load_with_base_dir<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let env = Self::detect_environment();

        let base_config_path = base_dir.join("config.toml");
        let mut merged_value = if base_config_path.exists() {
            Self::load_toml_value(&base_config_path)?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        let env_config_path = base_dir.join(format!("config.{}.toml", env.as_str()));
        if env_config_path.exists() {
            log::debug!(
                "Loading environment-specific config from: {}",
                env_config_path.display()
            );
            let env_value = Self::load_toml_value(&env_config_path)?;
            merged_value = serde_toml_merge::merge(merged_value, env_value).map_err(|e| {
                Error::config(format!("Failed to merge configuration files: {}", e))
            })?;
        }

        let json_value = serde_json::to_value(&merged_value).map_err(|e| {
            Error::config(format!("Failed to convert merged configuration: {}", e))
        })?;
        let mut config: AppConfig = serde_json::from_value(json_value).map_err(|e| {
            Error::config(format!("Failed to deserialize merged configuration: {}", e))
        })?;

        config.environment = env;
        config.finish()?;

        log::info!(
            "Session configuration loaded (environment: {})",
            config.environment.as_str()
        );
        Ok(config)
    }

    /// Load configuration from a single TOML file, without overrides
    #[cfg(feature = "config")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path_ref.display(),
                e
            ))
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}. Check TOML syntax.",
                path_ref.display(),
                e
            ))
        })?;
        config.validate()?;

        log::debug!(
            "Successfully loaded configuration from: {}",
            path_ref.display()
        );
        Ok(config)
    }

    #[cfg(feature = "config")]
    fn load_toml_value<P: AsRef<Path>>(path: P) -> Result<toml::Value> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path_ref.display(),
                e
            ))
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}. Check TOML syntax.",
                path_ref.display(),
                e
            ))
        })
    }

    /// Defaults plus environment variable overrides
    pub fn from_env() -> Result<Self> {
        let mut config = AppConfig {
            environment: Self::detect_environment(),
            ..AppConfig::default()
        };
        config.finish()?;
        Ok(config)
    }

    /// Detect current environment from `RUSTF_ENV`
    pub fn detect_environment() -> Environment {
        env::var("RUSTF_ENV")
            .map(|env| Environment::from_name(&env))
            .unwrap_or_default()
    }

    fn finish(&mut self) -> Result<()> {
        self.apply_env_overrides()?;
        if self.environment.is_production() {
            self.apply_security_defaults();
        }
        self.validate()
    }

    /// Harden session cookies for production
    pub fn apply_security_defaults(&mut self) {
        self.session.secure = true;
        self.session.http_only = true;
        if self.session.same_site.eq_ignore_ascii_case("none") {
            log::warn!("SameSite=None session cookie in production, using Lax");
            self.session.same_site = "Lax".to_string();
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let session = &self.session;

        if session.cookie_name.trim().is_empty() {
            return Err(Error::config("Session cookie name cannot be empty"));
        }
        if session.namespace.trim().is_empty() {
            return Err(Error::config("Session namespace cannot be empty"));
        }
        if session.max_concurrent_sessions < 0 {
            return Err(Error::config(
                "max_concurrent_sessions cannot be negative (use 0 for unlimited)",
            ));
        }

        if let SessionStorageConfig::Redis { url, pool_size, .. } = &session.storage {
            if url.trim().is_empty() {
                return Err(Error::config("Redis URL cannot be empty"));
            }
            if *pool_size == 0 {
                return Err(Error::config("Redis pool size cannot be 0"));
            }
        }

        if session.idle_timeout <= 0 && session.absolute_timeout <= 0 {
            log::warn!("Both session timeouts are disabled: sessions never expire");
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(env) = env::var("RUSTF_ENV") {
            self.environment = Environment::from_name(&env);
        }

        if let Ok(namespace) = env::var("RUSTF_SESSION_NAMESPACE") {
            self.session.namespace = namespace;
        }

        if let Ok(value) = env::var("RUSTF_SESSION_IDLE_TIMEOUT") {
            self.session.idle_timeout = parse_env("RUSTF_SESSION_IDLE_TIMEOUT", &value)?;
        }

        if let Ok(value) = env::var("RUSTF_SESSION_ABSOLUTE_TIMEOUT") {
            self.session.absolute_timeout = parse_env("RUSTF_SESSION_ABSOLUTE_TIMEOUT", &value)?;
        }

        if let Ok(value) = env::var("RUSTF_SESSION_MAX_CONCURRENT") {
            self.session.max_concurrent_sessions =
                parse_env("RUSTF_SESSION_MAX_CONCURRENT", &value)?;
        }

        if let Ok(url) = env::var("RUSTF_REDIS_URL") {
            match &mut self.session.storage {
                SessionStorageConfig::Redis { url: current, .. } => *current = url,
                SessionStorageConfig::Memory { .. } => {
                    self.session.storage = SessionStorageConfig::Redis {
                        url,
                        pool_size: default_redis_pool_size(),
                        connection_timeout: default_redis_connection_timeout(),
                        command_timeout: default_redis_command_timeout(),
                    };
                }
            }
        }

        Ok(())
    }
}

fn parse_env(name: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("Invalid value for {}: {}", name, value)))
}
