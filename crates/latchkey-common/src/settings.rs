//! Settings management for Latchkey
//!
//! Settings come from an optional file (`conf/latchkey.yml` by default) layered
//! under environment variables such as `LATCHKEY_REDIS__URL` or
//! `LATCHKEY_HEARTBEAT__INTERVAL_MS`. Every field has a default, so an empty
//! environment yields a usable configuration.

use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File, Map};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_KEY, DEFAULT_LOCK_TTL_SECONDS, ENV_PREFIX,
};

/// Default settings file, relative to the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "conf/latchkey.yml";

/// Redis connection settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisSettings {
    /// Connection URL (default: redis://127.0.0.1:6379/)
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Prefix applied to every key (default: empty)
    #[serde(default)]
    pub key_prefix: String,

    /// Per-command response timeout in milliseconds (default: 3000ms)
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: String::new(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl RedisSettings {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Lock settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSettings {
    /// Default lease for new locks in seconds (default: 30)
    #[serde(default = "default_lock_ttl_seconds")]
    pub ttl_seconds: u32,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_LOCK_TTL_SECONDS,
        }
    }
}

/// Heartbeat beacon settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    /// Refresh interval in milliseconds (default: 1000ms)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,

    /// Liveness key (default: mq::connection::heartbeat)
    #[serde(default = "default_heartbeat_key")]
    pub key: String,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            key: default_heartbeat_key(),
        }
    }
}

impl HeartbeatSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Logging settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Level or filter directive, overridden by `RUST_LOG` (default: info)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Top-level settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatchkeySettings {
    #[serde(default)]
    pub redis: RedisSettings,

    #[serde(default)]
    pub lock: LockSettings,

    #[serde(default)]
    pub heartbeat: HeartbeatSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl LatchkeySettings {
    /// Load settings from `path` (if it exists) and the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::build(Some(path.as_ref()), None)
    }

    /// Load settings from the default file location and the process environment.
    pub fn from_default_file() -> Result<Self, ConfigError> {
        Self::load(DEFAULT_SETTINGS_FILE)
    }

    /// Load settings from the process environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::build(None, None)
    }

    /// Load settings with an explicit environment map in place of the process
    /// environment. Keys use the same `LATCHKEY_SECTION__FIELD` spelling.
    pub fn from_source(
        path: Option<&Path>,
        env: Map<String, String>,
    ) -> Result<Self, ConfigError> {
        Self::build(path, Some(env))
    }

    fn build(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let settings: LatchkeySettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "heartbeat.interval_ms",
                message: "interval must be greater than zero".to_string(),
            });
        }
        if self.heartbeat.key.is_empty() {
            return Err(ConfigError::Invalid {
                key: "heartbeat.key",
                message: "liveness key must not be empty".to_string(),
            });
        }
        if self.redis.url.is_empty() {
            return Err(ConfigError::Invalid {
                key: "redis.url",
                message: "url must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_response_timeout_ms() -> u64 {
    3000
}

fn default_lock_ttl_seconds() -> u32 {
    DEFAULT_LOCK_TTL_SECONDS
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_heartbeat_key() -> String {
    DEFAULT_HEARTBEAT_KEY.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
