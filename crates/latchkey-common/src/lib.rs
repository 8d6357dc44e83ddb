//! Latchkey Common - Shared configuration, logging and utilities
//!
//! This crate provides the pieces every Latchkey component leans on:
//! - Settings loading (file + environment)
//! - Logging initialization
//! - Error types for configuration and logging
//! - Token, key and lease-time helpers

pub mod error;
pub mod logging;
pub mod settings;
pub mod util;

// Re-exports for convenience
pub use error::{ConfigError, LoggingError};
pub use logging::init_logging;
pub use settings::{
    HeartbeatSettings, LatchkeySettings, LockSettings, LoggingSettings, RedisSettings,
};
pub use util::{
    LEASE_TOLERANCE_MS, MILLIS_PER_SECOND, TOKEN_LEN, ensure_start_with, lease_millis,
    random_token,
};

/// Default liveness key written by the heartbeat beacon
pub const DEFAULT_HEARTBEAT_KEY: &str = "mq::connection::heartbeat";

/// Default heartbeat refresh interval in milliseconds
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1000;

/// Default lock lease in seconds
pub const DEFAULT_LOCK_TTL_SECONDS: u32 = 30;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "LATCHKEY";
