//! Error types for configuration and logging setup

/// Errors raised while loading settings
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

/// Errors raised while installing the global subscriber
#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}
