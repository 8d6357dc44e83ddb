//! Logging initialization
//!
//! Installs a `tracing` subscriber with a single formatted layer. `RUST_LOG`
//! takes precedence over the configured level so operators can raise
//! verbosity for one target (e.g. `RUST_LOG=latchkey_coordination=debug`)
//! without touching configuration files.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::error::LoggingError;
use crate::settings::LoggingSettings;

/// Build the filter for the given settings, preferring `RUST_LOG` when set.
pub fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&settings.level)?),
    }
}

/// Initialize global logging.
///
/// Fails with [`LoggingError::AlreadyInitialized`] if another subscriber was
/// installed first; callers embedding Latchkey in a host that owns logging can
/// ignore that error.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = build_filter(settings)?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if settings.json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter);
        layers.push(Box::new(json_layer));
    } else {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}
