use thiserror::Error;
use tracing_subscriber::{
    filter::ParseError,
    fmt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Filter used when neither the caller nor `RUST_LOG` provides one.
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: ParseError,
    },
    #[error("global subscriber already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Installs the process-wide fmt subscriber.
///
/// `RUST_LOG` wins over `filter` when set, so operators can raise verbosity
/// for one module without touching the desk configuration.
pub fn init_tracing(filter: &str) -> Result<(), LoggingError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => build_filter(filter)?,
    };

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .finish()
        .try_init()?;
    Ok(())
}

fn build_filter(filter: &str) -> Result<EnvFilter, LoggingError> {
    let filter = if filter.trim().is_empty() {
        DEFAULT_LOG_FILTER
    } else {
        filter
    };
    EnvFilter::try_new(filter).map_err(|source| LoggingError::InvalidFilter {
        filter: filter.to_string(),
        source,
    })
}
