use crate::error::{Result, TrackerError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| TrackerError::Config(format!("invalid log level '{}': {}", level, e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true).with_level(true)).try_init()
    };

    result.map_err(|e| TrackerError::Config(format!("logging already initialized: {}", e)))
}
