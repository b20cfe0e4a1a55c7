//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::{Error, Result};

/// Filter directive used when neither `RUST_LOG` nor the config supplies one.
pub const DEFAULT_FILTER: &str = "info,lumen=debug,lumen_rhi=debug,lumen_renderer=debug";

/// Initialize the logging system with tracing.
///
/// `RUST_LOG` wins over `directive`; an empty directive falls back to
/// [`DEFAULT_FILTER`].
///
/// # Errors
///
/// Returns [`Error::Logging`] if a global subscriber is already installed.
///
/// # Example
/// ```no_run
/// lumen_core::init_logging("info").unwrap();
/// tracing::info!("Engine starting");
/// ```
pub fn init_logging(directive: &str) -> Result<()> {
    let fallback = if directive.trim().is_empty() {
        DEFAULT_FILTER
    } else {
        directive
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}
