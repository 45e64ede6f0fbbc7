//! Tracing subscriber setup for processes embedding a service callee.

use tracing_subscriber::EnvFilter;

use crate::service::config::{CalleeConfig, LogFormat};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_filter`.
///
/// # Errors
///
/// Returns an error if the filter directives do not parse or a global
/// subscriber is already installed.
pub fn init_tracing(config: &CalleeConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match config.log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
