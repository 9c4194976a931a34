use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Installs the process-wide tracing subscriber with default settings.
pub fn init_logging() {
    init_logging_with(&LoggingConfig::default()).expect("Failed to set global subscriber");
}

/// Installs the process-wide tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter, e.g.
/// `RUST_LOG=tidemq::delivery=debug`.
pub fn init_logging_with(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let filter: EnvFilter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.filter)?,
    };

    let formatting_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_ids(cfg.thread_ids)
        .with_thread_names(cfg.thread_names)
        .with_target(true)
        .compact();

    let subscriber = Registry::default().with(filter).with(formatting_layer);

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
