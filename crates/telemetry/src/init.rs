// Path: crates/telemetry/src/init.rs
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initializes the global `tracing` subscriber with the default `info`
/// filter.
pub fn init_tracing() -> Result<(), anyhow::Error> {
    init_tracing_with_default("info")
}

/// Initializes structured JSON logging to stderr.
///
/// `RUST_LOG` wins when set; `default_filter` applies otherwise. Also
/// bridges `log`-crate records into `tracing` so dependency logs end up in
/// the same stream.
pub fn init_tracing_with_default(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(std::io::stderr),
    );
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
