//! Logging setup
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies.
//! Config loading runs under a provisional stderr subscriber, since the
//! configured one can only be installed once the config is known.

use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("sensorhub={0},tower_http={0}", config.level)))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn provisional<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    fmt::fmt().with_env_filter(filter).with_writer(writer).finish()
}

/// Run `f` with a default-level stderr subscriber scoped to this thread
pub fn bootstrap<T>(f: impl FnOnce() -> T) -> T {
    let subscriber = provisional(env_filter(&LoggingConfig::default()), std::io::stderr);
    tracing::subscriber::with_default(subscriber, f)
}

/// Install the global subscriber
pub fn init(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    match config.format.as_str() {
        "json" => registry.with(fmt::layer().json()).try_init(),
        _ => registry.with(fmt::layer()).try_init(),
    }
}
