//! Structured logging setup for the key ring controller
//!
//! Log lines always go to stderr; stdout is reserved for command output.

use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Output style for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    /// One JSON object per line, for log shippers
    Json,
    /// Human-readable lines, for terminals
    Console,
}

/// Build the level filter. `RUST_LOG` wins over the configured default.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// JSON formatting layer writing to `make_writer`
pub fn json_layer<S, W>(make_writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(make_writer)
}

/// Human-readable layer writing to `make_writer`
pub fn console_layer<S, W>(make_writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer().with_target(true).with_writer(make_writer)
}

/// Initialize logging for a binary
///
/// Returns an error instead of panicking when a global subscriber is
/// already installed.
pub fn init_logging(
    service_name: &str,
    default_level: &str,
    style: LogStyle,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(default_level));

    match style {
        LogStyle::Json => registry.with(json_layer(std::io::stderr)).try_init()?,
        LogStyle::Console => registry.with(console_layer(std::io::stderr)).try_init()?,
    }

    tracing::info!(service = service_name, style = ?style, "Logging initialized");
    Ok(())
}
