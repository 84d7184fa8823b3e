/*!
 * Structured Tracing
 * Subscriber setup for the memory subsystem's tracing and log output
 *
 * Library code logs through `log`; the facade emits `tracing` events with
 * structured fields. The subscriber installed here receives both, the former
 * through the tracing-log bridge.
 */

use tracing::info;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError,
    EnvFilter,
};

/// Initialize structured tracing, ignoring an already installed subscriber
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - VF_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    if let Err(err) = try_init_tracing() {
        eprintln!("tracing already initialized: {}", err);
    }
}

/// Initialize structured tracing, failing if a global subscriber exists
pub fn try_init_tracing() -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json_requested() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?;
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
        info!("Structured tracing initialized");
    }
    Ok(())
}

fn json_requested() -> bool {
    std::env::var("VF_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}
