//! Structured logging initialization.
//!
//! `RUST_LOG` (standard `tracing_subscriber::EnvFilter` syntax) controls
//! verbosity; defaults to `info` when unset. There is no OpenTelemetry
//! export here: this crate's observability surface is log lines plus the
//! Prometheus endpoint at `/internal/metrics`, not distributed tracing.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Call once, at process start,
/// before any `tracing` macro fires.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
