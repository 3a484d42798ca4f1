use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

use crate::util::env::env_flag;

/// Fallback filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,reqwest=warn";

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins over `default_filter`. With `LOG_SPANS=1` span close events
/// (and their timings) are emitted too, which covers the instrumented store
/// calls.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let span_events = if env_flag("LOG_SPANS", false) {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
