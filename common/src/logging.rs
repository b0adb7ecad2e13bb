//! Structured logging initialization
//!
//! Provides consistent logging initialization across pg-provision binaries.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ConfigExt;

/// Guard that keeps the tracing subscriber active.
/// Drop this at the end of main to flush logs.
pub struct LogGuard;

/// Initialize structured logging for a component.
///
/// `RUST_LOG` directives are honored; without them the level is INFO. Set
/// `LOG_FORMAT=json` to emit one JSON object per event instead of text.
///
/// # Example
/// ```ignore
/// let _guard = init_logging("pg-provision");
/// info!("Starting up...");
/// ```
pub fn init_logging(component: &str) -> LogGuard {
    let filter = build_filter(&String::env_or(EnvFilter::DEFAULT_ENV, ""));

    let registry = tracing_subscriber::registry().with(filter);

    if String::env_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }

    tracing::debug!(component, "Logging initialized");

    LogGuard
}

/// INFO unless `directives` say otherwise; unparseable directives are skipped.
fn build_filter(directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives)
}
