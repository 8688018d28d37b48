//! logging
//!
//! Tracing subscriber setup for the binary.
//!
//! The filter comes from `REPOFLOW_LOG` when set, otherwise from the config
//! file's `log_filter`, otherwise from the verbosity flags. Output goes to
//! stderr so command output on stdout stays clean.

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

use crate::ui::output::Verbosity;

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "REPOFLOW_LOG";

/// Build the filter for `verbosity` and an optional configured directive.
pub fn filter(verbosity: Verbosity, configured: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return filter;
    }
    // Flags win over the config file when they ask for something specific.
    let directive = match (verbosity, configured) {
        (Verbosity::Normal, Some(configured)) => configured,
        _ => verbosity.log_filter(),
    };
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(verbosity: Verbosity, configured: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(filter(verbosity, configured))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity == Verbosity::Debug),
        )
        .try_init();
}
