pub use tracing::{debug, error, info, warn, trace, instrument};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt::{self, format::FmtSpan}};

/// Installs the global subscriber. `RUST_LOG` picks the filter (default
/// `info`); span timings are printed when it asks for debug output.
pub fn init() {
    init_with_default("info");
}

/// Like `init`, but with the filter used when `RUST_LOG` is unset.
pub fn init_with_default(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let is_debug = wants_span_timings(&env_filter);

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(fmt::time::uptime())
        .with_span_events(if is_debug {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

/// True when any directive enables debug or trace events.
fn wants_span_timings(filter: &EnvFilter) -> bool {
    filter
        .max_level_hint()
        .is_some_and(|level| level >= LevelFilter::DEBUG)
}
