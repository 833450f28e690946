//! Global `tracing` subscriber setup, following the teacher's
//! `env-tracing-logger` crate: a compact formatter with an uptime timer,
//! filtered by `RUST_LOG` (§A.2).

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

struct Guard;

impl Drop for Guard {
    fn drop(&mut self) {}
}

/// Installs the global subscriber. The returned guard has no Drop behavior
/// of its own; it exists so callers hold something for the process
/// lifetime, matching the teacher's `impl Drop` return convention.
pub fn init() -> impl Drop {
    let evt_fmt = fmt::format().with_timer(fmt::time::Uptime::default()).compact();
    let fmt_layer = fmt::layer().event_format(evt_fmt);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::from_default_env())
        .init();

    Guard
}
