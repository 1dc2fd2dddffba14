//! Development-time tracing for the runtime.
//!
//! What gets logged, by level:
//!
//! - `debug`: the acquisition strategy picked per command (with the context
//!   id), QuadModel start/stop, entity loads, loader clears.
//! - `trace`: session cache put/remove with key and size, gateway reads and
//!   writes, device-cache inserts, resolved path templates.
//! - `warn`: a live context displaced from the session cache.
//! - `info`: entity created.
//!
//! Output goes to stderr and is filtered by `RUST_LOG`. CLI results go to
//! stdout and are unaffected by the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=quad_runtime::loader=debug,quad_runtime::cache=trace quad-runtime load --domain domain.toml --root patient --action new
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
