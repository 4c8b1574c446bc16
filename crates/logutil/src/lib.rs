//! Utilities for logging.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize the global tracing subscriber.
///
/// `verbosity` bumps the default level (0 = warn, 1 = debug, 2+ = trace);
/// the `RUST_LOG` env var still takes precedence. When `json` is set,
/// output is newline-delimited JSON for log collectors.
pub fn init(verbosity: u8, json: bool) {
    let default_level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Initialize a subscriber for tests. Safe to call multiple times.
pub fn init_test() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::DEBUG.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_test_writer()
        .with_env_filter(env_filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
