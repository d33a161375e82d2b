use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging with environment filter.
/// Set VTEST_LOG=debug (or trace, info, warn, error) for verbosity control.
/// Logs go to stderr so command output on stdout stays clean.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("VTEST_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // try_init: a host process may already own the global subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}
