//! Diagnostic logging setup.

use tracing_subscriber::EnvFilter;

/// Environment variable holding an explicit `tracing` filter.
pub const LOG_ENV: &str = "AGITLINK_LOG";

/// Default filter for the given number of `-v` flags.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install a stderr subscriber. Standard output is reserved for the permalink.
///
/// `AGITLINK_LOG` takes precedence over the verbosity flags. Calling this twice is harmless.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
