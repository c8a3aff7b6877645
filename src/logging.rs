//! Logging initialization for `packbox`.
//!
//! Diagnostics go to stderr via `tracing`, leaving stdout clean for
//! command output (including `--json` mode). Verbosity is driven by the
//! CLI flags, with `RUST_LOG` taking precedence when set.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static TEST_LOGGING: OnceCell<()> = OnceCell::new();

/// Initialize the global tracing subscriber.
///
/// `verbose` counts `-v` occurrences (0 = warn, 1 = info, 2 = debug,
/// 3+ = trace); `quiet` forces errors only.
///
/// # Errors
///
/// Returns an error message if a subscriber is already installed.
pub fn init_logging(verbose: u8, quiet: bool, filter: Option<&str>) -> Result<(), String> {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let env_filter = match filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("packbox={default_level}"))),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| e.to_string())
}

/// Initialize logging for tests (idempotent, debug level).
pub fn init_test_logging() {
    TEST_LOGGING.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("packbox=debug"))
            .with_writer(std::io::stderr)
            .with_test_writer()
            .try_init();
    });
}
