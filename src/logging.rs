//! Logging initialization

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize tracing output on stderr
///
/// `RUST_LOG` wins when set; otherwise verbosity maps to info/debug/trace.
pub fn init_logging(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
