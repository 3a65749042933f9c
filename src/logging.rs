// Diagnostics logging for the server process itself.
//
// This is separate from the access/application streams in `stream`. It
// writes to:
//   - stderr → also the fallback channel when a log stream cannot be written
//   - `<log dir>/server.YYYY-MM-DD.log` → daily files, last 7 kept
//
// The level is controlled by `RUST_LOG` (defaults to `info`, suppressing
// noisy library crates).

use std::fs;
use std::path::Path;

use tracing_appender::{
    non_blocking,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Initialise the global tracing subscriber.
//
// Returns a [`WorkerGuard`] that **must** be kept alive for the entire
// duration of the program. Dropping it early will cause buffered log
// messages to be lost.
pub fn init(log_dir: &Path) -> anyhow::Result<non_blocking::WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("server")
        .filename_suffix("log")
        .max_log_files(7)
        .build(log_dir)?;
    let (file_writer, guard) = non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,tower=warn,h2=warn"));

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_ansi(true)
        .with_writer(std::io::stderr);

    // File layer – plain text (no ANSI escape codes).
    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
