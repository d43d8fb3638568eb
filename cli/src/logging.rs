//! Tracing setup for the `tempo` binary.
//!
//! Diagnostics go to stderr so command output on stdout stays readable, and
//! realtime runs also keep a rotating log under the config directory
//! (`tempo/tempo.log`, 10 MB, one backup). Instant runs replay virtual time
//! in milliseconds and skip the file.
//!
//! Levels per sink: `RUST_LOG` applies to both when set. Otherwise stderr
//! shows warnings and the file records `info`; `DEBUG_LOGGING=1` raises both
//! to debug for the tempo crates.

use std::path::PathBuf;

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEBUG_DIRECTIVE: &str = "info,tempo_core=debug,tempo_cli=debug";
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Stderr,
    File,
}

fn default_directive(sink: Sink, debug_logging: bool) -> &'static str {
    match (sink, debug_logging) {
        (_, true) => DEBUG_DIRECTIVE,
        (Sink::Stderr, false) => "warn",
        (Sink::File, false) => "info",
    }
}

fn filter(sink: Sink, debug_logging: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(sink, debug_logging)))
}

fn open_log_file() -> Result<(BasicRollingFileAppender, PathBuf), String> {
    let dir = dirs::config_dir()
        .ok_or("no config directory")?
        .join("tempo");
    std::fs::create_dir_all(&dir).map_err(|e| format!("cannot create {}: {e}", dir.display()))?;

    let path = dir.join("tempo.log");
    let appender =
        BasicRollingFileAppender::new(&path, RollingConditionBasic::new().max_size(MAX_LOG_BYTES), 1)
            .map_err(|e| format!("cannot open {}: {e}", path.display()))?;
    Ok((appender, path))
}

/// Install the global subscriber.
///
/// Hold the returned guard until exit so buffered file lines are flushed.
/// `None` means no file sink: an instant run, or the log file could not be
/// opened (reported once on stderr).
pub fn init(instant: bool) -> Option<WorkerGuard> {
    let debug_logging = std::env::var_os("DEBUG_LOGGING").is_some();

    let file = if instant {
        None
    } else {
        match open_log_file() {
            Ok(file) => Some(file),
            Err(reason) => {
                // No subscriber yet
                eprintln!("tempo: file logging disabled ({reason})");
                None
            }
        }
    };

    let (file_layer, guard, path) = match file {
        Some((appender, path)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter(Sink::File, debug_logging));
            (Some(layer), Some(guard), Some(path))
        }
        None => (None, None, None),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_filter(filter(Sink::Stderr, debug_logging));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    tracing::info!(log_file = ?path, instant, debug_logging, "logging initialized");
    guard
}
