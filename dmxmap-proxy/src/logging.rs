//! Logging setup: console output plus an optional daily-rotated file.
//!
//! `log::` macros are used throughout the proxy; they are bridged into the
//! tracing subscriber. File logs older than the retention window are removed
//! at startup.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system.
///
/// * `log_dir` - directory for rotated log files; `None` disables file output
/// * `retention_days` - how long to keep rotated files
/// * `debug` - default the filter to debug instead of info
pub fn init_logging(
    log_dir: Option<&Path>,
    retention_days: u64,
    debug: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_timer(LocalTimeTimer);

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            clean_old_logs(dir, retention_days)?;

            let appender = tracing_appender::rolling::daily(dir, "dmxmap-proxy.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            // Keep the flush guard alive for the process lifetime.
            Box::leak(Box::new(guard));

            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_ansi(false)
                    .with_timer(LocalTimeTimer),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    // Bridge log:: macros into tracing.
    tracing_log::LogTracer::init()?;

    Ok(())
}

/// Remove rotated log files older than the retention window.
fn clean_old_logs(log_dir: &Path, retention_days: u64) -> io::Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    let cutoff = Local::now() - chrono::Duration::days(retention_days as i64);

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.contains("dmxmap-proxy.log") {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified: chrono::DateTime<Local> = modified.into();
            if modified < cutoff {
                if let Err(e) = fs::remove_file(&path) {
                    eprintln!("failed to remove old log file {path:?}: {e}");
                }
            }
        }
    }

    Ok(())
}

/// Local-time timestamps in log lines.
#[derive(Debug, Clone, Copy)]
struct LocalTimeTimer;

impl fmt::time::FormatTime for LocalTimeTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.6f"))
    }
}
