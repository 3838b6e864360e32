//! Logging for ideflow binaries
//!
//! Each binary logs to its own daily-rotated file under the XDG state
//! directory, e.g. `~/.local/state/ideflow/ideflow-process.log.2024-03-01`.
//! Pipeline workers log from rayon threads, so thread ids are always recorded.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize file logging for `component` (the binary name).
///
/// `RUST_LOG` overrides `logging.level`.
pub fn init(config: &LoggingConfig, component: &str) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let (non_blocking, guard) =
        tracing_appender::non_blocking(file_appender(&log_dir, component, config.max_files)?);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))?;

    let path = log_file_path(component);
    tracing::info!(
        component,
        path = %path.display(),
        level = %config.level,
        pid = std::process::id(),
        "Logging initialized"
    );

    Ok(LoggingGuard {
        path,
        _guard: guard,
    })
}

/// Daily appender writing `<component>.log.<date>` into `dir`.
fn file_appender(dir: &Path, component: &str, max_files: usize) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(format!("{component}.log"))
        .max_log_files(max_files.max(1))
        .build(dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {e}")))
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Keeps the background log writer alive; flushes on drop.
pub struct LoggingGuard {
    path: PathBuf,
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

impl LoggingGuard {
    /// Log file prefix; rotated files append the date.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Log file prefix for `component`
pub fn log_file_path(component: &str) -> PathBuf {
    Config::log_path(component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_log_file_path_names_component() {
        let path = log_file_path("ideflow-process");
        assert!(path.ends_with("ideflow/ideflow-process.log"));
    }

    #[test]
    fn test_appender_writes_component_file() {
        let dir = TempDir::new().unwrap();
        let mut appender = file_appender(dir.path(), "ideflow-process", 0).unwrap();
        writeln!(appender, "run started").unwrap();
        appender.flush().unwrap();
        drop(appender);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("ideflow-process.log"), "got {names:?}");
    }
}
