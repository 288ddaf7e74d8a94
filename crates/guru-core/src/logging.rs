use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

const LOG_PREFIX: &str = "guru.log";
const KEEP_DAYS: u64 = 7;

/// `~/.local/share/guru-jyotish/logs` (platform equivalent)
pub fn default_log_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("guru-jyotish").join("logs"))
}

/// Initialize file logging.
///
/// The terminal belongs to the TUI, so everything goes to a daily rolling
/// file (`guru.log.YYYY-MM-DD`). `RUST_LOG` overrides `level`. Keep the
/// returned guard alive for the life of the program.
pub fn init_logging(dir: &Path, level: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(dir, LOG_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    if let Err(e) = cleanup_old_logs(dir, KEEP_DAYS) {
        tracing::warn!("Failed to clean up old logs: {}", e);
    }

    Ok(guard)
}

/// Remove our log files last modified more than `days` days ago
fn cleanup_old_logs(dir: &Path, days: u64) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let threshold = Duration::from_secs(days * 24 * 3600);
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(LOG_PREFIX));
        if !path.is_file() || !is_ours {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if age.is_some_and(|age| age > threshold) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cleanup_keeps_fresh_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("guru.log.2026-10-18"), "fresh").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a log").unwrap();

        assert_eq!(cleanup_old_logs(dir.path(), 7).unwrap(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(cleanup_old_logs(&dir.path().join("absent"), 7).unwrap(), 0);
    }
}
