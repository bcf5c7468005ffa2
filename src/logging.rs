//! File logging through `tracing`. The terminal belongs to the UI, so log output only ever goes to
//! `csvdash.log` in the cache directory, and only when debug logging is enabled.

use color_eyre::Result;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::{CacheManager, LOG_FILE};

/// Subscriber that appends plain-text events at or above `level` to `path`.
pub fn file_subscriber(
    path: &Path,
    level: &str,
) -> Result<impl tracing::Subscriber + Send + Sync + 'static> {
    let filter = EnvFilter::try_new(level)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true),
    ))
}

/// Installs the global file subscriber and returns the log file path.
pub fn init_file_logging(cache: &CacheManager, level: &str) -> Result<PathBuf> {
    cache.ensure_cache_dir()?;
    let path = cache.cache_file(LOG_FILE);
    file_subscriber(&path, level)?.try_init()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "logging started");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn events_below_level_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILE);
        let subscriber = file_subscriber(&path, "warn").unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("quiet");
            tracing::warn!(rows = 3, "loud");
        });
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("loud"));
        assert!(contents.contains("rows=3"));
        assert!(!contents.contains("quiet"));
    }

    #[test]
    fn invalid_level_is_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(file_subscriber(&dir.path().join(LOG_FILE), "csvdash=loudest").is_err());
    }
}
