//! Runtime configuration resolved from flags and environment.

use certlab_core::default_log_level;
use std::path::PathBuf;

/// File name of the database used when no path is configured.
pub const DEFAULT_DB_FILE: &str = "certlab.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    /// Rolling log directory; `None` logs to stderr.
    pub log_dir: Option<PathBuf>,
}

impl CliConfig {
    /// Fills unset values with defaults. Environment fallbacks are applied by
    /// `clap` before this runs.
    pub fn resolve(
        db_path: Option<PathBuf>,
        log_level: Option<String>,
        log_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            db_path: db_path.unwrap_or_else(default_db_path),
            log_level: log_level
                .filter(|level| !level.trim().is_empty())
                .unwrap_or_else(|| default_log_level().to_string()),
            log_dir: log_dir.filter(|dir| !dir.as_os_str().is_empty()),
        }
    }
}

pub fn default_db_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_DB_FILE)
}
