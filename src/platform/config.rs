// platform/config.rs
//
// Platform-specific configuration and data directory resolution.
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.
//
// Also owns the one TOML config file the core reads directly: process
// shape (default log level, default rule-database override) rather than
// the user's mod-manager settings, which remain the external driver's job
// per spec.md's Non-goals.

use crate::util::constants;
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Resolved platform paths for ccscan's rule database and persisted state.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/ccscan/ or %APPDATA%\ccscan\).
    pub config_dir: PathBuf,

    /// Rule-database directory (static MAIN/GAME stores plus writable
    /// SETTINGS/IGNORE/GAME_LOCAL stores), under `config_dir`.
    pub rules_dir: PathBuf,

    /// Data directory for the cache and other process-local state.
    pub data_dir: PathBuf,

    /// Backup root for moved unsolved logs, `Backups/<category>/` under
    /// `data_dir`.
    pub backups_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to the current directory if platform dirs cannot be
    /// determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let rules_dir = config_dir.join(constants::RULES_DIR_NAME);
            let data_dir = proj_dirs.data_dir().to_path_buf();
            let backups_dir = data_dir.join(constants::BACKUPS_DIR_NAME);

            tracing::debug!(
                config = %config_dir.display(),
                rules = %rules_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                rules_dir,
                data_dir,
                backups_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                rules_dir: fallback.join(constants::RULES_DIR_NAME),
                data_dir: fallback.clone(),
                backups_dir: fallback.join(constants::BACKUPS_DIR_NAME),
            }
        }
    }

    /// Backup directory for a given category (e.g. "UnsolvedLogs"), created
    /// on demand by the caller.
    pub fn backup_category_dir(&self, category: &str) -> PathBuf {
        self.backups_dir.join(category)
    }

    /// Path to `config.toml` within `config_dir`.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

/// Process-shape configuration the core reads directly: default logging
/// level and an optional rule-database directory override. Read once at
/// startup; absent is not an error, it just means every field falls back to
/// its default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    pub logging: Option<LoggingConfig>,
    pub rules_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

impl AppConfig {
    /// Load `config.toml` from `path` if it exists. A missing file yields
    /// the all-`None` default; a present-but-malformed file is a non-fatal
    /// warning with the default returned, since no component of the core
    /// requires a config file to run.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read config file; using defaults");
                return Self::default();
            }
        };
        match toml::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed config file; using defaults");
                Self::default()
            }
        }
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(&dir.path().join("config.toml"));
        assert!(config.log_level().is_none());
        assert!(config.rules_dir.is_none());
    }

    #[test]
    fn parses_logging_level_and_rules_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "rules_dir = \"/tmp/rules\"\n\n[logging]\nlevel = \"debug\"\n").unwrap();
        let config = AppConfig::load(&path);
        assert_eq!(config.log_level(), Some("debug"));
        assert_eq!(config.rules_dir, Some(PathBuf::from("/tmp/rules")));
    }

    #[test]
    fn malformed_config_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml [[[").unwrap();
        let config = AppConfig::load(&path);
        assert!(config.log_level().is_none());
    }
}
