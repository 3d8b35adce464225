//! Configuration management.
//!
//! This module resolves the citedesk home directory, the database path and
//! the acting operator, and loads office settings.
//!
//! # Layout
//!
//! - **Database**: `~/.citedesk/data/citedesk.db` unless overridden
//! - **Settings**: `~/.citedesk/config.json` (office header, OR width, role
//!   enforcement, importer thresholds, HTTP bind address)
//! - **Backups**: `~/.citedesk/backups/` unless configured otherwise

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the global citedesk directory (`~/.citedesk`).
#[must_use]
pub fn global_citedesk_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".citedesk"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `CITEDESK_DB` environment variable
/// 3. Global location: `~/.citedesk/data/citedesk.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("CITEDESK_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_citedesk_dir().map(|dir| dir.join("data").join("citedesk.db"))
}

/// Get the default actor name.
///
/// Priority:
/// 1. `CITEDESK_ACTOR` environment variable
/// 2. System username
/// 3. "unknown"
#[must_use]
pub fn default_actor() -> String {
    if let Ok(actor) = std::env::var("CITEDESK_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return user;
        }
    }

    "unknown".to_string()
}

/// Office-level settings loaded from `config.json`.
///
/// Every field has a default so a missing or partial file is fine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Heading printed on official receipts.
    pub office_name: String,
    /// Second heading line on receipts.
    pub office_address: String,
    /// Digits used when suggesting the next OR number.
    pub or_number_width: usize,
    /// Require an active user with an allowed role for privileged operations.
    pub enforce_roles: bool,
    /// Minimum similarity for fuzzy violation matching during import.
    pub import_match_threshold: f64,
    /// Minimum duplicate score for linking imported rows to an existing driver.
    pub duplicate_link_score: u8,
    /// Address for `citedesk serve`.
    pub server_bind: String,
    /// Directory for backup files; `~/.citedesk/backups` when unset.
    pub backup_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            office_name: "Municipal Traffic Management Office".to_string(),
            office_address: String::new(),
            or_number_width: 7,
            enforce_roles: false,
            import_match_threshold: 0.8,
            duplicate_link_score: 85,
            server_bind: "127.0.0.1:8080".to_string(),
            backup_dir: None,
        }
    }
}

impl AppConfig {
    /// Backup directory, falling back to `~/.citedesk/backups`.
    pub fn resolved_backup_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.backup_dir {
            return Ok(dir.clone());
        }
        global_citedesk_dir()
            .map(|dir| dir.join("backups"))
            .ok_or(Error::Config("Could not determine home directory".into()))
    }
}

/// Resolve the config file path.
///
/// Priority: explicit `--config`, `CITEDESK_CONFIG`, `~/.citedesk/config.json`.
pub fn config_path(explicit_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("CITEDESK_CONFIG") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    global_citedesk_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or(Error::Config("Could not determine home directory".into()))
}

/// Load the office configuration, defaulting when the file is absent.
pub fn load_config(explicit_path: Option<&Path>) -> Result<AppConfig> {
    let path = config_path(explicit_path)?;

    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    let config: AppConfig = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))?;

    if !(0.0..=1.0).contains(&config.import_match_threshold) {
        return Err(Error::Config(format!(
            "import_match_threshold must be between 0 and 1, got {}",
            config.import_match_threshold
        )));
    }
    if config.or_number_width == 0 || config.or_number_width > 12 {
        return Err(Error::Config(format!(
            "or_number_width must be between 1 and 12, got {}",
            config.or_number_width
        )));
    }

    Ok(config)
}

/// Save the office configuration.
pub fn save_config(explicit_path: Option<&Path>, config: &AppConfig) -> Result<()> {
    let path = config_path(explicit_path)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(&path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_actor() {
        let actor = default_actor();
        assert!(!actor.is_empty());
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_resolve_db_path_default_name() {
        if std::env::var("CITEDESK_DB").is_ok() {
            return;
        }
        let path = resolve_db_path(None).unwrap();
        assert!(path.ends_with("citedesk.db"));
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_config_is_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"office_name":"City of San Isidro","enforce_roles":true}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.office_name, "City of San Isidro");
        assert!(config.enforce_roles);
        assert_eq!(config.or_number_width, 7);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"import_match_threshold":1.5}"#).unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            or_number_width: 8,
            ..AppConfig::default()
        };
        save_config(Some(&path), &config).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), config);
    }
}
