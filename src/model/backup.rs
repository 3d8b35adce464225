//! Backup bookkeeping models.

use serde::{Deserialize, Serialize};

/// Why a backup was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Manual,
    Scheduled,
    PreRestore,
}

impl BackupKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::PreRestore => "pre_restore",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "scheduled" => Self::Scheduled,
            "pre_restore" => Self::PreRestore,
            _ => Self::Manual,
        }
    }
}

/// How often scheduled backups run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl BackupFrequency {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Parse a frequency, `None` when unrecognized.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    /// Minimum interval between scheduled runs, in milliseconds.
    #[must_use]
    pub const fn interval_millis(&self) -> i64 {
        const DAY: i64 = 86_400_000;
        match self {
            Self::Daily => DAY,
            Self::Weekly => 7 * DAY,
            Self::Monthly => 30 * DAY,
        }
    }
}

/// A row of `backup_logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupLog {
    pub id: i64,
    pub file_path: String,
    pub file_size: i64,
    /// Hex sha-256 of the backup file
    pub checksum: Option<String>,
    pub kind: BackupKind,
    /// `success`, `failed` or `pruned`
    pub status: String,
    pub error: Option<String>,
    pub created_by: String,
    pub created_at: i64,
}

impl BackupLog {
    pub(crate) const COLUMNS: &'static str =
        "id, file_path, file_size, checksum, backup_type, status, error, created_by, created_at";

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_path: row.get(1)?,
            file_size: row.get(2)?,
            checksum: row.get(3)?,
            kind: BackupKind::from_str(&row.get::<_, String>(4)?),
            status: row.get(5)?,
            error: row.get(6)?,
            created_by: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

/// The single schedule row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    pub enabled: bool,
    pub frequency: BackupFrequency,
    pub backup_dir: Option<String>,
    pub retention_count: i64,
    pub last_run_at: Option<i64>,
    pub updated_at: i64,
}

impl BackupSettings {
    /// Whether a scheduled backup is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: i64) -> bool {
        self.enabled
            && self
                .last_run_at
                .is_none_or(|last| now - last >= self.frequency.interval_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled: bool, last_run_at: Option<i64>) -> BackupSettings {
        BackupSettings {
            enabled,
            frequency: BackupFrequency::Daily,
            backup_dir: None,
            retention_count: 7,
            last_run_at,
            updated_at: 0,
        }
    }

    #[test]
    fn test_schedule_due() {
        let day = BackupFrequency::Daily.interval_millis();
        assert!(!settings(false, None).is_due(day));
        assert!(settings(true, None).is_due(0));
        assert!(!settings(true, Some(0)).is_due(day - 1));
        assert!(settings(true, Some(0)).is_due(day));
    }

    #[test]
    fn test_frequency_parse() {
        assert_eq!(BackupFrequency::parse("Weekly"), Some(BackupFrequency::Weekly));
        assert_eq!(BackupFrequency::parse("hourly"), None);
    }
}
