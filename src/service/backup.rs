//! Database backups: online copies, verification, restore, retention and
//! the simple daily/weekly/monthly schedule.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::model::{BackupFrequency, BackupKind, BackupLog, BackupSettings};
use crate::service::users::{authorize, Privilege};
use crate::storage::events::EventType;
use crate::storage::hash::file_sha256;
use crate::storage::SqliteStorage;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Changes to the schedule row. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupSettingsChanges {
    pub enabled: Option<bool>,
    pub frequency: Option<BackupFrequency>,
    /// Empty string clears the directory
    pub backup_dir: Option<String>,
    pub retention_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub backup: BackupLog,
    pub file_exists: bool,
    pub checksum_ok: bool,
    pub integrity: String,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    pub keep: usize,
    pub dry_run: bool,
    pub removed: Vec<BackupLog>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub restored_from: String,
    pub safety_backup: BackupLog,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRun {
    pub backup: BackupLog,
    pub pruned: PruneReport,
}

/// `PRAGMA integrity_check` on an existing database file.
fn integrity_of(path: &Path) -> Result<String> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
    let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    Ok(result)
}

fn read_settings(conn: &Connection) -> Result<BackupSettings> {
    Ok(conn.query_row(
        "SELECT enabled, frequency, backup_dir, retention_count, last_run_at, updated_at
         FROM backup_settings WHERE id = 1",
        [],
        |row| {
            Ok(BackupSettings {
                enabled: row.get(0)?,
                frequency: BackupFrequency::parse(&row.get::<_, String>(1)?).unwrap_or(BackupFrequency::Daily),
                backup_dir: row.get(2)?,
                retention_count: row.get(3)?,
                last_run_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )?)
}

fn insert_log(conn: &Connection, log: &BackupLog) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO backup_logs (file_path, file_size, checksum, backup_type, status, error, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            log.file_path,
            log.file_size,
            log.checksum,
            log.kind.as_str(),
            log.status,
            log.error,
            log.created_by,
            log.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// A free `citedesk-backup-YYYYMMDD-HHMMSS.db` path in `dir`.
fn backup_file_name(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let mut path = dir.join(format!("citedesk-backup-{stamp}.db"));
    let mut n = 2;
    while path.exists() {
        path = dir.join(format!("citedesk-backup-{stamp}-{n}.db"));
        n += 1;
    }
    path
}

pub struct BackupService<'a> {
    storage: &'a mut SqliteStorage,
    config: &'a AppConfig,
}

impl<'a> BackupService<'a> {
    pub fn new(storage: &'a mut SqliteStorage, config: &'a AppConfig) -> Self {
        Self { storage, config }
    }

    pub fn settings(&self) -> Result<BackupSettings> {
        read_settings(self.storage.conn())
    }

    pub fn update_settings(&mut self, changes: &BackupSettingsChanges, actor: &str) -> Result<BackupSettings> {
        let mut settings = self.settings()?;
        let before = format!(
            "enabled={} frequency={} keep={}",
            settings.enabled,
            settings.frequency.as_str(),
            settings.retention_count
        );

        if let Some(enabled) = changes.enabled {
            settings.enabled = enabled;
        }
        if let Some(frequency) = changes.frequency {
            settings.frequency = frequency;
        }
        if let Some(dir) = &changes.backup_dir {
            settings.backup_dir = Some(dir.trim().to_string()).filter(|d| !d.is_empty());
        }
        if let Some(keep) = changes.retention_count {
            if keep < 1 {
                return Err(Error::InvalidArgument("retention count must be at least 1".into()));
            }
            settings.retention_count = keep;
        }
        settings.updated_at = chrono::Utc::now().timestamp_millis();
        let after = format!(
            "enabled={} frequency={} keep={}",
            settings.enabled,
            settings.frequency.as_str(),
            settings.retention_count
        );

        self.storage.mutate("update_backup_settings", actor, |tx, ctx| {
            tx.execute(
                "UPDATE backup_settings SET enabled = ?1, frequency = ?2, backup_dir = ?3,
                        retention_count = ?4, updated_at = ?5
                 WHERE id = 1",
                rusqlite::params![
                    settings.enabled,
                    settings.frequency.as_str(),
                    settings.backup_dir,
                    settings.retention_count,
                    settings.updated_at,
                ],
            )?;
            ctx.record_change("backup_settings", "1", EventType::BackupSettingsUpdated, Some(before), Some(after));
            Ok(())
        })?;
        Ok(settings)
    }

    /// Explicit directory, then the scheduled directory, then the config default.
    fn target_dir(&self, dir: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = dir {
            return Ok(dir.to_path_buf());
        }
        if let Some(dir) = self.settings()?.backup_dir {
            return Ok(PathBuf::from(dir));
        }
        self.config.resolved_backup_dir()
    }

    /// Take an online copy of the database.
    ///
    /// A failed attempt is still logged, with status `failed`.
    pub fn create(&mut self, dir: Option<&Path>, kind: BackupKind, actor: &str) -> Result<BackupLog> {
        let dir = self.target_dir(dir)?;
        let path = backup_file_name(&dir);

        let attempt = std::fs::create_dir_all(&dir)
            .map_err(Error::from)
            .and_then(|()| self.storage.backup_to(&path))
            .and_then(|()| {
                let size = std::fs::metadata(&path)?.len();
                Ok((i64::try_from(size).unwrap_or(i64::MAX), file_sha256(&path)?))
            });

        let mut log = BackupLog {
            id: 0,
            file_path: path.display().to_string(),
            file_size: 0,
            checksum: None,
            kind,
            status: "success".to_string(),
            error: None,
            created_by: actor.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        let failure = match attempt {
            Ok((size, checksum)) => {
                log.file_size = size;
                log.checksum = Some(checksum);
                None
            }
            Err(e) => {
                log.status = "failed".to_string();
                log.error = Some(e.to_string());
                Some(e)
            }
        };

        let id = self.storage.mutate("create_backup", actor, |tx, ctx| {
            let id = insert_log(tx, &log)?;
            ctx.record_change(
                "backup",
                &id.to_string(),
                EventType::BackupCreated,
                None,
                Some(format!("{} {}", log.status, log.file_path)),
            );
            Ok(id)
        })?;
        log.id = id;

        if let Some(e) = failure {
            error!(path = %log.file_path, error = %e, "Backup failed");
            return Err(Error::Backup(format!("backup to {} failed: {e}", log.file_path)));
        }
        info!(path = %log.file_path, size = log.file_size, kind = kind.as_str(), "Backup created");
        Ok(log)
    }

    /// Backup history, newest first.
    pub fn list(&self, limit: Option<u32>) -> Result<Vec<BackupLog>> {
        let sql = format!(
            "SELECT {} FROM backup_logs ORDER BY created_at DESC, id DESC LIMIT {}",
            BackupLog::COLUMNS,
            limit.unwrap_or(50)
        );
        let mut stmt = self.storage.conn().prepare(&sql)?;
        let rows = stmt.query_map([], BackupLog::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get(&self, id: i64) -> Result<BackupLog> {
        let sql = format!("SELECT {} FROM backup_logs WHERE id = ?1", BackupLog::COLUMNS);
        self.storage
            .conn()
            .query_row(&sql, [id], BackupLog::from_row)
            .optional()?
            .ok_or_else(|| Error::BackupNotFound { id: id.to_string() })
    }

    /// Check a backup's checksum and run an integrity check on the copy.
    pub fn verify(&self, id: i64) -> Result<VerifyReport> {
        let backup = self.get(id)?;
        let path = PathBuf::from(&backup.file_path);
        let file_exists = path.is_file();

        let (checksum_ok, integrity) = if file_exists {
            let checksum_ok = backup.checksum.as_deref() == Some(file_sha256(&path)?.as_str());
            let integrity = integrity_of(&path).unwrap_or_else(|e| e.to_string());
            (checksum_ok, integrity)
        } else {
            (false, "file missing".to_string())
        };

        let ok = checksum_ok && integrity == "ok";
        debug!(id, ok, "Backup verified");
        Ok(VerifyReport {
            backup,
            file_exists,
            checksum_ok,
            integrity,
            ok,
        })
    }

    /// Replace the live database with `file`.
    ///
    /// A `pre_restore` backup of the current data is taken first. Backup
    /// history survives the restore.
    pub fn restore(&mut self, file: &Path, actor: &str) -> Result<RestoreReport> {
        authorize(self.storage.conn(), self.config, actor, Privilege::RestoreBackup)?;
        if !file.is_file() {
            return Err(Error::Backup(format!("{} does not exist", file.display())));
        }
        let integrity = integrity_of(file).map_err(|e| Error::Backup(format!("{} is not a database: {e}", file.display())))?;
        if integrity != "ok" {
            return Err(Error::Backup(format!("{} failed integrity check: {integrity}", file.display())));
        }

        let safety_backup = self.create(None, BackupKind::PreRestore, actor)?;
        let history = self.list(Some(u32::MAX))?;

        warn!(from = %file.display(), actor, "Restoring database");
        self.storage.restore_from(file)?;

        self.storage.mutate("restore_backup", actor, |tx, ctx| {
            for log in history.iter().rev() {
                let present: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM backup_logs WHERE file_path = ?1 AND created_at = ?2)",
                    rusqlite::params![log.file_path, log.created_at],
                    |row| row.get(0),
                )?;
                if !present {
                    insert_log(tx, log)?;
                }
            }
            ctx.record_change(
                "backup",
                &safety_backup.id.to_string(),
                EventType::BackupRestored,
                Some(safety_backup.file_path.clone()),
                Some(file.display().to_string()),
            );
            Ok(())
        })?;

        info!(from = %file.display(), safety = %safety_backup.file_path, "Database restored");
        Ok(RestoreReport {
            restored_from: file.display().to_string(),
            safety_backup,
        })
    }

    /// Delete the oldest successful manual and scheduled backups beyond
    /// `keep` (default: the configured retention). `pre_restore` copies are
    /// never pruned.
    pub fn prune(&mut self, keep: Option<usize>, dry_run: bool, actor: &str) -> Result<PruneReport> {
        let keep = match keep {
            Some(keep) => keep,
            None => usize::try_from(self.settings()?.retention_count).unwrap_or(1),
        };

        let sql = format!(
            "SELECT {} FROM backup_logs
             WHERE status = 'success' AND backup_type IN ('manual', 'scheduled')
             ORDER BY created_at DESC, id DESC",
            BackupLog::COLUMNS
        );
        let candidates: Vec<BackupLog> = {
            let mut stmt = self.storage.conn().prepare(&sql)?;
            let rows = stmt.query_map([], BackupLog::from_row)?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        let removed: Vec<BackupLog> = candidates.into_iter().skip(keep).collect();

        if dry_run || removed.is_empty() {
            return Ok(PruneReport { keep, dry_run, removed });
        }

        for log in &removed {
            match std::fs::remove_file(&log.file_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %log.file_path, "Backup file already gone");
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.storage.mutate("prune_backups", actor, |tx, ctx| {
            for log in &removed {
                tx.execute("UPDATE backup_logs SET status = 'pruned' WHERE id = ?1", [log.id])?;
                ctx.record_change(
                    "backup",
                    &log.id.to_string(),
                    EventType::BackupPruned,
                    Some("success".into()),
                    Some("pruned".into()),
                );
            }
            Ok(())
        })?;

        info!(removed = removed.len(), keep, "Backups pruned");
        Ok(PruneReport { keep, dry_run, removed })
    }

    /// Run the scheduled backup if it is enabled and due at `now`.
    pub fn run_scheduled(&mut self, now: i64, actor: &str) -> Result<Option<ScheduledRun>> {
        let settings = self.settings()?;
        if !settings.is_due(now) {
            debug!(enabled = settings.enabled, "Scheduled backup not due");
            return Ok(None);
        }

        let backup = self.create(None, BackupKind::Scheduled, actor)?;
        let pruned = self.prune(None, false, actor)?;
        self.storage.mutate("scheduled_backup", actor, |tx, _ctx| {
            tx.execute("UPDATE backup_settings SET last_run_at = ?1 WHERE id = 1", [now])?;
            Ok(())
        })?;
        Ok(Some(ScheduledRun { backup, pruned }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::citation::find_citation;
    use crate::service::payment::processor::tests::setup_with_citation;

    #[test]
    fn test_create_verify_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut backups = BackupService::new(&mut storage, &config);

        let log = backups.create(Some(dir.path()), BackupKind::Manual, "admin").unwrap();
        assert_eq!(log.status, "success");
        assert!(log.file_size > 0);
        assert!(log.file_path.contains("citedesk-backup-"));

        let report = backups.verify(log.id).unwrap();
        assert!(report.ok, "{report:?}");

        std::fs::write(&log.file_path, b"garbage").unwrap();
        assert!(!backups.verify(log.id).unwrap().ok);
        assert_eq!(backups.list(None).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_backup_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut backups = BackupService::new(&mut storage, &config);
        assert!(matches!(
            backups.create(Some(&blocker), BackupKind::Manual, "admin"),
            Err(Error::Backup(_))
        ));
        let logs = backups.list(None).unwrap();
        assert_eq!(logs[0].status, "failed");
        assert!(logs[0].error.is_some());
    }

    #[test]
    fn test_restore_takes_safety_copy_and_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = setup_with_citation();
        let config = AppConfig::default();

        let snapshot = BackupService::new(&mut storage, &config)
            .create(Some(dir.path()), BackupKind::Manual, "admin")
            .unwrap();
        storage
            .conn()
            .execute("UPDATE citations SET remarks = 'after backup' WHERE ticket_number = 'T-1'", [])
            .unwrap();

        let settings = BackupSettingsChanges {
            backup_dir: Some(dir.path().display().to_string()),
            ..BackupSettingsChanges::default()
        };
        let mut backups = BackupService::new(&mut storage, &config);
        backups.update_settings(&settings, "admin").unwrap();
        let report = backups.restore(Path::new(&snapshot.file_path), "admin").unwrap();
        assert_eq!(report.safety_backup.kind, BackupKind::PreRestore);

        let citation = find_citation(storage.conn(), "T-1").unwrap();
        assert_eq!(citation.remarks, None);
        let kinds: Vec<BackupKind> = BackupService::new(&mut storage, &config)
            .list(None)
            .unwrap()
            .into_iter()
            .map(|l| l.kind)
            .collect();
        assert!(kinds.contains(&BackupKind::PreRestore));
        assert!(kinds.contains(&BackupKind::Manual));
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut backups = BackupService::new(&mut storage, &config);
        let logs: Vec<BackupLog> = (0..3)
            .map(|_| backups.create(Some(dir.path()), BackupKind::Manual, "admin").unwrap())
            .collect();

        let preview = backups.prune(Some(1), true, "admin").unwrap();
        assert_eq!(preview.removed.len(), 2);
        assert!(Path::new(&logs[0].file_path).exists());

        let done = backups.prune(Some(1), false, "admin").unwrap();
        assert_eq!(done.removed.len(), 2);
        assert!(!Path::new(&logs[0].file_path).exists());
        assert!(Path::new(&logs[2].file_path).exists());
        assert_eq!(backups.get(logs[0].id).unwrap().status, "pruned");
    }

    #[test]
    fn test_scheduled_runs_only_when_due() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut backups = BackupService::new(&mut storage, &config);
        assert!(backups.run_scheduled(0, "scheduler").unwrap().is_none());

        backups
            .update_settings(
                &BackupSettingsChanges {
                    enabled: Some(true),
                    frequency: Some(BackupFrequency::Weekly),
                    backup_dir: Some(dir.path().display().to_string()),
                    retention_count: Some(2),
                },
                "admin",
            )
            .unwrap();
        let now = chrono::Utc::now().timestamp_millis();
        let run = backups.run_scheduled(now, "scheduler").unwrap().unwrap();
        assert_eq!(run.backup.kind, BackupKind::Scheduled);
        assert_eq!(backups.settings().unwrap().last_run_at, Some(now));
        assert!(backups.run_scheduled(now + 1000, "scheduler").unwrap().is_none());
    }
}
