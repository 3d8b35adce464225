//! SQLite storage implementation.
//!
//! This module provides the storage backend for citedesk using SQLite.
//! It follows the MutationContext pattern for transaction discipline and
//! audit logging: every write runs inside [`SqliteStorage::mutate`], and the
//! audit events recorded by the closure are committed atomically with it.

use crate::error::Result;
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, DatabaseName, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
    path: Option<PathBuf>,
}

/// Context for a mutation operation, tracking side effects.
///
/// This struct is passed to mutation closures to record audit events,
/// which are written just before the transaction commits.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (username, cashier name, etc.).
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }

    /// Record an event carrying a free-text comment (reasons, summaries).
    pub fn record_comment(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        comment: &str,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor).with_comment(comment),
        );
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5_000)))?;

        apply_schema(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Path of the database file, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;
        debug!(op, actor, events = ctx.events.len(), "Mutation committed");

        Ok(result)
    }

    /// Run a mutation closure and roll it back, for `--dry-run` previews.
    ///
    /// The closure sees its own writes, so multi-step operations report
    /// exactly what a real run would do.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or an error if the transaction fails.
    pub fn preview<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let mut ctx = MutationContext::new(op, actor);
        let result = f(&tx, &mut ctx)?;
        tx.rollback()?;
        debug!(op, actor, events = ctx.events.len(), "Mutation previewed and rolled back");
        Ok(result)
    }

    /// Write an online copy of the live database to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite's backup API fails.
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        self.conn.backup(DatabaseName::Main, dest, None)?;
        Ok(())
    }

    /// Replace the live database contents with the database file at `src`.
    ///
    /// The schema is re-applied afterwards so that older copies pick up
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite's restore API or the schema upgrade fails.
    pub fn restore_from(&mut self, src: &Path) -> Result<()> {
        self.conn
            .restore(DatabaseName::Main, src, None::<fn(rusqlite::backup::Progress)>)?;
        apply_schema(&self.conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::events::get_events;

    #[test]
    fn test_open_memory() {
        let storage = SqliteStorage::open_memory();
        assert!(storage.is_ok());
        assert!(storage.unwrap().path().is_none());
    }

    #[test]
    fn test_mutate_commits_events() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        storage
            .mutate("create_user", "admin", |tx, ctx| {
                tx.execute(
                    "INSERT INTO users (id, username, full_name, role, created_at, updated_at)
                     VALUES ('usr_1', 'maria', 'Maria Santos', 'cashier', 0, 0)",
                    [],
                )?;
                ctx.record_event("user", "usr_1", EventType::UserCreated);
                Ok(())
            })
            .unwrap();

        let events = get_events(storage.conn(), "user", "usr_1", None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "admin");
    }

    #[test]
    fn test_mutate_rolls_back_on_error() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        let result: Result<()> = storage.mutate("create_user", "admin", |tx, ctx| {
            tx.execute(
                "INSERT INTO users (id, username, full_name, role, created_at, updated_at)
                 VALUES ('usr_1', 'maria', 'Maria Santos', 'cashier', 0, 0)",
                [],
            )?;
            ctx.record_event("user", "usr_1", EventType::UserCreated);
            Err(Error::Other("abort".into()))
        });
        assert!(result.is_err());

        let users: i64 = storage
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        let events: i64 = storage
            .conn()
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 0);
        assert_eq!(events, 0);
    }

    #[test]
    fn test_preview_sees_writes_then_rolls_back() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        let seen: i64 = storage
            .preview("create_user", "admin", |tx, ctx| {
                tx.execute(
                    "INSERT INTO users (id, username, full_name, role, created_at, updated_at)
                     VALUES ('usr_1', 'maria', 'Maria Santos', 'cashier', 0, 0)",
                    [],
                )?;
                ctx.record_event("user", "usr_1", EventType::UserCreated);
                Ok(tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(seen, 1);

        let users: i64 = storage
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 0);
        assert!(get_events(storage.conn(), "user", "usr_1", None).unwrap().is_empty());
    }

    #[test]
    fn test_backup_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let copy = dir.path().join("copy.db");

        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .conn()
            .execute(
                "INSERT INTO users (id, username, full_name, role, created_at, updated_at)
                 VALUES ('usr_1', 'maria', 'Maria Santos', 'cashier', 0, 0)",
                [],
            )
            .unwrap();
        storage.backup_to(&copy).unwrap();

        storage.conn().execute("DELETE FROM users", []).unwrap();
        storage.restore_from(&copy).unwrap();

        let users: i64 = storage
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 1);
    }
}
