//! Database migrations embedded at compile time.
//!
//! Migrations are sourced from `/migrations/` at the repo root and
//! embedded into the binary using `include_str!`. This ensures the
//! binary is self-contained with no runtime file dependencies.

use rusqlite::{Connection, Result};
use tracing::{info, warn};

/// A single migration with version identifier and SQL content.
struct Migration {
    version: &'static str,
    sql: &'static str,
}

/// All migrations in order, embedded at compile time.
///
/// Version names match the SQL filenames (without .sql extension).
/// The `schema_migrations` table tracks which have been applied.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001_payment_change_tracking",
        sql: include_str!("../../migrations/001_payment_change_tracking.sql"),
    },
    Migration {
        version: "002_import_match_detail",
        sql: include_str!("../../migrations/002_import_match_detail.sql"),
    },
    Migration {
        version: "003_payment_reissue_link",
        sql: include_str!("../../migrations/003_payment_reissue_link.sql"),
    },
];

/// Run all pending migrations on the database.
///
/// Migrations are applied in order. Already-applied migrations (tracked in
/// the `schema_migrations` table) are skipped. This is idempotent and safe
/// to call on every database open.
///
/// # Errors
///
/// Returns an error if a migration fails to apply. ALTER TABLE errors for
/// duplicate columns are logged as warnings, since the base schema already
/// carries those columns on fresh databases.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: std::collections::HashSet<String> = conn
        .prepare("SELECT version FROM schema_migrations")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    for migration in MIGRATIONS {
        if applied.contains(migration.version) {
            continue;
        }

        info!(version = migration.version, "Applying migration");

        if let Err(e) = conn.execute_batch(migration.sql) {
            if e.to_string().contains("duplicate column name") {
                warn!(
                    version = migration.version,
                    "Migration partially applied (columns exist), marking complete"
                );
            } else {
                return Err(e);
            }
        }

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().timestamp_millis()],
        )?;

        info!(version = migration.version, "Migration complete");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::SCHEMA_SQL;

    fn count_applied(conn: &Connection) -> i32 {
        conn.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version LIKE '0%'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations_compile() {
        assert_eq!(MIGRATIONS.len(), 3);
    }

    #[test]
    fn test_run_migrations_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        run_migrations(&conn).expect("Migrations should apply to fresh database");
        assert_eq!(count_applied(&conn), 3);
    }

    #[test]
    fn test_run_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();

        run_migrations(&conn).expect("First run should succeed");
        run_migrations(&conn).expect("Second run should succeed (idempotent)");
        assert_eq!(count_applied(&conn), 3);
    }

    #[test]
    fn test_migrations_upgrade_legacy_payments_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE payments (id TEXT PRIMARY KEY, citation_id TEXT, or_number TEXT);
             CREATE TABLE import_staging (id INTEGER PRIMARY KEY, batch_id TEXT);",
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let has_change: bool = conn
            .prepare("SELECT 1 FROM pragma_table_info('payments') WHERE name = 'change_due'")
            .unwrap()
            .exists([])
            .unwrap();
        let has_replaced: bool = conn
            .prepare("SELECT 1 FROM pragma_table_info('payments') WHERE name = 'replaced_by'")
            .unwrap()
            .exists([])
            .unwrap();
        assert!(has_change);
        assert!(has_replaced);
    }
}
