//! Database schema definitions.
//!
//! This module contains the complete SQLite schema for citedesk: the
//! office registry (users, drivers, fine schedule), citations and their
//! line items, payments and receipts, audit trail, backup bookkeeping and
//! spreadsheet import staging.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the citedesk database.
///
/// Note: Timestamps are stored as INTEGER (Unix milliseconds); money as
/// INTEGER centavos.
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Registry
-- ====================

-- Users: office accounts (cashiers, enforcers, encoders, admins)
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
    full_name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'encoder',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK (role IN ('admin', 'cashier', 'enforcer', 'encoder'))
);

-- Drivers: deduplicated motorist records
CREATE TABLE IF NOT EXISTS drivers (
    id TEXT PRIMARY KEY,
    license_number TEXT UNIQUE,
    last_name TEXT NOT NULL,
    first_name TEXT NOT NULL,
    middle_name TEXT,
    birth_date TEXT,
    address TEXT,
    name_key TEXT NOT NULL,
    merged_into TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (merged_into) REFERENCES drivers(id)
);

CREATE INDEX IF NOT EXISTS idx_drivers_name_key ON drivers(name_key);
CREATE INDEX IF NOT EXISTS idx_drivers_last_name ON drivers(last_name);
CREATE INDEX IF NOT EXISTS idx_drivers_merged ON drivers(merged_into);

-- Violation types: the fine schedule, three offense tiers
CREATE TABLE IF NOT EXISTS violation_types (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    category TEXT,
    description TEXT,
    fine_first INTEGER NOT NULL,
    fine_second INTEGER NOT NULL,
    fine_third INTEGER NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    CHECK (fine_first >= 0 AND fine_second >= fine_first AND fine_third >= fine_second)
);

-- ====================
-- Citations
-- ====================

CREATE TABLE IF NOT EXISTS citations (
    id TEXT PRIMARY KEY,
    ticket_number TEXT NOT NULL UNIQUE,
    driver_id TEXT NOT NULL,
    apprehended_at INTEGER NOT NULL,
    place TEXT,
    plate_number TEXT,
    vehicle_type TEXT,
    officer TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    status_reason TEXT,
    remarks TEXT,
    batch_id TEXT,
    created_by TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (driver_id) REFERENCES drivers(id),
    CHECK (status IN ('pending', 'paid', 'contested', 'dismissed', 'void'))
);

CREATE INDEX IF NOT EXISTS idx_citations_driver ON citations(driver_id);
CREATE INDEX IF NOT EXISTS idx_citations_status ON citations(status);
CREATE INDEX IF NOT EXISTS idx_citations_apprehended ON citations(apprehended_at DESC);
CREATE INDEX IF NOT EXISTS idx_citations_officer ON citations(officer);
CREATE INDEX IF NOT EXISTS idx_citations_batch ON citations(batch_id);

-- Violations: citation line items with the offense tier applied
CREATE TABLE IF NOT EXISTS violations (
    id TEXT PRIMARY KEY,
    citation_id TEXT NOT NULL,
    violation_type_id TEXT NOT NULL,
    offense_count INTEGER NOT NULL DEFAULT 1,
    fine_amount INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (citation_id) REFERENCES citations(id) ON DELETE CASCADE,
    FOREIGN KEY (violation_type_id) REFERENCES violation_types(id),
    UNIQUE (citation_id, violation_type_id),
    CHECK (offense_count >= 1 AND fine_amount >= 0)
);

CREATE INDEX IF NOT EXISTS idx_violations_citation ON violations(citation_id);
CREATE INDEX IF NOT EXISTS idx_violations_type ON violations(violation_type_id);

-- ====================
-- Payments & Receipts
-- ====================

-- OR numbers are unique across every payment ever recorded, voided included.
CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    citation_id TEXT NOT NULL,
    or_number TEXT NOT NULL UNIQUE,
    amount INTEGER NOT NULL,
    amount_tendered INTEGER,
    change_due INTEGER,
    method TEXT NOT NULL DEFAULT 'cash',
    reference_number TEXT,
    status TEXT NOT NULL DEFAULT 'pending_print',
    cashier TEXT NOT NULL,
    notes TEXT,
    paid_at INTEGER NOT NULL,
    completed_at INTEGER,
    voided_at INTEGER,
    void_reason TEXT,
    refunded_at INTEGER,
    refund_reason TEXT,
    replaced_by TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (citation_id) REFERENCES citations(id),
    CHECK (amount > 0),
    CHECK (method IN ('cash', 'check', 'money_order', 'online')),
    CHECK (status IN ('pending_print', 'completed', 'voided', 'refunded'))
);

CREATE INDEX IF NOT EXISTS idx_payments_citation ON payments(citation_id);
CREATE INDEX IF NOT EXISTS idx_payments_status ON payments(status);
CREATE INDEX IF NOT EXISTS idx_payments_paid_at ON payments(paid_at DESC);
CREATE INDEX IF NOT EXISTS idx_payments_cashier ON payments(cashier);
CREATE INDEX IF NOT EXISTS idx_payments_replaced_by ON payments(replaced_by);

-- One active (pending_print or completed) payment per citation
CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_one_active
    ON payments(citation_id) WHERE status IN ('pending_print', 'completed');

CREATE TABLE IF NOT EXISTS receipts (
    id TEXT PRIMARY KEY,
    payment_id TEXT NOT NULL UNIQUE,
    or_number TEXT NOT NULL UNIQUE,
    print_count INTEGER NOT NULL DEFAULT 1,
    printed_by TEXT NOT NULL,
    first_printed_at INTEGER NOT NULL,
    last_printed_at INTEGER NOT NULL,
    FOREIGN KEY (payment_id) REFERENCES payments(id)
);

-- ====================
-- Audit
-- ====================

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    action TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_log(actor);
CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_log(created_at DESC);

-- ====================
-- Backups
-- ====================

CREATE TABLE IF NOT EXISTS backup_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL,
    file_size INTEGER NOT NULL DEFAULT 0,
    checksum TEXT,
    backup_type TEXT NOT NULL DEFAULT 'manual',
    status TEXT NOT NULL,
    error TEXT,
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    CHECK (backup_type IN ('manual', 'scheduled', 'pre_restore')),
    CHECK (status IN ('success', 'failed', 'pruned'))
);

CREATE INDEX IF NOT EXISTS idx_backup_logs_created ON backup_logs(created_at DESC);

CREATE TABLE IF NOT EXISTS backup_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    enabled INTEGER NOT NULL DEFAULT 0,
    frequency TEXT NOT NULL DEFAULT 'daily',
    backup_dir TEXT,
    retention_count INTEGER NOT NULL DEFAULT 7,
    last_run_at INTEGER,
    updated_at INTEGER NOT NULL DEFAULT 0,
    CHECK (frequency IN ('daily', 'weekly', 'monthly')),
    CHECK (retention_count >= 1)
);

INSERT OR IGNORE INTO backup_settings (id) VALUES (1);

-- ====================
-- Spreadsheet Import
-- ====================

CREATE TABLE IF NOT EXISTS import_batches (
    id TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    sheet_name TEXT,
    status TEXT NOT NULL DEFAULT 'staged',
    total_rows INTEGER NOT NULL DEFAULT 0,
    valid_rows INTEGER NOT NULL DEFAULT 0,
    duplicate_rows INTEGER NOT NULL DEFAULT 0,
    conflict_rows INTEGER NOT NULL DEFAULT 0,
    error_rows INTEGER NOT NULL DEFAULT 0,
    imported_rows INTEGER NOT NULL DEFAULT 0,
    imported_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    committed_at INTEGER,
    CHECK (status IN ('staged', 'committed', 'cancelled'))
);

CREATE INDEX IF NOT EXISTS idx_import_batches_hash ON import_batches(file_hash);

CREATE TABLE IF NOT EXISTS import_staging (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id TEXT NOT NULL,
    row_number INTEGER NOT NULL,
    raw_data TEXT NOT NULL,
    ticket_number TEXT,
    last_name TEXT,
    first_name TEXT,
    middle_name TEXT,
    license_number TEXT,
    birth_date TEXT,
    address TEXT,
    apprehended_at INTEGER,
    place TEXT,
    plate_number TEXT,
    vehicle_type TEXT,
    officer TEXT,
    remarks TEXT,
    violation_text TEXT,
    matched_codes TEXT NOT NULL DEFAULT '[]',
    match_detail TEXT,
    status TEXT NOT NULL,
    message TEXT,
    resolution TEXT,
    resolved_ticket TEXT,
    existing_citation_id TEXT,
    citation_id TEXT,
    FOREIGN KEY (batch_id) REFERENCES import_batches(id) ON DELETE CASCADE,
    CHECK (status IN ('valid', 'duplicate', 'conflict', 'error', 'imported', 'skipped'))
);

CREATE INDEX IF NOT EXISTS idx_import_staging_batch ON import_staging(batch_id, status);

-- ====================
-- Triggers: payment status cascades to citation status
-- ====================

CREATE TRIGGER IF NOT EXISTS trg_payment_terminal_guard
BEFORE UPDATE OF status ON payments
WHEN OLD.status IN ('voided', 'refunded') AND NEW.status != OLD.status
BEGIN
    SELECT RAISE(ABORT, 'payment status is terminal');
END;

CREATE TRIGGER IF NOT EXISTS trg_payment_completed_marks_paid
AFTER UPDATE OF status ON payments
WHEN NEW.status = 'completed' AND OLD.status != 'completed'
BEGIN
    UPDATE citations SET status = 'paid', updated_at = NEW.updated_at
    WHERE id = NEW.citation_id AND status = 'pending';
END;

CREATE TRIGGER IF NOT EXISTS trg_payment_reversed_reopens
AFTER UPDATE OF status ON payments
WHEN NEW.status IN ('voided', 'refunded') AND OLD.status = 'completed'
BEGIN
    UPDATE citations SET status = 'pending', updated_at = NEW.updated_at
    WHERE id = NEW.citation_id
      AND status = 'paid'
      AND NOT EXISTS (
          SELECT 1 FROM payments p
          WHERE p.citation_id = NEW.citation_id AND p.status = 'completed'
      );
END;

-- ====================
-- Views
-- ====================

CREATE VIEW IF NOT EXISTS citation_balances AS
SELECT
    c.id AS citation_id,
    COALESCE((SELECT SUM(v.fine_amount) FROM violations v WHERE v.citation_id = c.id), 0) AS total_fine,
    COALESCE((SELECT SUM(p.amount) FROM payments p
              WHERE p.citation_id = c.id AND p.status = 'completed'), 0) AS amount_paid
FROM citations c;
"#;

/// Apply the schema to the database.
///
/// This uses `execute_batch` to run the entire DDL script.
/// It is idempotent because all statements use `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    // Apply schema
    conn.execute_batch(SCHEMA_SQL)?;

    // Run migrations for existing databases
    super::migrations::run_migrations(conn)?;

    // Record schema version
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_paid_path(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO drivers (id, last_name, first_name, name_key, created_at, updated_at)
                 VALUES ('drv_1', 'CRUZ', 'JUAN', 'C620J500', 0, 0);
             INSERT INTO violation_types (id, code, name, fine_first, fine_second, fine_third, created_at, updated_at)
                 VALUES ('vt_1', 'NH', 'No Helmet', 100000, 150000, 200000, 0, 0);
             INSERT INTO citations (id, ticket_number, driver_id, apprehended_at, created_at, updated_at)
                 VALUES ('cit_1', 'T-1', 'drv_1', 0, 0, 0);
             INSERT INTO violations (id, citation_id, violation_type_id, offense_count, fine_amount, created_at)
                 VALUES ('vio_1', 'cit_1', 'vt_1', 1, 100000, 0);
             INSERT INTO payments (id, citation_id, or_number, amount, method, cashier, paid_at, created_at, updated_at)
                 VALUES ('pay_1', 'cit_1', '0000001', 100000, 'cash', 'cashier', 0, 0, 0);",
        )
        .unwrap();
    }

    fn citation_status(conn: &Connection) -> String {
        conn.query_row("SELECT status FROM citations WHERE id = 'cit_1'", [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "drivers",
            "violation_types",
            "citations",
            "violations",
            "payments",
            "receipts",
            "audit_log",
            "backup_logs",
            "backup_settings",
            "import_batches",
            "import_staging",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");

        let settings: i64 = conn
            .query_row("SELECT COUNT(*) FROM backup_settings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(settings, 1);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);
    }

    #[test]
    fn test_fine_tier_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO violation_types (id, code, name, fine_first, fine_second, fine_third, created_at, updated_at)
             VALUES ('vt_x', 'X', 'Decreasing', 500, 400, 300, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_completed_payment_marks_citation_paid() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        seed_paid_path(&conn);

        assert_eq!(citation_status(&conn), "pending");
        conn.execute("UPDATE payments SET status = 'completed' WHERE id = 'pay_1'", [])
            .unwrap();
        assert_eq!(citation_status(&conn), "paid");

        conn.execute("UPDATE payments SET status = 'refunded' WHERE id = 'pay_1'", [])
            .unwrap();
        assert_eq!(citation_status(&conn), "pending");
    }

    #[test]
    fn test_terminal_payment_status_is_guarded() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        seed_paid_path(&conn);

        conn.execute("UPDATE payments SET status = 'voided' WHERE id = 'pay_1'", [])
            .unwrap();
        let result = conn.execute(
            "UPDATE payments SET status = 'completed' WHERE id = 'pay_1'",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_one_active_payment_per_citation() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        seed_paid_path(&conn);

        let result = conn.execute(
            "INSERT INTO payments (id, citation_id, or_number, amount, method, cashier, paid_at, created_at, updated_at)
             VALUES ('pay_2', 'cit_1', '0000002', 100000, 'cash', 'cashier', 0, 0, 0)",
            [],
        );
        assert!(result.is_err());

        // Once the first is voided, a new payment (with a new OR) is allowed.
        conn.execute("UPDATE payments SET status = 'voided' WHERE id = 'pay_1'", [])
            .unwrap();
        conn.execute(
            "INSERT INTO payments (id, citation_id, or_number, amount, method, cashier, paid_at, created_at, updated_at)
             VALUES ('pay_2', 'cit_1', '0000002', 100000, 'cash', 'cashier', 0, 0, 0)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_or_number_never_reused() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        seed_paid_path(&conn);

        conn.execute("UPDATE payments SET status = 'voided' WHERE id = 'pay_1'", [])
            .unwrap();
        let result = conn.execute(
            "INSERT INTO payments (id, citation_id, or_number, amount, method, cashier, paid_at, created_at, updated_at)
             VALUES ('pay_2', 'cit_1', '0000001', 100000, 'cash', 'cashier', 0, 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
