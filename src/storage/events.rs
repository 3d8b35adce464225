//! Audit event storage and retrieval.
//!
//! Events track every mutation in the database for accountability: who
//! recorded, voided or refunded a payment, who merged two drivers, who
//! restored a backup.

use rusqlite::{Connection, Result};

/// Audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Users
    UserCreated,
    UserUpdated,

    // Drivers
    DriverCreated,
    DriverUpdated,
    DriverMerged,

    // Fine schedule
    ViolationTypeCreated,
    ViolationTypeUpdated,

    // Citations
    CitationCreated,
    CitationUpdated,
    CitationStatusChanged,
    ViolationAdded,
    ViolationRemoved,
    FinesRecalculated,

    // Payments & receipts
    PaymentRecorded,
    PaymentCompleted,
    PaymentVoided,
    PaymentRefunded,
    ReceiptPrinted,
    ReceiptReprinted,

    // Backups
    BackupCreated,
    BackupRestored,
    BackupPruned,
    BackupSettingsUpdated,

    // Import
    ImportStaged,
    ImportRowResolved,
    ImportCommitted,
    ImportCancelled,

    // Fallback for rows written by newer versions
    Unknown,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreated => "user_created",
            Self::UserUpdated => "user_updated",
            Self::DriverCreated => "driver_created",
            Self::DriverUpdated => "driver_updated",
            Self::DriverMerged => "driver_merged",
            Self::ViolationTypeCreated => "violation_type_created",
            Self::ViolationTypeUpdated => "violation_type_updated",
            Self::CitationCreated => "citation_created",
            Self::CitationUpdated => "citation_updated",
            Self::CitationStatusChanged => "citation_status_changed",
            Self::ViolationAdded => "violation_added",
            Self::ViolationRemoved => "violation_removed",
            Self::FinesRecalculated => "fines_recalculated",
            Self::PaymentRecorded => "payment_recorded",
            Self::PaymentCompleted => "payment_completed",
            Self::PaymentVoided => "payment_voided",
            Self::PaymentRefunded => "payment_refunded",
            Self::ReceiptPrinted => "receipt_printed",
            Self::ReceiptReprinted => "receipt_reprinted",
            Self::BackupCreated => "backup_created",
            Self::BackupRestored => "backup_restored",
            Self::BackupPruned => "backup_pruned",
            Self::BackupSettingsUpdated => "backup_settings_updated",
            Self::ImportStaged => "import_staged",
            Self::ImportRowResolved => "import_row_resolved",
            Self::ImportCommitted => "import_committed",
            Self::ImportCancelled => "import_cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Parse from the stored string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "user_created" => Self::UserCreated,
            "user_updated" => Self::UserUpdated,
            "driver_created" => Self::DriverCreated,
            "driver_updated" => Self::DriverUpdated,
            "driver_merged" => Self::DriverMerged,
            "violation_type_created" => Self::ViolationTypeCreated,
            "violation_type_updated" => Self::ViolationTypeUpdated,
            "citation_created" => Self::CitationCreated,
            "citation_updated" => Self::CitationUpdated,
            "citation_status_changed" => Self::CitationStatusChanged,
            "violation_added" => Self::ViolationAdded,
            "violation_removed" => Self::ViolationRemoved,
            "fines_recalculated" => Self::FinesRecalculated,
            "payment_recorded" => Self::PaymentRecorded,
            "payment_completed" => Self::PaymentCompleted,
            "payment_voided" => Self::PaymentVoided,
            "payment_refunded" => Self::PaymentRefunded,
            "receipt_printed" => Self::ReceiptPrinted,
            "receipt_reprinted" => Self::ReceiptReprinted,
            "backup_created" => Self::BackupCreated,
            "backup_restored" => Self::BackupRestored,
            "backup_pruned" => Self::BackupPruned,
            "backup_settings_updated" => Self::BackupSettingsUpdated,
            "import_staged" => Self::ImportStaged,
            "import_row_resolved" => Self::ImportRowResolved,
            "import_committed" => Self::ImportCommitted,
            "import_cancelled" => Self::ImportCancelled,
            _ => Self::Unknown,
        }
    }
}

/// An audit event record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// Add a comment to the event.
    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO audit_log (entity_type, entity_id, action, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for an entity, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, action, actor, old_value, new_value, comment, created_at
         FROM audit_log
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY created_at DESC, id DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], map_event_row)?;
    rows.collect()
}

/// Map an `audit_log` row selected in column order
/// `id, entity_type, entity_id, action, actor, old_value, new_value, comment, created_at`.
pub(crate) fn map_event_row(row: &rusqlite::Row) -> Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        event_type: EventType::parse(row.get::<_, String>(3)?.as_str()),
        actor: row.get(4)?,
        old_value: row.get(5)?,
        new_value: row.get(6)?,
        comment: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_event_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new("payment", "pay_123", EventType::PaymentVoided, "cashier1")
            .with_values(Some("completed".into()), Some("voided".into()))
            .with_comment("Wrong amount encoded");

        let id = insert_event(&conn, &event).unwrap();
        assert!(id > 0);

        let events = get_events(&conn, "payment", "pay_123", Some(10)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "cashier1");
        assert_eq!(events[0].event_type, EventType::PaymentVoided);
        assert_eq!(events[0].new_value.as_deref(), Some("voided"));
        assert_eq!(events[0].comment.as_deref(), Some("Wrong amount encoded"));
    }

    #[test]
    fn test_event_type_round_trips_through_storage_string() {
        for ty in [EventType::DriverMerged, EventType::ReceiptReprinted, EventType::ImportCommitted] {
            assert_eq!(EventType::parse(ty.as_str()), ty);
        }
        assert_eq!(EventType::parse("something_new"), EventType::Unknown);
    }
}
