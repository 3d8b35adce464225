//! Read side of the audit log.
//!
//! Entries are only ever written by `SqliteStorage::mutate`, in the same
//! transaction as the change they describe.

use crate::error::Result;
use crate::storage::events::{get_events, map_event_row, Event};
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor: Option<String>,
    /// Stored action name, e.g. `payment_voided`
    pub action: Option<String>,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub limit: Option<u32>,
}

pub struct AuditService<'c> {
    conn: &'c Connection,
}

impl<'c> AuditService<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Entries matching `filter`, newest first. Defaults to 100 entries.
    pub fn list(&self, filter: &AuditFilter) -> Result<Vec<Event>> {
        let mut sql = String::from(
            "SELECT id, entity_type, entity_id, action, actor, old_value, new_value, comment, created_at
             FROM audit_log WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        for (column, value) in [
            ("entity_type", &filter.entity_type),
            ("entity_id", &filter.entity_id),
            ("actor", &filter.actor),
            ("action", &filter.action),
        ] {
            if let Some(value) = value {
                sql.push_str(&format!(" AND {column} = ?{}", params.len() + 1));
                params.push(Box::new(value.trim().to_string()));
            }
        }
        if let Some(from) = filter.from {
            sql.push_str(&format!(" AND created_at >= ?{}", params.len() + 1));
            params.push(Box::new(from));
        }
        if let Some(to) = filter.to {
            sql.push_str(&format!(" AND created_at < ?{}", params.len() + 1));
            params.push(Box::new(to));
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC, id DESC LIMIT {}",
            filter.limit.unwrap_or(100)
        ));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), map_event_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Full trail of one entity.
    pub fn history(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        Ok(get_events(self.conn, entity_type, entity_id, None)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::service::payment::processor::tests::{cash, setup_with_citation};
    use crate::service::payment::PaymentService;
    use crate::storage::events::EventType;

    #[test]
    fn test_filters_and_order() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut payments = PaymentService::new(&mut storage, &config);
        let payment = payments.record(&cash("0000001"), "maria").unwrap();
        payments.void("0000001", "typo", "rosa").unwrap();

        let audit = AuditService::new(storage.conn());
        let voids = audit
            .list(&AuditFilter {
                action: Some("payment_voided".into()),
                ..AuditFilter::default()
            })
            .unwrap();
        assert_eq!(voids.len(), 1);
        assert_eq!(voids[0].actor, "rosa");

        let by_maria = audit
            .list(&AuditFilter {
                actor: Some("maria".into()),
                entity_type: Some("payment".into()),
                ..AuditFilter::default()
            })
            .unwrap();
        assert_eq!(by_maria.len(), 1);
        assert_eq!(by_maria[0].event_type, EventType::PaymentRecorded);

        let trail = audit.history("payment", &payment.id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].event_type, EventType::PaymentVoided);

        let none = audit
            .list(&AuditFilter {
                from: Some(chrono::Utc::now().timestamp_millis() + 60_000),
                ..AuditFilter::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }
}
