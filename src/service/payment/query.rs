//! Payment lookups and OR number bookkeeping.

use crate::error::{Error, Result};
use super::validator::PaymentValidator;
use crate::model::{Payment, PaymentFilter, PaymentStatus};
use crate::validate::{normalize_or_number, normalize_payment_status};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

const MAX_OR_DIGITS: usize = 12;
const MAX_NUMERIC_OR: u64 = 999_999_999_999;

/// Result of checking whether an OR number can be issued.
#[derive(Debug, Clone, Serialize)]
pub struct OrCheck {
    pub or_number: String,
    pub available: bool,
    /// Payment already holding this OR number
    pub payment_id: Option<String>,
    pub status: Option<PaymentStatus>,
    pub message: String,
}

/// A payment waiting for its receipt to print, with the ticket it pays.
#[derive(Debug, Clone, Serialize)]
pub struct PendingPrint {
    #[serde(flatten)]
    pub payment: Payment,
    pub ticket_number: String,
    pub driver_name: String,
}

pub struct PaymentQuery<'c> {
    conn: &'c Connection,
}

impl<'c> PaymentQuery<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, id: &str) -> Result<Payment> {
        let sql = format!("SELECT {} FROM payments WHERE id = ?1", Payment::COLUMNS);
        self.conn
            .query_row(&sql, [id], Payment::from_row)
            .optional()?
            .ok_or_else(|| Error::PaymentNotFound { id: id.to_string() })
    }

    pub fn get_by_or(&self, or_number: &str) -> Result<Payment> {
        let normalized = normalize_or_number(or_number).unwrap_or_else(|_| or_number.trim().to_string());
        let sql = format!("SELECT {} FROM payments WHERE or_number = ?1", Payment::COLUMNS);
        self.conn
            .query_row(&sql, [&normalized], Payment::from_row)
            .optional()?
            .ok_or(Error::PaymentNotFound { id: normalized })
    }

    /// Resolve a payment id (`pay_…`) or an OR number.
    pub fn find(&self, id_or_or: &str) -> Result<Payment> {
        let key = id_or_or.trim();
        if key.starts_with("pay_") {
            if let Ok(payment) = self.get(key) {
                return Ok(payment);
            }
        }
        self.get_by_or(key)
    }

    /// List payments matching `filter`, newest first.
    pub fn list(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        let mut sql = format!("SELECT {} FROM payments WHERE 1=1", Payment::COLUMNS);
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let status = normalize_payment_status(status).map_err(|(input, suggestion)| {
                Error::InvalidStatus(match suggestion {
                    Some(s) => format!("'{input}' (did you mean '{s}'?)"),
                    None => format!("'{input}' (use pending_print, completed, voided or refunded)"),
                })
            })?;
            sql.push_str(&format!(" AND status = ?{}", params.len() + 1));
            params.push(Box::new(status));
        }
        if let Some(method) = filter.method.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            let method = PaymentValidator::parse_method(Some(method))?;
            sql.push_str(&format!(" AND method = ?{}", params.len() + 1));
            params.push(Box::new(method.as_str()));
        }
        if let Some(cashier) = &filter.cashier {
            sql.push_str(&format!(" AND cashier = ?{} COLLATE NOCASE", params.len() + 1));
            params.push(Box::new(cashier.clone()));
        }
        if let Some(citation_id) = &filter.citation_id {
            sql.push_str(&format!(" AND citation_id = ?{}", params.len() + 1));
            params.push(Box::new(citation_id.clone()));
        }
        if let Some(from) = filter.from {
            sql.push_str(&format!(" AND paid_at >= ?{}", params.len() + 1));
            params.push(Box::new(from));
        }
        if let Some(to) = filter.to {
            sql.push_str(&format!(" AND paid_at < ?{}", params.len() + 1));
            params.push(Box::new(to));
        }

        sql.push_str(" ORDER BY paid_at DESC, or_number DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), Payment::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Payments recorded but not yet printed, oldest first.
    pub fn pending_print(&self) -> Result<Vec<PendingPrint>> {
        let sql = format!(
            "SELECT {}, c.ticket_number, d.last_name || ', ' || d.first_name
             FROM payments p
             JOIN citations c ON c.id = p.citation_id
             JOIN drivers d ON d.id = c.driver_id
             WHERE p.status = 'pending_print'
             ORDER BY p.paid_at",
            prefixed_columns("p")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(PendingPrint {
                payment: Payment::from_row(row)?,
                ticket_number: row.get(20)?,
                driver_name: row.get(21)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Report whether an OR number is well-formed and unused.
    pub fn check_or(&self, or_number: &str) -> Result<OrCheck> {
        let normalized = match normalize_or_number(or_number) {
            Ok(n) => n,
            Err(message) => {
                return Ok(OrCheck {
                    or_number: or_number.trim().to_string(),
                    available: false,
                    payment_id: None,
                    status: None,
                    message,
                });
            }
        };

        let holder: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT id, status FROM payments WHERE or_number = ?1",
                [&normalized],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match holder {
            Some((payment_id, raw)) => {
                let status = PaymentStatus::parse(&raw);
                OrCheck {
                    message: format!(
                        "OR {normalized} was already issued ({}) and cannot be reused",
                        status.map_or(raw.as_str(), |s| s.as_str())
                    ),
                    or_number: normalized,
                    available: false,
                    payment_id: Some(payment_id),
                    status,
                }
            }
            None => OrCheck {
                message: format!("OR {normalized} is available"),
                or_number: normalized,
                available: true,
                payment_id: None,
                status: None,
            },
        })
    }

    /// Suggest the next OR number: one past the highest all-digit OR in
    /// use, zero-padded to `width`, skipping any that are taken.
    pub fn next_or(&self, width: usize) -> Result<String> {
        let mut stmt = self.conn.prepare("SELECT or_number FROM payments")?;
        let issued = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let highest = issued
            .iter()
            .filter(|or| or.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|or| or.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        // normalize_or_number accepts five to twelve characters
        let width = width.clamp(5, MAX_OR_DIGITS);
        let mut candidate = highest + 1;
        while candidate <= MAX_NUMERIC_OR {
            let or_number = format!("{candidate:0width$}");
            let taken: bool = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM payments WHERE or_number = ?1)",
                [&or_number],
                |row| row.get(0),
            )?;
            if !taken {
                return Ok(or_number);
            }
            candidate += 1;
        }
        Err(Error::InvalidArgument(format!(
            "numeric OR numbers are exhausted (highest issued is {highest}); enter the next booklet's OR number by hand"
        )))
    }
}

/// `Payment::COLUMNS` qualified with a table alias.
pub(crate) fn prefixed_columns(alias: &str) -> String {
    Payment::COLUMNS
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::service::payment::processor::tests::{cash, setup_with_citation};
    use crate::service::payment::processor::PaymentProcessor;

    #[test]
    fn test_next_or_and_check() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        assert_eq!(PaymentQuery::new(storage.conn()).next_or(7).unwrap(), "0000001");

        PaymentProcessor::new(&mut storage, &config)
            .record(&cash("0000041"), "maria")
            .unwrap();
        let query = PaymentQuery::new(storage.conn());
        assert_eq!(query.next_or(7).unwrap(), "0000042");
        assert_eq!(query.next_or(3).unwrap(), "00042");

        let check = query.check_or("0000041").unwrap();
        assert!(!check.available);
        assert_eq!(check.status, Some(PaymentStatus::PendingPrint));
        assert!(query.check_or("0000042").unwrap().available);
        assert!(!query.check_or("12").unwrap().available);
    }

    #[test]
    fn test_find_list_and_pending_queue() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let payment = PaymentProcessor::new(&mut storage, &config)
            .record(&cash("0000001"), "maria")
            .unwrap();

        let query = PaymentQuery::new(storage.conn());
        assert_eq!(query.find(&payment.id).unwrap().or_number, "0000001");
        assert_eq!(query.find("0000001").unwrap().id, payment.id);
        assert!(matches!(query.find("0009999"), Err(Error::PaymentNotFound { .. })));

        let pending = query.pending_print().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ticket_number, "T-1");

        let by_cashier = query
            .list(&PaymentFilter {
                cashier: Some("MARIA".into()),
                ..PaymentFilter::default()
            })
            .unwrap();
        assert_eq!(by_cashier.len(), 1);
        let completed = query
            .list(&PaymentFilter {
                status: Some("completed".into()),
                ..PaymentFilter::default()
            })
            .unwrap();
        assert!(completed.is_empty());

        let unprinted = query
            .list(&PaymentFilter {
                status: Some("unprinted".into()),
                method: Some("Cash".into()),
                ..PaymentFilter::default()
            })
            .unwrap();
        assert_eq!(unprinted.len(), 1);
    }

    #[test]
    fn test_list_rejects_unknown_filters() {
        let storage = setup_with_citation();
        let query = PaymentQuery::new(storage.conn());

        let err = query
            .list(&PaymentFilter {
                status: Some("completd".into()),
                ..PaymentFilter::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStatus(ref msg) if msg.contains("completed")));

        let err = query
            .list(&PaymentFilter {
                method: Some("chek".into()),
                ..PaymentFilter::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref msg) if msg.contains("check")));
    }

    #[test]
    fn test_next_or_stays_within_twelve_digits() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        PaymentProcessor::new(&mut storage, &config)
            .record(&cash("999999999998"), "maria")
            .unwrap();
        assert_eq!(
            PaymentQuery::new(storage.conn()).next_or(7).unwrap(),
            "999999999999"
        );

        PaymentProcessor::new(&mut storage, &config)
            .void("999999999998", "booklet mix-up", "maria")
            .unwrap();
        let mut processor = PaymentProcessor::new(&mut storage, &config);
        processor
            .record(&cash("999999999999"), "maria")
            .unwrap();
        let err = PaymentQuery::new(storage.conn()).next_or(7).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref msg) if msg.contains("exhausted")));
    }

    #[test]
    fn test_unknown_stored_status_is_an_error() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        PaymentProcessor::new(&mut storage, &config)
            .record(&cash("0000001"), "maria")
            .unwrap();
        storage
            .conn()
            .execute_batch("PRAGMA ignore_check_constraints = ON; UPDATE payments SET status = 'lost';")
            .unwrap();

        let query = PaymentQuery::new(storage.conn());
        assert!(matches!(query.get_by_or("0000001"), Err(Error::Database(_))));
        let check = query.check_or("0000001").unwrap();
        assert!(!check.available);
        assert_eq!(check.status, None);
    }
}
