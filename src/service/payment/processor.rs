//! Payment state transitions.
//!
//! Every transition runs in one transaction with its audit event; the
//! citation's status follows through the payment triggers.

use super::query::PaymentQuery;
use super::validator::{PaymentRequest, PaymentValidator};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::model::{Payment, PaymentStatus, Receipt};
use crate::service::users::{authorize, Privilege};
use crate::storage::events::{Event, EventType};
use crate::storage::{MutationContext, SqliteStorage};
use rusqlite::Connection;
use tracing::{info, warn};

/// Insert a freshly validated payment.
fn insert_payment(conn: &Connection, payment: &Payment) -> Result<()> {
    conn.execute(
        "INSERT INTO payments (id, citation_id, or_number, amount, amount_tendered, change_due,
                               method, reference_number, status, cashier, notes, paid_at,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
            payment.id,
            payment.citation_id,
            payment.or_number,
            payment.amount,
            payment.amount_tendered,
            payment.change_due,
            payment.method.as_str(),
            payment.reference_number,
            payment.status.as_str(),
            payment.cashier,
            payment.notes,
            payment.paid_at,
            payment.created_at,
            payment.updated_at,
        ],
    )?;
    Ok(())
}

/// Move a payment to `next`, stamping the matching timestamp and reason.
pub(crate) fn transition(
    conn: &Connection,
    ctx: &mut MutationContext,
    payment: &Payment,
    next: PaymentStatus,
    reason: Option<&str>,
) -> Result<()> {
    if !payment.status.can_transition_to(next) {
        return Err(Error::InvalidTransition {
            entity: "payment",
            from: payment.status.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }

    let now = chrono::Utc::now().timestamp_millis();
    let (stamp_column, reason_column, event_type) = match next {
        PaymentStatus::Completed => ("completed_at", None, EventType::PaymentCompleted),
        PaymentStatus::Voided => ("voided_at", Some("void_reason"), EventType::PaymentVoided),
        PaymentStatus::Refunded => ("refunded_at", Some("refund_reason"), EventType::PaymentRefunded),
        PaymentStatus::PendingPrint => {
            return Err(Error::InvalidTransition {
                entity: "payment",
                from: payment.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
    };

    let changed = match reason_column {
        Some(column) => conn.execute(
            &format!(
                "UPDATE payments SET status = ?1, {stamp_column} = ?2, {column} = ?3, updated_at = ?2
                 WHERE id = ?4 AND status = ?5"
            ),
            rusqlite::params![next.as_str(), now, reason, payment.id, payment.status.as_str()],
        )?,
        None => conn.execute(
            &format!(
                "UPDATE payments SET status = ?1, {stamp_column} = ?2, updated_at = ?2
                 WHERE id = ?3 AND status = ?4"
            ),
            rusqlite::params![next.as_str(), now, payment.id, payment.status.as_str()],
        )?,
    };
    if changed == 0 {
        // Another cashier moved it first.
        return Err(Error::InvalidTransition {
            entity: "payment",
            from: payment.status.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }

    let mut event = Event::new("payment", &payment.id, event_type, &ctx.actor).with_values(
        Some(payment.status.as_str().to_string()),
        Some(next.as_str().to_string()),
    );
    if let Some(reason) = reason {
        event = event.with_comment(reason);
    }
    ctx.events.push(event);
    Ok(())
}

/// Create the receipt row for a payment that just completed.
fn insert_receipt(conn: &Connection, ctx: &mut MutationContext, payment: &Payment) -> Result<Receipt> {
    let receipt = Receipt::new(&payment.id, &payment.or_number, &ctx.actor);
    conn.execute(
        "INSERT INTO receipts (id, payment_id, or_number, print_count, printed_by, first_printed_at, last_printed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            receipt.id,
            receipt.payment_id,
            receipt.or_number,
            receipt.print_count,
            receipt.printed_by,
            receipt.first_printed_at,
            receipt.last_printed_at,
        ],
    )?;
    ctx.record_change(
        "receipt",
        &receipt.id,
        EventType::ReceiptPrinted,
        None,
        Some(receipt.or_number.clone()),
    );
    Ok(receipt)
}

fn require_reason(reason: &str) -> Result<&str> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(Error::RequiredField("reason"));
    }
    Ok(reason)
}

pub struct PaymentProcessor<'a> {
    storage: &'a mut SqliteStorage,
    config: &'a AppConfig,
}

impl<'a> PaymentProcessor<'a> {
    pub fn new(storage: &'a mut SqliteStorage, config: &'a AppConfig) -> Self {
        Self { storage, config }
    }

    /// Record a payment awaiting receipt printing.
    ///
    /// Validation runs inside the write transaction so two cashiers cannot
    /// take the same OR number or pay the same citation twice.
    pub fn record(&mut self, request: &PaymentRequest, actor: &str) -> Result<Payment> {
        let payment = self.storage.mutate("record_payment", actor, |tx, ctx| {
            let v = PaymentValidator::new(tx).validate(request)?;

            let mut payment = Payment::new(&v.citation.id, &v.or_number, v.amount, v.method, actor);
            if let Some(tendered) = v.amount_tendered {
                payment = payment.with_tendered(tendered);
            }
            if let Some(reference) = &v.reference_number {
                payment = payment.with_reference(reference);
            }
            if let Some(notes) = &v.notes {
                payment = payment.with_notes(notes);
            }

            insert_payment(tx, &payment)?;
            ctx.record_change(
                "payment",
                &payment.id,
                EventType::PaymentRecorded,
                None,
                Some(format!("OR {} for {}", payment.or_number, v.citation.ticket_number)),
            );
            Ok(payment)
        })?;

        info!(or = %payment.or_number, amount = payment.amount, cashier = actor, "Payment recorded");
        Ok(payment)
    }

    /// Confirm that the receipt printed: the payment completes, the receipt
    /// row is created and the citation becomes paid.
    pub fn confirm_print(&mut self, id_or_or: &str, actor: &str) -> Result<(Payment, Receipt)> {
        let payment = PaymentQuery::new(self.storage.conn()).find(id_or_or)?;

        let receipt = self.storage.mutate("confirm_print", actor, |tx, ctx| {
            transition(tx, ctx, &payment, PaymentStatus::Completed, None)?;
            insert_receipt(tx, ctx, &payment)
        })?;

        info!(or = %payment.or_number, "Payment completed");
        let payment = PaymentQuery::new(self.storage.conn()).get(&payment.id)?;
        Ok((payment, receipt))
    }

    /// Void a pending or completed payment. Its OR number stays used.
    pub fn void(&mut self, id_or_or: &str, reason: &str, actor: &str) -> Result<Payment> {
        authorize(self.storage.conn(), self.config, actor, Privilege::VoidPayment)?;
        let reason = require_reason(reason)?;
        let payment = PaymentQuery::new(self.storage.conn()).find(id_or_or)?;

        self.storage.mutate("void_payment", actor, |tx, ctx| {
            transition(tx, ctx, &payment, PaymentStatus::Voided, Some(reason))
        })?;

        warn!(or = %payment.or_number, reason, actor, "Payment voided");
        PaymentQuery::new(self.storage.conn()).get(&payment.id)
    }

    /// Replace a `pending_print` payment whose receipt failed to print.
    ///
    /// The spoiled OR is voided and a new `pending_print` payment with the
    /// same details is recorded under `new_or`, in one transaction.
    pub fn reissue(&mut self, id_or_or: &str, new_or: &str, actor: &str) -> Result<Payment> {
        authorize(self.storage.conn(), self.config, actor, Privilege::VoidPayment)?;
        let old = PaymentQuery::new(self.storage.conn()).find(id_or_or)?;
        if old.status != PaymentStatus::PendingPrint {
            return Err(Error::InvalidStatus(format!(
                "only payments awaiting printing can be reissued; OR {} is {}",
                old.or_number,
                old.status.as_str()
            )));
        }

        let replacement = self.storage.mutate("reissue_payment", actor, |tx, ctx| {
            let or_number = PaymentValidator::new(tx).check_or_unused(new_or)?;

            let mut replacement = Payment::new(&old.citation_id, &or_number, old.amount, old.method, actor);
            replacement.amount_tendered = old.amount_tendered;
            replacement.change_due = old.change_due;
            replacement.reference_number.clone_from(&old.reference_number);
            replacement.notes.clone_from(&old.notes);

            let reason = format!("Receipt spoiled; reissued as OR {or_number}");
            transition(tx, ctx, &old, PaymentStatus::Voided, Some(&reason))?;
            insert_payment(tx, &replacement)?;
            tx.execute(
                "UPDATE payments SET replaced_by = ?1 WHERE id = ?2",
                [&replacement.id, &old.id],
            )?;
            ctx.record_change(
                "payment",
                &replacement.id,
                EventType::PaymentRecorded,
                Some(old.or_number.clone()),
                Some(or_number),
            );
            Ok(replacement)
        })?;

        info!(old = %old.or_number, new = %replacement.or_number, "Receipt reissued");
        Ok(replacement)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::CitationStatus;
    use crate::service::citation::tests::new_citation;
    use crate::service::citation::{find_citation, CitationService};
    use crate::service::fines::tests::seed_schedule;

    pub(crate) fn setup_with_citation() -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        seed_schedule(storage.conn());
        CitationService::new(&mut storage)
            .create(&new_citation("T-1", 1_000, &["NH"]), "encoder")
            .unwrap();
        storage
    }

    pub(crate) fn cash(or_number: &str) -> PaymentRequest {
        PaymentRequest {
            citation: "T-1".into(),
            or_number: or_number.into(),
            amount_tendered: Some(200_000),
            ..PaymentRequest::default()
        }
    }

    fn citation_status(storage: &SqliteStorage) -> CitationStatus {
        find_citation(storage.conn(), "T-1").unwrap().status
    }

    #[test]
    fn test_record_then_confirm_marks_paid() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut processor = PaymentProcessor::new(&mut storage, &config);

        let payment = processor.record(&cash("0000001"), "maria").unwrap();
        assert_eq!(payment.status, PaymentStatus::PendingPrint);
        assert_eq!(payment.change_due, Some(100_000));

        let (payment, receipt) = processor.confirm_print("0000001", "maria").unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.completed_at.is_some());
        assert_eq!(receipt.print_count, 1);
        assert_eq!(citation_status(&storage), CitationStatus::Paid);
    }

    #[test]
    fn test_backdated_citation_leaves_recorded_amount_alone() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let payment = PaymentProcessor::new(&mut storage, &config)
            .record(&cash("0000001"), "maria")
            .unwrap();
        assert_eq!(payment.amount, 100_000);

        // An earlier NH offense surfaces after the cashier took the money.
        let earlier = CitationService::new(&mut storage)
            .create(&new_citation("T-0", 500, &["NH"]), "encoder")
            .unwrap();
        assert_eq!(earlier.violations[0].offense_count, 1);

        let mut processor = PaymentProcessor::new(&mut storage, &config);
        processor.confirm_print("0000001", "maria").unwrap();

        let paid = CitationService::new(&mut storage).get("T-1").unwrap();
        assert_eq!(paid.citation.status, CitationStatus::Paid);
        assert_eq!(paid.total_fine, 100_000);
        assert_eq!(paid.balance_due, 0);
    }

    #[test]
    fn test_second_payment_blocked_while_active() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut processor = PaymentProcessor::new(&mut storage, &config);
        processor.record(&cash("0000001"), "maria").unwrap();

        let err = processor.record(&cash("0000002"), "maria").unwrap_err();
        assert!(matches!(err, Error::ActivePaymentExists { .. }));
    }

    #[test]
    fn test_void_completed_reopens_citation_and_or_is_not_reused() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut processor = PaymentProcessor::new(&mut storage, &config);
        processor.record(&cash("0000001"), "maria").unwrap();
        processor.confirm_print("0000001", "maria").unwrap();

        assert!(matches!(
            processor.void("0000001", "  ", "maria").unwrap_err(),
            Error::RequiredField("reason")
        ));
        let voided = processor.void("0000001", "Wrong driver", "maria").unwrap();
        assert_eq!(voided.status, PaymentStatus::Voided);
        assert_eq!(voided.void_reason.as_deref(), Some("Wrong driver"));
        assert_eq!(citation_status(&storage), CitationStatus::Pending);

        let mut processor = PaymentProcessor::new(&mut storage, &config);
        let err = processor.record(&cash("0000001"), "maria").unwrap_err();
        assert!(matches!(err, Error::DuplicateOrNumber { .. }));
        assert!(processor.record(&cash("0000002"), "maria").is_ok());

        // Terminal
        assert!(matches!(
            processor.confirm_print("0000001", "maria").unwrap_err(),
            Error::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_reissue_voids_old_and_links_replacement() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut processor = PaymentProcessor::new(&mut storage, &config);
        let old = processor.record(&cash("0000001"), "maria").unwrap();

        let new = processor.reissue("0000001", "0000002", "maria").unwrap();
        assert_eq!(new.status, PaymentStatus::PendingPrint);
        assert_eq!(new.amount, old.amount);
        assert_eq!(new.amount_tendered, old.amount_tendered);

        let old = PaymentQuery::new(storage.conn()).get(&old.id).unwrap();
        assert_eq!(old.status, PaymentStatus::Voided);
        assert_eq!(old.replaced_by.as_deref(), Some(new.id.as_str()));

        let mut processor = PaymentProcessor::new(&mut storage, &config);
        processor.confirm_print("0000002", "maria").unwrap();
        assert!(processor.reissue("0000002", "0000003", "maria").is_err());
    }

    #[test]
    fn test_reissue_to_used_or_rolls_back() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut processor = PaymentProcessor::new(&mut storage, &config);
        processor.record(&cash("0000001"), "maria").unwrap();

        let err = processor.reissue("0000001", "0000001", "maria").unwrap_err();
        assert!(matches!(err, Error::DuplicateOrNumber { .. }));
        let still = PaymentQuery::new(storage.conn()).get_by_or("0000001").unwrap();
        assert_eq!(still.status, PaymentStatus::PendingPrint);
    }

    #[test]
    fn test_void_requires_cashier_role_when_enforced() {
        let mut storage = setup_with_citation();
        let config = AppConfig {
            enforce_roles: true,
            ..AppConfig::default()
        };
        {
            let mut users = crate::service::users::UserService::new(&mut storage, &config);
            users.create("boss", "Office Head", crate::model::Role::Admin, "setup").unwrap();
            users.create("pedro", "Pedro Reyes", crate::model::Role::Encoder, "boss").unwrap();
        }
        let mut processor = PaymentProcessor::new(&mut storage, &config);
        processor.record(&cash("0000001"), "pedro").unwrap();
        assert!(matches!(
            processor.void("0000001", "typo", "pedro").unwrap_err(),
            Error::PermissionDenied { .. }
        ));
        assert!(processor.void("0000001", "typo", "boss").is_ok());
    }
}
