//! Official receipt rendering and print tracking.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::format::{format_amount, format_datetime, ordinal};
use crate::model::{Payment, PaymentStatus, Receipt};
use crate::service::citation::load_detail;
use crate::service::payment::processor::PaymentProcessor;
use crate::service::payment::PaymentQuery;
use crate::storage::events::EventType;
use crate::storage::SqliteStorage;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::info;

const WIDTH: usize = 48;

/// Result of printing a receipt.
#[derive(Debug, Clone, Serialize)]
pub struct PrintOutcome {
    pub payment: Payment,
    pub receipt: Receipt,
    /// False on the first print, which confirms the payment
    pub reprint: bool,
    pub text: String,
}

/// Receipt row for an OR number, if the payment ever completed.
pub fn find_receipt(conn: &Connection, or_number: &str) -> Result<Option<Receipt>> {
    let sql = format!("SELECT {} FROM receipts WHERE or_number = ?1", Receipt::COLUMNS);
    Ok(conn.query_row(&sql, [or_number], Receipt::from_row).optional()?)
}

fn centered(out: &mut String, text: &str) {
    let pad = WIDTH.saturating_sub(text.chars().count()) / 2;
    let _ = writeln!(out, "{:pad$}{text}", "");
}

fn row(out: &mut String, label: &str, value: &str) {
    let gap = WIDTH.saturating_sub(label.chars().count() + value.chars().count()).max(1);
    let _ = writeln!(out, "{label}{:gap$}{value}", "");
}

/// Render the receipt for `payment` as plain text.
pub fn render_payment(conn: &Connection, config: &AppConfig, payment: &Payment) -> Result<String> {
    let detail = load_detail(conn, &payment.citation_id)?;
    let rule = "-".repeat(WIDTH);
    let mut out = String::new();

    centered(&mut out, &config.office_name);
    if !config.office_address.is_empty() {
        centered(&mut out, &config.office_address);
    }
    centered(&mut out, "OFFICIAL RECEIPT");
    match payment.status {
        PaymentStatus::Voided => centered(&mut out, "*** VOIDED ***"),
        PaymentStatus::Refunded => centered(&mut out, "*** REFUNDED ***"),
        PaymentStatus::PendingPrint | PaymentStatus::Completed => {}
    }
    let _ = writeln!(out, "{rule}");

    row(&mut out, "OR No.", &payment.or_number);
    row(&mut out, "Date", &format_datetime(payment.paid_at));
    row(&mut out, "Payor", &detail.driver_name);
    row(&mut out, "Ticket", &detail.citation.ticket_number);
    let _ = writeln!(out, "{rule}");

    for line in &detail.violations {
        let label = format!("{} ({} offense)", line.name, ordinal(line.offense_count));
        let amount = format_amount(line.fine_amount);
        let room = WIDTH.saturating_sub(amount.chars().count() + 1);
        row(&mut out, &crate::format::truncate(&label, room), &amount);
    }
    let _ = writeln!(out, "{rule}");

    row(&mut out, "TOTAL", &format_amount(payment.amount));
    if let Some(tendered) = payment.amount_tendered {
        row(&mut out, "Tendered", &format_amount(tendered));
    }
    if let Some(change) = payment.change_due {
        row(&mut out, "Change", &format_amount(change));
    }
    let method = match &payment.reference_number {
        Some(reference) => format!("{} #{reference}", payment.method.label()),
        None => payment.method.label().to_string(),
    };
    row(&mut out, "Paid by", &method);
    row(&mut out, "Cashier", &payment.cashier);

    match payment.status {
        PaymentStatus::Voided => {
            if let Some(reason) = &payment.void_reason {
                row(&mut out, "Void reason", reason);
            }
        }
        PaymentStatus::Refunded => {
            if let Some(reason) = &payment.refund_reason {
                row(&mut out, "Refund reason", reason);
            }
        }
        PaymentStatus::PendingPrint | PaymentStatus::Completed => {}
    }
    let _ = writeln!(out, "{rule}");
    Ok(out)
}

pub struct ReceiptService<'a> {
    storage: &'a mut SqliteStorage,
    config: &'a AppConfig,
}

impl<'a> ReceiptService<'a> {
    pub fn new(storage: &'a mut SqliteStorage, config: &'a AppConfig) -> Self {
        Self { storage, config }
    }

    /// The receipt row of a completed (or later voided/refunded) payment.
    pub fn get(&self, or_number: &str) -> Result<Receipt> {
        let payment = PaymentQuery::new(self.storage.conn()).get_by_or(or_number)?;
        find_receipt(self.storage.conn(), &payment.or_number)?.ok_or(Error::ReceiptNotFound {
            or_number: payment.or_number,
        })
    }

    pub fn render(&self, or_number: &str) -> Result<String> {
        let payment = PaymentQuery::new(self.storage.conn()).get_by_or(or_number)?;
        render_payment(self.storage.conn(), self.config, &payment)
    }

    /// Print a receipt.
    ///
    /// The first print of a `pending_print` payment confirms it; any later
    /// print is a reprint and is audited as such.
    pub fn print(&mut self, or_number: &str, actor: &str) -> Result<PrintOutcome> {
        let payment = PaymentQuery::new(self.storage.conn()).get_by_or(or_number)?;

        let (payment, receipt, reprint) = if payment.status == PaymentStatus::PendingPrint {
            let (payment, receipt) =
                PaymentProcessor::new(self.storage, self.config).confirm_print(&payment.id, actor)?;
            (payment, receipt, false)
        } else {
            let receipt = find_receipt(self.storage.conn(), &payment.or_number)?.ok_or_else(|| {
                Error::ReceiptNotFound {
                    or_number: payment.or_number.clone(),
                }
            })?;
            let now = chrono::Utc::now().timestamp_millis();
            self.storage.mutate("reprint_receipt", actor, |tx, ctx| {
                tx.execute(
                    "UPDATE receipts SET print_count = print_count + 1, printed_by = ?1, last_printed_at = ?2
                     WHERE id = ?3",
                    rusqlite::params![actor, now, receipt.id],
                )?;
                ctx.record_change(
                    "receipt",
                    &receipt.id,
                    EventType::ReceiptReprinted,
                    Some(receipt.print_count.to_string()),
                    Some((receipt.print_count + 1).to_string()),
                );
                Ok(())
            })?;
            info!(or = %payment.or_number, copies = receipt.print_count + 1, "Receipt reprinted");
            let receipt = find_receipt(self.storage.conn(), &payment.or_number)?.ok_or_else(|| {
                Error::ReceiptNotFound {
                    or_number: payment.or_number.clone(),
                }
            })?;
            (payment, receipt, true)
        };

        let text = render_payment(self.storage.conn(), self.config, &payment)?;
        Ok(PrintOutcome {
            payment,
            receipt,
            reprint,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::payment::processor::tests::{cash, setup_with_citation};
    use crate::service::payment::PaymentService;

    #[test]
    fn test_first_print_confirms_then_reprints() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        PaymentService::new(&mut storage, &config)
            .record(&cash("0000007"), "maria")
            .unwrap();

        let mut receipts = ReceiptService::new(&mut storage, &config);
        let first = receipts.print("0000007", "maria").unwrap();
        assert!(!first.reprint);
        assert_eq!(first.payment.status, PaymentStatus::Completed);
        assert!(first.text.contains("OFFICIAL RECEIPT"));
        assert!(first.text.contains("No Helmet (1st offense)"));
        assert!(first.text.contains("1,000.00"));
        assert!(first.text.contains("Change"));

        let second = receipts.print("0000007", "rosa").unwrap();
        assert!(second.reprint);
        assert_eq!(second.receipt.print_count, 2);
        assert_eq!(second.receipt.printed_by, "rosa");
        assert_eq!(receipts.get("0000007").unwrap().print_count, 2);
    }

    #[test]
    fn test_voided_receipt_has_banner() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut payments = PaymentService::new(&mut storage, &config);
        payments.record(&cash("0000007"), "maria").unwrap();
        payments.void("0000007", "Spoiled form", "maria").unwrap();

        let receipts = ReceiptService::new(&mut storage, &config);
        let text = receipts.render("0000007").unwrap();
        assert!(text.contains("*** VOIDED ***"));
        assert!(text.contains("Spoiled form"));
        assert!(matches!(receipts.get("0000007"), Err(Error::ReceiptNotFound { .. })));
    }
}
