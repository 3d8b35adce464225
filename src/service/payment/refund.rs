//! Refunds of completed payments.

use super::processor::transition;
use super::query::PaymentQuery;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::model::{Payment, PaymentStatus};
use crate::service::users::{authorize, Privilege};
use crate::storage::SqliteStorage;
use tracing::warn;

pub struct RefundHandler<'a> {
    storage: &'a mut SqliteStorage,
    config: &'a AppConfig,
}

impl<'a> RefundHandler<'a> {
    pub fn new(storage: &'a mut SqliteStorage, config: &'a AppConfig) -> Self {
        Self { storage, config }
    }

    /// Refund a completed payment. The citation goes back to pending
    /// unless another completed payment still covers it.
    pub fn refund(&mut self, id_or_or: &str, reason: &str, actor: &str) -> Result<Payment> {
        authorize(self.storage.conn(), self.config, actor, Privilege::RefundPayment)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::RequiredField("reason"));
        }

        let payment = PaymentQuery::new(self.storage.conn()).find(id_or_or)?;
        if payment.status != PaymentStatus::Completed {
            return Err(Error::InvalidTransition {
                entity: "payment",
                from: payment.status.as_str().to_string(),
                to: PaymentStatus::Refunded.as_str().to_string(),
            });
        }

        self.storage.mutate("refund_payment", actor, |tx, ctx| {
            transition(tx, ctx, &payment, PaymentStatus::Refunded, Some(reason))
        })?;

        warn!(or = %payment.or_number, amount = payment.amount, reason, actor, "Payment refunded");
        PaymentQuery::new(self.storage.conn()).get(&payment.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CitationStatus;
    use crate::service::citation::find_citation;
    use crate::service::payment::processor::tests::{cash, setup_with_citation};
    use crate::service::payment::processor::PaymentProcessor;
    use crate::storage::events::get_events;

    #[test]
    fn test_refund_only_completed() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        PaymentProcessor::new(&mut storage, &config)
            .record(&cash("0000001"), "maria")
            .unwrap();

        let mut refunds = RefundHandler::new(&mut storage, &config);
        assert!(matches!(
            refunds.refund("0000001", "overpaid", "maria").unwrap_err(),
            Error::InvalidTransition { .. }
        ));

        PaymentProcessor::new(&mut storage, &config)
            .confirm_print("0000001", "maria")
            .unwrap();
        let mut refunds = RefundHandler::new(&mut storage, &config);
        assert!(matches!(
            refunds.refund("0000001", "", "maria").unwrap_err(),
            Error::RequiredField("reason")
        ));
        let refunded = refunds.refund("0000001", "Court dismissed case", "maria").unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert!(refunded.refunded_at.is_some());

        let citation = find_citation(storage.conn(), "T-1").unwrap();
        assert_eq!(citation.status, CitationStatus::Pending);

        let events = get_events(storage.conn(), "payment", &refunded.id, None).unwrap();
        assert!(events
            .iter()
            .any(|e| e.new_value.as_deref() == Some("refunded") && e.comment.as_deref() == Some("Court dismissed case")));
    }
}
