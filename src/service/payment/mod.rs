//! Payments: recording, printing, voiding, refunds and OR numbers.
//!
//! [`PaymentService`] is the entry point; the submodules split the work
//! the same way the cashier's window does.

pub mod processor;
pub mod query;
pub mod refund;
pub mod statistics;
pub mod validator;

pub use query::{OrCheck, PaymentQuery, PendingPrint};
pub use statistics::{Bucket, PaymentStatistics, PaymentStats};
pub use validator::{PaymentRequest, PaymentValidator};

use crate::config::AppConfig;
use crate::error::Result;
use crate::model::{Payment, PaymentFilter, Receipt};
use crate::storage::SqliteStorage;
use processor::PaymentProcessor;
use refund::RefundHandler;

pub struct PaymentService<'a> {
    storage: &'a mut SqliteStorage,
    config: &'a AppConfig,
}

impl<'a> PaymentService<'a> {
    pub fn new(storage: &'a mut SqliteStorage, config: &'a AppConfig) -> Self {
        Self { storage, config }
    }

    fn processor(&mut self) -> PaymentProcessor<'_> {
        PaymentProcessor::new(self.storage, self.config)
    }

    fn query(&self) -> PaymentQuery<'_> {
        PaymentQuery::new(self.storage.conn())
    }

    pub fn record(&mut self, request: &PaymentRequest, actor: &str) -> Result<Payment> {
        self.processor().record(request, actor)
    }

    pub fn confirm_print(&mut self, id_or_or: &str, actor: &str) -> Result<(Payment, Receipt)> {
        self.processor().confirm_print(id_or_or, actor)
    }

    pub fn void(&mut self, id_or_or: &str, reason: &str, actor: &str) -> Result<Payment> {
        self.processor().void(id_or_or, reason, actor)
    }

    pub fn reissue(&mut self, id_or_or: &str, new_or: &str, actor: &str) -> Result<Payment> {
        self.processor().reissue(id_or_or, new_or, actor)
    }

    pub fn refund(&mut self, id_or_or: &str, reason: &str, actor: &str) -> Result<Payment> {
        RefundHandler::new(self.storage, self.config).refund(id_or_or, reason, actor)
    }

    pub fn find(&self, id_or_or: &str) -> Result<Payment> {
        self.query().find(id_or_or)
    }

    pub fn list(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        self.query().list(filter)
    }

    pub fn pending_print(&self) -> Result<Vec<PendingPrint>> {
        self.query().pending_print()
    }

    pub fn check_or(&self, or_number: &str) -> Result<OrCheck> {
        self.query().check_or(or_number)
    }

    /// Suggest the next OR number using the configured width.
    pub fn next_or(&self) -> Result<String> {
        self.query().next_or(self.config.or_number_width)
    }

    pub fn stats(&self, from: Option<i64>, to: Option<i64>) -> Result<PaymentStats> {
        PaymentStatistics::new(self.storage.conn()).stats(from, to)
    }
}
