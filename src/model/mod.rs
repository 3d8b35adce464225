//! Data models for citedesk.
//!
//! This module contains all domain models:
//! - User
//! - Driver
//! - ViolationType
//! - Citation / Violation
//! - Payment
//! - Receipt
//! - BackupLog / BackupSettings

pub mod backup;
pub mod citation;
pub mod driver;
pub mod payment;
pub mod receipt;
pub mod user;
pub mod violation_type;

pub use backup::{BackupFrequency, BackupKind, BackupLog, BackupSettings};
pub use citation::{
    Citation, CitationChanges, CitationDetail, CitationFilter, CitationStatus, DriverRef,
    NewCitation, Violation,
};
pub use driver::{Driver, DriverChanges, NewDriver};
pub use payment::{Payment, PaymentFilter, PaymentMethod, PaymentStatus};
pub use receipt::Receipt;
pub use user::{Role, User};
pub use violation_type::ViolationType;
