//! Business operations over the store.
//!
//! Services borrow a [`SqliteStorage`](crate::storage::SqliteStorage) for
//! the duration of a call. Writers take it mutably and run each operation
//! through `mutate`; readers only need the connection. Helpers that must
//! compose inside another service's transaction are free functions over
//! `&Connection`.

pub mod audit;
pub mod backup;
pub mod citation;
pub mod driver;
pub mod duplicate;
pub mod fines;
pub mod payment;
pub mod receipt;
pub mod report;
pub mod users;
pub mod violation_type;

pub use audit::{AuditFilter, AuditService};
pub use backup::BackupService;
pub use citation::CitationService;
pub use driver::DriverService;
pub use duplicate::DuplicateDetectionService;
pub use payment::PaymentService;
pub use receipt::ReceiptService;
pub use report::ReportService;
pub use users::UserService;
pub use violation_type::ViolationTypeService;
