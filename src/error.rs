//! Error types for citedesk.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 5=conflict, etc.)
//! - Retryability flags for operators and scripts
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers and the HTTP API

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for citedesk operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. API clients match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    CitationNotFound,
    DriverNotFound,
    ViolationTypeNotFound,
    PaymentNotFound,
    ReceiptNotFound,
    UserNotFound,
    BatchNotFound,
    BackupNotFound,

    // Validation (exit 4)
    InvalidStatus,
    InvalidAmount,
    InvalidArgument,
    RequiredField,

    // Conflict (exit 5)
    DuplicateOrNumber,
    DuplicateTicket,
    PossibleDuplicateDriver,
    InvalidTransition,
    ActivePaymentExists,

    // Import (exit 6)
    ImportError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Backup (exit 9)
    BackupError,

    // Permission (exit 10)
    PermissionDenied,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::CitationNotFound => "CITATION_NOT_FOUND",
            Self::DriverNotFound => "DRIVER_NOT_FOUND",
            Self::ViolationTypeNotFound => "VIOLATION_TYPE_NOT_FOUND",
            Self::PaymentNotFound => "PAYMENT_NOT_FOUND",
            Self::ReceiptNotFound => "RECEIPT_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::BatchNotFound => "BATCH_NOT_FOUND",
            Self::BackupNotFound => "BACKUP_NOT_FOUND",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::RequiredField => "REQUIRED_FIELD",
            Self::DuplicateOrNumber => "DUPLICATE_OR_NUMBER",
            Self::DuplicateTicket => "DUPLICATE_TICKET",
            Self::PossibleDuplicateDriver => "POSSIBLE_DUPLICATE_DRIVER",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::ActivePaymentExists => "ACTIVE_PAYMENT_EXISTS",
            Self::ImportError => "IMPORT_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::BackupError => "BACKUP_ERROR",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-10).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::CitationNotFound
            | Self::DriverNotFound
            | Self::ViolationTypeNotFound
            | Self::PaymentNotFound
            | Self::ReceiptNotFound
            | Self::UserNotFound
            | Self::BatchNotFound
            | Self::BackupNotFound => 3,
            Self::InvalidStatus
            | Self::InvalidAmount
            | Self::InvalidArgument
            | Self::RequiredField => 4,
            Self::DuplicateOrNumber
            | Self::DuplicateTicket
            | Self::PossibleDuplicateDriver
            | Self::InvalidTransition
            | Self::ActivePaymentExists => 5,
            Self::ImportError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::BackupError => 9,
            Self::PermissionDenied => 10,
        }
    }

    /// Whether the caller should retry with corrected input.
    ///
    /// True for validation errors and duplicate-value conflicts that a
    /// different OR number, ticket or amount would fix. False for
    /// not-found, I/O, or internal errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidStatus
                | Self::InvalidAmount
                | Self::InvalidArgument
                | Self::RequiredField
                | Self::DuplicateOrNumber
                | Self::DuplicateTicket
                | Self::PossibleDuplicateDriver
                | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in citedesk operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `citedesk init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Citation not found: {id}")]
    CitationNotFound { id: String },

    #[error("Driver not found: {id}")]
    DriverNotFound { id: String },

    #[error("Violation type not found: {code}")]
    ViolationTypeNotFound {
        code: String,
        /// Closest known codes, for hint display.
        similar: Vec<String>,
    },

    #[error("Payment not found: {id}")]
    PaymentNotFound { id: String },

    #[error("Receipt not found for OR {or_number}")]
    ReceiptNotFound { or_number: String },

    #[error("User not found: {username}")]
    UserNotFound { username: String },

    #[error("Import batch not found: {id}")]
    BatchNotFound { id: String },

    #[error("Backup not found: {id}")]
    BackupNotFound { id: String },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Missing required field: {0}")]
    RequiredField(&'static str),

    #[error("OR number {or_number} is already used by payment {payment_id}")]
    DuplicateOrNumber {
        or_number: String,
        payment_id: String,
    },

    #[error("Ticket number {ticket} already exists")]
    DuplicateTicket { ticket: String },

    #[error("Driver may already exist ({} candidate(s))", candidates.len())]
    PossibleDuplicateDriver {
        /// (driver_id, display name, score) of likely matches.
        candidates: Vec<(String, String, u8)>,
    },

    #[error("Cannot move {entity} from '{from}' to '{to}'")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Citation {citation} already has an active payment ({payment_id})")]
    ActivePaymentExists {
        citation: String,
        payment_id: String,
    },

    #[error("Permission denied: {actor} cannot {action}")]
    PermissionDenied { actor: String, action: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<calamine::Error> for Error {
    fn from(e: calamine::Error) -> Self {
        Self::Import(e.to_string())
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::CitationNotFound { .. } => ErrorCode::CitationNotFound,
            Self::DriverNotFound { .. } => ErrorCode::DriverNotFound,
            Self::ViolationTypeNotFound { .. } => ErrorCode::ViolationTypeNotFound,
            Self::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
            Self::ReceiptNotFound { .. } => ErrorCode::ReceiptNotFound,
            Self::UserNotFound { .. } => ErrorCode::UserNotFound,
            Self::BatchNotFound { .. } => ErrorCode::BatchNotFound,
            Self::BackupNotFound { .. } => ErrorCode::BackupNotFound,
            Self::InvalidStatus(_) => ErrorCode::InvalidStatus,
            Self::InvalidAmount(_) => ErrorCode::InvalidAmount,
            Self::RequiredField(_) => ErrorCode::RequiredField,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::DuplicateOrNumber { .. } => ErrorCode::DuplicateOrNumber,
            Self::DuplicateTicket { .. } => ErrorCode::DuplicateTicket,
            Self::PossibleDuplicateDriver { .. } => ErrorCode::PossibleDuplicateDriver,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::ActivePaymentExists { .. } => ErrorCode::ActivePaymentExists,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::Import(_) => ErrorCode::ImportError,
            Self::Backup(_) => ErrorCode::BackupError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `citedesk init` to create the database".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::CitationNotFound { id } => Some(format!(
                "No citation with ID or ticket '{id}'. Use `citedesk citation list --search` to look it up."
            )),

            Self::DriverNotFound { id } => Some(format!(
                "No driver with ID '{id}'. Use `citedesk driver list --search <name>`."
            )),

            Self::ViolationTypeNotFound { similar, .. } if !similar.is_empty() => {
                Some(format!("Did you mean: {}?", similar.join(", ")))
            }
            Self::ViolationTypeNotFound { .. } => Some(
                "Use `citedesk violation-type list` to see the fine schedule.".to_string(),
            ),

            Self::PaymentNotFound { .. } => Some(
                "Payments can be looked up by payment ID or OR number. Use `citedesk payment list`."
                    .to_string(),
            ),

            Self::DuplicateOrNumber { .. } => Some(
                "OR numbers are never reused, even when voided. Use `citedesk payment next-or` for the next free number."
                    .to_string(),
            ),

            Self::DuplicateTicket { ticket } => Some(format!(
                "Use `citedesk citation show {ticket}` to inspect the existing citation."
            )),

            Self::PossibleDuplicateDriver { candidates } => {
                let mut hint = String::from("Possible matches:\n");
                for (id, name, score) in candidates.iter().take(5) {
                    hint.push_str(&format!("    {id}  {name} (score {score})\n"));
                }
                hint.push_str("  Reuse one with --driver <id>, or pass --force to create a new record.");
                Some(hint)
            }

            Self::ActivePaymentExists { payment_id, .. } => Some(format!(
                "Confirm, void or refund payment {payment_id} first."
            )),

            Self::PermissionDenied { .. } => Some(
                "Role enforcement is on. Use an --actor with an admin or cashier role.".to_string(),
            ),

            Self::InvalidStatus(msg) | Self::InvalidArgument(msg) => {
                if msg.contains("method") {
                    Some("Valid methods: cash, check, money_order, online".to_string())
                } else if msg.contains("citation status") {
                    Some("Valid statuses: pending, contested, dismissed, void".to_string())
                } else if msg.contains("role") {
                    Some("Valid roles: admin, cashier, enforcer, encoder".to_string())
                } else {
                    None
                }
            }

            Self::UserNotFound { .. }
            | Self::ReceiptNotFound { .. }
            | Self::BatchNotFound { .. }
            | Self::BackupNotFound { .. }
            | Self::InvalidAmount(_)
            | Self::RequiredField(_)
            | Self::InvalidTransition { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Import(_)
            | Self::Backup(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_categories() {
        assert_eq!(Error::NotInitialized.exit_code(), 2);
        assert_eq!(
            Error::CitationNotFound { id: "x".into() }.exit_code(),
            3
        );
        assert_eq!(Error::InvalidAmount("neg".into()).exit_code(), 4);
        assert_eq!(
            Error::DuplicateOrNumber {
                or_number: "0001".into(),
                payment_id: "pay_1".into()
            }
            .exit_code(),
            5
        );
        assert_eq!(
            Error::PermissionDenied {
                actor: "a".into(),
                action: "void".into()
            }
            .exit_code(),
            10
        );
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::DuplicateOrNumber {
            or_number: "1234567".into(),
            payment_id: "pay_abc".into(),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "DUPLICATE_OR_NUMBER");
        assert_eq!(json["error"]["retryable"], true);
        assert!(json["error"]["hint"].as_str().unwrap().contains("next-or"));
    }

    #[test]
    fn test_violation_type_hint_suggests_similar() {
        let err = Error::ViolationTypeNotFound {
            code: "NOHELM".into(),
            similar: vec!["NO-HELMET".into()],
        };
        assert_eq!(err.hint().unwrap(), "Did you mean: NO-HELMET?");
    }
}
