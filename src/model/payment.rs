//! Payment model and its status machine.
//!
//! ```text
//! pending_print ──confirm──▶ completed ──refund──▶ refunded
//!       │                        │
//!       └──────void──────▶ voided ◀──void──┘
//! ```
//!
//! `voided` and `refunded` are terminal. A payment's OR number is never
//! reused, whatever its status.

use serde::{Deserialize, Serialize};

/// Payment status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    PendingPrint,
    Completed,
    Voided,
    Refunded,
}

impl PaymentStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPrint => "pending_print",
            Self::Completed => "completed",
            Self::Voided => "voided",
            Self::Refunded => "refunded",
        }
    }

    /// Parse a stored status. Synonyms are resolved by
    /// `validate::normalize_payment_status` before this point.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_print" => Some(Self::PendingPrint),
            "completed" => Some(Self::Completed),
            "voided" => Some(Self::Voided),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::PendingPrint, Self::Completed | Self::Voided)
                | (Self::Completed, Self::Voided | Self::Refunded)
        )
    }

    /// Active payments hold their citation: at most one per citation.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::PendingPrint | Self::Completed)
    }
}

/// Payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Check,
    MoneyOrder,
    Online,
}

impl PaymentMethod {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Check => "check",
            Self::MoneyOrder => "money_order",
            Self::Online => "online",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(Self::Cash),
            "check" => Some(Self::Check),
            "money_order" => Some(Self::MoneyOrder),
            "online" => Some(Self::Online),
            _ => None,
        }
    }

    /// Non-cash methods must carry a reference number.
    #[must_use]
    pub const fn requires_reference(&self) -> bool {
        !matches!(self, Self::Cash)
    }

    /// Human label for receipts.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::Check => "Check",
            Self::MoneyOrder => "Money Order",
            Self::Online => "Online",
        }
    }
}

/// A payment against a citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier (`pay_…`)
    pub id: String,
    pub citation_id: String,
    /// Official receipt number, unique across all payments ever recorded
    pub or_number: String,
    /// Amount applied to the citation, in centavos
    pub amount: i64,
    /// Cash handed over, in centavos
    pub amount_tendered: Option<i64>,
    pub change_due: Option<i64>,
    pub method: PaymentMethod,
    /// Check number, money order or online transaction reference
    pub reference_number: Option<String>,
    pub status: PaymentStatus,
    pub cashier: String,
    pub notes: Option<String>,
    pub paid_at: i64,
    pub completed_at: Option<i64>,
    pub voided_at: Option<i64>,
    pub void_reason: Option<String>,
    pub refunded_at: Option<i64>,
    pub refund_reason: Option<String>,
    /// Payment that replaced this one after a failed print
    pub replaced_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Payment {
    pub(crate) const COLUMNS: &'static str = "id, citation_id, or_number, amount, amount_tendered, \
         change_due, method, reference_number, status, cashier, notes, paid_at, completed_at, \
         voided_at, void_reason, refunded_at, refund_reason, replaced_by, created_at, updated_at";

    /// Create a new payment awaiting receipt printing.
    pub fn new(citation_id: &str, or_number: &str, amount: i64, method: PaymentMethod, cashier: &str) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: format!("pay_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            citation_id: citation_id.to_string(),
            or_number: or_number.to_string(),
            amount,
            amount_tendered: None,
            change_due: None,
            method,
            reference_number: None,
            status: PaymentStatus::PendingPrint,
            cashier: cashier.to_string(),
            notes: None,
            paid_at: now,
            completed_at: None,
            voided_at: None,
            void_reason: None,
            refunded_at: None,
            refund_reason: None,
            replaced_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the cash tendered and compute change.
    #[must_use]
    pub fn with_tendered(mut self, tendered: i64) -> Self {
        self.amount_tendered = Some(tendered);
        self.change_due = Some(tendered - self.amount);
        self
    }

    /// Set the reference number.
    #[must_use]
    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference_number = Some(reference.to_string());
        self
    }

    /// Set notes.
    #[must_use]
    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            citation_id: row.get(1)?,
            or_number: row.get(2)?,
            amount: row.get(3)?,
            amount_tendered: row.get(4)?,
            change_due: row.get(5)?,
            method: enum_column(row, 6, PaymentMethod::parse)?,
            reference_number: row.get(7)?,
            status: enum_column(row, 8, PaymentStatus::parse)?,
            cashier: row.get(9)?,
            notes: row.get(10)?,
            paid_at: row.get(11)?,
            completed_at: row.get(12)?,
            voided_at: row.get(13)?,
            void_reason: row.get(14)?,
            refunded_at: row.get(15)?,
            refund_reason: row.get(16)?,
            replaced_by: row.get(17)?,
            created_at: row.get(18)?,
            updated_at: row.get(19)?,
        })
    }
}

/// Read a text column through `parse`, failing on values it does not know.
fn enum_column<T>(
    row: &rusqlite::Row,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unrecognized value '{raw}'").into(),
        )
    })
}

/// Filters for listing payments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub status: Option<String>,
    pub method: Option<String>,
    pub cashier: Option<String>,
    pub citation_id: Option<String>,
    /// Inclusive lower bound on `paid_at`
    pub from: Option<i64>,
    /// Exclusive upper bound on `paid_at`
    pub to: Option<i64>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_machine() {
        use PaymentStatus::*;
        assert!(PendingPrint.can_transition_to(Completed));
        assert!(PendingPrint.can_transition_to(Voided));
        assert!(Completed.can_transition_to(Voided));
        assert!(Completed.can_transition_to(Refunded));

        assert!(!PendingPrint.can_transition_to(Refunded));
        assert!(!Voided.can_transition_to(Completed));
        assert!(!Refunded.can_transition_to(Voided));
        assert!(!Completed.can_transition_to(PendingPrint));
    }

    #[test]
    fn test_with_tendered_computes_change() {
        let p = Payment::new("cit_1", "0000001", 150_000, PaymentMethod::Cash, "maria")
            .with_tendered(200_000);
        assert_eq!(p.change_due, Some(50_000));
        assert_eq!(p.status, PaymentStatus::PendingPrint);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(PaymentMethod::parse("money_order"), Some(PaymentMethod::MoneyOrder));
        assert_eq!(PaymentMethod::parse("chek"), None);
        assert_eq!(PaymentStatus::parse("completd"), None);
        assert!(PaymentMethod::Check.requires_reference());
        assert!(!PaymentMethod::Cash.requires_reference());
    }
}
