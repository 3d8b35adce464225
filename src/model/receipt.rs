//! Official receipt print record.

use serde::{Deserialize, Serialize};

/// One row per completed payment; reprints bump `print_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub payment_id: String,
    pub or_number: String,
    pub print_count: i64,
    pub printed_by: String,
    pub first_printed_at: i64,
    pub last_printed_at: i64,
}

impl Receipt {
    pub(crate) const COLUMNS: &'static str =
        "id, payment_id, or_number, print_count, printed_by, first_printed_at, last_printed_at";

    /// First print of a payment's receipt.
    pub fn new(payment_id: &str, or_number: &str, printed_by: &str) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: format!("rcpt_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            payment_id: payment_id.to_string(),
            or_number: or_number.to_string(),
            print_count: 1,
            printed_by: printed_by.to_string(),
            first_printed_at: now,
            last_printed_at: now,
        }
    }

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            payment_id: row.get(1)?,
            or_number: row.get(2)?,
            print_count: row.get(3)?,
            printed_by: row.get(4)?,
            first_printed_at: row.get(5)?,
            last_printed_at: row.get(6)?,
        })
    }
}
