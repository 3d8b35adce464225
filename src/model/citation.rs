//! Citation model.
//!
//! A citation (traffic ticket) belongs to one driver and carries one or
//! more violation line items. Each line item records the offense count it
//! was assessed at and the fine of that tier.

use serde::{Deserialize, Serialize};

/// Citation status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStatus {
    Pending,
    Paid,
    Contested,
    Dismissed,
    Void,
}

impl CitationStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Contested => "contested",
            Self::Dismissed => "dismissed",
            Self::Void => "void",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "paid" => Self::Paid,
            "contested" => Self::Contested,
            "dismissed" => Self::Dismissed,
            "void" => Self::Void,
            _ => Self::Pending,
        }
    }

    /// Manual transitions an operator may request.
    ///
    /// `pending ↔ paid` is driven by payment triggers and never requested.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Contested | Self::Void)
                | (Self::Contested, Self::Pending | Self::Dismissed)
        )
    }

    /// Whether line items and details may still be edited.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        matches!(self, Self::Pending | Self::Contested)
    }

    /// Whether the citation counts toward a driver's offense history.
    #[must_use]
    pub const fn counts_as_offense(&self) -> bool {
        !matches!(self, Self::Dismissed | Self::Void)
    }
}

impl Default for CitationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// A traffic citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Unique identifier (`cit_…`)
    pub id: String,
    /// Printed ticket number, unique
    pub ticket_number: String,
    pub driver_id: String,
    /// Apprehension date/time (wall clock, Unix milliseconds)
    pub apprehended_at: i64,
    pub place: Option<String>,
    pub plate_number: Option<String>,
    pub vehicle_type: Option<String>,
    /// Apprehending officer
    pub officer: Option<String>,
    pub status: CitationStatus,
    /// Reason given for the latest manual status change
    pub status_reason: Option<String>,
    pub remarks: Option<String>,
    /// Import batch that created this citation, if any
    pub batch_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Citation {
    pub(crate) const COLUMNS: &'static str = "id, ticket_number, driver_id, apprehended_at, place, \
         plate_number, vehicle_type, officer, status, status_reason, remarks, batch_id, created_by, \
         created_at, updated_at";

    /// Create a new pending citation.
    pub fn new(ticket_number: &str, driver_id: &str, apprehended_at: i64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: format!("cit_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            ticket_number: ticket_number.to_string(),
            driver_id: driver_id.to_string(),
            apprehended_at,
            place: None,
            plate_number: None,
            vehicle_type: None,
            officer: None,
            status: CitationStatus::Pending,
            status_reason: None,
            remarks: None,
            batch_id: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ticket_number: row.get(1)?,
            driver_id: row.get(2)?,
            apprehended_at: row.get(3)?,
            place: row.get(4)?,
            plate_number: row.get(5)?,
            vehicle_type: row.get(6)?,
            officer: row.get(7)?,
            status: CitationStatus::from_str(&row.get::<_, String>(8)?),
            status_reason: row.get(9)?,
            remarks: row.get(10)?,
            batch_id: row.get(11)?,
            created_by: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

/// A citation line item with its violation type resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub citation_id: String,
    pub violation_type_id: String,
    pub code: String,
    pub name: String,
    /// 1st, 2nd, 3rd... offense of this type for the driver
    pub offense_count: i64,
    /// Fine assessed for this tier, in centavos
    pub fine_amount: i64,
}

impl Violation {
    pub(crate) const COLUMNS: &'static str = "v.id, v.citation_id, v.violation_type_id, vt.code, \
         vt.name, v.offense_count, v.fine_amount";

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            citation_id: row.get(1)?,
            violation_type_id: row.get(2)?,
            code: row.get(3)?,
            name: row.get(4)?,
            offense_count: row.get(5)?,
            fine_amount: row.get(6)?,
        })
    }
}

/// A citation with its line items and balance.
#[derive(Debug, Clone, Serialize)]
pub struct CitationDetail {
    #[serde(flatten)]
    pub citation: Citation,
    pub driver_name: String,
    pub license_number: Option<String>,
    pub violations: Vec<Violation>,
    pub total_fine: i64,
    pub amount_paid: i64,
    pub balance_due: i64,
}

/// Driver reference for a new citation: an existing id or new details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DriverRef {
    Existing { driver_id: String },
    New(super::NewDriver),
}

/// Input for creating a citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCitation {
    pub ticket_number: String,
    pub driver: DriverRef,
    /// Apprehension date/time (wall clock, Unix milliseconds)
    pub apprehended_at: i64,
    /// Violation type codes
    pub violation_codes: Vec<String>,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub plate_number: Option<String>,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub officer: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    /// Create the new driver even if it looks like an existing one
    #[serde(default)]
    pub force_new_driver: bool,
}

/// Partial update for a citation. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitationChanges {
    pub apprehended_at: Option<i64>,
    pub place: Option<String>,
    pub plate_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub officer: Option<String>,
    pub remarks: Option<String>,
}

impl CitationChanges {
    /// True when no field would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.apprehended_at.is_none()
            && self.place.is_none()
            && self.plate_number.is_none()
            && self.vehicle_type.is_none()
            && self.officer.is_none()
            && self.remarks.is_none()
    }
}

/// Filters for listing citations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CitationFilter {
    pub status: Option<String>,
    pub driver_id: Option<String>,
    /// Inclusive lower bound (Unix milliseconds)
    pub from: Option<i64>,
    /// Exclusive upper bound (Unix milliseconds)
    pub to: Option<i64>,
    /// Matches ticket, plate or driver name
    pub search: Option<String>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_citation() {
        let c = Citation::new("TCT-0001", "drv_1", 0);
        assert!(c.id.starts_with("cit_"));
        assert_eq!(c.status, CitationStatus::Pending);
    }

    #[test]
    fn test_status_transitions() {
        use CitationStatus::*;
        assert!(Pending.can_transition_to(Contested));
        assert!(Pending.can_transition_to(Void));
        assert!(Contested.can_transition_to(Dismissed));
        assert!(Contested.can_transition_to(Pending));

        assert!(!Pending.can_transition_to(Paid));
        assert!(!Pending.can_transition_to(Dismissed));
        assert!(!Paid.can_transition_to(Void));
        assert!(!Void.can_transition_to(Pending));
        assert!(!Dismissed.can_transition_to(Contested));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(CitationStatus::from_str("PAID"), CitationStatus::Paid);
        assert_eq!(CitationStatus::from_str("void"), CitationStatus::Void);
        assert_eq!(CitationStatus::from_str("???"), CitationStatus::Pending);
    }

    #[test]
    fn test_driver_ref_deserializes_both_shapes() {
        let existing: DriverRef = serde_json::from_str(r#"{"driver_id":"drv_1"}"#).unwrap();
        assert!(matches!(existing, DriverRef::Existing { .. }));

        let new: DriverRef =
            serde_json::from_str(r#"{"last_name":"Cruz","first_name":"Juan"}"#).unwrap();
        assert!(matches!(new, DriverRef::New(_)));
    }
}
