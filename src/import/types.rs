//! Import pipeline types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spreadsheet columns the importer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Ticket,
    FullName,
    LastName,
    FirstName,
    MiddleName,
    License,
    BirthDate,
    Address,
    /// Apprehension date, possibly with a time
    Date,
    Time,
    Place,
    Plate,
    VehicleType,
    Officer,
    Violations,
    Remarks,
}

/// One spreadsheet cell, reduced to what the importer cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    /// Excel date serial (days since 1899-12-30, fraction is time of day)
    Serial(f64),
}

impl Cell {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) | Self::Serial(_) => false,
        }
    }

    /// Display form: whole numbers lose their `.0`, serials render as dates.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{n:.0}"),
            Self::Number(n) => n.to_string(),
            Self::Serial(serial) => super::excel::serial_to_datetime(*serial)
                .map_or_else(|| serial.to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string()),
        }
    }
}

/// A data row below the header.
#[derive(Debug, Clone)]
pub struct SheetRow {
    /// 1-based row number in the sheet
    pub row_number: usize,
    pub values: BTreeMap<Field, Cell>,
    /// Header text → display value, kept verbatim for the staging table
    pub raw: BTreeMap<String, String>,
}

impl SheetRow {
    #[must_use]
    pub fn get(&self, field: Field) -> Option<&Cell> {
        self.values.get(&field).filter(|c| !c.is_empty())
    }

    #[must_use]
    pub fn text(&self, field: Field) -> Option<String> {
        self.get(field).map(Cell::display).filter(|s| !s.is_empty())
    }
}

/// A sheet after header detection.
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub sheet_name: String,
    /// 1-based row number of the header row
    pub header_row: usize,
    pub columns: Vec<(String, Field)>,
    pub rows: Vec<SheetRow>,
}

/// Classification of a staged row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Valid,
    Duplicate,
    Conflict,
    Error,
    Imported,
    Skipped,
}

impl RowStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Duplicate => "duplicate",
            Self::Conflict => "conflict",
            Self::Error => "error",
            Self::Imported => "imported",
            Self::Skipped => "skipped",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "valid" => Self::Valid,
            "duplicate" => Self::Duplicate,
            "conflict" => Self::Conflict,
            "imported" => Self::Imported,
            "skipped" => Self::Skipped,
            _ => Self::Error,
        }
    }

    /// Parse a user-supplied status filter.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "valid" => Some(Self::Valid),
            "duplicate" | "duplicates" => Some(Self::Duplicate),
            "conflict" | "conflicts" => Some(Self::Conflict),
            "error" | "errors" => Some(Self::Error),
            "imported" => Some(Self::Imported),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// How a conflicting row should be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "ticket")]
pub enum Resolution {
    Skip,
    /// Import under a different, unused ticket number
    Renumber(String),
    /// Replace the existing unpaid citation with this row
    Overwrite,
}

impl Resolution {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Renumber(_) => "renumber",
            Self::Overwrite => "overwrite",
        }
    }
}

/// Batch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Staged,
    Committed,
    Cancelled,
}

impl BatchStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Committed => "committed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "committed" => Self::Committed,
            "cancelled" => Self::Cancelled,
            _ => Self::Staged,
        }
    }
}

/// A row of `import_batches`.
#[derive(Debug, Clone, Serialize)]
pub struct ImportBatch {
    pub id: String,
    pub file_name: String,
    pub file_hash: String,
    pub sheet_name: Option<String>,
    pub status: BatchStatus,
    pub total_rows: i64,
    pub valid_rows: i64,
    pub duplicate_rows: i64,
    pub conflict_rows: i64,
    pub error_rows: i64,
    pub imported_rows: i64,
    pub imported_by: String,
    pub created_at: i64,
    pub committed_at: Option<i64>,
}

impl ImportBatch {
    pub(crate) const COLUMNS: &'static str = "id, file_name, file_hash, sheet_name, status, total_rows, \
         valid_rows, duplicate_rows, conflict_rows, error_rows, imported_rows, imported_by, created_at, \
         committed_at";

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_name: row.get(1)?,
            file_hash: row.get(2)?,
            sheet_name: row.get(3)?,
            status: BatchStatus::from_str(&row.get::<_, String>(4)?),
            total_rows: row.get(5)?,
            valid_rows: row.get(6)?,
            duplicate_rows: row.get(7)?,
            conflict_rows: row.get(8)?,
            error_rows: row.get(9)?,
            imported_rows: row.get(10)?,
            imported_by: row.get(11)?,
            created_at: row.get(12)?,
            committed_at: row.get(13)?,
        })
    }
}

/// A row of `import_staging`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StagedRow {
    pub id: i64,
    pub batch_id: String,
    pub row_number: i64,
    pub raw_data: String,
    pub ticket_number: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub license_number: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
    pub apprehended_at: Option<i64>,
    pub place: Option<String>,
    pub plate_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub officer: Option<String>,
    pub remarks: Option<String>,
    pub violation_text: Option<String>,
    pub matched_codes: Vec<String>,
    /// Per-part match method and score
    pub match_detail: Option<String>,
    pub status: String,
    pub message: Option<String>,
    pub resolution: Option<String>,
    pub resolved_ticket: Option<String>,
    pub existing_citation_id: Option<String>,
    pub citation_id: Option<String>,
}

impl StagedRow {
    pub(crate) const COLUMNS: &'static str = "id, batch_id, row_number, raw_data, ticket_number, last_name, \
         first_name, middle_name, license_number, birth_date, address, apprehended_at, place, plate_number, \
         vehicle_type, officer, remarks, violation_text, matched_codes, match_detail, status, message, \
         resolution, resolved_ticket, existing_citation_id, citation_id";

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let matched: String = row.get(18)?;
        Ok(Self {
            id: row.get(0)?,
            batch_id: row.get(1)?,
            row_number: row.get(2)?,
            raw_data: row.get(3)?,
            ticket_number: row.get(4)?,
            last_name: row.get(5)?,
            first_name: row.get(6)?,
            middle_name: row.get(7)?,
            license_number: row.get(8)?,
            birth_date: row.get(9)?,
            address: row.get(10)?,
            apprehended_at: row.get(11)?,
            place: row.get(12)?,
            plate_number: row.get(13)?,
            vehicle_type: row.get(14)?,
            officer: row.get(15)?,
            remarks: row.get(16)?,
            violation_text: row.get(17)?,
            matched_codes: serde_json::from_str(&matched).unwrap_or_default(),
            match_detail: row.get(19)?,
            status: row.get(20)?,
            message: row.get(21)?,
            resolution: row.get(22)?,
            resolved_ticket: row.get(23)?,
            existing_citation_id: row.get(24)?,
            citation_id: row.get(25)?,
        })
    }

    #[must_use]
    pub fn row_status(&self) -> RowStatus {
        RowStatus::from_str(&self.status)
    }
}

/// What a commit did, or would do under `--dry-run`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommitReport {
    pub batch_id: String,
    pub dry_run: bool,
    pub imported: usize,
    pub overwritten: usize,
    pub skipped: usize,
    pub drivers_created: usize,
    pub drivers_linked: usize,
    pub drivers_recalculated: usize,
    pub tickets: Vec<String>,
}
