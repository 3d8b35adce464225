//! Driver (motorist) model.
//!
//! Drivers are deduplicated records: one row per real person, keyed by
//! license number when known and by a phonetic name key otherwise.

use crate::validate::{normalize_license, normalize_name, soundex};
use serde::{Deserialize, Serialize};

/// A motorist who can be cited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    /// Unique identifier (`drv_…`)
    pub id: String,

    /// Driver's license number, upper-cased without spaces
    pub license_number: Option<String>,

    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,

    /// Birth date as `YYYY-MM-DD`
    pub birth_date: Option<String>,

    pub address: Option<String>,

    /// Soundex(last) + Soundex(first)
    pub name_key: String,

    /// Set when this record was merged into another driver
    pub merged_into: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Driver {
    pub(crate) const COLUMNS: &'static str = "id, license_number, last_name, first_name, middle_name, \
         birth_date, address, name_key, merged_into, created_at, updated_at";

    /// Create a driver from already-validated details.
    pub fn new(details: &NewDriver) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let last_name = normalize_name(&details.last_name);
        let first_name = normalize_name(&details.first_name);
        Self {
            id: format!("drv_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            license_number: details.license_number.as_deref().and_then(normalize_license),
            name_key: name_key(&last_name, &first_name),
            last_name,
            first_name,
            middle_name: details
                .middle_name
                .as_deref()
                .map(normalize_name)
                .filter(|m| !m.is_empty()),
            birth_date: details.birth_date.clone(),
            address: details
                .address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            merged_into: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `LAST, FIRST MIDDLE`
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.middle_name {
            Some(middle) => format!("{}, {} {}", self.last_name, self.first_name, middle),
            None => format!("{}, {}", self.last_name, self.first_name),
        }
    }

    /// `FIRST LAST`, used for similarity comparisons.
    #[must_use]
    pub fn plain_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            license_number: row.get(1)?,
            last_name: row.get(2)?,
            first_name: row.get(3)?,
            middle_name: row.get(4)?,
            birth_date: row.get(5)?,
            address: row.get(6)?,
            name_key: row.get(7)?,
            merged_into: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

/// Input for creating a driver or probing for duplicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDriver {
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Partial update for a driver. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverChanges {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub license_number: Option<String>,
    pub birth_date: Option<String>,
    pub address: Option<String>,
}

/// Phonetic key for a normalized name pair.
#[must_use]
pub fn name_key(last_name: &str, first_name: &str) -> String {
    let first_word = |s: &str| s.split_whitespace().next().unwrap_or("").to_string();
    format!(
        "{}{}",
        soundex(&first_word(last_name)),
        soundex(&first_word(first_name))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_driver_normalizes() {
        let driver = Driver::new(&NewDriver {
            last_name: "dela  cruz".into(),
            first_name: "juan".into(),
            middle_name: Some(" ".into()),
            license_number: Some("n01 12 345678".into()),
            birth_date: Some("1990-05-01".into()),
            address: None,
        });

        assert!(driver.id.starts_with("drv_"));
        assert_eq!(driver.last_name, "DELA CRUZ");
        assert_eq!(driver.first_name, "JUAN");
        assert_eq!(driver.middle_name, None);
        assert_eq!(driver.license_number.as_deref(), Some("N0112345678"));
        assert_eq!(driver.display_name(), "DELA CRUZ, JUAN");
    }

    #[test]
    fn test_name_key_is_phonetic() {
        assert_eq!(name_key("SMITH", "JOHN"), name_key("SMYTHE", "JON"));
        assert_ne!(name_key("SMITH", "JOHN"), name_key("REYES", "JOHN"));
    }
}
