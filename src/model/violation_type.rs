//! Violation types: the fine schedule.

use serde::{Deserialize, Serialize};

/// A violation in the fine schedule, with three offense tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationType {
    pub id: String,
    /// Short code typed by encoders (e.g. `NH` for "No Helmet")
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    /// Fine for a first offense, in centavos
    pub fine_first: i64,
    /// Fine for a second offense, in centavos
    pub fine_second: i64,
    /// Fine for third and later offenses, in centavos
    pub fine_third: i64,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ViolationType {
    pub(crate) const COLUMNS: &'static str = "id, code, name, category, description, \
         fine_first, fine_second, fine_third, is_active, created_at, updated_at";

    /// Create a new active violation type.
    pub fn new(code: &str, name: &str, fines: [i64; 3]) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: format!("vt_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            code: code.trim().to_uppercase(),
            name: name.trim().to_string(),
            category: None,
            description: None,
            fine_first: fines[0],
            fine_second: fines[1],
            fine_third: fines[2],
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Fine for the given offense count (1st, 2nd, 3rd and later).
    #[must_use]
    pub const fn fine_for(&self, offense_count: i64) -> i64 {
        match offense_count {
            i64::MIN..=1 => self.fine_first,
            2 => self.fine_second,
            _ => self.fine_third,
        }
    }

    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            category: row.get(3)?,
            description: row.get(4)?,
            fine_first: row.get(5)?,
            fine_second: row.get(6)?,
            fine_third: row.get(7)?,
            is_active: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

/// Check that fines are non-negative and non-decreasing across tiers.
pub fn validate_fines(fines: [i64; 3]) -> Result<(), String> {
    if fines[0] < 0 {
        return Err("fines cannot be negative".to_string());
    }
    if fines[1] < fines[0] || fines[2] < fines[1] {
        return Err("fines must not decrease from one offense tier to the next".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fine_tiers() {
        let vt = ViolationType::new("nh", "No Helmet", [100_000, 150_000, 200_000]);
        assert_eq!(vt.code, "NH");
        assert_eq!(vt.fine_for(1), 100_000);
        assert_eq!(vt.fine_for(2), 150_000);
        assert_eq!(vt.fine_for(3), 200_000);
        assert_eq!(vt.fine_for(7), 200_000);
    }

    #[test]
    fn test_validate_fines() {
        assert!(validate_fines([500, 500, 1000]).is_ok());
        assert!(validate_fines([-1, 0, 0]).is_err());
        assert!(validate_fines([500, 400, 1000]).is_err());
    }
}
