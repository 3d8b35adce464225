//! Fine schedule administration.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::model::violation_type::validate_fines;
use crate::model::ViolationType;
use crate::service::users::{authorize, Privilege};
use crate::storage::events::EventType;
use crate::storage::SqliteStorage;
use rusqlite::OptionalExtension;
use tracing::info;

/// Common municipal ordinance violations loaded by `citedesk init --seed`.
/// Fines are in centavos for the 1st, 2nd and 3rd+ offense.
const STANDARD_SCHEDULE: &[(&str, &str, &str, [i64; 3])] = &[
    ("NH", "No Helmet", "Safety", [150_000, 300_000, 500_000]),
    ("NL", "Driving Without License", "Licensing", [300_000, 300_000, 500_000]),
    ("EL", "Expired License", "Licensing", [100_000, 150_000, 200_000]),
    ("UR", "Unregistered Vehicle", "Registration", [1_000_000, 1_000_000, 1_000_000]),
    ("NP", "No Plate", "Registration", [500_000, 500_000, 500_000]),
    ("RD", "Reckless Driving", "Conduct", [200_000, 300_000, 1_000_000]),
    ("DTS", "Disregarding Traffic Signs", "Conduct", [100_000, 150_000, 200_000]),
    ("IP", "Illegal Parking", "Obstruction", [50_000, 100_000, 150_000]),
    ("OBS", "Obstruction", "Obstruction", [50_000, 100_000, 150_000]),
    ("OL", "Overloading", "Conduct", [100_000, 150_000, 200_000]),
    ("NSB", "No Seatbelt", "Safety", [100_000, 200_000, 500_000]),
    ("CP", "Using Mobile Phone While Driving", "Conduct", [500_000, 1_000_000, 1_500_000]),
    ("CL", "Colorum Operation", "Franchise", [500_000, 1_000_000, 1_500_000]),
];

/// Changes to a violation type. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ViolationTypeChanges {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub fine_first: Option<i64>,
    pub fine_second: Option<i64>,
    pub fine_third: Option<i64>,
    pub is_active: Option<bool>,
}

pub struct ViolationTypeService<'a> {
    storage: &'a mut SqliteStorage,
    config: &'a AppConfig,
}

impl<'a> ViolationTypeService<'a> {
    pub fn new(storage: &'a mut SqliteStorage, config: &'a AppConfig) -> Self {
        Self { storage, config }
    }

    /// Add a violation type to the schedule.
    pub fn add(&mut self, vt: &ViolationType, actor: &str) -> Result<ViolationType> {
        authorize(self.storage.conn(), self.config, actor, Privilege::ManageViolationTypes)?;
        if vt.code.is_empty() || !vt.code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::InvalidArgument(format!(
                "violation code must be letters, digits or '-': '{}'",
                vt.code
            )));
        }
        if vt.name.trim().is_empty() {
            return Err(Error::RequiredField("name"));
        }
        validate_fines([vt.fine_first, vt.fine_second, vt.fine_third]).map_err(Error::InvalidAmount)?;

        let clash: Option<String> = self
            .storage
            .conn()
            .query_row(
                "SELECT code FROM violation_types WHERE code = ?1 OR name = ?2 COLLATE NOCASE",
                [&vt.code, &vt.name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(code) = clash {
            return Err(Error::InvalidArgument(format!(
                "violation type {code} already uses that code or name"
            )));
        }

        self.storage.mutate("add_violation_type", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO violation_types (id, code, name, category, description, fine_first,
                                              fine_second, fine_third, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    vt.id,
                    vt.code,
                    vt.name,
                    vt.category,
                    vt.description,
                    vt.fine_first,
                    vt.fine_second,
                    vt.fine_third,
                    vt.is_active,
                    vt.created_at,
                    vt.updated_at,
                ],
            )?;
            ctx.record_change(
                "violation_type",
                &vt.id,
                EventType::ViolationTypeCreated,
                None,
                Some(format!("{} {}", vt.code, vt.name)),
            );
            Ok(())
        })?;

        info!(code = %vt.code, "Violation type added");
        Ok(vt.clone())
    }

    /// List the schedule, active entries only unless `include_inactive`.
    pub fn list(&self, include_inactive: bool) -> Result<Vec<ViolationType>> {
        let sql = format!(
            "SELECT {} FROM violation_types {} ORDER BY code",
            ViolationType::COLUMNS,
            if include_inactive { "" } else { "WHERE is_active = 1" }
        );
        let mut stmt = self.storage.conn().prepare(&sql)?;
        let rows = stmt.query_map([], ViolationType::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Get a violation type by code, active or not.
    pub fn get(&self, code: &str) -> Result<ViolationType> {
        let code = code.trim().to_uppercase();
        let sql = format!("SELECT {} FROM violation_types WHERE code = ?1", ViolationType::COLUMNS);
        self.storage
            .conn()
            .query_row(&sql, [&code], ViolationType::from_row)
            .optional()?
            .ok_or(Error::ViolationTypeNotFound { code, similar: Vec::new() })
    }

    /// Update names or fines. Existing line items keep the fines they were assessed.
    pub fn update(&mut self, code: &str, changes: &ViolationTypeChanges, actor: &str) -> Result<ViolationType> {
        authorize(self.storage.conn(), self.config, actor, Privilege::ManageViolationTypes)?;
        let mut vt = self.get(code)?;
        let before = format!("{}/{}/{}", vt.fine_first, vt.fine_second, vt.fine_third);

        if let Some(name) = changes.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            vt.name = name.to_string();
        }
        if let Some(category) = &changes.category {
            vt.category = Some(category.trim().to_string()).filter(|c| !c.is_empty());
        }
        if let Some(description) = &changes.description {
            vt.description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
        }
        vt.fine_first = changes.fine_first.unwrap_or(vt.fine_first);
        vt.fine_second = changes.fine_second.unwrap_or(vt.fine_second);
        vt.fine_third = changes.fine_third.unwrap_or(vt.fine_third);
        if let Some(active) = changes.is_active {
            vt.is_active = active;
        }
        validate_fines([vt.fine_first, vt.fine_second, vt.fine_third]).map_err(Error::InvalidAmount)?;
        vt.updated_at = chrono::Utc::now().timestamp_millis();
        let after = format!("{}/{}/{}", vt.fine_first, vt.fine_second, vt.fine_third);

        self.storage.mutate("update_violation_type", actor, |tx, ctx| {
            tx.execute(
                "UPDATE violation_types SET name = ?1, category = ?2, description = ?3,
                        fine_first = ?4, fine_second = ?5, fine_third = ?6, is_active = ?7,
                        updated_at = ?8
                 WHERE id = ?9",
                rusqlite::params![
                    vt.name,
                    vt.category,
                    vt.description,
                    vt.fine_first,
                    vt.fine_second,
                    vt.fine_third,
                    vt.is_active,
                    vt.updated_at,
                    vt.id,
                ],
            )?;
            ctx.record_change("violation_type", &vt.id, EventType::ViolationTypeUpdated, Some(before), Some(after));
            Ok(())
        })?;

        Ok(vt)
    }

    /// Load the standard schedule, skipping codes or names already present.
    ///
    /// Returns the number of types added.
    pub fn seed_standard(&mut self, actor: &str) -> Result<usize> {
        let added = self.storage.mutate("seed_violation_types", actor, |tx, ctx| {
            let mut added = 0;
            for (code, name, category, fines) in STANDARD_SCHEDULE {
                let vt = ViolationType::new(code, name, *fines).with_category(category);
                let inserted = tx.execute(
                    "INSERT INTO violation_types (id, code, name, category, fine_first, fine_second,
                                                  fine_third, is_active, created_at, updated_at)
                     SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8
                     WHERE NOT EXISTS (SELECT 1 FROM violation_types
                                       WHERE code = ?2 OR name = ?3 COLLATE NOCASE)",
                    rusqlite::params![
                        vt.id,
                        vt.code,
                        vt.name,
                        vt.category,
                        vt.fine_first,
                        vt.fine_second,
                        vt.fine_third,
                        vt.created_at,
                    ],
                )?;
                if inserted > 0 {
                    ctx.record_change(
                        "violation_type",
                        &vt.id,
                        EventType::ViolationTypeCreated,
                        None,
                        Some(format!("{} {}", vt.code, vt.name)),
                    );
                    added += 1;
                }
            }
            Ok(added)
        })?;
        info!(added, "Standard violation schedule loaded");
        Ok(added)
    }

    /// Retire a violation type so it can no longer be cited.
    pub fn deactivate(&mut self, code: &str, actor: &str) -> Result<ViolationType> {
        self.update(
            code,
            &ViolationTypeChanges {
                is_active: Some(false),
                ..ViolationTypeChanges::default()
            },
            actor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_list_update_deactivate() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let config = AppConfig::default();
        let mut service = ViolationTypeService::new(&mut storage, &config);

        service
            .add(
                &ViolationType::new("nh", "No Helmet", [100_000, 150_000, 200_000]).with_category("Safety"),
                "admin",
            )
            .unwrap();
        assert!(service
            .add(&ViolationType::new("NH2", "no helmet", [1, 2, 3]), "admin")
            .is_err());
        assert!(service
            .add(&ViolationType::new("XX", "Decreasing", [3, 2, 1]), "admin")
            .is_err());

        let updated = service
            .update(
                "NH",
                &ViolationTypeChanges {
                    fine_third: Some(250_000),
                    ..ViolationTypeChanges::default()
                },
                "admin",
            )
            .unwrap();
        assert_eq!(updated.fine_third, 250_000);
        assert!(service
            .update(
                "NH",
                &ViolationTypeChanges {
                    fine_second: Some(50),
                    ..ViolationTypeChanges::default()
                },
                "admin",
            )
            .is_err());

        service.deactivate("nh", "admin").unwrap();
        assert!(service.list(false).unwrap().is_empty());
        assert_eq!(service.list(true).unwrap().len(), 1);
    }

    #[test]
    fn test_seed_standard_is_idempotent() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let config = AppConfig::default();
        let mut service = ViolationTypeService::new(&mut storage, &config);

        let first = service.seed_standard("setup").unwrap();
        assert_eq!(first, STANDARD_SCHEDULE.len());
        assert_eq!(service.seed_standard("setup").unwrap(), 0);
        assert_eq!(service.get("nh").unwrap().name, "No Helmet");
    }
}
