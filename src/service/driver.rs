//! Driver registry: creation with duplicate checks, updates, merges and
//! offense history.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::model::driver::name_key;
use crate::model::{CitationDetail, Driver, DriverChanges, NewDriver};
use crate::service::citation::load_detail;
use crate::service::duplicate::{DuplicateDetectionService, LIKELY_SCORE};
use crate::service::fines::recalculate_driver;
use crate::service::users::{authorize, Privilege};
use crate::storage::events::{Event, EventType};
use crate::storage::{MutationContext, SqliteStorage};
use crate::validate::{normalize_license, normalize_name, parse_date};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Per-type offense totals in a driver's history.
#[derive(Debug, Clone, Serialize)]
pub struct OffenseTotal {
    pub code: String,
    pub name: String,
    pub count: i64,
}

/// Everything on record for a driver.
#[derive(Debug, Clone, Serialize)]
pub struct DriverHistory {
    pub driver: Driver,
    pub citations: Vec<CitationDetail>,
    pub offense_totals: Vec<OffenseTotal>,
    pub total_fines: i64,
    pub outstanding: i64,
}

/// Validate and normalize driver input.
pub(crate) fn validate_new_driver(details: &NewDriver) -> Result<NewDriver> {
    if normalize_name(&details.last_name).is_empty() {
        return Err(Error::RequiredField("last_name"));
    }
    if normalize_name(&details.first_name).is_empty() {
        return Err(Error::RequiredField("first_name"));
    }
    let birth_date = match details.birth_date.as_deref().map(str::trim) {
        Some(b) if !b.is_empty() => Some(
            parse_date(b)
                .map_err(Error::InvalidArgument)?
                .format("%Y-%m-%d")
                .to_string(),
        ),
        _ => None,
    };
    Ok(NewDriver {
        birth_date,
        license_number: details.license_number.as_deref().and_then(normalize_license),
        ..details.clone()
    })
}

/// Get a driver by id.
pub fn get_driver(conn: &Connection, id: &str) -> Result<Driver> {
    let sql = format!("SELECT {} FROM drivers WHERE id = ?1", Driver::COLUMNS);
    conn.query_row(&sql, [id], Driver::from_row)
        .optional()?
        .ok_or_else(|| Error::DriverNotFound { id: id.to_string() })
}

/// Insert a driver inside an open transaction.
///
/// Unless `force`, likely duplicates abort with `PossibleDuplicateDriver`.
/// A license number already on file always aborts.
pub(crate) fn insert_driver(
    conn: &Connection,
    ctx: &mut MutationContext,
    details: &NewDriver,
    force: bool,
) -> Result<Driver> {
    let details = validate_new_driver(details)?;
    let candidates = DuplicateDetectionService::new(conn).find_candidates(&details)?;

    let blocking: Vec<_> = candidates
        .iter()
        .filter(|c| c.score == 100 || (!force && c.score >= LIKELY_SCORE))
        .map(|c| (c.driver.id.clone(), c.driver.display_name(), c.score))
        .collect();
    if !blocking.is_empty() {
        return Err(Error::PossibleDuplicateDriver { candidates: blocking });
    }

    let driver = Driver::new(&details);
    conn.execute(
        "INSERT INTO drivers (id, license_number, last_name, first_name, middle_name, birth_date,
                              address, name_key, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            driver.id,
            driver.license_number,
            driver.last_name,
            driver.first_name,
            driver.middle_name,
            driver.birth_date,
            driver.address,
            driver.name_key,
            driver.created_at,
            driver.updated_at,
        ],
    )?;
    ctx.record_change(
        "driver",
        &driver.id,
        EventType::DriverCreated,
        None,
        Some(driver.display_name()),
    );
    Ok(driver)
}

/// Driver registry operations.
pub struct DriverService<'a> {
    storage: &'a mut SqliteStorage,
    config: &'a AppConfig,
}

impl<'a> DriverService<'a> {
    pub fn new(storage: &'a mut SqliteStorage, config: &'a AppConfig) -> Self {
        Self { storage, config }
    }

    /// Create a driver after duplicate detection.
    pub fn create(&mut self, details: &NewDriver, force: bool, actor: &str) -> Result<Driver> {
        let driver = self
            .storage
            .mutate("create_driver", actor, |tx, ctx| insert_driver(tx, ctx, details, force))?;
        info!(driver = %driver.id, name = %driver.display_name(), "Driver created");
        Ok(driver)
    }

    /// Get a driver by id.
    pub fn get(&self, id: &str) -> Result<Driver> {
        get_driver(self.storage.conn(), id)
    }

    /// List unmerged drivers, optionally filtered by name or license.
    pub fn list(&self, search: Option<&str>, limit: Option<u32>) -> Result<Vec<Driver>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_uppercase()));
        let sql = format!(
            "SELECT {} FROM drivers
             WHERE merged_into IS NULL
               AND (?1 IS NULL
                    OR last_name || ', ' || first_name LIKE ?1
                    OR first_name || ' ' || last_name LIKE ?1
                    OR license_number LIKE ?1)
             ORDER BY last_name, first_name
             LIMIT ?2",
            Driver::COLUMNS
        );
        let mut stmt = self.storage.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params![pattern, limit.unwrap_or(100)],
            Driver::from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Update driver details; the phonetic key follows the name.
    pub fn update(&mut self, id: &str, changes: &DriverChanges, actor: &str) -> Result<Driver> {
        let mut driver = self.get(id)?;
        if driver.merged_into.is_some() {
            return Err(Error::InvalidArgument(format!(
                "driver {id} was merged into {}",
                driver.merged_into.as_deref().unwrap_or("another driver")
            )));
        }
        let before = driver.display_name();
        let mut fields = Vec::new();

        if let Some(last) = &changes.last_name {
            let last = normalize_name(last);
            if last.is_empty() {
                return Err(Error::RequiredField("last_name"));
            }
            driver.last_name = last;
            fields.push("last_name");
        }
        if let Some(first) = &changes.first_name {
            let first = normalize_name(first);
            if first.is_empty() {
                return Err(Error::RequiredField("first_name"));
            }
            driver.first_name = first;
            fields.push("first_name");
        }
        if let Some(middle) = &changes.middle_name {
            driver.middle_name = Some(normalize_name(middle)).filter(|m| !m.is_empty());
            fields.push("middle_name");
        }
        if let Some(license) = &changes.license_number {
            driver.license_number = normalize_license(license);
            fields.push("license_number");
        }
        if let Some(birth) = &changes.birth_date {
            driver.birth_date = if birth.trim().is_empty() {
                None
            } else {
                Some(
                    parse_date(birth)
                        .map_err(Error::InvalidArgument)?
                        .format("%Y-%m-%d")
                        .to_string(),
                )
            };
            fields.push("birth_date");
        }
        if let Some(address) = &changes.address {
            driver.address = Some(address.trim().to_string()).filter(|a| !a.is_empty());
            fields.push("address");
        }
        if fields.is_empty() {
            return Err(Error::InvalidArgument("no changes given".to_string()));
        }

        driver.name_key = name_key(&driver.last_name, &driver.first_name);
        driver.updated_at = chrono::Utc::now().timestamp_millis();

        if let Some(license) = &driver.license_number {
            let holder: Option<String> = self
                .storage
                .conn()
                .query_row(
                    "SELECT id FROM drivers WHERE license_number = ?1 AND id != ?2",
                    [license, &driver.id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(holder) = holder {
                return Err(Error::PossibleDuplicateDriver {
                    candidates: vec![(holder, format!("license {license}"), 100)],
                });
            }
        }

        self.storage.mutate("update_driver", actor, |tx, ctx| {
            tx.execute(
                "UPDATE drivers SET license_number = ?1, last_name = ?2, first_name = ?3,
                        middle_name = ?4, birth_date = ?5, address = ?6, name_key = ?7,
                        updated_at = ?8
                 WHERE id = ?9",
                rusqlite::params![
                    driver.license_number,
                    driver.last_name,
                    driver.first_name,
                    driver.middle_name,
                    driver.birth_date,
                    driver.address,
                    driver.name_key,
                    driver.updated_at,
                    driver.id,
                ],
            )?;
            let event = Event::new("driver", &driver.id, EventType::DriverUpdated, &ctx.actor)
                .with_values(Some(before), Some(driver.display_name()))
                .with_comment(&fields.join(", "));
            ctx.events.push(event);
            Ok(())
        })?;

        Ok(driver)
    }

    /// Merge `remove` into `keep`.
    ///
    /// Citations move to the kept driver, empty fields of the kept record
    /// are filled from the removed one, and the kept driver's offense
    /// counts are recalculated over the combined history.
    pub fn merge(&mut self, keep: &str, remove: &str, actor: &str) -> Result<Driver> {
        authorize(self.storage.conn(), self.config, actor, Privilege::MergeDrivers)?;
        if keep == remove {
            return Err(Error::InvalidArgument("cannot merge a driver into itself".to_string()));
        }
        let mut kept = self.get(keep)?;
        let removed = self.get(remove)?;
        for d in [&kept, &removed] {
            if let Some(target) = &d.merged_into {
                return Err(Error::InvalidArgument(format!(
                    "driver {} was already merged into {target}",
                    d.id
                )));
            }
        }

        let take_license = kept.license_number.is_none() && removed.license_number.is_some();
        if take_license {
            kept.license_number.clone_from(&removed.license_number);
        }
        if kept.middle_name.is_none() {
            kept.middle_name.clone_from(&removed.middle_name);
        }
        if kept.birth_date.is_none() {
            kept.birth_date.clone_from(&removed.birth_date);
        }
        if kept.address.is_none() {
            kept.address.clone_from(&removed.address);
        }
        let now = chrono::Utc::now().timestamp_millis();
        kept.updated_at = now;

        let moved = self.storage.mutate("merge_drivers", actor, |tx, ctx| {
            let moved = tx.execute(
                "UPDATE citations SET driver_id = ?1, updated_at = ?2 WHERE driver_id = ?3",
                rusqlite::params![kept.id, now, removed.id],
            )?;
            // Release the license first; it is unique across drivers.
            tx.execute(
                "UPDATE drivers SET merged_into = ?1, license_number = CASE WHEN ?2 THEN NULL ELSE license_number END,
                        updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![kept.id, take_license, now, removed.id],
            )?;
            tx.execute(
                "UPDATE drivers SET license_number = ?1, middle_name = ?2, birth_date = ?3,
                        address = ?4, updated_at = ?5
                 WHERE id = ?6",
                rusqlite::params![
                    kept.license_number,
                    kept.middle_name,
                    kept.birth_date,
                    kept.address,
                    now,
                    kept.id
                ],
            )?;
            ctx.record_change(
                "driver",
                &kept.id,
                EventType::DriverMerged,
                Some(removed.id.clone()),
                Some(kept.id.clone()),
            );
            recalculate_driver(tx, ctx, &kept.id)?;
            Ok(moved)
        })?;

        info!(keep = %kept.id, remove = %removed.id, citations = moved, "Drivers merged");
        Ok(kept)
    }

    /// Driver with every citation and per-type offense totals.
    pub fn history(&self, id: &str) -> Result<DriverHistory> {
        let conn = self.storage.conn();
        let driver = self.get(id)?;

        let ids: Vec<String> = conn
            .prepare(
                "SELECT id FROM citations WHERE driver_id = ?1
                 ORDER BY apprehended_at, created_at, id",
            )?
            .query_map([id], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        let citations = ids
            .iter()
            .map(|cid| load_detail(conn, cid))
            .collect::<Result<Vec<_>>>()?;

        let mut totals: BTreeMap<String, OffenseTotal> = BTreeMap::new();
        let mut total_fines = 0;
        let mut outstanding = 0;
        for detail in citations.iter().filter(|d| d.citation.status.counts_as_offense()) {
            total_fines += detail.total_fine;
            outstanding += detail.balance_due;
            for line in &detail.violations {
                totals
                    .entry(line.code.clone())
                    .or_insert_with(|| OffenseTotal {
                        code: line.code.clone(),
                        name: line.name.clone(),
                        count: 0,
                    })
                    .count += 1;
            }
        }

        Ok(DriverHistory {
            driver,
            citations,
            offense_totals: totals.into_values().collect(),
            total_fines,
            outstanding,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fines::tests::seed_schedule;

    fn juan() -> NewDriver {
        NewDriver {
            last_name: "Cruz".into(),
            first_name: "Juan".into(),
            birth_date: Some("05/01/1990".into()),
            ..NewDriver::default()
        }
    }

    #[test]
    fn test_create_normalizes_birth_date() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let config = AppConfig::default();
        let driver = DriverService::new(&mut storage, &config)
            .create(&juan(), false, "encoder")
            .unwrap();
        assert_eq!(driver.birth_date.as_deref(), Some("1990-05-01"));
        assert_eq!(driver.last_name, "CRUZ");
    }

    #[test]
    fn test_create_blocks_likely_duplicate_unless_forced() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let config = AppConfig::default();
        let mut drivers = DriverService::new(&mut storage, &config);
        drivers.create(&juan(), false, "encoder").unwrap();

        let err = drivers.create(&juan(), false, "encoder").unwrap_err();
        assert!(matches!(err, Error::PossibleDuplicateDriver { .. }));

        assert!(drivers.create(&juan(), true, "encoder").is_ok());
        assert_eq!(drivers.list(Some("cruz"), None).unwrap().len(), 2);
    }

    #[test]
    fn test_license_conflict_cannot_be_forced() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let config = AppConfig::default();
        let mut drivers = DriverService::new(&mut storage, &config);
        let with_license = NewDriver {
            license_number: Some("N01-12-345678".into()),
            ..juan()
        };
        drivers.create(&with_license, false, "encoder").unwrap();

        let other = NewDriver {
            last_name: "Reyes".into(),
            first_name: "Ana".into(),
            license_number: Some("n01-12-345678".into()),
            ..NewDriver::default()
        };
        let err = drivers.create(&other, true, "encoder").unwrap_err();
        assert!(matches!(err, Error::PossibleDuplicateDriver { .. }));
    }

    #[test]
    fn test_update_recomputes_name_key() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let config = AppConfig::default();
        let mut drivers = DriverService::new(&mut storage, &config);
        let driver = drivers.create(&juan(), false, "encoder").unwrap();

        let updated = drivers
            .update(
                &driver.id,
                &DriverChanges {
                    last_name: Some("Reyes".into()),
                    ..DriverChanges::default()
                },
                "encoder",
            )
            .unwrap();
        assert_eq!(updated.name_key, name_key("REYES", "JUAN"));
    }

    #[test]
    fn test_merge_moves_citations_and_recalculates() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        seed_schedule(storage.conn());
        let config = AppConfig::default();
        let (keep, remove) = {
            let mut drivers = DriverService::new(&mut storage, &config);
            // The seeded schedule already holds a CRUZ, JUAN without a birth date.
            let keep = drivers.create(&juan(), true, "encoder").unwrap();
            let remove = drivers
                .create(
                    &NewDriver {
                        license_number: Some("N01-99".into()),
                        ..juan()
                    },
                    true,
                    "encoder",
                )
                .unwrap();
            (keep, remove)
        };
        // Each record has one first-offense NH citation.
        storage
            .conn()
            .execute_batch(&format!(
                "INSERT INTO citations (id, ticket_number, driver_id, apprehended_at, created_at, updated_at)
                     VALUES ('c1', 'T1', '{k}', 1000, 0, 0), ('c2', 'T2', '{r}', 2000, 0, 0);
                 INSERT INTO violations (id, citation_id, violation_type_id, offense_count, fine_amount, created_at)
                     VALUES ('v1', 'c1', 'vt_nh', 1, 100000, 0), ('v2', 'c2', 'vt_nh', 1, 100000, 0);",
                k = keep.id,
                r = remove.id
            ))
            .unwrap();

        let mut drivers = DriverService::new(&mut storage, &config);
        let merged = drivers.merge(&keep.id, &remove.id, "admin").unwrap();
        assert_eq!(merged.license_number.as_deref(), Some("N01-99"));

        let history = drivers.history(&keep.id).unwrap();
        assert_eq!(history.citations.len(), 2);
        assert_eq!(history.offense_totals[0].count, 2);
        assert_eq!(history.citations[1].violations[0].offense_count, 2);
        assert_eq!(history.citations[1].violations[0].fine_amount, 150_000);

        assert!(drivers.get(&remove.id).unwrap().merged_into.is_some());
        assert!(drivers.list(None, None).unwrap().iter().all(|d| d.id != remove.id));
        assert!(drivers.merge(&keep.id, &remove.id, "admin").is_err());
        assert!(drivers.merge(&keep.id, &keep.id, "admin").is_err());
    }
}
