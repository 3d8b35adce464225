//! Citation intake and lifecycle.
//!
//! Creating a citation resolves (or registers) the driver, resolves the
//! violation codes against the fine schedule, and assesses each line item
//! at the driver's offense count. Any change that could shift offense
//! ordering (back-dated entries, edits to apprehension time, voids and
//! dismissals) recalculates the driver's unpaid citations.

use crate::error::{Error, Result};
use crate::model::{
    Citation, CitationChanges, CitationDetail, CitationFilter, CitationStatus, DriverRef,
    NewCitation, Violation,
};
use crate::service::driver::{get_driver, insert_driver};
use crate::service::fines::{
    assess, offense_count, recalculate_driver, resolve_codes, violation_type_by_code, FineLine,
    RecalcSummary,
};
use crate::storage::events::{Event, EventType};
use crate::storage::{MutationContext, SqliteStorage};
use crate::validate::{normalize_citation_status, normalize_ticket};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

/// One row of a citation listing.
#[derive(Debug, Clone, Serialize)]
pub struct CitationSummary {
    pub id: String,
    pub ticket_number: String,
    pub driver_id: String,
    pub driver_name: String,
    pub apprehended_at: i64,
    pub plate_number: Option<String>,
    pub officer: Option<String>,
    pub status: CitationStatus,
    pub violation_count: i64,
    pub total_fine: i64,
    pub amount_paid: i64,
    pub balance_due: i64,
}

/// Fines a prospective citation would receive.
#[derive(Debug, Clone, Serialize)]
pub struct FinePreview {
    pub driver_id: Option<String>,
    pub lines: Vec<FineLine>,
    pub total: i64,
}

/// Find a citation by id or ticket number.
pub fn find_citation(conn: &Connection, id_or_ticket: &str) -> Result<Citation> {
    let key = id_or_ticket.trim();
    let sql = format!(
        "SELECT {} FROM citations WHERE id = ?1 OR ticket_number = ?2",
        Citation::COLUMNS
    );
    let ticket = normalize_ticket(key).unwrap_or_else(|_| key.to_string());
    conn.query_row(&sql, [key, ticket.as_str()], Citation::from_row)
        .optional()?
        .ok_or_else(|| Error::CitationNotFound { id: key.to_string() })
}

/// Line items of a citation.
pub fn citation_lines(conn: &Connection, citation_id: &str) -> Result<Vec<Violation>> {
    let sql = format!(
        "SELECT {} FROM violations v
         JOIN violation_types vt ON vt.id = v.violation_type_id
         WHERE v.citation_id = ?1
         ORDER BY v.created_at, v.id",
        Violation::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([citation_id], Violation::from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// `(total_fine, amount_paid)` from the balances view.
pub fn citation_balance(conn: &Connection, citation_id: &str) -> Result<(i64, i64)> {
    Ok(conn.query_row(
        "SELECT total_fine, amount_paid FROM citation_balances WHERE citation_id = ?1",
        [citation_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?)
}

/// Id of the citation's `pending_print` or `completed` payment, if any.
pub fn active_payment(conn: &Connection, citation_id: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM payments
             WHERE citation_id = ?1 AND status IN ('pending_print', 'completed')",
            [citation_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Citation with driver, line items and balance.
pub fn load_detail(conn: &Connection, id_or_ticket: &str) -> Result<CitationDetail> {
    let citation = find_citation(conn, id_or_ticket)?;
    let driver = get_driver(conn, &citation.driver_id)?;
    let violations = citation_lines(conn, &citation.id)?;
    let (total_fine, amount_paid) = citation_balance(conn, &citation.id)?;
    Ok(CitationDetail {
        driver_name: driver.display_name(),
        license_number: driver.license_number,
        violations,
        total_fine,
        amount_paid,
        balance_due: (total_fine - amount_paid).max(0),
        citation,
    })
}

/// Insert a citation and its assessed line items.
pub(crate) fn insert_citation(
    conn: &Connection,
    ctx: &mut MutationContext,
    citation: &Citation,
    lines: &[FineLine],
) -> Result<()> {
    conn.execute(
        "INSERT INTO citations (id, ticket_number, driver_id, apprehended_at, place, plate_number,
                                vehicle_type, officer, status, remarks, batch_id, created_by,
                                created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
            citation.id,
            citation.ticket_number,
            citation.driver_id,
            citation.apprehended_at,
            citation.place,
            citation.plate_number,
            citation.vehicle_type,
            citation.officer,
            citation.status.as_str(),
            citation.remarks,
            citation.batch_id,
            citation.created_by,
            citation.created_at,
            citation.updated_at,
        ],
    )?;
    for line in lines {
        insert_line(conn, &citation.id, line, citation.created_at)?;
    }
    ctx.record_change(
        "citation",
        &citation.id,
        EventType::CitationCreated,
        None,
        Some(citation.ticket_number.clone()),
    );
    Ok(())
}

pub(crate) fn insert_line(conn: &Connection, citation_id: &str, line: &FineLine, now: i64) -> Result<String> {
    let id = format!("vio_{}", &uuid::Uuid::new_v4().to_string()[..12]);
    conn.execute(
        "INSERT INTO violations (id, citation_id, violation_type_id, offense_count, fine_amount, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id,
            citation_id,
            line.violation_type_id,
            line.offense_count,
            line.fine_amount,
            now
        ],
    )?;
    Ok(id)
}

/// Ensure a ticket number is free, returning its normalized form.
pub(crate) fn ensure_ticket_free(conn: &Connection, ticket: &str) -> Result<String> {
    let ticket = normalize_ticket(ticket).map_err(Error::InvalidArgument)?;
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM citations WHERE ticket_number = ?1)",
        [&ticket],
        |row| row.get(0),
    )?;
    if taken {
        return Err(Error::DuplicateTicket { ticket });
    }
    Ok(ticket)
}

fn clean(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !v.is_empty())
}

/// Citation intake and lifecycle operations.
pub struct CitationService<'a> {
    storage: &'a mut SqliteStorage,
}

impl<'a> CitationService<'a> {
    pub fn new(storage: &'a mut SqliteStorage) -> Self {
        Self { storage }
    }

    /// Create a citation with its assessed line items.
    pub fn create(&mut self, new: &NewCitation, actor: &str) -> Result<CitationDetail> {
        if new.violation_codes.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::RequiredField("violation_codes"));
        }

        let id = self.storage.mutate("create_citation", actor, |tx, ctx| {
            let ticket = ensure_ticket_free(tx, &new.ticket_number)?;

            let driver_id = match &new.driver {
                DriverRef::Existing { driver_id } => {
                    let driver = get_driver(tx, driver_id)?;
                    match driver.merged_into {
                        Some(target) => target,
                        None => driver.id,
                    }
                }
                DriverRef::New(details) => {
                    insert_driver(tx, ctx, details, new.force_new_driver)?.id
                }
            };

            let types = resolve_codes(tx, &new.violation_codes)?;
            let lines = assess(tx, Some(&driver_id), &types, new.apprehended_at)?;

            let mut citation = Citation::new(&ticket, &driver_id, new.apprehended_at);
            citation.place = clean(new.place.as_ref());
            citation.plate_number = clean(new.plate_number.as_ref()).map(|p| p.to_uppercase());
            citation.vehicle_type = clean(new.vehicle_type.as_ref());
            citation.officer = clean(new.officer.as_ref());
            citation.remarks = clean(new.remarks.as_ref());
            citation.created_by = Some(actor.to_string());

            insert_citation(tx, ctx, &citation, &lines)?;
            // A back-dated entry shifts the tiers of the driver's later citations.
            recalculate_driver(tx, ctx, &driver_id)?;
            Ok(citation.id)
        })?;

        let detail = load_detail(self.storage.conn(), &id)?;
        info!(
            ticket = %detail.citation.ticket_number,
            driver = %detail.citation.driver_id,
            total = detail.total_fine,
            "Citation created"
        );
        Ok(detail)
    }

    /// Citation by id or ticket number.
    pub fn get(&self, id_or_ticket: &str) -> Result<CitationDetail> {
        load_detail(self.storage.conn(), id_or_ticket)
    }

    /// List citations matching a filter, newest apprehension first.
    pub fn list(&self, filter: &CitationFilter) -> Result<Vec<CitationSummary>> {
        let mut sql = String::from(
            "SELECT c.id, c.ticket_number, c.driver_id, d.last_name || ', ' || d.first_name,
                    c.apprehended_at, c.plate_number, c.officer, c.status,
                    (SELECT COUNT(*) FROM violations v WHERE v.citation_id = c.id),
                    b.total_fine, b.amount_paid
             FROM citations c
             JOIN drivers d ON d.id = c.driver_id
             JOIN citation_balances b ON b.citation_id = c.id
             WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = &filter.status {
            let status = normalize_citation_status(status).map_err(|(input, suggestion)| {
                Error::InvalidStatus(match suggestion {
                    Some(s) => format!("'{input}' (did you mean '{s}'?)"),
                    None => format!("'{input}'"),
                })
            })?;
            sql.push_str(" AND c.status = ?");
            params.push(Box::new(status));
        }
        if let Some(driver_id) = &filter.driver_id {
            sql.push_str(" AND c.driver_id = ?");
            params.push(Box::new(driver_id.clone()));
        }
        if let Some(from) = filter.from {
            sql.push_str(" AND c.apprehended_at >= ?");
            params.push(Box::new(from));
        }
        if let Some(to) = filter.to {
            sql.push_str(" AND c.apprehended_at < ?");
            params.push(Box::new(to));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            sql.push_str(
                " AND (c.ticket_number LIKE ? OR c.plate_number LIKE ?
                       OR d.last_name || ', ' || d.first_name LIKE ?
                       OR d.first_name || ' ' || d.last_name LIKE ?)",
            );
            let pattern = format!("%{}%", search.to_uppercase());
            for _ in 0..4 {
                params.push(Box::new(pattern.clone()));
            }
        }

        sql.push_str(" ORDER BY c.apprehended_at DESC, c.created_at DESC LIMIT ?");
        params.push(Box::new(filter.limit.unwrap_or(100)));

        let conn = self.storage.conn();
        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            let total_fine: i64 = row.get(9)?;
            let amount_paid: i64 = row.get(10)?;
            Ok(CitationSummary {
                id: row.get(0)?,
                ticket_number: row.get(1)?,
                driver_id: row.get(2)?,
                driver_name: row.get(3)?,
                apprehended_at: row.get(4)?,
                plate_number: row.get(5)?,
                officer: row.get(6)?,
                status: CitationStatus::from_str(&row.get::<_, String>(7)?),
                violation_count: row.get(8)?,
                total_fine,
                amount_paid,
                balance_due: (total_fine - amount_paid).max(0),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Edit citation details. Only `pending` and `contested` citations are editable.
    pub fn update(
        &mut self,
        id_or_ticket: &str,
        changes: &CitationChanges,
        actor: &str,
    ) -> Result<CitationDetail> {
        if changes.is_empty() {
            return Err(Error::InvalidArgument("no changes given".to_string()));
        }
        let citation = find_citation(self.storage.conn(), id_or_ticket)?;
        require_editable(&citation)?;

        let mut updated = citation.clone();
        let mut fields = Vec::new();
        if let Some(at) = changes.apprehended_at {
            updated.apprehended_at = at;
            fields.push("apprehended_at");
        }
        if changes.place.is_some() {
            updated.place = clean(changes.place.as_ref());
            fields.push("place");
        }
        if changes.plate_number.is_some() {
            updated.plate_number = clean(changes.plate_number.as_ref()).map(|p| p.to_uppercase());
            fields.push("plate_number");
        }
        if changes.vehicle_type.is_some() {
            updated.vehicle_type = clean(changes.vehicle_type.as_ref());
            fields.push("vehicle_type");
        }
        if changes.officer.is_some() {
            updated.officer = clean(changes.officer.as_ref());
            fields.push("officer");
        }
        if changes.remarks.is_some() {
            updated.remarks = clean(changes.remarks.as_ref());
            fields.push("remarks");
        }
        updated.updated_at = chrono::Utc::now().timestamp_millis();
        let time_changed = updated.apprehended_at != citation.apprehended_at;
        if time_changed {
            require_no_active_payment(self.storage.conn(), &citation)?;
        }

        self.storage.mutate("update_citation", actor, |tx, ctx| {
            tx.execute(
                "UPDATE citations SET apprehended_at = ?1, place = ?2, plate_number = ?3,
                        vehicle_type = ?4, officer = ?5, remarks = ?6, updated_at = ?7
                 WHERE id = ?8",
                rusqlite::params![
                    updated.apprehended_at,
                    updated.place,
                    updated.plate_number,
                    updated.vehicle_type,
                    updated.officer,
                    updated.remarks,
                    updated.updated_at,
                    updated.id,
                ],
            )?;
            ctx.events.push(
                Event::new("citation", &updated.id, EventType::CitationUpdated, &ctx.actor)
                    .with_comment(&fields.join(", ")),
            );
            if time_changed {
                recalculate_driver(tx, ctx, &updated.driver_id)?;
            }
            Ok(())
        })?;

        self.get(&updated.id)
    }

    /// Add a violation line item to an unpaid citation.
    pub fn add_violation(&mut self, id_or_ticket: &str, code: &str, actor: &str) -> Result<CitationDetail> {
        let citation = find_citation(self.storage.conn(), id_or_ticket)?;
        require_editable(&citation)?;
        require_no_active_payment(self.storage.conn(), &citation)?;

        self.storage.mutate("add_violation", actor, |tx, ctx| {
            let vt = violation_type_by_code(tx, code)?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM violations WHERE citation_id = ?1 AND violation_type_id = ?2)",
                [&citation.id, &vt.id],
                |row| row.get(0),
            )?;
            if exists {
                return Err(Error::InvalidArgument(format!(
                    "{} is already on ticket {}",
                    vt.code, citation.ticket_number
                )));
            }

            let count = offense_count(tx, &citation.driver_id, &vt.id, citation.apprehended_at, Some(citation.id.as_str()))?;
            let line = FineLine {
                violation_type_id: vt.id.clone(),
                code: vt.code.clone(),
                name: vt.name.clone(),
                offense_count: count,
                fine_amount: vt.fine_for(count),
            };
            let now = chrono::Utc::now().timestamp_millis();
            insert_line(tx, &citation.id, &line, now)?;
            tx.execute(
                "UPDATE citations SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, citation.id],
            )?;
            ctx.record_change("citation", &citation.id, EventType::ViolationAdded, None, Some(vt.code.clone()));
            recalculate_driver(tx, ctx, &citation.driver_id)?;
            Ok(())
        })?;

        self.get(&citation.id)
    }

    /// Remove a violation line item. The last line item cannot be removed.
    pub fn remove_violation(&mut self, id_or_ticket: &str, code: &str, actor: &str) -> Result<CitationDetail> {
        let citation = find_citation(self.storage.conn(), id_or_ticket)?;
        require_editable(&citation)?;
        require_no_active_payment(self.storage.conn(), &citation)?;

        let lines = citation_lines(self.storage.conn(), &citation.id)?;
        let code = code.trim().to_uppercase();
        let line = lines
            .iter()
            .find(|l| l.code == code)
            .ok_or_else(|| Error::ViolationTypeNotFound {
                code: code.clone(),
                similar: lines.iter().map(|l| l.code.clone()).collect(),
            })?;
        if lines.len() == 1 {
            return Err(Error::InvalidArgument(
                "a citation must keep at least one violation; void it instead".to_string(),
            ));
        }

        self.storage.mutate("remove_violation", actor, |tx, ctx| {
            tx.execute("DELETE FROM violations WHERE id = ?1", [&line.id])?;
            tx.execute(
                "UPDATE citations SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![chrono::Utc::now().timestamp_millis(), citation.id],
            )?;
            ctx.record_change("citation", &citation.id, EventType::ViolationRemoved, Some(line.code.clone()), None);
            recalculate_driver(tx, ctx, &citation.driver_id)?;
            Ok(())
        })?;

        self.get(&citation.id)
    }

    /// Manually change a citation's status.
    ///
    /// `paid` is reached only through payments. Citations with an active
    /// payment cannot change status by hand.
    pub fn change_status(
        &mut self,
        id_or_ticket: &str,
        status: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<CitationDetail> {
        let next = normalize_citation_status(status)
            .map(|s| CitationStatus::from_str(&s))
            .map_err(|(input, suggestion)| {
                Error::InvalidStatus(match suggestion {
                    Some(s) => format!("'{input}' (did you mean '{s}'?)"),
                    None => format!("'{input}'"),
                })
            })?;
        let citation = find_citation(self.storage.conn(), id_or_ticket)?;

        if !citation.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                entity: "citation",
                from: citation.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        require_no_active_payment(self.storage.conn(), &citation)?;

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if matches!(next, CitationStatus::Void | CitationStatus::Dismissed) && reason.is_none() {
            return Err(Error::RequiredField("reason"));
        }

        self.storage.mutate("change_citation_status", actor, |tx, ctx| {
            tx.execute(
                "UPDATE citations SET status = ?1, status_reason = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![
                    next.as_str(),
                    reason,
                    chrono::Utc::now().timestamp_millis(),
                    citation.id
                ],
            )?;
            let mut event = Event::new("citation", &citation.id, EventType::CitationStatusChanged, &ctx.actor)
                .with_values(
                    Some(citation.status.as_str().to_string()),
                    Some(next.as_str().to_string()),
                );
            if let Some(reason) = reason {
                event = event.with_comment(reason);
            }
            ctx.events.push(event);
            // Void and dismissed citations stop counting toward offense tiers.
            recalculate_driver(tx, ctx, &citation.driver_id)?;
            Ok(())
        })?;

        info!(ticket = %citation.ticket_number, from = citation.status.as_str(), to = next.as_str(), "Citation status changed");
        self.get(&citation.id)
    }

    /// Fines a new citation would receive now (or at `at`).
    pub fn fine_preview(&self, driver_id: Option<&str>, codes: &[String], at: Option<i64>) -> Result<FinePreview> {
        let conn = self.storage.conn();
        let driver_id = match driver_id {
            Some(id) => {
                let driver = get_driver(conn, id)?;
                Some(driver.merged_into.unwrap_or(driver.id))
            }
            None => None,
        };
        let types = resolve_codes(conn, codes)?;
        let at = at.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let lines = assess(conn, driver_id.as_deref(), &types, at)?;
        let total = lines.iter().map(|l| l.fine_amount).sum();
        debug!(driver = ?driver_id, total, "Fine preview");
        Ok(FinePreview { driver_id, lines, total })
    }

    /// Recompute the offense counts of a driver's unpaid citations.
    pub fn recalculate_driver(&mut self, driver_id: &str, actor: &str) -> Result<RecalcSummary> {
        get_driver(self.storage.conn(), driver_id)?;
        self.storage
            .mutate("recalculate_driver", actor, |tx, ctx| recalculate_driver(tx, ctx, driver_id))
    }
}

fn require_editable(citation: &Citation) -> Result<()> {
    if citation.status.is_editable() {
        Ok(())
    } else {
        Err(Error::InvalidStatus(format!(
            "ticket {} is {} and can no longer be edited",
            citation.ticket_number,
            citation.status.as_str()
        )))
    }
}

fn require_no_active_payment(conn: &Connection, citation: &Citation) -> Result<()> {
    match active_payment(conn, &citation.id)? {
        Some(payment_id) => Err(Error::ActivePaymentExists {
            citation: citation.ticket_number.clone(),
            payment_id,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::NewDriver;
    use crate::service::fines::tests::seed_schedule;

    pub(crate) fn new_citation(ticket: &str, at: i64, codes: &[&str]) -> NewCitation {
        NewCitation {
            ticket_number: ticket.to_string(),
            driver: DriverRef::Existing {
                driver_id: "drv_1".to_string(),
            },
            apprehended_at: at,
            violation_codes: codes.iter().map(|c| (*c).to_string()).collect(),
            place: Some("Rizal  Ave.".into()),
            plate_number: Some("abc 1234".into()),
            vehicle_type: None,
            officer: Some("PO1 Santos".into()),
            remarks: None,
            force_new_driver: false,
        }
    }

    fn setup() -> SqliteStorage {
        let storage = SqliteStorage::open_memory().unwrap();
        seed_schedule(storage.conn());
        storage
    }

    #[test]
    fn test_create_assesses_offense_tiers() {
        let mut storage = setup();
        let mut service = CitationService::new(&mut storage);

        let first = service.create(&new_citation("t-1", 1_000, &["NH"]), "encoder").unwrap();
        assert_eq!(first.citation.ticket_number, "T-1");
        assert_eq!(first.citation.place.as_deref(), Some("Rizal Ave."));
        assert_eq!(first.citation.plate_number.as_deref(), Some("ABC 1234"));
        assert_eq!(first.total_fine, 100_000);

        let second = service
            .create(&new_citation("T-2", 2_000, &["NH", "nl", "NH"]), "encoder")
            .unwrap();
        assert_eq!(second.violations.len(), 2);
        assert_eq!(second.violations[0].offense_count, 2);
        assert_eq!(second.total_fine, 150_000 + 300_000);
        assert_eq!(second.balance_due, second.total_fine);
    }

    #[test]
    fn test_duplicate_ticket_rejected() {
        let mut storage = setup();
        let mut service = CitationService::new(&mut storage);
        service.create(&new_citation("T-1", 1_000, &["NH"]), "encoder").unwrap();

        let err = service.create(&new_citation("#t-1", 2_000, &["NH"]), "encoder").unwrap_err();
        assert!(matches!(err, Error::DuplicateTicket { .. }));
    }

    #[test]
    fn test_create_with_new_driver_and_bad_code_rolls_back() {
        let mut storage = setup();
        let mut service = CitationService::new(&mut storage);
        let mut new = new_citation("T-9", 1_000, &["ZZZ"]);
        new.driver = DriverRef::New(NewDriver {
            last_name: "Reyes".into(),
            first_name: "Ana".into(),
            ..NewDriver::default()
        });

        assert!(service.create(&new, "encoder").is_err());
        let drivers: i64 = storage
            .conn()
            .query_row("SELECT COUNT(*) FROM drivers WHERE last_name = 'REYES'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(drivers, 0);
    }

    #[test]
    fn test_back_dated_citation_shifts_later_tiers() {
        let mut storage = setup();
        let mut service = CitationService::new(&mut storage);
        let later = service.create(&new_citation("T-2", 5_000, &["NH"]), "encoder").unwrap();
        assert_eq!(later.violations[0].offense_count, 1);

        let earlier = service.create(&new_citation("T-1", 1_000, &["NH"]), "encoder").unwrap();
        assert_eq!(earlier.violations[0].offense_count, 1);

        let later = service.get("T-2").unwrap();
        assert_eq!(later.violations[0].offense_count, 2);
        assert_eq!(later.total_fine, 150_000);
    }

    #[test]
    fn test_status_transitions_and_reasons() {
        let mut storage = setup();
        let mut service = CitationService::new(&mut storage);
        service.create(&new_citation("T-1", 1_000, &["NH"]), "encoder").unwrap();
        service.create(&new_citation("T-2", 2_000, &["NH"]), "encoder").unwrap();

        assert!(matches!(
            service.change_status("T-1", "paid", None, "encoder").unwrap_err(),
            Error::InvalidTransition { .. }
        ));
        assert!(matches!(
            service.change_status("T-1", "void", None, "encoder").unwrap_err(),
            Error::RequiredField("reason")
        ));

        let contested = service.change_status("T-1", "appealed", None, "encoder").unwrap();
        assert_eq!(contested.citation.status, CitationStatus::Contested);

        let dismissed = service
            .change_status("T-1", "dismissed", Some("Officer did not appear"), "encoder")
            .unwrap();
        assert_eq!(dismissed.citation.status, CitationStatus::Dismissed);
        assert_eq!(dismissed.citation.status_reason.as_deref(), Some("Officer did not appear"));

        // The dismissed ticket no longer counts, so T-2 becomes a first offense.
        assert_eq!(service.get("T-2").unwrap().violations[0].offense_count, 1);

        assert!(service.change_status("T-1", "pending", None, "encoder").is_err());
    }

    #[test]
    fn test_add_and_remove_violation() {
        let mut storage = setup();
        let mut service = CitationService::new(&mut storage);
        service.create(&new_citation("T-1", 1_000, &["NH"]), "encoder").unwrap();

        let detail = service.add_violation("T-1", "NL", "encoder").unwrap();
        assert_eq!(detail.violations.len(), 2);
        assert!(service.add_violation("T-1", "NL", "encoder").is_err());

        let detail = service.remove_violation("T-1", "NH", "encoder").unwrap();
        assert_eq!(detail.violations.len(), 1);
        assert_eq!(detail.total_fine, 300_000);
        assert!(service.remove_violation("T-1", "NL", "encoder").is_err());
    }

    #[test]
    fn test_update_time_recalculates() {
        let mut storage = setup();
        let mut service = CitationService::new(&mut storage);
        service.create(&new_citation("T-1", 1_000, &["NH"]), "encoder").unwrap();
        service.create(&new_citation("T-2", 2_000, &["NH"]), "encoder").unwrap();

        service
            .update(
                "T-1",
                &CitationChanges {
                    apprehended_at: Some(3_000),
                    ..CitationChanges::default()
                },
                "encoder",
            )
            .unwrap();

        assert_eq!(service.get("T-2").unwrap().violations[0].offense_count, 1);
        assert_eq!(service.get("T-1").unwrap().violations[0].offense_count, 2);
    }

    #[test]
    fn test_time_change_blocked_while_payment_active() {
        let mut storage = setup();
        CitationService::new(&mut storage)
            .create(&new_citation("T-1", 1_000, &["NH"]), "encoder")
            .unwrap();
        let config = crate::config::AppConfig::default();
        crate::service::payment::PaymentService::new(&mut storage, &config)
            .record(
                &crate::service::payment::PaymentRequest {
                    citation: "T-1".into(),
                    or_number: "0000001".into(),
                    ..Default::default()
                },
                "maria",
            )
            .unwrap();

        let mut service = CitationService::new(&mut storage);
        let err = service
            .update(
                "T-1",
                &CitationChanges {
                    apprehended_at: Some(3_000),
                    ..CitationChanges::default()
                },
                "encoder",
            )
            .unwrap_err();
        assert!(matches!(err, Error::ActivePaymentExists { .. }));

        let remarks = service
            .update(
                "T-1",
                &CitationChanges {
                    remarks: Some("helmet strap broken".into()),
                    ..CitationChanges::default()
                },
                "encoder",
            )
            .unwrap();
        assert_eq!(remarks.citation.remarks.as_deref(), Some("helmet strap broken"));
    }

    #[test]
    fn test_list_filters() {
        let mut storage = setup();
        let mut service = CitationService::new(&mut storage);
        service.create(&new_citation("T-1", 1_000, &["NH"]), "encoder").unwrap();
        service.create(&new_citation("T-2", 2_000, &["NL"]), "encoder").unwrap();
        service.change_status("T-2", "contested", None, "encoder").unwrap();

        let all = service.list(&CitationFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].ticket_number, "T-2");

        let contested = service
            .list(&CitationFilter {
                status: Some("contested".into()),
                ..CitationFilter::default()
            })
            .unwrap();
        assert_eq!(contested.len(), 1);

        let by_name = service
            .list(&CitationFilter {
                search: Some("juan cruz".into()),
                ..CitationFilter::default()
            })
            .unwrap();
        assert_eq!(by_name.len(), 2);

        let windowed = service
            .list(&CitationFilter {
                from: Some(1_500),
                to: Some(2_500),
                ..CitationFilter::default()
            })
            .unwrap();
        assert_eq!(windowed.len(), 1);
    }

    #[test]
    fn test_fine_preview() {
        let mut storage = setup();
        let mut service = CitationService::new(&mut storage);
        service.create(&new_citation("T-1", 1_000, &["NH"]), "encoder").unwrap();

        let preview = service
            .fine_preview(Some("drv_1"), &["NH".to_string(), "NL".to_string()], None)
            .unwrap();
        assert_eq!(preview.lines[0].offense_count, 2);
        assert_eq!(preview.total, 150_000 + 300_000);
    }
}
