//! Stage, review, resolve and commit spreadsheet imports.
//!
//! ```text
//! file ──stage──▶ batch (staged) ──resolve rows──▶ commit ──▶ committed
//!                     │
//!                     └──cancel──▶ cancelled
//! ```
//!
//! Staging writes every sheet row to `import_staging` with its
//! classification; nothing touches citations until commit, which runs in a
//! single transaction.

use super::excel::{parse_birth_date, parse_when, read_workbook, split_full_name};
use super::matcher::ViolationMatcher;
use super::types::{
    BatchStatus, CommitReport, Field, ImportBatch, ParsedSheet, Resolution, RowStatus, SheetRow, StagedRow,
};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::model::{Citation, NewDriver};
use crate::service::citation::{active_payment, ensure_ticket_free, find_citation, insert_citation, insert_line};
use crate::service::driver::{get_driver, insert_driver};
use crate::service::duplicate::DuplicateDetectionService;
use crate::service::fines::{assess, recalculate_driver, resolve_codes};
use crate::storage::events::EventType;
use crate::storage::hash::file_sha256;
use crate::storage::{MutationContext, SqliteStorage};
use crate::validate::{normalize_license, normalize_name, normalize_ticket, to_millis};
use rusqlite::{Connection, OptionalExtension};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

const DAY_MS: i64 = 86_400_000;

/// Strip stray punctuation around a ticket ("#T-100.", "T 100").
fn clean_ticket(raw: &str) -> std::result::Result<String, String> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    normalize_ticket(kept.trim_matches('-'))
}

fn collapse(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !v.is_empty())
}

/// Who and when, for telling repeats from conflicts.
#[derive(PartialEq, Eq)]
struct Identity {
    last: String,
    first: String,
    day: i64,
}

/// Clean one sheet row and classify everything except ticket collisions.
fn clean_row(row: &SheetRow, matcher: &ViolationMatcher) -> Result<StagedRow> {
    let mut staged = StagedRow {
        row_number: i64::try_from(row.row_number).unwrap_or(i64::MAX),
        raw_data: serde_json::to_string(&row.raw)?,
        status: RowStatus::Valid.as_str().to_string(),
        ..StagedRow::default()
    };
    let mut errors: Vec<String> = Vec::new();
    let mut notes: Vec<String> = Vec::new();

    match row.text(Field::Ticket).map(|t| clean_ticket(&t)) {
        Some(Ok(ticket)) => staged.ticket_number = Some(ticket),
        Some(Err(e)) => errors.push(e),
        None => errors.push("missing ticket number".into()),
    }

    let split = row.text(Field::FullName).and_then(|full| split_full_name(&full));
    let last = row.text(Field::LastName).map(|l| normalize_name(&l)).filter(|l| !l.is_empty());
    let first = row.text(Field::FirstName).map(|f| normalize_name(&f)).filter(|f| !f.is_empty());
    match (last, first, split) {
        (Some(last), Some(first), _) => {
            staged.last_name = Some(last);
            staged.first_name = Some(first);
            staged.middle_name = row.text(Field::MiddleName).map(|m| normalize_name(&m)).filter(|m| !m.is_empty());
        }
        (_, _, Some((last, first, middle))) => {
            staged.last_name = Some(last);
            staged.first_name = Some(first);
            staged.middle_name = row
                .text(Field::MiddleName)
                .map(|m| normalize_name(&m))
                .filter(|m| !m.is_empty())
                .or(middle);
        }
        _ => errors.push("missing driver name".into()),
    }

    staged.license_number = row.text(Field::License).as_deref().and_then(normalize_license);
    if let Some(cell) = row.get(Field::BirthDate) {
        match parse_birth_date(cell) {
            Ok(date) => staged.birth_date = Some(date),
            Err(e) => notes.push(format!("birth date ignored: {e}")),
        }
    }
    staged.address = collapse(row.text(Field::Address));

    let date = row.get(Field::Date).cloned().unwrap_or(super::types::Cell::Empty);
    match parse_when(&date, row.get(Field::Time)) {
        Ok(dt) => staged.apprehended_at = Some(to_millis(dt)),
        Err(e) => errors.push(format!("bad date: {e}")),
    }

    staged.place = collapse(row.text(Field::Place));
    staged.plate_number = collapse(row.text(Field::Plate)).map(|p| p.to_uppercase());
    staged.vehicle_type = collapse(row.text(Field::VehicleType));
    staged.officer = collapse(row.text(Field::Officer));
    staged.remarks = collapse(row.text(Field::Remarks));

    match row.text(Field::Violations) {
        Some(text) => {
            let matches = matcher.match_text(&text);
            for m in &matches {
                match &m.code {
                    Some(code) if !staged.matched_codes.contains(code) => staged.matched_codes.push(code.clone()),
                    Some(_) => {}
                    None => errors.push(format!("no violation type matches '{}'", m.part)),
                }
            }
            staged.match_detail = Some(
                matches
                    .iter()
                    .map(super::matcher::PartMatch::describe)
                    .collect::<Vec<_>>()
                    .join("; "),
            );
            staged.violation_text = Some(text);
            if matches.is_empty() {
                errors.push("no violations listed".into());
            }
        }
        None => errors.push("no violations listed".into()),
    }

    if !errors.is_empty() {
        staged.status = RowStatus::Error.as_str().to_string();
        notes.splice(0..0, errors);
    }
    staged.message = Some(notes.join("; ")).filter(|m| !m.is_empty());
    Ok(staged)
}

/// Mark duplicates and conflicts against the database and earlier rows.
fn classify_tickets(conn: &Connection, rows: &mut [StagedRow]) -> Result<()> {
    let mut seen: HashMap<String, (i64, Identity)> = HashMap::new();

    for row in rows.iter_mut() {
        if row.row_status() == RowStatus::Error {
            continue;
        }
        let (Some(ticket), Some(last), Some(first), Some(at)) =
            (row.ticket_number.clone(), row.last_name.clone(), row.first_name.clone(), row.apprehended_at)
        else {
            continue;
        };
        let identity = Identity {
            last,
            first,
            day: at.div_euclid(DAY_MS),
        };

        let existing: Option<Citation> = conn
            .query_row(
                &format!("SELECT {} FROM citations WHERE ticket_number = ?1", Citation::COLUMNS),
                [&ticket],
                Citation::from_row,
            )
            .optional()?;
        if let Some(existing) = existing {
            let driver = get_driver(conn, &existing.driver_id)?;
            let same = driver.last_name == identity.last
                && driver.first_name == identity.first
                && existing.apprehended_at.div_euclid(DAY_MS) == identity.day;
            if same {
                row.status = RowStatus::Duplicate.as_str().to_string();
                row.message = Some(format!("already recorded as citation {}", existing.id));
            } else {
                row.status = RowStatus::Conflict.as_str().to_string();
                row.message = Some(format!(
                    "ticket {ticket} already belongs to {} on {}",
                    driver.display_name(),
                    crate::format::format_date(existing.apprehended_at)
                ));
            }
            row.existing_citation_id = Some(existing.id);
            continue;
        }

        if let Some((earlier, earlier_identity)) = seen.get(&ticket) {
            if *earlier_identity == identity {
                row.status = RowStatus::Duplicate.as_str().to_string();
                row.message = Some(format!("repeats row {earlier}"));
            } else {
                row.status = RowStatus::Conflict.as_str().to_string();
                row.message = Some(format!("ticket {ticket} is also used on row {earlier}"));
            }
            continue;
        }

        seen.insert(ticket, (row.row_number, identity));
    }
    Ok(())
}

fn insert_staged(conn: &Connection, batch_id: &str, row: &StagedRow) -> Result<()> {
    conn.execute(
        "INSERT INTO import_staging (batch_id, row_number, raw_data, ticket_number, last_name, first_name,
                                     middle_name, license_number, birth_date, address, apprehended_at,
                                     place, plate_number, vehicle_type, officer, remarks, violation_text,
                                     matched_codes, match_detail, status, message, existing_citation_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20,
                 ?21, ?22)",
        rusqlite::params![
            batch_id,
            row.row_number,
            row.raw_data,
            row.ticket_number,
            row.last_name,
            row.first_name,
            row.middle_name,
            row.license_number,
            row.birth_date,
            row.address,
            row.apprehended_at,
            row.place,
            row.plate_number,
            row.vehicle_type,
            row.officer,
            row.remarks,
            row.violation_text,
            serde_json::to_string(&row.matched_codes)?,
            row.match_detail,
            row.status,
            row.message,
            row.existing_citation_id,
        ],
    )?;
    Ok(())
}

fn load_batch(conn: &Connection, id: &str) -> Result<ImportBatch> {
    let sql = format!("SELECT {} FROM import_batches WHERE id = ?1", ImportBatch::COLUMNS);
    conn.query_row(&sql, [id], ImportBatch::from_row)
        .optional()?
        .ok_or_else(|| Error::BatchNotFound { id: id.to_string() })
}

fn load_rows(conn: &Connection, batch_id: &str, status: Option<RowStatus>) -> Result<Vec<StagedRow>> {
    let sql = format!(
        "SELECT {} FROM import_staging WHERE batch_id = ?1 AND (?2 IS NULL OR status = ?2) ORDER BY row_number",
        StagedRow::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params![batch_id, status.map(|s| s.as_str())], StagedRow::from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn require_staged(batch: &ImportBatch) -> Result<()> {
    if batch.status == BatchStatus::Staged {
        Ok(())
    } else {
        Err(Error::InvalidStatus(format!(
            "batch {} is {}; only staged batches can be changed",
            batch.id,
            batch.status.as_str()
        )))
    }
}

/// Existing citation an overwrite would replace, if it may be replaced.
fn overwrite_target(conn: &Connection, citation_id: &str) -> Result<Citation> {
    let citation = find_citation(conn, citation_id)?;
    if !citation.status.is_editable() {
        return Err(Error::InvalidStatus(format!(
            "ticket {} is {} and cannot be overwritten",
            citation.ticket_number,
            citation.status.as_str()
        )));
    }
    if let Some(payment_id) = active_payment(conn, &citation.id)? {
        return Err(Error::ActivePaymentExists {
            citation: citation.ticket_number,
            payment_id,
        });
    }
    Ok(citation)
}

/// Apply a staged batch inside an open transaction.
fn apply_commit(
    conn: &Connection,
    ctx: &mut MutationContext,
    batch: &ImportBatch,
    link_score: u8,
    dry_run: bool,
) -> Result<CommitReport> {
    let mut report = CommitReport {
        batch_id: batch.id.clone(),
        dry_run,
        ..CommitReport::default()
    };
    let mut affected: BTreeSet<String> = BTreeSet::new();
    let now = chrono::Utc::now().timestamp_millis();

    for row in load_rows(conn, &batch.id, None)? {
        let (ticket, overwrite) = match (row.row_status(), row.resolution.as_deref()) {
            (RowStatus::Valid, _) => (row.ticket_number.clone(), None),
            (RowStatus::Conflict, Some("renumber")) => (row.resolved_ticket.clone(), None),
            (RowStatus::Conflict, Some("overwrite")) => (row.ticket_number.clone(), row.existing_citation_id.clone()),
            (RowStatus::Conflict, _) => {
                conn.execute("UPDATE import_staging SET status = 'skipped' WHERE id = ?1", [row.id])?;
                report.skipped += 1;
                continue;
            }
            _ => continue,
        };
        let (Some(ticket), Some(at)) = (ticket, row.apprehended_at) else {
            return Err(Error::Import(format!("row {} is incomplete", row.row_number)));
        };

        let details = NewDriver {
            last_name: row.last_name.clone().unwrap_or_default(),
            first_name: row.first_name.clone().unwrap_or_default(),
            middle_name: row.middle_name.clone(),
            license_number: row.license_number.clone(),
            birth_date: row.birth_date.clone(),
            address: row.address.clone(),
        };
        let best = DuplicateDetectionService::new(conn)
            .find_candidates(&details)?
            .into_iter()
            .next()
            .filter(|c| c.score >= link_score);
        let driver_id = match best {
            Some(candidate) => {
                debug!(row = row.row_number, driver = %candidate.driver.id, score = candidate.score, "Linked to existing driver");
                report.drivers_linked += 1;
                candidate.driver.id
            }
            None => {
                report.drivers_created += 1;
                insert_driver(conn, ctx, &details, true)?.id
            }
        };

        let types = resolve_codes(conn, &row.matched_codes)?;
        let lines = assess(conn, Some(&driver_id), &types, at)?;

        let citation_id = match overwrite {
            Some(existing_id) => {
                let existing = overwrite_target(conn, &existing_id)?;
                conn.execute(
                    "UPDATE citations SET driver_id = ?1, apprehended_at = ?2, place = ?3, plate_number = ?4,
                            vehicle_type = ?5, officer = ?6, remarks = ?7, batch_id = ?8, updated_at = ?9
                     WHERE id = ?10",
                    rusqlite::params![
                        driver_id,
                        at,
                        row.place,
                        row.plate_number,
                        row.vehicle_type,
                        row.officer,
                        row.remarks,
                        batch.id,
                        now,
                        existing.id,
                    ],
                )?;
                conn.execute("DELETE FROM violations WHERE citation_id = ?1", [&existing.id])?;
                for line in &lines {
                    insert_line(conn, &existing.id, line, now)?;
                }
                ctx.record_change(
                    "citation",
                    &existing.id,
                    EventType::CitationUpdated,
                    Some(existing.driver_id.clone()),
                    Some(format!("overwritten by import batch {}", batch.id)),
                );
                affected.insert(existing.driver_id);
                report.overwritten += 1;
                existing.id
            }
            None => {
                let ticket = ensure_ticket_free(conn, &ticket)?;
                let mut citation = Citation::new(&ticket, &driver_id, at);
                citation.place.clone_from(&row.place);
                citation.plate_number.clone_from(&row.plate_number);
                citation.vehicle_type.clone_from(&row.vehicle_type);
                citation.officer.clone_from(&row.officer);
                citation.remarks.clone_from(&row.remarks);
                citation.batch_id = Some(batch.id.clone());
                citation.created_by = Some(ctx.actor.clone());
                insert_citation(conn, ctx, &citation, &lines)?;
                report.imported += 1;
                citation.id
            }
        };

        conn.execute(
            "UPDATE import_staging SET status = 'imported', citation_id = ?1 WHERE id = ?2",
            rusqlite::params![citation_id, row.id],
        )?;
        report.tickets.push(ticket);
        affected.insert(driver_id);
    }

    for driver_id in &affected {
        recalculate_driver(conn, ctx, driver_id)?;
    }
    report.drivers_recalculated = affected.len();

    let imported = i64::try_from(report.imported + report.overwritten).unwrap_or(i64::MAX);
    conn.execute(
        "UPDATE import_batches SET status = 'committed', imported_rows = ?1, committed_at = ?2 WHERE id = ?3",
        rusqlite::params![imported, now, batch.id],
    )?;
    ctx.record_change(
        "import_batch",
        &batch.id,
        EventType::ImportCommitted,
        Some(BatchStatus::Staged.as_str().to_string()),
        Some(format!("{imported} imported, {} skipped", report.skipped)),
    );
    Ok(report)
}

/// Spreadsheet import pipeline.
pub struct ExcelImporter<'a> {
    storage: &'a mut SqliteStorage,
    config: &'a AppConfig,
}

impl<'a> ExcelImporter<'a> {
    pub fn new(storage: &'a mut SqliteStorage, config: &'a AppConfig) -> Self {
        Self { storage, config }
    }

    /// Read and stage a spreadsheet file.
    ///
    /// A file whose contents were already committed is rejected unless
    /// `force`.
    pub fn stage_file(&mut self, path: &Path, sheet: Option<&str>, force: bool, actor: &str) -> Result<ImportBatch> {
        let file_hash = file_sha256(path)?;
        let committed: Option<String> = self
            .storage
            .conn()
            .query_row(
                "SELECT id FROM import_batches WHERE file_hash = ?1 AND status = 'committed' LIMIT 1",
                [&file_hash],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(batch_id) = committed {
            if !force {
                return Err(Error::Import(format!(
                    "{} was already imported in batch {batch_id}; use --force to stage it again",
                    path.display()
                )));
            }
            warn!(file = %path.display(), batch = %batch_id, "Re-staging an already imported file");
        }

        let sheet = read_workbook(path, sheet)?;
        let file_name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        self.stage_sheet(&file_name, &file_hash, &sheet, actor)
    }

    /// Classify and stage already-parsed rows.
    pub fn stage_sheet(&mut self, file_name: &str, file_hash: &str, sheet: &ParsedSheet, actor: &str) -> Result<ImportBatch> {
        let matcher = ViolationMatcher::load(self.storage.conn(), self.config.import_match_threshold)?;
        let mut rows = sheet
            .rows
            .iter()
            .map(|row| clean_row(row, &matcher))
            .collect::<Result<Vec<_>>>()?;
        classify_tickets(self.storage.conn(), &mut rows)?;

        let count = |status: RowStatus| -> i64 {
            i64::try_from(rows.iter().filter(|r| r.row_status() == status).count()).unwrap_or(i64::MAX)
        };
        let batch = ImportBatch {
            id: format!("imp_{}", &uuid::Uuid::new_v4().to_string()[..12]),
            file_name: file_name.to_string(),
            file_hash: file_hash.to_string(),
            sheet_name: Some(sheet.sheet_name.clone()),
            status: BatchStatus::Staged,
            total_rows: i64::try_from(rows.len()).unwrap_or(i64::MAX),
            valid_rows: count(RowStatus::Valid),
            duplicate_rows: count(RowStatus::Duplicate),
            conflict_rows: count(RowStatus::Conflict),
            error_rows: count(RowStatus::Error),
            imported_rows: 0,
            imported_by: actor.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
            committed_at: None,
        };

        self.storage.mutate("stage_import", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO import_batches (id, file_name, file_hash, sheet_name, status, total_rows, valid_rows,
                                             duplicate_rows, conflict_rows, error_rows, imported_rows, imported_by,
                                             created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12)",
                rusqlite::params![
                    batch.id,
                    batch.file_name,
                    batch.file_hash,
                    batch.sheet_name,
                    batch.status.as_str(),
                    batch.total_rows,
                    batch.valid_rows,
                    batch.duplicate_rows,
                    batch.conflict_rows,
                    batch.error_rows,
                    batch.imported_by,
                    batch.created_at,
                ],
            )?;
            for row in &rows {
                insert_staged(tx, &batch.id, row)?;
            }
            ctx.record_change(
                "import_batch",
                &batch.id,
                EventType::ImportStaged,
                None,
                Some(format!(
                    "{}: {} rows ({} valid, {} duplicate, {} conflict, {} error)",
                    batch.file_name,
                    batch.total_rows,
                    batch.valid_rows,
                    batch.duplicate_rows,
                    batch.conflict_rows,
                    batch.error_rows
                )),
            );
            Ok(())
        })?;

        info!(batch = %batch.id, rows = batch.total_rows, valid = batch.valid_rows, "Import staged");
        Ok(batch)
    }

    /// Batches, newest first.
    pub fn list(&self, limit: Option<u32>) -> Result<Vec<ImportBatch>> {
        let sql = format!(
            "SELECT {} FROM import_batches ORDER BY created_at DESC LIMIT {}",
            ImportBatch::COLUMNS,
            limit.unwrap_or(50)
        );
        let mut stmt = self.storage.conn().prepare(&sql)?;
        let rows = stmt.query_map([], ImportBatch::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get(&self, batch_id: &str) -> Result<ImportBatch> {
        load_batch(self.storage.conn(), batch_id)
    }

    /// Staged rows of a batch, optionally only those with `status`.
    pub fn rows(&self, batch_id: &str, status: Option<RowStatus>) -> Result<Vec<StagedRow>> {
        load_batch(self.storage.conn(), batch_id)?;
        load_rows(self.storage.conn(), batch_id, status)
    }

    /// Decide how a conflicting row is committed.
    pub fn resolve(&mut self, batch_id: &str, row_number: i64, resolution: &Resolution, actor: &str) -> Result<StagedRow> {
        let batch = load_batch(self.storage.conn(), batch_id)?;
        require_staged(&batch)?;

        let row = load_rows(self.storage.conn(), batch_id, None)?
            .into_iter()
            .find(|r| r.row_number == row_number)
            .ok_or_else(|| Error::Import(format!("batch {batch_id} has no row {row_number}")))?;
        if row.row_status() != RowStatus::Conflict {
            return Err(Error::InvalidStatus(format!(
                "row {row_number} is {}; only conflicting rows need a resolution",
                row.status
            )));
        }

        let resolved_ticket = match resolution {
            Resolution::Skip => None,
            Resolution::Renumber(ticket) => {
                let ticket = ensure_ticket_free(self.storage.conn(), ticket)?;
                let clash: bool = self.storage.conn().query_row(
                    "SELECT EXISTS(SELECT 1 FROM import_staging
                                   WHERE batch_id = ?1 AND id != ?2
                                     AND status IN ('valid', 'conflict')
                                     AND (ticket_number = ?3 OR resolved_ticket = ?3))",
                    rusqlite::params![batch_id, row.id, ticket],
                    |r| r.get(0),
                )?;
                if clash {
                    return Err(Error::DuplicateTicket { ticket });
                }
                Some(ticket)
            }
            Resolution::Overwrite => {
                let Some(existing) = &row.existing_citation_id else {
                    return Err(Error::InvalidArgument(format!(
                        "row {row_number} clashes with another row of this file; renumber or skip it"
                    )));
                };
                overwrite_target(self.storage.conn(), existing)?;
                None
            }
        };

        self.storage.mutate("resolve_import_row", actor, |tx, ctx| {
            tx.execute(
                "UPDATE import_staging SET resolution = ?1, resolved_ticket = ?2 WHERE id = ?3",
                rusqlite::params![resolution.as_str(), resolved_ticket, row.id],
            )?;
            ctx.record_change(
                "import_batch",
                batch_id,
                EventType::ImportRowResolved,
                row.resolution.clone(),
                Some(match &resolved_ticket {
                    Some(t) => format!("row {row_number}: renumber {t}"),
                    None => format!("row {row_number}: {}", resolution.as_str()),
                }),
            );
            Ok(())
        })?;

        load_rows(self.storage.conn(), batch_id, None)?
            .into_iter()
            .find(|r| r.row_number == row_number)
            .ok_or_else(|| Error::Import(format!("batch {batch_id} has no row {row_number}")))
    }

    /// Commit a staged batch in one transaction, or preview it.
    pub fn commit(&mut self, batch_id: &str, dry_run: bool, actor: &str) -> Result<CommitReport> {
        let batch = load_batch(self.storage.conn(), batch_id)?;
        require_staged(&batch)?;
        let link_score = self.config.duplicate_link_score;

        let report = if dry_run {
            self.storage
                .preview("commit_import", actor, |tx, ctx| apply_commit(tx, ctx, &batch, link_score, true))?
        } else {
            self.storage
                .mutate("commit_import", actor, |tx, ctx| apply_commit(tx, ctx, &batch, link_score, false))?
        };

        info!(
            batch = %batch.id,
            imported = report.imported,
            overwritten = report.overwritten,
            skipped = report.skipped,
            dry_run,
            "Import committed"
        );
        Ok(report)
    }

    /// Abandon a staged batch.
    pub fn cancel(&mut self, batch_id: &str, actor: &str) -> Result<ImportBatch> {
        let batch = load_batch(self.storage.conn(), batch_id)?;
        require_staged(&batch)?;
        self.storage.mutate("cancel_import", actor, |tx, ctx| {
            tx.execute("UPDATE import_batches SET status = 'cancelled' WHERE id = ?1", [batch_id])?;
            ctx.record_change(
                "import_batch",
                batch_id,
                EventType::ImportCancelled,
                Some(BatchStatus::Staged.as_str().to_string()),
                Some(BatchStatus::Cancelled.as_str().to_string()),
            );
            Ok(())
        })?;
        load_batch(self.storage.conn(), batch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::excel::parse_grid;
    use crate::import::types::Cell;
    use crate::service::citation::tests::new_citation;
    use crate::service::citation::CitationService;
    use crate::service::fines::tests::seed_schedule;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn sheet(rows: &[[&str; 4]]) -> ParsedSheet {
        let mut grid = vec![vec![text("Ticket No."), text("Driver's Name"), text("Date"), text("Violation(s)")]];
        grid.extend(rows.iter().map(|r| r.iter().map(|c| text(c)).collect()));
        parse_grid("Sheet1", grid, 1).unwrap()
    }

    fn setup() -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        seed_schedule(storage.conn());
        // drv_1 CRUZ, JUAN already has T-1 on 2024-01-10
        let jan10 = to_millis(crate::validate::parse_datetime("2024-01-10").unwrap());
        CitationService::new(&mut storage)
            .create(&new_citation("T-1", jan10, &["NH"]), "encoder")
            .unwrap();
        storage
    }

    fn statuses(rows: &[StagedRow]) -> Vec<(i64, String)> {
        rows.iter().map(|r| (r.row_number, r.status.clone())).collect()
    }

    #[test]
    fn test_stage_classifies_rows() {
        let mut storage = setup();
        let config = AppConfig::default();
        let mut importer = ExcelImporter::new(&mut storage, &config);

        let batch = importer
            .stage_sheet(
                "jan.xlsx",
                "hash1",
                &sheet(&[
                    ["T-100", "Reyes, Pedro", "2024-01-12", "NH; No Helmit"],
                    ["T-1", "Cruz, Juan", "01/10/2024", "NH"],
                    ["T-1.", "Santos, Ana", "2024-01-11", "NH"],
                    ["", "Lim, Bo", "2024-01-11", "NH"],
                    ["T-101", "Lim, Bo", "yesterday", "Jaywalking"],
                    ["T-100", "Reyes, Pedro", "2024-01-12", "NH"],
                    ["T-100", "Go, Ed", "2024-01-12", "NH"],
                ]),
                "encoder",
            )
            .unwrap();
        assert_eq!(batch.total_rows, 7);

        let rows = importer.rows(&batch.id, None).unwrap();
        assert_eq!(
            statuses(&rows),
            vec![
                (2, "valid".to_string()),
                (3, "duplicate".to_string()),
                (4, "conflict".to_string()),
                (5, "error".to_string()),
                (6, "error".to_string()),
                (7, "duplicate".to_string()),
                (8, "conflict".to_string()),
            ]
        );
        assert_eq!(rows[0].matched_codes, vec!["NH".to_string()]);
        assert!(rows[0].match_detail.as_deref().unwrap().contains("phonetic"));
        assert!(rows[2].existing_citation_id.is_some());
        assert!(rows[4].message.as_deref().unwrap().contains("bad date"));
        assert!(rows[4].message.as_deref().unwrap().contains("Jaywalking"));
        assert_eq!(importer.rows(&batch.id, Some(RowStatus::Error)).unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_and_commit() {
        let mut storage = setup();
        let config = AppConfig {
            duplicate_link_score: 70,
            ..AppConfig::default()
        };
        let mut importer = ExcelImporter::new(&mut storage, &config);
        let batch = importer
            .stage_sheet(
                "jan.xlsx",
                "hash1",
                &sheet(&[
                    ["T-200", "Juan Cruz", "2024-01-05", "No Helmet"],
                    ["T-1", "Santos, Ana", "2024-01-11", "NL"],
                    ["T-201", "Santos, Ana", "2024-01-12", "NL"],
                    ["T-1", "Go, Ed", "2024-01-11", "NH"],
                ]),
                "encoder",
            )
            .unwrap();

        assert!(matches!(
            importer.resolve(&batch.id, 3, &Resolution::Renumber("T-200".into()), "encoder"),
            Err(Error::DuplicateTicket { .. })
        ));
        importer
            .resolve(&batch.id, 3, &Resolution::Renumber("T-300".into()), "encoder")
            .unwrap();

        let preview = importer.commit(&batch.id, true, "encoder").unwrap();
        assert!(preview.dry_run);
        assert_eq!(preview.imported, 3);
        assert_eq!(preview.skipped, 1);
        assert_eq!(importer.get(&batch.id).unwrap().status, BatchStatus::Staged);

        let report = importer.commit(&batch.id, false, "encoder").unwrap();
        assert_eq!(report.imported, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.drivers_linked, 2); // Juan Cruz, then Ana on her second row
        assert_eq!(report.drivers_created, 1);
        assert_eq!(importer.get(&batch.id).unwrap().status, BatchStatus::Committed);
        assert!(importer.commit(&batch.id, false, "encoder").is_err());

        // The back-dated T-200 became Juan's first NH; T-1 moved to second.
        let t1 = crate::service::citation::load_detail(storage.conn(), "T-1").unwrap();
        assert_eq!(t1.violations[0].offense_count, 2);
        let ana = crate::service::citation::load_detail(storage.conn(), "T-201").unwrap();
        assert_eq!(ana.violations[0].offense_count, 2);
    }

    #[test]
    fn test_overwrite_replaces_unpaid_citation() {
        let mut storage = setup();
        let config = AppConfig::default();
        let mut importer = ExcelImporter::new(&mut storage, &config);
        let batch = importer
            .stage_sheet(
                "fix.xlsx",
                "hash2",
                &sheet(&[["T-1", "Cruz, Juan", "2024-01-11", "NL"]]),
                "encoder",
            )
            .unwrap();
        importer.resolve(&batch.id, 2, &Resolution::Overwrite, "encoder").unwrap();
        let report = importer.commit(&batch.id, false, "encoder").unwrap();
        assert_eq!(report.overwritten, 1);

        let t1 = crate::service::citation::load_detail(storage.conn(), "T-1").unwrap();
        assert_eq!(t1.violations.len(), 1);
        assert_eq!(t1.violations[0].code, "NL");
    }

    #[test]
    fn test_cancel_and_unresolvable_rows() {
        let mut storage = setup();
        let config = AppConfig::default();
        let mut importer = ExcelImporter::new(&mut storage, &config);
        let batch = importer
            .stage_sheet("x.xlsx", "hash3", &sheet(&[["T-9", "Cruz, Juan", "2024-02-01", "NH"]]), "encoder")
            .unwrap();
        assert!(matches!(
            importer.resolve(&batch.id, 2, &Resolution::Skip, "encoder"),
            Err(Error::InvalidStatus(_))
        ));
        let cancelled = importer.cancel(&batch.id, "encoder").unwrap();
        assert_eq!(cancelled.status, BatchStatus::Cancelled);
        assert!(importer.commit(&batch.id, false, "encoder").is_err());
        assert_eq!(importer.list(None).unwrap().len(), 1);
    }
}
