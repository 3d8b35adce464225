//! Offense counting and fine computation.
//!
//! The offense count of a violation type for a driver is the number of
//! earlier violations of that type on the driver's citations that still
//! count (not void or dismissed), plus one. Earlier means chronological by
//! apprehension time, ties broken by entry order.

use crate::error::{Error, Result};
use crate::model::{CitationStatus, ViolationType};
use crate::storage::events::EventType;
use crate::storage::MutationContext;
use crate::validate::find_similar;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// A line item as it would be assessed.
#[derive(Debug, Clone, Serialize)]
pub struct FineLine {
    pub violation_type_id: String,
    pub code: String,
    pub name: String,
    pub offense_count: i64,
    pub fine_amount: i64,
}

/// Outcome of recomputing a driver's unpaid citations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecalcSummary {
    pub driver_id: String,
    pub citations_checked: usize,
    pub lines_changed: usize,
}

/// Resolve an active violation type by code (case-insensitive).
pub fn violation_type_by_code(conn: &Connection, code: &str) -> Result<ViolationType> {
    let code = code.trim().to_uppercase();
    let sql = format!(
        "SELECT {} FROM violation_types WHERE code = ?1 AND is_active = 1",
        ViolationType::COLUMNS
    );
    if let Some(vt) = conn.query_row(&sql, [&code], ViolationType::from_row).optional()? {
        return Ok(vt);
    }

    let codes: Vec<String> = conn
        .prepare("SELECT code FROM violation_types WHERE is_active = 1")?
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Err(Error::ViolationTypeNotFound {
        similar: find_similar(&code, &codes, 3),
        code,
    })
}

/// Resolve codes to distinct active violation types, keeping first-seen order.
pub fn resolve_codes(conn: &Connection, codes: &[String]) -> Result<Vec<ViolationType>> {
    let mut resolved: Vec<ViolationType> = Vec::with_capacity(codes.len());
    for code in codes.iter().filter(|c| !c.trim().is_empty()) {
        let vt = violation_type_by_code(conn, code)?;
        if !resolved.iter().any(|r| r.id == vt.id) {
            resolved.push(vt);
        }
    }
    if resolved.is_empty() {
        return Err(Error::RequiredField("violation_codes"));
    }
    Ok(resolved)
}

/// Offense count a new violation of `violation_type_id` at `apprehended_at`
/// would receive, ignoring `exclude_citation`.
pub fn offense_count(
    conn: &Connection,
    driver_id: &str,
    violation_type_id: &str,
    apprehended_at: i64,
    exclude_citation: Option<&str>,
) -> Result<i64> {
    let prior: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM violations v
         JOIN citations c ON c.id = v.citation_id
         WHERE c.driver_id = ?1
           AND v.violation_type_id = ?2
           AND c.status NOT IN ('void', 'dismissed')
           AND c.apprehended_at <= ?3
           AND c.id != COALESCE(?4, '')",
        rusqlite::params![driver_id, violation_type_id, apprehended_at, exclude_citation],
        |row| row.get(0),
    )?;
    Ok(prior + 1)
}

/// Fines a new citation for `driver_id` would receive at `apprehended_at`.
///
/// With no driver (a first-time motorist) every line is a first offense.
pub fn assess(
    conn: &Connection,
    driver_id: Option<&str>,
    types: &[ViolationType],
    apprehended_at: i64,
) -> Result<Vec<FineLine>> {
    types
        .iter()
        .map(|vt| {
            let count = match driver_id {
                Some(driver) => offense_count(conn, driver, &vt.id, apprehended_at, None)?,
                None => 1,
            };
            Ok(FineLine {
                violation_type_id: vt.id.clone(),
                code: vt.code.clone(),
                name: vt.name.clone(),
                offense_count: count,
                fine_amount: vt.fine_for(count),
            })
        })
        .collect()
}

/// Recompute offense counts and fines of a driver's unpaid citations.
///
/// Citations are walked chronologically; every citation that still counts
/// advances the per-type tally, but only `pending`/`contested` ones have
/// their stored counts and fines rewritten. A citation holding an active
/// payment is locked: its amount was fixed when the payment was recorded.
pub fn recalculate_driver(
    conn: &Connection,
    ctx: &mut MutationContext,
    driver_id: &str,
) -> Result<RecalcSummary> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.status, v.id, v.violation_type_id, v.offense_count, v.fine_amount,
                vt.fine_first, vt.fine_second, vt.fine_third,
                EXISTS (SELECT 1 FROM payments p
                        WHERE p.citation_id = c.id
                          AND p.status IN ('pending_print', 'completed')) AS locked
         FROM citations c
         JOIN violations v ON v.citation_id = c.id
         JOIN violation_types vt ON vt.id = v.violation_type_id
         WHERE c.driver_id = ?1 AND c.status NOT IN ('void', 'dismissed')
         ORDER BY c.apprehended_at, c.created_at, c.id, v.created_at, v.id",
    )?;
    let lines = stmt
        .query_map([driver_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                CitationStatus::from_str(&row.get::<_, String>(1)?),
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                [row.get::<_, i64>(6)?, row.get::<_, i64>(7)?, row.get::<_, i64>(8)?],
                row.get::<_, bool>(9)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut tally: HashMap<String, i64> = HashMap::new();
    let mut summary = RecalcSummary {
        driver_id: driver_id.to_string(),
        ..RecalcSummary::default()
    };
    let mut last_citation: Option<String> = None;
    let mut touched: Vec<String> = Vec::new();

    for (citation_id, status, line_id, type_id, old_count, old_fine, fines, locked) in lines {
        if last_citation.as_deref() != Some(citation_id.as_str()) {
            summary.citations_checked += 1;
            last_citation = Some(citation_id.clone());
        }

        let count = tally.entry(type_id).or_insert(0);
        *count += 1;

        if !status.is_editable() || locked {
            continue;
        }
        let fine = match *count {
            1 => fines[0],
            2 => fines[1],
            _ => fines[2],
        };
        if *count != old_count || fine != old_fine {
            conn.execute(
                "UPDATE violations SET offense_count = ?1, fine_amount = ?2 WHERE id = ?3",
                rusqlite::params![*count, fine, line_id],
            )?;
            debug!(line = %line_id, from = old_count, to = *count, "Offense count adjusted");
            summary.lines_changed += 1;
            if !touched.contains(&citation_id) {
                touched.push(citation_id);
            }
        }
    }

    if summary.lines_changed > 0 {
        let now = chrono::Utc::now().timestamp_millis();
        for citation_id in &touched {
            conn.execute(
                "UPDATE citations SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, citation_id],
            )?;
        }
        ctx.record_comment(
            "driver",
            driver_id,
            EventType::FinesRecalculated,
            &format!(
                "{} line(s) on {} citation(s) reassessed",
                summary.lines_changed,
                touched.len()
            ),
        );
        info!(driver = driver_id, lines = summary.lines_changed, "Fines recalculated");
    }

    Ok(summary)
}
