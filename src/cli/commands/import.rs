//! Spreadsheet import commands.

use super::CommandContext;
use crate::cli::ImportCommands;
use crate::error::{Error, Result};
use crate::format::{format_datetime, truncate};
use crate::import::{ExcelImporter, ImportBatch, Resolution, RowStatus, StagedRow};
use colored::{ColoredString, Colorize};

fn row_label(status: RowStatus) -> ColoredString {
    let s = status.as_str();
    match status {
        RowStatus::Valid | RowStatus::Imported => s.green(),
        RowStatus::Duplicate | RowStatus::Skipped => s.dimmed(),
        RowStatus::Conflict => s.yellow(),
        RowStatus::Error => s.red(),
    }
}

fn resolution(skip: bool, renumber: Option<&str>, overwrite: bool) -> Result<Resolution> {
    match (skip, renumber, overwrite) {
        (true, None, false) => Ok(Resolution::Skip),
        (false, Some(ticket), false) => Ok(Resolution::Renumber(ticket.to_string())),
        (false, None, true) => Ok(Resolution::Overwrite),
        _ => Err(Error::InvalidArgument(
            "choose exactly one of --skip, --renumber <ticket> or --overwrite".to_string(),
        )),
    }
}

fn print_batch(batch: &ImportBatch) {
    println!(
        "Batch {} {} ({})",
        batch.id.bold(),
        batch.status.as_str(),
        batch.file_name
    );
    println!(
        "  Rows: {} total, {} valid, {} duplicate, {} conflict, {} error, {} imported",
        batch.total_rows,
        batch.valid_rows,
        batch.duplicate_rows,
        batch.conflict_rows,
        batch.error_rows,
        batch.imported_rows
    );
    println!("  Staged by {} at {}", batch.imported_by, format_datetime(batch.created_at));
}

fn print_row(row: &StagedRow) {
    let name = match (&row.last_name, &row.first_name) {
        (Some(last), Some(first)) => format!("{last}, {first}"),
        (Some(last), None) => last.clone(),
        _ => String::new(),
    };
    println!(
        "  {:>5} {:<10} {:<12} {:<28} {}",
        row.row_number,
        row_label(row.row_status()),
        row.resolved_ticket.as_deref().or(row.ticket_number.as_deref()).unwrap_or("-"),
        truncate(&name, 28),
        row.matched_codes.join(",")
    );
    if let Some(message) = &row.message {
        println!("        {}", message.dimmed());
    }
    if let Some(resolution) = &row.resolution {
        println!("        resolution: {resolution}");
    }
}

pub fn execute(command: &ImportCommands, ctx: &CommandContext) -> Result<()> {
    let mut storage = ctx.open()?;
    let config = ctx.settings()?;
    let actor = ctx.actor();
    let mut importer = ExcelImporter::new(&mut storage, &config);

    match command {
        ImportCommands::Stage { file, sheet, force } => {
            let batch = importer.stage_file(file, sheet.as_deref(), *force, &actor)?;
            if crate::is_silent() {
                println!("{}", batch.id);
            } else if ctx.json {
                super::print_json(&batch)?;
            } else {
                print_batch(&batch);
                if batch.conflict_rows > 0 {
                    println!();
                    println!(
                        "Resolve conflicts with: citedesk import resolve {} <row> --skip|--renumber <ticket>|--overwrite",
                        batch.id
                    );
                }
                println!("Commit with: citedesk import commit {} [--dry-run]", batch.id);
            }
        }
        ImportCommands::List { limit } => {
            let batches = importer.list(Some(*limit))?;
            if ctx.json {
                super::print_json(&serde_json::json!({ "batches": batches, "count": batches.len() }))?;
            } else if batches.is_empty() {
                println!("No import batches found.");
            } else {
                for batch in &batches {
                    println!(
                        "  {}  {:<10} {:>5} rows  {:<30} {}",
                        batch.id,
                        batch.status.as_str(),
                        batch.total_rows,
                        truncate(&batch.file_name, 30),
                        format_datetime(batch.created_at)
                    );
                }
            }
        }
        ImportCommands::Show { batch, status } => {
            let status = status
                .as_deref()
                .map(|s| {
                    RowStatus::parse(s).ok_or_else(|| Error::InvalidArgument(format!("unknown row status '{s}'")))
                })
                .transpose()?;
            let info = importer.get(batch)?;
            let rows = importer.rows(&info.id, status)?;
            if crate::is_csv() {
                println!("row,status,ticket_number,last_name,first_name,violations,matched_codes,message");
                for r in &rows {
                    println!(
                        "{},{},{},{},{},{},{},{}",
                        r.row_number,
                        r.status,
                        crate::csv_escape(r.ticket_number.as_deref().unwrap_or("")),
                        crate::csv_escape(r.last_name.as_deref().unwrap_or("")),
                        crate::csv_escape(r.first_name.as_deref().unwrap_or("")),
                        crate::csv_escape(r.violation_text.as_deref().unwrap_or("")),
                        crate::csv_escape(&r.matched_codes.join(";")),
                        crate::csv_escape(r.message.as_deref().unwrap_or("")),
                    );
                }
            } else if ctx.json {
                super::print_json(&serde_json::json!({ "batch": info, "rows": rows }))?;
            } else {
                print_batch(&info);
                println!();
                if rows.is_empty() {
                    println!("No rows found.");
                }
                for row in &rows {
                    print_row(row);
                }
            }
        }
        ImportCommands::Resolve {
            batch,
            row,
            skip,
            renumber,
            overwrite,
        } => {
            let resolution = resolution(*skip, renumber.as_deref(), *overwrite)?;
            let staged = importer.resolve(batch, *row, &resolution, &actor)?;
            if ctx.json {
                super::print_json(&staged)?;
            } else {
                println!("Row {} will {}", staged.row_number, resolution.as_str());
            }
        }
        ImportCommands::Commit { batch } => {
            let report = importer.commit(batch, crate::is_dry_run(), &actor)?;
            if ctx.json {
                super::print_json(&report)?;
            } else {
                let verb = if report.dry_run { "Would import" } else { "Imported" };
                println!("{verb} {} citation(s) from batch {}", report.imported, report.batch_id);
                println!("  Overwritten:      {}", report.overwritten);
                println!("  Skipped:          {}", report.skipped);
                println!("  New drivers:      {}", report.drivers_created);
                println!("  Linked drivers:   {}", report.drivers_linked);
                println!("  Fines recomputed: {} driver(s)", report.drivers_recalculated);
            }
        }
        ImportCommands::Cancel { batch } => {
            let info = importer.cancel(batch, &actor)?;
            if ctx.json {
                super::print_json(&info)?;
            } else {
                println!("Cancelled batch {}", info.id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_needs_exactly_one_choice() {
        assert_eq!(resolution(true, None, false).unwrap(), Resolution::Skip);
        assert_eq!(
            resolution(false, Some("T-99"), false).unwrap(),
            Resolution::Renumber("T-99".into())
        );
        assert!(resolution(false, None, false).is_err());
        assert!(resolution(true, None, true).is_err());
    }
}
