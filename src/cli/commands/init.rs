//! Create the citedesk database.
//!
//! The database lives at `~/.citedesk/data/citedesk.db` unless `--db` or
//! `CITEDESK_DB` points elsewhere. The schema is applied on first open.

use super::CommandContext;
use crate::config::{global_citedesk_dir, resolve_db_path};
use crate::error::{Error, Result};
use crate::service::ViolationTypeService;
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    seeded_violation_types: usize,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the database exists (without `force`) or cannot be
/// created.
pub fn execute(ctx: &CommandContext, force: bool, seed: bool) -> Result<()> {
    let db_path = resolve_db_path(ctx.db)
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    if db_path.exists() && !force {
        return Err(Error::AlreadyInitialized { path: db_path });
    }
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    if force && db_path.exists() {
        fs::remove_file(&db_path)?;
    }

    // Everything in ~/.citedesk is local-only.
    if let Some(base) = global_citedesk_dir().filter(|base| db_path.starts_with(base)) {
        let gitignore = base.join(".gitignore");
        if !gitignore.exists() {
            fs::write(&gitignore, "*\n")?;
        }
    }

    let mut storage = SqliteStorage::open(&db_path)?;
    let seeded = if seed {
        let config = ctx.settings()?;
        ViolationTypeService::new(&mut storage, &config).seed_standard(&ctx.actor())?
    } else {
        0
    };

    if crate::is_silent() {
        println!("{}", db_path.display());
    } else if ctx.json {
        super::print_json(&InitOutput {
            database: db_path,
            seeded_violation_types: seeded,
        })?;
    } else {
        println!("Initialized citedesk database");
        println!("  Database: {}", db_path.display());
        if seed {
            println!("  Violation types loaded: {seeded}");
        } else {
            println!();
            println!("Next: add violation types with 'citedesk violation-type add' or re-run with --seed.");
        }
    }

    Ok(())
}
