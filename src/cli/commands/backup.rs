//! Backup commands.

use super::CommandContext;
use crate::cli::BackupCommands;
use crate::error::{Error, Result};
use crate::format::format_datetime;
use crate::model::{BackupFrequency, BackupKind, BackupLog, BackupSettings};
use crate::service::backup::BackupSettingsChanges;
use crate::service::BackupService;
use colored::Colorize;

fn print_log(log: &BackupLog) {
    let status = if log.status == "success" {
        log.status.green()
    } else {
        log.status.red()
    };
    println!(
        "  #{:<4} {}  {:<11} {:<8} {:>10} bytes  {}",
        log.id,
        format_datetime(log.created_at),
        log.kind.as_str(),
        status,
        log.file_size,
        log.file_path
    );
}

fn print_settings(settings: &BackupSettings) {
    println!("Backup schedule");
    println!("  Enabled:   {}", settings.enabled);
    println!("  Frequency: {}", settings.frequency.as_str());
    println!(
        "  Directory: {}",
        settings.backup_dir.as_deref().unwrap_or("(config default)")
    );
    println!("  Keep:      {}", settings.retention_count);
    println!(
        "  Last run:  {}",
        settings.last_run_at.map_or_else(|| "never".to_string(), format_datetime)
    );
}

pub fn execute(command: &BackupCommands, ctx: &CommandContext) -> Result<()> {
    let mut storage = ctx.open()?;
    let config = ctx.settings()?;
    let actor = ctx.actor();
    let mut service = BackupService::new(&mut storage, &config);

    match command {
        BackupCommands::Create { dir } => {
            let log = service.create(dir.as_deref(), BackupKind::Manual, &actor)?;
            if crate::is_silent() {
                println!("{}", log.file_path);
            } else if ctx.json {
                super::print_json(&log)?;
            } else {
                println!("Backup #{} written to {}", log.id, log.file_path);
                if let Some(checksum) = &log.checksum {
                    println!("  sha256: {checksum}");
                }
            }
        }
        BackupCommands::List { limit } => {
            let logs = service.list(Some(*limit))?;
            if crate::is_csv() {
                println!("id,created_at,kind,status,file_size,file_path,checksum");
                for l in &logs {
                    println!(
                        "{},{},{},{},{},{},{}",
                        l.id,
                        format_datetime(l.created_at),
                        l.kind.as_str(),
                        l.status,
                        l.file_size,
                        crate::csv_escape(&l.file_path),
                        l.checksum.as_deref().unwrap_or("")
                    );
                }
            } else if ctx.json {
                super::print_json(&serde_json::json!({ "backups": logs, "count": logs.len() }))?;
            } else if logs.is_empty() {
                println!("No backups found.");
            } else {
                println!("Backups ({}):", logs.len());
                for log in &logs {
                    print_log(log);
                }
            }
        }
        BackupCommands::Verify { id } => {
            let report = service.verify(*id)?;
            if ctx.json {
                super::print_json(&report)?;
            } else {
                let verdict = if report.ok { "OK".green() } else { "FAILED".red() };
                println!("Backup #{} {verdict}", report.backup.id);
                println!("  File present: {}", report.file_exists);
                println!("  Checksum:     {}", if report.checksum_ok { "match" } else { "mismatch" });
                println!("  Integrity:    {}", report.integrity);
            }
            if !report.ok {
                return Err(Error::Backup(format!("backup #{id} failed verification")));
            }
        }
        BackupCommands::Restore { file } => {
            let report = service.restore(file, &actor)?;
            if ctx.json {
                super::print_json(&report)?;
            } else {
                println!("Restored database from {}", report.restored_from);
                println!("  Previous data saved to {}", report.safety_backup.file_path);
            }
        }
        BackupCommands::Prune { keep } => {
            let report = service.prune(*keep, crate::is_dry_run(), &actor)?;
            if ctx.json {
                super::print_json(&report)?;
            } else if report.removed.is_empty() {
                println!("Nothing to prune (keeping {}).", report.keep);
            } else {
                let verb = if report.dry_run { "Would remove" } else { "Removed" };
                println!("{verb} {} backup(s), keeping {}:", report.removed.len(), report.keep);
                for log in &report.removed {
                    print_log(log);
                }
            }
        }
        BackupCommands::Run => {
            let run = service.run_scheduled(chrono::Utc::now().timestamp_millis(), &actor)?;
            if ctx.json {
                super::print_json(&run)?;
            } else {
                match run {
                    Some(run) => {
                        println!("Scheduled backup #{} written to {}", run.backup.id, run.backup.file_path);
                        if !run.pruned.removed.is_empty() {
                            println!("  Pruned {} old backup(s)", run.pruned.removed.len());
                        }
                    }
                    None => println!("Scheduled backup not due."),
                }
            }
        }
        BackupCommands::Settings {
            enabled,
            frequency,
            dir,
            retention,
        } => {
            let settings = if enabled.is_none() && frequency.is_none() && dir.is_none() && retention.is_none() {
                service.settings()?
            } else {
                let frequency = frequency
                    .as_deref()
                    .map(|f| {
                        BackupFrequency::parse(f).ok_or_else(|| {
                            Error::InvalidArgument(format!("frequency must be daily, weekly or monthly, got '{f}'"))
                        })
                    })
                    .transpose()?;
                service.update_settings(
                    &BackupSettingsChanges {
                        enabled: *enabled,
                        frequency,
                        backup_dir: dir.clone(),
                        retention_count: *retention,
                    },
                    &actor,
                )?
            };
            if ctx.json {
                super::print_json(&settings)?;
            } else {
                print_settings(&settings);
            }
        }
    }
    Ok(())
}
