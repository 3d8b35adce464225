//! Driver registry commands.

use super::CommandContext;
use crate::cli::{DriverArgs, DriverCommands};
use crate::error::{Error, Result};
use crate::format::{format_amount, format_date};
use crate::model::{Driver, DriverChanges, NewDriver};
use crate::service::duplicate::DuplicateCandidate;
use crate::service::{DriverService, DuplicateDetectionService};
use colored::Colorize;

/// Build a new-driver record from the shared `--last/--first/...` flags.
pub(crate) fn new_driver(args: &DriverArgs) -> Result<NewDriver> {
    let (Some(last_name), Some(first_name)) = (&args.last_name, &args.first_name) else {
        return Err(Error::InvalidArgument(
            "a driver needs --last and --first (or --driver <id>)".to_string(),
        ));
    };
    Ok(NewDriver {
        last_name: last_name.clone(),
        first_name: first_name.clone(),
        middle_name: args.middle_name.clone(),
        license_number: args.license.clone(),
        birth_date: args.birth_date.clone(),
        address: args.address.clone(),
    })
}

fn changes(args: &DriverArgs) -> DriverChanges {
    DriverChanges {
        last_name: args.last_name.clone(),
        first_name: args.first_name.clone(),
        middle_name: args.middle_name.clone(),
        license_number: args.license.clone(),
        birth_date: args.birth_date.clone(),
        address: args.address.clone(),
    }
}

pub fn execute(command: &DriverCommands, ctx: &CommandContext) -> Result<()> {
    let mut storage = ctx.open()?;
    let config = ctx.settings()?;
    let actor = ctx.actor();

    match command {
        DriverCommands::Add { details, force } => {
            let driver = DriverService::new(&mut storage, &config).create(&new_driver(details)?, *force, &actor)?;
            if crate::is_silent() {
                println!("{}", driver.id);
            } else if ctx.json {
                super::print_json(&driver)?;
            } else {
                println!("Registered driver {} ({})", driver.id, driver.display_name());
            }
        }
        DriverCommands::Show { id } => {
            let driver = DriverService::new(&mut storage, &config).get(id)?;
            if ctx.json {
                super::print_json(&driver)?;
            } else {
                print_driver(&driver);
            }
        }
        DriverCommands::List { search, limit } => {
            let drivers = DriverService::new(&mut storage, &config).list(search.as_deref(), Some(*limit))?;
            if crate::is_csv() {
                println!("id,last_name,first_name,middle_name,license_number,birth_date");
                for d in &drivers {
                    println!(
                        "{},{},{},{},{},{}",
                        d.id,
                        crate::csv_escape(&d.last_name),
                        crate::csv_escape(&d.first_name),
                        crate::csv_escape(d.middle_name.as_deref().unwrap_or("")),
                        d.license_number.as_deref().unwrap_or(""),
                        d.birth_date.as_deref().unwrap_or(""),
                    );
                }
            } else if ctx.json {
                super::print_json(&serde_json::json!({ "drivers": drivers, "count": drivers.len() }))?;
            } else if drivers.is_empty() {
                println!("No drivers found.");
            } else {
                println!("Drivers ({}):", drivers.len());
                for d in &drivers {
                    println!(
                        "  {}  {:<32} {}",
                        d.id.dimmed(),
                        d.display_name(),
                        d.license_number.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        DriverCommands::Update { id, details } => {
            let driver = DriverService::new(&mut storage, &config).update(id, &changes(details), &actor)?;
            if ctx.json {
                super::print_json(&driver)?;
            } else {
                println!("Updated driver {} ({})", driver.id, driver.display_name());
            }
        }
        DriverCommands::Duplicates { id: Some(id) } => {
            let driver = DriverService::new(&mut storage, &config).get(id)?;
            let candidates = DuplicateDetectionService::new(storage.conn()).candidates_for(&driver)?;
            if ctx.json {
                super::print_json(&serde_json::json!({ "driver": driver, "candidates": candidates }))?;
            } else if candidates.is_empty() {
                println!("No likely duplicates of {}.", driver.display_name());
            } else {
                println!("Possible duplicates of {}:", driver.display_name());
                print_candidates(&candidates);
            }
        }
        DriverCommands::Duplicates { id: None } => {
            let pairs = DuplicateDetectionService::new(storage.conn()).scan_duplicates()?;
            if ctx.json {
                super::print_json(&serde_json::json!({ "pairs": pairs, "count": pairs.len() }))?;
            } else if pairs.is_empty() {
                println!("No duplicate drivers found.");
            } else {
                println!("Duplicate candidates ({}):", pairs.len());
                for pair in &pairs {
                    println!(
                        "  {:>3} {:<9} {} {}  <->  {} {}",
                        pair.score,
                        pair.confidence.as_str(),
                        pair.first.id.dimmed(),
                        pair.first.display_name(),
                        pair.second.id.dimmed(),
                        pair.second.display_name(),
                    );
                    println!("      {}", pair.reasons.join("; "));
                }
                println!();
                println!("Merge with: citedesk driver merge <keep> <remove>");
            }
        }
        DriverCommands::Merge { keep, remove } => {
            let driver = DriverService::new(&mut storage, &config).merge(keep, remove, &actor)?;
            if crate::is_silent() {
                println!("{}", driver.id);
            } else if ctx.json {
                super::print_json(&driver)?;
            } else {
                println!("Merged {remove} into {} ({})", driver.id, driver.display_name());
            }
        }
        DriverCommands::History { id } => {
            let history = DriverService::new(&mut storage, &config).history(id)?;
            if ctx.json {
                return super::print_json(&history);
            }
            print_driver(&history.driver);
            println!();
            if history.citations.is_empty() {
                println!("No citations.");
                return Ok(());
            }
            println!("Citations ({}):", history.citations.len());
            for c in &history.citations {
                let codes: Vec<&str> = c.violations.iter().map(|v| v.code.as_str()).collect();
                println!(
                    "  {}  {:<12} {:<10} {:>12}  {}",
                    format_date(c.citation.apprehended_at),
                    c.citation.ticket_number,
                    super::citation::status_label(c.citation.status),
                    format_amount(c.total_fine),
                    codes.join(", ")
                );
            }
            println!();
            println!("Offenses:");
            for total in &history.offense_totals {
                println!("  {:<8} {:<32} {}", total.code, total.name, total.count);
            }
            println!();
            println!("Total fines:  {}", format_amount(history.total_fines));
            println!("Outstanding:  {}", format_amount(history.outstanding));
        }
    }
    Ok(())
}

fn print_driver(driver: &Driver) {
    println!("{} {}", driver.display_name().bold(), driver.id.dimmed());
    println!("  License:    {}", driver.license_number.as_deref().unwrap_or("-"));
    println!("  Birth date: {}", driver.birth_date.as_deref().unwrap_or("-"));
    if let Some(address) = &driver.address {
        println!("  Address:    {address}");
    }
    if let Some(target) = &driver.merged_into {
        println!("  {} {target}", "Merged into".yellow());
    }
}

fn print_candidates(candidates: &[DuplicateCandidate]) {
    for c in candidates {
        println!(
            "  {:>3} {:<9} {} {}  ({})",
            c.score,
            c.confidence.as_str(),
            c.driver.id.dimmed(),
            c.driver.display_name(),
            c.reasons.join("; ")
        );
    }
}
