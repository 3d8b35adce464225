//! Citation and fine preview commands.

use super::{date_bounds, datetime_arg, CommandContext};
use crate::cli::{CitationCommands, CitationCreateArgs, CitationListArgs, CitationUpdateArgs, FineCommands};
use crate::error::Result;
use crate::format::{format_amount, format_datetime, ordinal};
use crate::model::{CitationChanges, CitationDetail, CitationFilter, CitationStatus, DriverRef, NewCitation};
use crate::service::citation::CitationSummary;
use crate::service::CitationService;
use colored::{ColoredString, Colorize};

pub(crate) fn status_label(status: CitationStatus) -> ColoredString {
    let s = status.as_str();
    match status {
        CitationStatus::Pending => s.yellow(),
        CitationStatus::Paid => s.green(),
        CitationStatus::Contested => s.cyan(),
        CitationStatus::Dismissed | CitationStatus::Void => s.dimmed(),
    }
}

fn new_citation(args: &CitationCreateArgs) -> Result<NewCitation> {
    let driver = match &args.driver_id {
        Some(driver_id) => DriverRef::Existing {
            driver_id: driver_id.clone(),
        },
        None => DriverRef::New(super::driver::new_driver(&args.driver)?),
    };
    Ok(NewCitation {
        ticket_number: args.ticket.clone(),
        driver,
        apprehended_at: datetime_arg(&args.date)?,
        violation_codes: args.violations.clone(),
        place: args.place.clone(),
        plate_number: args.plate.clone(),
        vehicle_type: args.vehicle.clone(),
        officer: args.officer.clone(),
        remarks: args.remarks.clone(),
        force_new_driver: args.force_new_driver,
    })
}

fn filter(args: &CitationListArgs) -> Result<CitationFilter> {
    let (from, to) = date_bounds(args.from.as_deref(), args.to.as_deref())?;
    Ok(CitationFilter {
        status: args.status.clone(),
        driver_id: args.driver_id.clone(),
        from,
        to,
        search: args.search.clone(),
        limit: Some(args.limit),
    })
}

fn changes(args: &CitationUpdateArgs) -> Result<CitationChanges> {
    Ok(CitationChanges {
        apprehended_at: args.date.as_deref().map(datetime_arg).transpose()?,
        place: args.place.clone(),
        plate_number: args.plate.clone(),
        vehicle_type: args.vehicle.clone(),
        officer: args.officer.clone(),
        remarks: args.remarks.clone(),
    })
}

pub fn execute(command: &CitationCommands, ctx: &CommandContext) -> Result<()> {
    let mut storage = ctx.open()?;
    let actor = ctx.actor();
    let mut service = CitationService::new(&mut storage);

    match command {
        CitationCommands::Create(args) => {
            let detail = service.create(&new_citation(args)?, &actor)?;
            if crate::is_silent() {
                println!("{}", detail.citation.id);
            } else if ctx.json {
                super::print_json(&detail)?;
            } else {
                println!("Recorded citation {}", detail.citation.ticket_number.bold());
                print_detail(&detail);
            }
        }
        CitationCommands::Show { id } => {
            let detail = service.get(id)?;
            if ctx.json {
                super::print_json(&detail)?;
            } else {
                print_detail(&detail);
            }
        }
        CitationCommands::List(args) => {
            let citations = service.list(&filter(args)?)?;
            if crate::is_csv() {
                println!("id,ticket_number,driver,apprehended_at,status,violations,total_fine,balance_due");
                for c in &citations {
                    println!(
                        "{},{},{},{},{},{},{},{}",
                        c.id,
                        crate::csv_escape(&c.ticket_number),
                        crate::csv_escape(&c.driver_name),
                        format_datetime(c.apprehended_at),
                        c.status.as_str(),
                        c.violation_count,
                        crate::csv_escape(&format_amount(c.total_fine)),
                        crate::csv_escape(&format_amount(c.balance_due)),
                    );
                }
            } else if ctx.json {
                super::print_json(&serde_json::json!({ "citations": citations, "count": citations.len() }))?;
            } else if citations.is_empty() {
                println!("No citations found.");
            } else {
                print_summaries(&citations);
            }
        }
        CitationCommands::Update(args) => {
            let detail = service.update(&args.id, &changes(args)?, &actor)?;
            if ctx.json {
                super::print_json(&detail)?;
            } else {
                println!("Updated citation {}", detail.citation.ticket_number);
            }
        }
        CitationCommands::AddViolation { id, code } => {
            let detail = service.add_violation(id, code, &actor)?;
            if ctx.json {
                super::print_json(&detail)?;
            } else {
                println!("Added {code} to {}", detail.citation.ticket_number);
                print_detail(&detail);
            }
        }
        CitationCommands::RemoveViolation { id, code } => {
            let detail = service.remove_violation(id, code, &actor)?;
            if ctx.json {
                super::print_json(&detail)?;
            } else {
                println!("Removed {code} from {}", detail.citation.ticket_number);
                print_detail(&detail);
            }
        }
        CitationCommands::Status { id, status, reason } => {
            let detail = service.change_status(id, status, reason.as_deref(), &actor)?;
            if ctx.json {
                super::print_json(&detail)?;
            } else {
                println!(
                    "Citation {} is now {}",
                    detail.citation.ticket_number,
                    status_label(detail.citation.status)
                );
            }
        }
        CitationCommands::Recalc { driver } => {
            let summary = service.recalculate_driver(driver, &actor)?;
            if ctx.json {
                super::print_json(&summary)?;
            } else {
                println!(
                    "Checked {} unpaid citation(s), {} line(s) changed",
                    summary.citations_checked, summary.lines_changed
                );
            }
        }
    }
    Ok(())
}

pub fn execute_fine(command: &FineCommands, ctx: &CommandContext) -> Result<()> {
    let FineCommands::Preview {
        violations,
        driver_id,
        date,
    } = command;

    let mut storage = ctx.open()?;
    let at = date.as_deref().map(datetime_arg).transpose()?;
    let preview = CitationService::new(&mut storage).fine_preview(driver_id.as_deref(), violations, at)?;

    if ctx.json {
        return super::print_json(&preview);
    }
    for line in &preview.lines {
        println!(
            "  {:<8} {:<36} {:>4} offense {:>12}",
            line.code,
            line.name,
            ordinal(line.offense_count),
            format_amount(line.fine_amount)
        );
    }
    println!("  {:<8} {:<36} {:>4}         {:>12}", "", "Total", "", format_amount(preview.total).bold());
    Ok(())
}

fn print_detail(detail: &CitationDetail) {
    let c = &detail.citation;
    println!("{} {} {}", c.ticket_number.bold(), status_label(c.status), c.id.dimmed());
    println!(
        "  Driver:    {} ({})",
        detail.driver_name,
        detail.license_number.as_deref().unwrap_or("no license")
    );
    println!("  When:      {}", format_datetime(c.apprehended_at));
    if let Some(place) = &c.place {
        println!("  Place:     {place}");
    }
    if let Some(plate) = &c.plate_number {
        println!(
            "  Vehicle:   {plate} {}",
            c.vehicle_type.as_deref().unwrap_or("")
        );
    }
    if let Some(officer) = &c.officer {
        println!("  Officer:   {officer}");
    }
    if let Some(reason) = &c.status_reason {
        println!("  Reason:    {reason}");
    }
    println!("  Violations:");
    for v in &detail.violations {
        println!(
            "    {:<8} {:<36} {:>4} {:>12}",
            v.code,
            v.name,
            ordinal(v.offense_count),
            format_amount(v.fine_amount)
        );
    }
    println!("  Total fine:  {:>12}", format_amount(detail.total_fine));
    println!("  Paid:        {:>12}", format_amount(detail.amount_paid));
    println!("  Balance due: {:>12}", format_amount(detail.balance_due));
}

fn print_summaries(citations: &[CitationSummary]) {
    println!("Citations ({}):", citations.len());
    for c in citations {
        println!(
            "  {:<12} {}  {:<10} {:<28} {:>12} {:>12}",
            c.ticket_number,
            format_datetime(c.apprehended_at),
            status_label(c.status),
            crate::format::truncate(&c.driver_name, 28),
            format_amount(c.total_fine),
            format_amount(c.balance_due),
        );
    }
}
