//! Report commands.

use super::{date_bounds, CommandContext};
use crate::cli::{RangeArgs, ReportCommands};
use crate::error::{Error, Result};
use crate::format::{format_amount, format_date};
use crate::service::report::{DateRange, Period};
use crate::service::ReportService;
use colored::Colorize;

fn range(args: &RangeArgs) -> Result<DateRange> {
    let (from, to) = date_bounds(args.from.as_deref(), args.to.as_deref())?;
    Ok(DateRange { from, to })
}

fn range_heading(range: DateRange) -> String {
    match (range.from, range.to) {
        (None, None) => "all dates".to_string(),
        (from, to) => format!(
            "{} to {}",
            from.map_or_else(|| "start".to_string(), format_date),
            // `to` is the exclusive start of the following day
            to.map_or_else(|| "today".to_string(), |t| format_date(t - 1)),
        ),
    }
}

pub fn execute(command: &ReportCommands, ctx: &CommandContext) -> Result<()> {
    let storage = ctx.open()?;
    let reports = ReportService::new(storage.conn());

    match command {
        ReportCommands::Summary(args) => {
            let range = range(args)?;
            let summary = reports.summary(range)?;
            if ctx.json {
                return super::print_json(&summary);
            }
            println!("{} ({})", "Summary".bold(), range_heading(range));
            println!("  Citations:      {}", summary.total_citations);
            for s in &summary.by_status {
                println!("    {:<12} {}", s.status, s.count);
            }
            println!("  Fines assessed: {:>14}", format_amount(summary.fines_assessed));
            println!("  Collected:      {:>14}", format_amount(summary.collected));
            println!("  Outstanding:    {:>14}", format_amount(summary.outstanding));
        }
        ReportCommands::Violations { range: args, top } => {
            let range = range(args)?;
            let rows = reports.violations(range, Some(*top))?;
            if crate::is_csv() {
                println!("code,name,count,fines");
                for r in &rows {
                    println!("{},{},{},{}", r.code, crate::csv_escape(&r.name), r.count, crate::csv_escape(&format_amount(r.fines)));
                }
            } else if ctx.json {
                super::print_json(&rows)?;
            } else if rows.is_empty() {
                println!("No violations recorded.");
            } else {
                println!("{} ({})", "Top violations".bold(), range_heading(range));
                for r in &rows {
                    println!("  {:<8} {:<40} {:>6} {:>14}", r.code, r.name, r.count, format_amount(r.fines));
                }
            }
        }
        ReportCommands::Collections { range: args, period } => {
            let range = range(args)?;
            let period = Period::parse(period)
                .ok_or_else(|| Error::InvalidArgument(format!("period must be day or month, got '{period}'")))?;
            let rows = reports.collections(range, period)?;
            if crate::is_csv() {
                println!("period,count,total");
                for r in &rows {
                    println!("{},{},{}", r.period, r.count, crate::csv_escape(&format_amount(r.total)));
                }
            } else if ctx.json {
                super::print_json(&rows)?;
            } else if rows.is_empty() {
                println!("No collections in range.");
            } else {
                println!("{} ({})", "Collections".bold(), range_heading(range));
                let mut total = 0;
                for r in &rows {
                    total += r.total;
                    println!("  {:<10} {:>6} {:>14}", r.period, r.count, format_amount(r.total));
                }
                println!("  {:<10} {:>6} {:>14}", "Total", "", format_amount(total).bold());
            }
        }
        ReportCommands::Offenders { range: args, min } => {
            let range = range(args)?;
            let rows = reports.offenders(range, *min)?;
            if crate::is_csv() {
                println!("driver_id,driver_name,license_number,citations,total_fines,outstanding");
                for r in &rows {
                    println!(
                        "{},{},{},{},{},{}",
                        r.driver_id,
                        crate::csv_escape(&r.driver_name),
                        r.license_number.as_deref().unwrap_or(""),
                        r.citations,
                        crate::csv_escape(&format_amount(r.total_fines)),
                        crate::csv_escape(&format_amount(r.outstanding)),
                    );
                }
            } else if ctx.json {
                super::print_json(&rows)?;
            } else if rows.is_empty() {
                println!("No drivers with {min} or more citations.");
            } else {
                println!("{} ({})", "Repeat offenders".bold(), range_heading(range));
                for r in &rows {
                    println!(
                        "  {:<32} {:<16} {:>4} {:>14} {:>14}",
                        r.driver_name,
                        r.license_number.as_deref().unwrap_or("-"),
                        r.citations,
                        format_amount(r.total_fines),
                        format_amount(r.outstanding)
                    );
                }
            }
        }
        ReportCommands::Officers(args) => {
            let range = range(args)?;
            let rows = reports.officers(range)?;
            if crate::is_csv() {
                println!("officer,citations,fines");
                for r in &rows {
                    println!("{},{},{}", crate::csv_escape(&r.officer), r.citations, crate::csv_escape(&format_amount(r.fines)));
                }
            } else if ctx.json {
                super::print_json(&rows)?;
            } else if rows.is_empty() {
                println!("No citations in range.");
            } else {
                println!("{} ({})", "Apprehending officers".bold(), range_heading(range));
                for r in &rows {
                    println!("  {:<32} {:>6} {:>14}", r.officer, r.citations, format_amount(r.fines));
                }
            }
        }
        ReportCommands::Aging => {
            let buckets = reports.aging(chrono::Utc::now().timestamp_millis())?;
            if ctx.json {
                return super::print_json(&buckets);
            }
            println!("{}", "Outstanding balances by age".bold());
            for b in &buckets {
                println!("  {:<12} {:>6} {:>14}", b.bucket, b.citations, format_amount(b.balance));
            }
        }
    }
    Ok(())
}
