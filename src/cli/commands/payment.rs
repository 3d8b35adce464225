//! Payment and OR number commands.

use super::{amount_arg, date_bounds, CommandContext};
use crate::cli::{PaymentCommands, PaymentListArgs, PaymentRecordArgs};
use crate::error::Result;
use crate::format::{format_amount, format_datetime};
use crate::model::{Payment, PaymentFilter, PaymentStatus};
use crate::service::citation::find_citation;
use crate::service::payment::{Bucket, PaymentRequest};
use crate::service::PaymentService;
use crate::storage::SqliteStorage;
use colored::{ColoredString, Colorize};

pub(crate) fn status_label(status: PaymentStatus) -> ColoredString {
    let s = status.as_str();
    match status {
        PaymentStatus::PendingPrint => s.yellow(),
        PaymentStatus::Completed => s.green(),
        PaymentStatus::Voided => s.red(),
        PaymentStatus::Refunded => s.magenta(),
    }
}

fn request(args: &PaymentRecordArgs) -> Result<PaymentRequest> {
    Ok(PaymentRequest {
        citation: args.citation.clone(),
        or_number: args.or_number.clone(),
        amount: args.amount.as_deref().map(amount_arg).transpose()?,
        amount_tendered: args.tendered.as_deref().map(amount_arg).transpose()?,
        method: Some(args.method.clone()),
        reference_number: args.reference.clone(),
        notes: args.notes.clone(),
    })
}

fn filter(storage: &SqliteStorage, args: &PaymentListArgs) -> Result<PaymentFilter> {
    let (from, to) = date_bounds(args.from.as_deref(), args.to.as_deref())?;
    let citation_id = args
        .citation
        .as_deref()
        .map(|c| find_citation(storage.conn(), c).map(|c| c.id))
        .transpose()?;
    Ok(PaymentFilter {
        status: args.status.clone(),
        method: args.method.clone(),
        cashier: args.cashier.clone(),
        citation_id,
        from,
        to,
        limit: Some(args.limit),
    })
}

pub fn execute(command: &PaymentCommands, ctx: &CommandContext) -> Result<()> {
    let mut storage = ctx.open()?;
    let config = ctx.settings()?;
    let actor = ctx.actor();

    match command {
        PaymentCommands::Record(args) => {
            let payment = PaymentService::new(&mut storage, &config).record(&request(args)?, &actor)?;
            if crate::is_silent() {
                println!("{}", payment.id);
            } else if ctx.json {
                super::print_json(&payment)?;
            } else {
                println!(
                    "Recorded payment {} under OR {}",
                    payment.id,
                    payment.or_number.bold()
                );
                println!("  Amount: {}", format_amount(payment.amount));
                if let Some(change) = payment.change_due {
                    println!("  Change: {}", format_amount(change));
                }
                println!();
                println!("Print the receipt with: citedesk receipt print {}", payment.or_number);
            }
        }
        PaymentCommands::Confirm { id } => {
            let (payment, receipt) = PaymentService::new(&mut storage, &config).confirm_print(id, &actor)?;
            if ctx.json {
                super::print_json(&serde_json::json!({ "payment": payment, "receipt": receipt }))?;
            } else {
                println!("OR {} {}", payment.or_number, status_label(payment.status));
            }
        }
        PaymentCommands::Void { id, reason } => {
            let payment = PaymentService::new(&mut storage, &config).void(id, reason, &actor)?;
            print_changed(ctx, &payment, "Voided")?;
        }
        PaymentCommands::Reissue { id, new_or } => {
            let payment = PaymentService::new(&mut storage, &config).reissue(id, new_or, &actor)?;
            if crate::is_silent() {
                println!("{}", payment.or_number);
            } else if ctx.json {
                super::print_json(&payment)?;
            } else {
                println!("Reissued as OR {} ({})", payment.or_number.bold(), status_label(payment.status));
            }
        }
        PaymentCommands::Refund { id, reason } => {
            let payment = PaymentService::new(&mut storage, &config).refund(id, reason, &actor)?;
            print_changed(ctx, &payment, "Refunded")?;
        }
        PaymentCommands::Show { id } => {
            let payment = PaymentService::new(&mut storage, &config).find(id)?;
            if ctx.json {
                super::print_json(&payment)?;
            } else {
                print_payment(&payment);
            }
        }
        PaymentCommands::List(args) => {
            let filter = filter(&storage, args)?;
            let payments = PaymentService::new(&mut storage, &config).list(&filter)?;
            if crate::is_csv() {
                println!("id,or_number,citation_id,amount,method,status,cashier,paid_at");
                for p in &payments {
                    println!(
                        "{},{},{},{},{},{},{},{}",
                        p.id,
                        crate::csv_escape(&p.or_number),
                        p.citation_id,
                        crate::csv_escape(&format_amount(p.amount)),
                        p.method.as_str(),
                        p.status.as_str(),
                        crate::csv_escape(&p.cashier),
                        format_datetime(p.paid_at),
                    );
                }
            } else if ctx.json {
                super::print_json(&serde_json::json!({ "payments": payments, "count": payments.len() }))?;
            } else if payments.is_empty() {
                println!("No payments found.");
            } else {
                println!("Payments ({}):", payments.len());
                for p in &payments {
                    println!(
                        "  {:<12} {}  {:>12}  {:<12} {:<14} {}",
                        p.or_number,
                        format_datetime(p.paid_at),
                        format_amount(p.amount),
                        p.method.label(),
                        status_label(p.status),
                        p.cashier
                    );
                }
            }
        }
        PaymentCommands::Pending => {
            let pending = PaymentService::new(&mut storage, &config).pending_print()?;
            if ctx.json {
                super::print_json(&serde_json::json!({ "pending": pending, "count": pending.len() }))?;
            } else if pending.is_empty() {
                println!("No payments waiting for a receipt.");
            } else {
                println!("Waiting for receipt ({}):", pending.len());
                for p in &pending {
                    println!(
                        "  {:<12} {:<12} {:<28} {:>12}  {}",
                        p.payment.or_number,
                        p.ticket_number,
                        p.driver_name,
                        format_amount(p.payment.amount),
                        format_datetime(p.payment.paid_at)
                    );
                }
            }
        }
        PaymentCommands::CheckOr { or_number } => {
            let check = PaymentService::new(&mut storage, &config).check_or(or_number)?;
            if ctx.json {
                super::print_json(&check)?;
            } else if check.available {
                println!("{} {}", check.or_number, "available".green());
            } else {
                println!("{} {}: {}", check.or_number, "in use".red(), check.message);
            }
        }
        PaymentCommands::NextOr => {
            let next = PaymentService::new(&mut storage, &config).next_or()?;
            if ctx.json {
                super::print_json(&serde_json::json!({ "or_number": next }))?;
            } else {
                println!("{next}");
            }
        }
        PaymentCommands::Stats { from, to } => {
            let (from, to) = date_bounds(from.as_deref(), to.as_deref())?;
            let stats = PaymentService::new(&mut storage, &config).stats(from, to)?;
            if ctx.json {
                return super::print_json(&stats);
            }
            println!("Collected:      {}", format_amount(stats.collected).bold());
            println!("Refunded:       {}", format_amount(stats.refunded));
            println!("Voided:         {}", stats.voided_count);
            println!("Awaiting print: {}", stats.pending_print_count);
            print_buckets("By status", &stats.by_status);
            print_buckets("By method", &stats.by_method);
            print_buckets("By cashier", &stats.by_cashier);
        }
    }
    Ok(())
}

fn print_changed(ctx: &CommandContext, payment: &Payment, verb: &str) -> Result<()> {
    if crate::is_silent() {
        println!("{}", payment.id);
    } else if ctx.json {
        super::print_json(payment)?;
    } else {
        println!("{verb} OR {} ({})", payment.or_number, format_amount(payment.amount));
    }
    Ok(())
}

fn print_buckets(title: &str, buckets: &[Bucket]) {
    if buckets.is_empty() {
        return;
    }
    println!();
    println!("{title}:");
    for b in buckets {
        println!("  {:<16} {:>5} {:>14}", b.key, b.count, format_amount(b.total));
    }
}

fn print_payment(p: &Payment) {
    println!("OR {} {} {}", p.or_number.bold(), status_label(p.status), p.id.dimmed());
    println!("  Citation:  {}", p.citation_id);
    println!("  Amount:    {}", format_amount(p.amount));
    if let Some(tendered) = p.amount_tendered {
        println!("  Tendered:  {}", format_amount(tendered));
    }
    if let Some(change) = p.change_due {
        println!("  Change:    {}", format_amount(change));
    }
    println!("  Method:    {}", p.method.label());
    if let Some(reference) = &p.reference_number {
        println!("  Reference: {reference}");
    }
    println!("  Cashier:   {}", p.cashier);
    println!("  Paid:      {}", format_datetime(p.paid_at));
    if let Some(at) = p.completed_at {
        println!("  Printed:   {}", format_datetime(at));
    }
    if let (Some(at), Some(reason)) = (p.voided_at, &p.void_reason) {
        println!("  Voided:    {} ({reason})", format_datetime(at));
    }
    if let (Some(at), Some(reason)) = (p.refunded_at, &p.refund_reason) {
        println!("  Refunded:  {} ({reason})", format_datetime(at));
    }
    if let Some(next) = &p.replaced_by {
        println!("  Replaced by: {next}");
    }
    if let Some(notes) = &p.notes {
        println!("  Notes:     {notes}");
    }
}
