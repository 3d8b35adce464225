//! Audit trail commands.

use super::{date_bounds, CommandContext};
use crate::cli::AuditCommands;
use crate::error::Result;
use crate::format::format_datetime;
use crate::service::{AuditFilter, AuditService};
use crate::storage::events::Event;
use colored::Colorize;

pub fn execute(command: &AuditCommands, ctx: &CommandContext) -> Result<()> {
    let storage = ctx.open()?;
    let audit = AuditService::new(storage.conn());

    let events = match command {
        AuditCommands::List {
            entity,
            id,
            actor,
            action,
            from,
            to,
            limit,
        } => {
            let (from, to) = date_bounds(from.as_deref(), to.as_deref())?;
            audit.list(&AuditFilter {
                entity_type: entity.clone(),
                entity_id: id.clone(),
                actor: actor.clone(),
                action: action.clone(),
                from,
                to,
                limit: Some(*limit),
            })?
        }
        AuditCommands::History { entity, id } => audit.history(entity, id)?,
    };

    if crate::is_csv() {
        println!("id,created_at,actor,action,entity_type,entity_id,old_value,new_value,comment");
        for e in &events {
            println!(
                "{},{},{},{},{},{},{},{},{}",
                e.id,
                format_datetime(e.created_at),
                crate::csv_escape(&e.actor),
                e.event_type.as_str(),
                e.entity_type,
                e.entity_id,
                crate::csv_escape(e.old_value.as_deref().unwrap_or("")),
                crate::csv_escape(e.new_value.as_deref().unwrap_or("")),
                crate::csv_escape(e.comment.as_deref().unwrap_or("")),
            );
        }
    } else if ctx.json {
        super::print_json(&serde_json::json!({ "events": events, "count": events.len() }))?;
    } else if events.is_empty() {
        println!("No audit entries found.");
    } else {
        for e in &events {
            print_event(e);
        }
    }
    Ok(())
}

fn print_event(e: &Event) {
    let mut line = format!(
        "{}  {:<12} {:<26} {}:{}",
        format_datetime(e.created_at).dimmed(),
        e.actor,
        e.event_type.as_str().bold(),
        e.entity_type,
        e.entity_id
    );
    match (&e.old_value, &e.new_value) {
        (Some(old), Some(new)) => line.push_str(&format!("  {old} -> {new}")),
        (None, Some(new)) => line.push_str(&format!("  {new}")),
        _ => {}
    }
    if let Some(comment) = &e.comment {
        line.push_str(&format!("  ({comment})"));
    }
    println!("{line}");
}
