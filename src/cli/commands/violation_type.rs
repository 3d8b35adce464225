//! Violation type (fine schedule) commands.

use super::{amount_arg, CommandContext};
use crate::cli::ViolationTypeCommands;
use crate::error::{Error, Result};
use crate::format::format_amount;
use crate::model::ViolationType;
use crate::service::violation_type::ViolationTypeChanges;
use crate::service::ViolationTypeService;
use colored::Colorize;

/// Parse `--fines 1000,1500,2000` into centavos for each offense tier.
fn fines_arg(values: &[String]) -> Result<[i64; 3]> {
    let amounts = values
        .iter()
        .map(|v| amount_arg(v))
        .collect::<Result<Vec<_>>>()?;
    <[i64; 3]>::try_from(amounts).map_err(|got| {
        Error::InvalidArgument(format!(
            "--fines needs three amounts (1st, 2nd, 3rd offense), got {}",
            got.len()
        ))
    })
}

pub fn execute(command: &ViolationTypeCommands, ctx: &CommandContext) -> Result<()> {
    let mut storage = ctx.open()?;
    let config = ctx.settings()?;
    let actor = ctx.actor();
    let mut service = ViolationTypeService::new(&mut storage, &config);

    match command {
        ViolationTypeCommands::Add {
            code,
            name,
            fines,
            category,
            description,
        } => {
            let mut vt = ViolationType::new(code, name, fines_arg(fines)?);
            if let Some(category) = category {
                vt = vt.with_category(category);
            }
            if let Some(description) = description {
                vt = vt.with_description(description);
            }
            let vt = service.add(&vt, &actor)?;
            if crate::is_silent() {
                println!("{}", vt.code);
            } else if ctx.json {
                super::print_json(&vt)?;
            } else {
                println!("Added {} {}", vt.code.bold(), vt.name);
                println!("  Fines: {}", tiers(&vt));
            }
        }
        ViolationTypeCommands::List { all } => {
            let types = service.list(*all)?;
            if crate::is_csv() {
                println!("code,name,category,fine_first,fine_second,fine_third,active");
                for vt in &types {
                    println!(
                        "{},{},{},{},{},{},{}",
                        vt.code,
                        crate::csv_escape(&vt.name),
                        crate::csv_escape(vt.category.as_deref().unwrap_or("")),
                        crate::csv_escape(&format_amount(vt.fine_first)),
                        crate::csv_escape(&format_amount(vt.fine_second)),
                        crate::csv_escape(&format_amount(vt.fine_third)),
                        vt.is_active
                    );
                }
            } else if ctx.json {
                super::print_json(&serde_json::json!({ "violation_types": types, "count": types.len() }))?;
            } else if types.is_empty() {
                println!("No violation types found.");
                println!("Load the standard schedule with: citedesk init --seed --force");
            } else {
                println!("Violation types ({}):", types.len());
                for vt in &types {
                    let line = format!("  {:<8} {:<40} {}", vt.code, vt.name, tiers(vt));
                    if vt.is_active {
                        println!("{line}");
                    } else {
                        println!("{} {}", line.dimmed(), "(inactive)".dimmed());
                    }
                }
            }
        }
        ViolationTypeCommands::Update {
            code,
            name,
            category,
            description,
            fines,
            activate,
        } => {
            let fines = fines.as_deref().map(fines_arg).transpose()?;
            let changes = ViolationTypeChanges {
                name: name.clone(),
                category: category.clone(),
                description: description.clone(),
                fine_first: fines.map(|f| f[0]),
                fine_second: fines.map(|f| f[1]),
                fine_third: fines.map(|f| f[2]),
                is_active: activate.then_some(true),
            };
            let vt = service.update(code, &changes, &actor)?;
            if ctx.json {
                super::print_json(&vt)?;
            } else {
                println!("Updated {} {}", vt.code.bold(), vt.name);
                println!("  Fines: {}", tiers(&vt));
            }
        }
        ViolationTypeCommands::Deactivate { code } => {
            let vt = service.deactivate(code, &actor)?;
            if ctx.json {
                super::print_json(&vt)?;
            } else {
                println!("Deactivated {} {}", vt.code, vt.name);
            }
        }
    }
    Ok(())
}

fn tiers(vt: &ViolationType) -> String {
    format!(
        "{} / {} / {}",
        format_amount(vt.fine_first),
        format_amount(vt.fine_second),
        format_amount(vt.fine_third)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fines_arg_needs_three_tiers() {
        let fines: Vec<String> = vec!["1000".into(), "1,500.50".into(), "2000".into()];
        assert_eq!(fines_arg(&fines).unwrap(), [100_000, 150_050, 200_000]);

        let short: Vec<String> = vec!["1000".into(), "1500".into()];
        assert!(fines_arg(&short).is_err());
    }
}
