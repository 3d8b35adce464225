//! Official receipt commands.

use super::CommandContext;
use crate::cli::ReceiptCommands;
use crate::error::Result;
use crate::service::ReceiptService;
use colored::Colorize;
use std::fs;

pub fn execute(command: &ReceiptCommands, ctx: &CommandContext) -> Result<()> {
    let mut storage = ctx.open()?;
    let config = ctx.settings()?;
    let mut service = ReceiptService::new(&mut storage, &config);

    match command {
        ReceiptCommands::Show { or_number } => {
            let text = service.render(or_number)?;
            if ctx.json {
                super::print_json(&serde_json::json!({ "or_number": or_number, "text": text }))?;
            } else {
                print!("{text}");
            }
        }
        ReceiptCommands::Print { or_number, output } => {
            let outcome = service.print(or_number, &ctx.actor())?;
            if let Some(path) = output {
                fs::write(path, &outcome.text)?;
            }

            if ctx.json {
                super::print_json(&outcome)?;
            } else if let Some(path) = output {
                let label = if outcome.reprint { "Reprinted" } else { "Printed" };
                println!("{label} OR {} to {}", outcome.payment.or_number, path.display());
            } else {
                print!("{}", outcome.text);
                if outcome.reprint {
                    eprintln!(
                        "{} copy {} of OR {}",
                        "Reprint:".yellow(),
                        outcome.receipt.print_count,
                        outcome.payment.or_number
                    );
                }
            }
        }
    }
    Ok(())
}
