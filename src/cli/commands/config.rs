//! Office settings commands.

use super::CommandContext;
use crate::cli::ConfigCommands;
use crate::config::{config_path, save_config, AppConfig};
use crate::error::{Error, Result};
use std::path::PathBuf;

pub fn execute(command: &ConfigCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        ConfigCommands::Show => show(ctx),
        ConfigCommands::Set { key, value } => set(ctx, key, value),
    }
}

fn show(ctx: &CommandContext) -> Result<()> {
    let config = ctx.settings()?;
    if ctx.json {
        return super::print_json(&config);
    }
    println!("Settings ({})", config_path(ctx.config)?.display());
    println!("  office_name:            {}", config.office_name);
    println!("  office_address:         {}", config.office_address);
    println!("  or_number_width:        {}", config.or_number_width);
    println!("  enforce_roles:          {}", config.enforce_roles);
    println!("  import_match_threshold: {}", config.import_match_threshold);
    println!("  duplicate_link_score:   {}", config.duplicate_link_score);
    println!("  server_bind:            {}", config.server_bind);
    println!(
        "  backup_dir:             {}",
        config.resolved_backup_dir()?.display()
    );
    Ok(())
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("invalid value for {key}: '{value}'")))
}

/// Apply one `key = value` change.
fn apply(config: &mut AppConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "office_name" => config.office_name = value.trim().to_string(),
        "office_address" => config.office_address = value.trim().to_string(),
        "or_number_width" => config.or_number_width = parse(key, value)?,
        "enforce_roles" => config.enforce_roles = parse(key, value)?,
        "import_match_threshold" => config.import_match_threshold = parse(key, value)?,
        "duplicate_link_score" => {
            let score: u8 = parse(key, value)?;
            if score > 100 {
                return Err(Error::InvalidArgument("duplicate_link_score must be 0-100".into()));
            }
            config.duplicate_link_score = score;
        }
        "server_bind" => config.server_bind = value.trim().to_string(),
        "backup_dir" => {
            config.backup_dir = Some(value.trim()).filter(|v| !v.is_empty()).map(PathBuf::from);
        }
        _ => return Err(Error::InvalidArgument(format!("unknown setting '{key}'"))),
    }
    if !(0.0..=1.0).contains(&config.import_match_threshold) {
        return Err(Error::InvalidArgument("import_match_threshold must be between 0 and 1".into()));
    }
    if config.or_number_width == 0 || config.or_number_width > 12 {
        return Err(Error::InvalidArgument("or_number_width must be between 1 and 12".into()));
    }
    Ok(())
}

fn set(ctx: &CommandContext, key: &str, value: &str) -> Result<()> {
    let mut config = ctx.settings()?;
    apply(&mut config, key, value)?;
    save_config(ctx.config, &config)?;
    tracing::info!(key, "Setting changed");

    if ctx.json {
        super::print_json(&config)
    } else {
        println!("Set {key} = {value}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_validates_values() {
        let mut config = AppConfig::default();
        apply(&mut config, "or_number_width", "8").unwrap();
        assert_eq!(config.or_number_width, 8);
        apply(&mut config, "backup_dir", "").unwrap();
        assert!(config.backup_dir.is_none());

        assert!(apply(&mut config, "or_number_width", "0").is_err());
        assert!(apply(&mut config, "import_match_threshold", "1.5").is_err());
        assert!(apply(&mut config, "enforce_roles", "maybe").is_err());
        assert!(apply(&mut config, "colour", "red").is_err());
    }

    #[test]
    fn test_set_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let ctx = CommandContext {
            db: None,
            config: Some(&path),
            actor: None,
            json: true,
        };
        set(&ctx, "office_name", "Municipality of San Isidro").unwrap();
        let loaded = ctx.settings().unwrap();
        assert_eq!(loaded.office_name, "Municipality of San Isidro");
    }
}
