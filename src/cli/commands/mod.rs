//! Command implementations.

pub mod audit;
pub mod backup;
pub mod citation;
pub mod completions;
pub mod config;
pub mod driver;
pub mod import;
pub mod init;
pub mod payment;
pub mod receipt;
pub mod report;
pub mod serve;
pub mod user;
pub mod version;
pub mod violation_type;

use crate::config::{default_actor, load_config, resolve_db_path, AppConfig};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use crate::validate::{date_end_millis, date_start_millis, parse_amount, parse_date, parse_datetime, to_millis};
use serde::Serialize;
use std::path::Path;

/// Global options every command handler needs.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub db: Option<&'a Path>,
    pub config: Option<&'a Path>,
    pub actor: Option<&'a str>,
    pub json: bool,
}

impl CommandContext<'_> {
    /// Open the database; it must have been created by `citedesk init`.
    pub fn open(&self) -> Result<SqliteStorage> {
        let db_path = resolve_db_path(self.db).ok_or(Error::NotInitialized)?;
        if !db_path.exists() {
            return Err(Error::NotInitialized);
        }
        SqliteStorage::open(&db_path)
    }

    pub fn actor(&self) -> String {
        self.actor.map_or_else(default_actor, ToString::to_string)
    }

    pub fn settings(&self) -> Result<AppConfig> {
        load_config(self.config)
    }
}

/// Print a value as one line of JSON.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Parse a money argument into centavos.
pub(crate) fn amount_arg(input: &str) -> Result<i64> {
    parse_amount(input).map_err(Error::InvalidAmount)
}

/// Parse a date/time argument into stored milliseconds.
pub(crate) fn datetime_arg(input: &str) -> Result<i64> {
    parse_datetime(input).map(to_millis).map_err(Error::InvalidArgument)
}

/// Inclusive `--from`/`--to` dates as a half-open millisecond range.
pub(crate) fn date_bounds(from: Option<&str>, to: Option<&str>) -> Result<(Option<i64>, Option<i64>)> {
    let parse = |s: &str| parse_date(s).map_err(Error::InvalidArgument);
    Ok((
        from.map(parse).transpose()?.map(date_start_millis),
        to.map(parse).transpose()?.map(date_end_millis),
    ))
}

/// Map a `normalize_*` rejection to an error with a suggestion.
pub(crate) fn invalid_choice<'a>(kind: &'a str, valid: &'a str) -> impl Fn((String, Option<String>)) -> Error + 'a {
    move |(value, suggestion)| {
        let msg = match suggestion {
            Some(s) => format!("Invalid {kind} '{value}'. Did you mean '{s}'?"),
            None => format!("Invalid {kind} '{value}'. Valid: {valid}"),
        };
        Error::InvalidArgument(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_bounds_are_inclusive_days() {
        let (from, to) = date_bounds(Some("2024-03-01"), Some("2024-03-31")).unwrap();
        assert_eq!(to.unwrap() - from.unwrap(), 31 * 86_400_000);
        assert!(date_bounds(Some("03/01/2024"), None).unwrap().0.is_some());
        assert!(date_bounds(Some("March"), None).is_err());
    }

    #[test]
    fn test_invalid_choice_message() {
        let err = invalid_choice("method", "cash, check")(("chek".into(), Some("check".into())));
        assert!(err.to_string().contains("Did you mean 'check'"));
    }
}
