//! Spreadsheet reading: header detection, cell coercion, dates and names.

use super::types::{Cell, Field, ParsedSheet, SheetRow};
use crate::error::{Error, Result};
use crate::validate::{normalize_name, parse_datetime, parse_time};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Rows searched for the header.
const HEADER_SCAN_ROWS: usize = 10;

/// Normalized header aliases.
const ALIASES: &[(Field, &[&str])] = &[
    (
        Field::Ticket,
        &[
            "ticket", "ticket no", "ticket number", "tct", "tct no", "tct number", "citation no",
            "citation number", "ovr", "ovr no", "control no",
        ],
    ),
    (
        Field::FullName,
        &[
            "name", "driver", "drivers name", "driver name", "violator", "violators name", "full name",
            "name of driver", "name of violator",
        ],
    ),
    (Field::LastName, &["last name", "surname", "family name", "lname"]),
    (Field::FirstName, &["first name", "given name", "fname"]),
    (Field::MiddleName, &["middle name", "mi", "middle initial", "mname"]),
    (
        Field::License,
        &[
            "license", "license no", "license number", "drivers license", "drivers license no",
            "dl no", "lic no",
        ],
    ),
    (Field::BirthDate, &["birth date", "birthdate", "date of birth", "dob", "birthday"]),
    (Field::Address, &["address", "home address", "residence"]),
    (
        Field::Date,
        &[
            "date", "date of apprehension", "apprehension date", "date apprehended", "date of violation",
            "violation date", "date time", "date and time",
        ],
    ),
    (Field::Time, &["time", "time of apprehension", "apprehension time"]),
    (
        Field::Place,
        &["place", "place of apprehension", "location", "place of violation", "street"],
    ),
    (Field::Plate, &["plate", "plate no", "plate number", "vehicle plate"]),
    (Field::VehicleType, &["vehicle", "vehicle type", "type of vehicle", "kind of vehicle"]),
    (Field::Officer, &["officer", "apprehending officer", "enforcer", "apprehended by"]),
    (
        Field::Violations,
        &[
            "violation", "violations", "violation s", "offense", "offenses", "nature of violation",
            "violation committed",
        ],
    ),
    (Field::Remarks, &["remarks", "notes", "note"]),
];

/// Surname particles that stay attached to the last name.
const PARTICLES: &[&str] = &["DE", "DEL", "DELA", "DELOS", "DELAS", "LA", "LAS", "LOS", "SAN", "STA", "STO"];

fn normalize_header(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '\'' && *c != '’')
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Which field a header cell names, if any.
#[must_use]
pub fn header_field(text: &str) -> Option<Field> {
    let normalized = normalize_header(text);
    ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&normalized.as_str()))
        .map(|(field, _)| *field)
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        #[allow(clippy::cast_precision_loss)]
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::Serial(dt.as_f64()),
    }
}

/// Read the first sheet (or `sheet`) of an `.xlsx`, `.xls` or `.ods` file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, the sheet does not exist
/// or no header row is found.
pub fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<ParsedSheet> {
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names();
    let name = match sheet {
        Some(s) => names
            .iter()
            .find(|n| n.eq_ignore_ascii_case(s))
            .cloned()
            .ok_or_else(|| Error::Import(format!("no sheet named '{s}' (sheets: {})", names.join(", "))))?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| Error::Import("workbook has no sheets".into()))?,
    };

    let range = workbook.worksheet_range(&name)?;
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let first_col = range.start().map_or(0, |(_, col)| col as usize);
    let grid: Vec<Vec<Cell>> = range
        .rows()
        .map(|row| {
            let mut cells = vec![Cell::Empty; first_col];
            cells.extend(row.iter().map(to_cell));
            cells
        })
        .collect();

    debug!(sheet = %name, rows = grid.len(), "Worksheet read");
    parse_grid(&name, grid, first_row + 1)
}

/// Detect the header and turn the remaining rows into [`SheetRow`]s.
///
/// `first_row_number` is the 1-based sheet row of `grid[0]`.
///
/// # Errors
///
/// Returns an error if no row among the first ten names a ticket column.
pub fn parse_grid(sheet_name: &str, grid: Vec<Vec<Cell>>, first_row_number: usize) -> Result<ParsedSheet> {
    let header_idx = grid
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| row.iter().any(|c| header_field(&c.display()) == Some(Field::Ticket)))
        .ok_or_else(|| {
            Error::Import(format!(
                "no header row with a ticket number column in the first {HEADER_SCAN_ROWS} rows of '{sheet_name}'"
            ))
        })?;

    // First column wins when two headers map to the same field.
    let mut columns: Vec<(usize, String, Field)> = Vec::new();
    for (idx, cell) in grid[header_idx].iter().enumerate() {
        let text = cell.display();
        if let Some(field) = header_field(&text) {
            if !columns.iter().any(|(_, _, f)| *f == field) {
                columns.push((idx, text, field));
            }
        }
    }

    let rows = grid
        .into_iter()
        .enumerate()
        .skip(header_idx + 1)
        .filter(|(_, cells)| cells.iter().any(|c| !c.is_empty()))
        .map(|(idx, cells)| {
            let mut values = BTreeMap::new();
            let mut raw = BTreeMap::new();
            for (col, header, field) in &columns {
                let cell = cells.get(*col).cloned().unwrap_or(Cell::Empty);
                raw.insert(header.clone(), cell.display());
                values.insert(*field, cell);
            }
            SheetRow {
                row_number: first_row_number + idx,
                values,
                raw,
            }
        })
        .collect();

    Ok(ParsedSheet {
        sheet_name: sheet_name.to_string(),
        header_row: first_row_number + header_idx,
        columns: columns.into_iter().map(|(_, header, field)| (header, field)).collect(),
        rows,
    })
}

/// Convert an Excel date serial (1900 date system) to a date-time.
#[must_use]
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    #[allow(clippy::cast_possible_truncation)]
    let days = serial.trunc() as i64;
    #[allow(clippy::cast_possible_truncation)]
    let seconds = (serial.fract() * 86_400.0).round() as i64;
    Some(base + Duration::days(days) + Duration::seconds(seconds))
}

fn time_of(cell: &Cell) -> std::result::Result<NaiveTime, String> {
    match cell {
        Cell::Serial(v) | Cell::Number(v) => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let seconds = (v.fract() * 86_400.0).round() as u32;
            NaiveTime::from_num_seconds_from_midnight_opt(seconds % 86_400, 0)
                .ok_or_else(|| format!("bad time value {v}"))
        }
        Cell::Text(s) => parse_time(s),
        Cell::Empty => Err("time is empty".into()),
    }
}

/// Apprehension date-time from a date cell and an optional time cell.
///
/// The time cell only applies when the date cell carries no time itself.
pub fn parse_when(date: &Cell, time: Option<&Cell>) -> std::result::Result<NaiveDateTime, String> {
    let dt = match date {
        Cell::Serial(v) | Cell::Number(v) => {
            serial_to_datetime(*v).ok_or_else(|| format!("'{v}' is not a date"))?
        }
        Cell::Text(s) => parse_datetime(s)?,
        Cell::Empty => return Err("apprehension date is missing".into()),
    };
    match time {
        Some(t) if dt.num_seconds_from_midnight() == 0 && !t.is_empty() => Ok(dt.date().and_time(time_of(t)?)),
        _ => Ok(dt),
    }
}

/// Birth date cell as `YYYY-MM-DD`.
pub fn parse_birth_date(cell: &Cell) -> std::result::Result<String, String> {
    parse_when(cell, None).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Split a full-name cell into `(last, first, middle)`.
///
/// Accepts `LAST, FIRST MIDDLE` and `FIRST MIDDLE LAST`; surname particles
/// (`DELA CRUZ`, `SAN JUAN`) stay with the last name.
#[must_use]
pub fn split_full_name(full: &str) -> Option<(String, String, Option<String>)> {
    if let Some((last, rest)) = full.split_once(',') {
        let last = normalize_name(last);
        let words: Vec<String> = normalize_name(rest).split(' ').filter(|w| !w.is_empty()).map(String::from).collect();
        if last.is_empty() || words.is_empty() {
            return None;
        }
        let (first, middle) = match words.len() {
            1 => (words[0].clone(), None),
            n => (words[..n - 1].join(" "), Some(words[n - 1].clone())),
        };
        return Some((last, first, middle));
    }

    let words: Vec<String> = normalize_name(full).split(' ').filter(|w| !w.is_empty()).map(String::from).collect();
    if words.len() < 2 {
        return None;
    }
    let mut last_start = words.len() - 1;
    while last_start > 1 && PARTICLES.contains(&words[last_start - 1].as_str()) {
        last_start -= 1;
    }
    let last = words[last_start..].join(" ");
    let first = words[0].clone();
    let middle = Some(words[1..last_start].join(" ")).filter(|m| !m.is_empty());
    Some((last, first, middle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_header_aliases() {
        assert_eq!(header_field("Ticket No."), Some(Field::Ticket));
        assert_eq!(header_field("TCT #"), Some(Field::Ticket));
        assert_eq!(header_field("Date of Apprehension"), Some(Field::Date));
        assert_eq!(header_field("Violation(s)"), Some(Field::Violations));
        assert_eq!(header_field("Driver's Name"), Some(Field::FullName));
        assert_eq!(header_field("Amount"), None);
    }

    #[test]
    fn test_header_found_below_title_rows() {
        let grid = vec![
            vec![text("MUNICIPAL TRAFFIC OFFICE")],
            vec![text("January Citations")],
            vec![text("Ticket No."), text("Name"), text("Date"), text("Violations"), text("Fine")],
            vec![text("T-100"), text("Cruz, Juan P."), Cell::Serial(45_306.5), text("NH")],
            vec![Cell::Empty, Cell::Empty],
            vec![Cell::Number(101.0), text("Pedro Reyes"), text("2024-01-16"), text("NL")],
        ];
        let sheet = parse_grid("Sheet1", grid, 1).unwrap();
        assert_eq!(sheet.header_row, 3);
        assert_eq!(sheet.columns.len(), 4);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].row_number, 4);
        assert_eq!(sheet.rows[1].row_number, 6);
        assert_eq!(sheet.rows[1].text(Field::Ticket).as_deref(), Some("101"));
        assert_eq!(sheet.rows[0].raw.get("Ticket No.").map(String::as_str), Some("T-100"));
    }

    #[test]
    fn test_missing_header_is_an_error() {
        let grid = vec![vec![text("Name"), text("Date")]];
        assert!(parse_grid("Sheet1", grid, 1).is_err());
    }

    #[test]
    fn test_serial_dates_and_times() {
        // 2024-01-15 12:00
        let dt = serial_to_datetime(45_306.5).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-01-15 12:00");

        let with_time = parse_when(&text("01/15/2024"), Some(&text("2:30 PM"))).unwrap();
        assert_eq!(with_time.format("%H:%M").to_string(), "14:30");
        let time_serial = parse_when(&Cell::Serial(45_306.0), Some(&Cell::Number(0.25))).unwrap();
        assert_eq!(time_serial.format("%H:%M").to_string(), "06:00");
        assert!(parse_when(&text("someday"), None).is_err());
        assert!(parse_when(&Cell::Empty, None).is_err());
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(
            split_full_name("Cruz, Juan Perez"),
            Some(("CRUZ".into(), "JUAN".into(), Some("PEREZ".into())))
        );
        assert_eq!(
            split_full_name("Juan P. Dela Cruz"),
            Some(("DELA CRUZ".into(), "JUAN".into(), Some("P".into())))
        );
        assert_eq!(split_full_name("Reyes, Pedro"), Some(("REYES".into(), "PEDRO".into(), None)));
        assert_eq!(split_full_name("Madonna"), None);
    }
}
