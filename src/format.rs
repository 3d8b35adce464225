//! Rendering helpers shared by the CLI, receipts and reports.

/// RFC 3339 rendering of a stored millisecond timestamp.
#[must_use]
pub fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

/// `YYYY-MM-DD HH:MM` rendering of a stored wall-clock timestamp.
#[must_use]
pub fn format_datetime(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.naive_utc().format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// `YYYY-MM-DD` rendering of a stored timestamp.
#[must_use]
pub fn format_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.naive_utc().format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Render centavos as pesos with thousands separators: `150050` → `1,500.50`.
#[must_use]
pub fn format_amount(centavos: i64) -> String {
    let sign = if centavos < 0 { "-" } else { "" };
    let abs = centavos.unsigned_abs();
    let whole = (abs / 100).to_string();
    let frac = abs % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{sign}{grouped}.{frac:02}")
}

/// `1` → `1st`, `2` → `2nd`, `3` → `3rd`, `11` → `11th`.
#[must_use]
pub fn ordinal(n: i64) -> String {
    let suffix = match (n % 10, n % 100) {
        (1, r) if r != 11 => "st",
        (2, r) if r != 12 => "nd",
        (3, r) if r != 13 => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// Truncate for single-line table cells.
#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(150_050), "1,500.50");
        assert_eq!(format_amount(100_000_000), "1,000,000.00");
        assert_eq!(format_amount(-2_500), "-25.00");
    }

    #[test]
    fn test_ordinal() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(22), "22nd");
    }

    #[test]
    fn test_format_datetime() {
        let ts = crate::validate::to_millis(
            crate::validate::parse_datetime("2026-03-04 14:30").unwrap(),
        );
        assert_eq!(format_datetime(ts), "2026-03-04 14:30");
        assert_eq!(format_date(ts), "2026-03-04");
    }
}
