//! Input validation and normalization.
//!
//! Provides O(1) validation sets and synonym maps so operators can type
//! natural values for statuses, payment methods and roles. Three-tier
//! resolution: exact match → synonym lookup → error with suggestion.
//!
//! Also hosts the string-similarity primitives (Levenshtein, Soundex) used
//! by driver deduplication and the spreadsheet importer, and the parsers
//! for money, dates and identifiers.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

// ── Valid value sets (O(1) lookups) ──────────────────────────

pub static VALID_CITATION_STATUSES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["pending", "paid", "contested", "dismissed", "void"]
        .into_iter()
        .collect()
});

pub static VALID_PAYMENT_STATUSES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["pending_print", "completed", "voided", "refunded"]
        .into_iter()
        .collect()
});

pub static VALID_METHODS: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["cash", "check", "money_order", "online"].into_iter().collect()
});

pub static VALID_ROLES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["admin", "cashier", "enforcer", "encoder"].into_iter().collect()
});

// ── Synonym maps ─────────────────────────────────────────────

pub static CITATION_STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("open", "pending"),
        ("unpaid", "pending"),
        ("new", "pending"),
        ("settled", "paid"),
        ("appealed", "contested"),
        ("disputed", "contested"),
        ("protested", "contested"),
        ("cancelled", "void"),
        ("canceled", "void"),
        ("voided", "void"),
        ("withdrawn", "dismissed"),
        ("acquitted", "dismissed"),
    ]
    .into_iter()
    .collect()
});

pub static PAYMENT_STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("pending", "pending_print"),
        ("unprinted", "pending_print"),
        ("printed", "completed"),
        ("paid", "completed"),
        ("void", "voided"),
        ("cancelled", "voided"),
        ("canceled", "voided"),
        ("refund", "refunded"),
        ("returned", "refunded"),
    ]
    .into_iter()
    .collect()
});

pub static METHOD_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("cheque", "check"),
        ("mo", "money_order"),
        ("money-order", "money_order"),
        ("moneyorder", "money_order"),
        ("postal", "money_order"),
        ("gcash", "online"),
        ("maya", "online"),
        ("bank", "online"),
        ("transfer", "online"),
        ("epay", "online"),
    ]
    .into_iter()
    .collect()
});

pub static ROLE_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("administrator", "admin"),
        ("treasurer", "cashier"),
        ("collector", "cashier"),
        ("officer", "enforcer"),
        ("traffic_enforcer", "enforcer"),
        ("clerk", "encoder"),
        ("staff", "encoder"),
    ]
    .into_iter()
    .collect()
});

/// Normalize a citation status string via exact match or synonym lookup.
///
/// Returns the canonical status, or an error with the original input
/// and an optional suggestion.
pub fn normalize_citation_status(input: &str) -> Result<String, (String, Option<String>)> {
    normalize_with(input, &VALID_CITATION_STATUSES, &CITATION_STATUS_SYNONYMS)
}

/// Normalize a payment status.
pub fn normalize_payment_status(input: &str) -> Result<String, (String, Option<String>)> {
    normalize_with(input, &VALID_PAYMENT_STATUSES, &PAYMENT_STATUS_SYNONYMS)
}

/// Normalize a payment method.
pub fn normalize_method(input: &str) -> Result<String, (String, Option<String>)> {
    normalize_with(input, &VALID_METHODS, &METHOD_SYNONYMS)
}

/// Normalize a user role.
pub fn normalize_role(input: &str) -> Result<String, (String, Option<String>)> {
    normalize_with(input, &VALID_ROLES, &ROLE_SYNONYMS)
}

fn normalize_with(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Result<String, (String, Option<String>)> {
    let lower = input.trim().to_lowercase().replace(' ', "_");

    // Tier 1: exact match
    if valid.contains(lower.as_str()) {
        return Ok(lower);
    }

    // Tier 2: synonym lookup
    if let Some(&canonical) = synonyms.get(lower.as_str()) {
        return Ok(canonical.to_string());
    }

    // Tier 3: find closest suggestion
    let suggestion = find_closest_match(&lower, valid, synonyms);
    Err((input.to_string(), suggestion))
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist <= 3 && best.is_none_or(|(_, d)| dist < d) {
            // For synonyms, show what it maps to
            let shown = synonyms.get(v).copied().unwrap_or(v);
            best = Some((shown, dist));
        }
    }

    best.map(|(v, _)| v.to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Use single-row optimization (O(min(m,n)) space)
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1) // deletion
                .min(curr[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Normalized similarity in `[0.0, 1.0]` derived from edit distance.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / longest as f64
}

/// Find existing values similar to the searched one.
///
/// Returns up to `max` suggestions with edit distance ≤ 3,
/// sorted by distance then alphabetically.
pub fn find_similar(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let searched = searched.to_uppercase();
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|v| (levenshtein_distance(&searched, &v.to_uppercase()), v.as_str()))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max)
        .map(|(_, v)| v.to_string())
        .collect()
}

// ── Soundex ──────────────────────────────────────────────────

/// American Soundex code (letter + three digits) of a word.
///
/// Non-letters are ignored. Returns an empty string when the input has no
/// ASCII letters.
#[must_use]
pub fn soundex(word: &str) -> String {
    fn digit(c: char) -> Option<char> {
        match c {
            'B' | 'F' | 'P' | 'V' => Some('1'),
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
            'D' | 'T' => Some('3'),
            'L' => Some('4'),
            'M' | 'N' => Some('5'),
            'R' => Some('6'),
            _ => None,
        }
    }

    let mut letters = word
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase());

    let Some(first) = letters.next() else {
        return String::new();
    };

    let mut code = String::with_capacity(4);
    code.push(first);
    let mut last = digit(first);

    for c in letters {
        let d = digit(c);
        if let Some(value) = d {
            if d != last {
                code.push(value);
                if code.len() == 4 {
                    break;
                }
            }
        }
        // H and W do not separate equal codes; vowels do.
        if c != 'H' && c != 'W' {
            last = d;
        }
    }

    while code.len() < 4 {
        code.push('0');
    }
    code
}

// ── Identifier normalization ─────────────────────────────────

/// Uppercase, keep letters/spaces/hyphens/apostrophes, collapse whitespace.
#[must_use]
pub fn normalize_name(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_alphabetic() || c == '-' || c == '\'' {
                c.to_uppercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Uppercase and strip whitespace from a driver's license number.
#[must_use]
pub fn normalize_license(input: &str) -> Option<String> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if cleaned.is_empty() || cleaned == "N/A" || cleaned == "NONE" {
        None
    } else {
        Some(cleaned)
    }
}

fn normalize_code(input: &str, kind: &str, min: usize, max: usize) -> Result<String, String> {
    let cleaned: String = input
        .trim()
        .trim_start_matches('#')
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.len() < min || cleaned.len() > max {
        return Err(format!("{kind} must be {min}-{max} characters, got '{input}'"));
    }
    if !cleaned.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("{kind} may only contain letters, digits and '-': '{input}'"));
    }
    Ok(cleaned)
}

/// Normalize a citation ticket number (1-20 of `[A-Z0-9-]`).
pub fn normalize_ticket(input: &str) -> Result<String, String> {
    normalize_code(input, "ticket number", 1, 20)
}

/// Normalize an official receipt number (5-12 of `[A-Z0-9-]`, at least one digit).
pub fn normalize_or_number(input: &str) -> Result<String, String> {
    let or = normalize_code(input, "OR number", 5, 12)?;
    if !or.chars().any(|c| c.is_ascii_digit()) {
        return Err(format!("OR number must contain digits: '{input}'"));
    }
    Ok(or)
}

// ── Money ────────────────────────────────────────────────────

/// Parse a peso amount ("1500", "1,500.50", "₱ 250") into centavos.
pub fn parse_amount(input: &str) -> Result<i64, String> {
    let cleaned: String = input
        .trim()
        .trim_start_matches('₱')
        .trim_start_matches("PHP")
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Err("amount is empty".to_string());
    }
    if cleaned.starts_with('-') {
        return Err(format!("amount cannot be negative: '{input}'"));
    }

    let (whole, frac) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned.as_str(), ""),
    };
    if frac.len() > 2 {
        return Err(format!("amount has more than two decimals: '{input}'"));
    }
    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| format!("not a number: '{input}'"))?
    };
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| format!("not a number: '{input}'"))? * 10,
        _ => frac.parse().map_err(|_| format!("not a number: '{input}'"))?,
    };

    whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(frac))
        .ok_or_else(|| format!("amount too large: '{input}'"))
}

// ── Dates ────────────────────────────────────────────────────

/// Parse a calendar date in `YYYY-MM-DD` or `MM/DD/YYYY` form.
pub fn parse_date(input: &str) -> Result<NaiveDate, String> {
    let s = input.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%y"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%B %d, %Y"))
        .map_err(|_| format!("unrecognized date '{input}' (use YYYY-MM-DD)"))
}

/// Parse a time of day (`14:30`, `14:30:00`, `2:30 PM`).
pub fn parse_time(input: &str) -> Result<NaiveTime, String> {
    let s = input.trim().to_uppercase();
    NaiveTime::parse_from_str(&s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
        .or_else(|_| NaiveTime::parse_from_str(&s, "%I:%M %p"))
        .or_else(|_| NaiveTime::parse_from_str(&s, "%I:%M%p"))
        .map_err(|_| format!("unrecognized time '{input}' (use HH:MM)"))
}

/// Parse a date with optional time, separated by a space or `T`.
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, String> {
    let s = input.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    if let Ok(date) = parse_date(s) {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    let (date_part, time_part) = s
        .split_once(['T', ' '])
        .ok_or_else(|| format!("unrecognized date/time '{input}'"))?;
    let date = parse_date(date_part)?;
    let time = parse_time(time_part)?;
    Ok(date.and_time(time))
}

/// Apprehension/report timestamps are wall-clock times stored as if UTC.
#[must_use]
pub fn to_millis(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_millis()
}

/// Start of `date` in stored milliseconds.
#[must_use]
pub fn date_start_millis(date: NaiveDate) -> i64 {
    to_millis(date.and_time(NaiveTime::MIN))
}

/// Exclusive end of `date` (start of the next day) in stored milliseconds.
#[must_use]
pub fn date_end_millis(date: NaiveDate) -> i64 {
    date_start_millis(date) + 86_400_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_citation_status() {
        assert_eq!(normalize_citation_status("pending"), Ok("pending".to_string()));
        assert_eq!(normalize_citation_status("Appealed"), Ok("contested".to_string()));
        assert_eq!(normalize_citation_status("cancelled"), Ok("void".to_string()));
        let err = normalize_citation_status("contestd").unwrap_err();
        assert_eq!(err.1, Some("contested".to_string()));
    }

    #[test]
    fn test_normalize_payment_status() {
        assert_eq!(normalize_payment_status("Pending Print"), Ok("pending_print".to_string()));
        assert_eq!(normalize_payment_status("void"), Ok("voided".to_string()));
        let err = normalize_payment_status("completd").unwrap_err();
        assert_eq!(err.1, Some("completed".to_string()));
    }

    #[test]
    fn test_normalize_method() {
        assert_eq!(normalize_method("Cash"), Ok("cash".to_string()));
        assert_eq!(normalize_method("cheque"), Ok("check".to_string()));
        assert_eq!(normalize_method("money order"), Ok("money_order".to_string()));
        assert_eq!(normalize_method("gcash"), Ok("online".to_string()));
        assert!(normalize_method("barter").is_err());
    }

    #[test]
    fn test_normalize_role() {
        assert_eq!(normalize_role("treasurer"), Ok("cashier".to_string()));
        assert!(normalize_role("mayor").is_err());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_similarity() {
        assert!((similarity("HELMET", "HELMET") - 1.0).abs() < f64::EPSILON);
        assert!(similarity("NO HELMET", "NO HELMENT") > 0.85);
        assert!(similarity("SPEEDING", "NO HELMET") < 0.5);
    }

    #[test]
    fn test_soundex() {
        assert_eq!(soundex("Robert"), "R163");
        assert_eq!(soundex("Rupert"), "R163");
        assert_eq!(soundex("Ashcraft"), "A261");
        assert_eq!(soundex("Tymczak"), "T522");
        assert_eq!(soundex("Pfister"), "P236");
        assert_eq!(soundex("DELA CRUZ"), soundex("Dela Cruz"));
        assert_eq!(soundex("123"), "");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  dela   cruz, "), "DELA CRUZ");
        assert_eq!(normalize_name("Ma. Teresa"), "MA TERESA");
        assert_eq!(normalize_name("O'Neil-Santos"), "O'NEIL-SANTOS");
    }

    #[test]
    fn test_normalize_ticket_and_or() {
        assert_eq!(normalize_ticket(" #tct-0012 "), Ok("TCT-0012".to_string()));
        assert!(normalize_ticket("").is_err());
        assert!(normalize_ticket("AB/12").is_err());
        assert_eq!(normalize_or_number("0012345"), Ok("0012345".to_string()));
        assert!(normalize_or_number("ABCDEF").is_err());
        assert!(normalize_or_number("12").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1500"), Ok(150_000));
        assert_eq!(parse_amount("1,500.50"), Ok(150_050));
        assert_eq!(parse_amount("₱ 250.5"), Ok(25_050));
        assert_eq!(parse_amount(".75"), Ok(75));
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("1.005").is_err());
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_parse_datetime() {
        let dt = parse_datetime("2026-03-04 14:30").unwrap();
        assert_eq!(dt.to_string(), "2026-03-04 14:30:00");
        let dt = parse_datetime("03/04/2026 2:30 PM").unwrap();
        assert_eq!(dt.to_string(), "2026-03-04 14:30:00");
        let dt = parse_datetime("2026-03-04").unwrap();
        assert_eq!(dt.to_string(), "2026-03-04 00:00:00");
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn test_find_similar() {
        let codes = vec!["NO-HELMET".to_string(), "NO-LICENSE".to_string(), "SPEEDING".to_string()];
        let result = find_similar("no-helmt", &codes, 3);
        assert_eq!(result.first(), Some(&"NO-HELMET".to_string()));
    }
}
