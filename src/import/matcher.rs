//! Free-text violation matching against the fine schedule.
//!
//! Encoders type violations however they like ("no helmet", "NH",
//! "Driving w/o License"). Each part is tried against progressively looser
//! rules and the first rule that yields exactly one type wins.

use crate::error::Result;
use crate::model::ViolationType;
use crate::validate::{similarity, soundex};
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Code,
    Name,
    Contains,
    Phonetic,
    Fuzzy,
}

impl MatchMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Name => "name",
            Self::Contains => "contains",
            Self::Phonetic => "phonetic",
            Self::Fuzzy => "fuzzy",
        }
    }
}

/// Outcome for one part of a violation cell.
#[derive(Debug, Clone, Serialize)]
pub struct PartMatch {
    pub part: String,
    pub code: Option<String>,
    pub method: Option<MatchMethod>,
    pub score: f64,
}

impl PartMatch {
    /// `part→CODE (method score)` for the staging table.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.code, self.method) {
            (Some(code), Some(method)) => format!("{}→{code} ({} {:.2})", self.part, method.as_str(), self.score),
            _ => format!("{}→? (no match)", self.part),
        }
    }
}

/// Lowercase words of letters and digits; `w/o` reads as "without".
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace("w/o", "without")
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn phonetic_key(text: &str) -> Vec<String> {
    text.split(' ').filter(|w| w.len() > 1).map(soundex).collect()
}

/// Split a violation cell on `;`, `/`, `,` and newlines.
///
/// `w/o` is protected so "Driving w/o License" stays one part.
#[must_use]
pub fn split_parts(text: &str) -> Vec<String> {
    let protected = text.replace("w/o", "\u{0}").replace("W/O", "\u{0}").replace("W/o", "\u{0}");
    protected
        .split([';', '/', ',', '\n', '\r'])
        .map(|p| p.replace('\u{0}', "w/o").trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// The only item of `hits`, if there is exactly one.
fn unique<'m>(mut hits: impl Iterator<Item = &'m Candidate>) -> Option<&'m Candidate> {
    let first = hits.next()?;
    hits.next().is_none().then_some(first)
}

struct Candidate {
    code: String,
    name: String,
    phonetic: Vec<String>,
}

pub struct ViolationMatcher {
    candidates: Vec<Candidate>,
    threshold: f64,
}

impl ViolationMatcher {
    /// Load active violation types.
    pub fn load(conn: &Connection, threshold: f64) -> Result<Self> {
        let sql = format!(
            "SELECT {} FROM violation_types WHERE is_active = 1 ORDER BY code",
            ViolationType::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let types = stmt
            .query_map([], ViolationType::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Self::new(&types, threshold))
    }

    #[must_use]
    pub fn new(types: &[ViolationType], threshold: f64) -> Self {
        let candidates = types
            .iter()
            .map(|vt| {
                let name = normalize(&vt.name);
                Candidate {
                    code: vt.code.clone(),
                    phonetic: phonetic_key(&name),
                    name,
                }
            })
            .collect();
        Self { candidates, threshold }
    }

    /// Match a single part.
    #[must_use]
    pub fn match_part(&self, part: &str) -> PartMatch {
        let normalized = normalize(part);
        let found = self.find(part, &normalized);
        debug!(part, code = ?found.as_ref().map(|(c, _, _)| c), "Violation part matched");
        match found {
            Some((code, method, score)) => PartMatch {
                part: part.to_string(),
                code: Some(code),
                method: Some(method),
                score,
            },
            None => PartMatch {
                part: part.to_string(),
                code: None,
                method: None,
                score: 0.0,
            },
        }
    }

    fn find(&self, raw: &str, normalized: &str) -> Option<(String, MatchMethod, f64)> {
        if normalized.is_empty() {
            return None;
        }

        let code = raw.trim().to_uppercase();
        if let Some(c) = self.candidates.iter().find(|c| c.code == code) {
            return Some((c.code.clone(), MatchMethod::Code, 1.0));
        }

        if let Some(c) = self.candidates.iter().find(|c| c.name == normalized) {
            return Some((c.code.clone(), MatchMethod::Name, 1.0));
        }

        if normalized.len() >= 4 {
            let hit = unique(
                self.candidates
                    .iter()
                    .filter(|c| c.name.contains(normalized) || normalized.contains(c.name.as_str())),
            );
            if let Some(c) = hit {
                return Some((c.code.clone(), MatchMethod::Contains, 0.9));
            }
        }

        let key = phonetic_key(normalized);
        if !key.is_empty() {
            if let Some(c) = unique(self.candidates.iter().filter(|c| c.phonetic == key)) {
                return Some((c.code.clone(), MatchMethod::Phonetic, 0.85));
            }
        }

        self.candidates
            .iter()
            .map(|c| (c, similarity(normalized, &c.name)))
            .filter(|(_, score)| *score >= self.threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, score)| (c.code.clone(), MatchMethod::Fuzzy, score))
    }

    /// Match every part of a violation cell.
    #[must_use]
    pub fn match_text(&self, text: &str) -> Vec<PartMatch> {
        split_parts(text).iter().map(|part| self.match_part(part)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> ViolationMatcher {
        ViolationMatcher::new(
            &[
                ViolationType::new("NH", "No Helmet", [100_000, 150_000, 200_000]),
                ViolationType::new("NL", "Driving Without License", [300_000, 300_000, 500_000]),
                ViolationType::new("RR", "Reckless Driving", [200_000, 300_000, 500_000]),
                ViolationType::new("OBS", "Obstruction", [50_000, 50_000, 100_000]),
            ],
            0.8,
        )
    }

    #[test]
    fn test_split_parts_keeps_without() {
        assert_eq!(
            split_parts("NH; Driving w/o License\nRR / OBS"),
            vec!["NH", "Driving w/o License", "RR", "OBS"]
        );
    }

    #[test]
    fn test_match_methods_in_order() {
        let m = matcher();
        assert_eq!(m.match_part("nh").method, Some(MatchMethod::Code));
        assert_eq!(m.match_part("no helmet").method, Some(MatchMethod::Name));

        let w = m.match_part("Driving w/o License");
        assert_eq!(w.code.as_deref(), Some("NL"));
        assert_eq!(w.method, Some(MatchMethod::Name));

        let contains = m.match_part("Reckless");
        assert_eq!(contains.code.as_deref(), Some("RR"));
        assert_eq!(contains.method, Some(MatchMethod::Contains));

        let phonetic = m.match_part("No Helmit");
        assert_eq!(phonetic.code.as_deref(), Some("NH"));
        assert_eq!(phonetic.method, Some(MatchMethod::Phonetic));

        let fuzzy = m.match_part("Abstruction");
        assert_eq!(fuzzy.code.as_deref(), Some("OBS"));
        assert_eq!(fuzzy.method, Some(MatchMethod::Fuzzy));
    }

    #[test]
    fn test_ambiguous_and_unknown() {
        let m = matcher();
        // "driving" is in two names
        assert!(m.match_part("Driving").code.is_none());
        assert!(m.match_part("Jaywalking").code.is_none());
        assert!(m.match_part("Jaywalking").describe().contains("no match"));
    }
}
