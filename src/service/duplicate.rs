//! Driver duplicate detection.
//!
//! Scores a probe (a driver being entered or imported) against existing
//! driver records:
//!
//! | score | confidence | rule |
//! |------:|------------|------|
//! | 100 | exact | same license number |
//! | 95 | exact | same name and birth date |
//! | 85 | likely | same phonetic key and birth date |
//! | 75 | likely | full name within edit distance 2, same birth date |
//! | 70 | likely | same name, birth date unknown on either side |
//! | 50 | possible | same phonetic key only |

use crate::error::Result;
use crate::model::driver::name_key;
use crate::model::{Driver, NewDriver};
use crate::validate::{levenshtein_distance, normalize_license, normalize_name};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Scores at or above this are treated as the same person unless forced.
pub const LIKELY_SCORE: u8 = 70;

/// How sure a match is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Possible,
    Likely,
    Exact,
}

impl Confidence {
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            95.. => Self::Exact,
            LIKELY_SCORE.. => Self::Likely,
            _ => Self::Possible,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Possible => "possible",
            Self::Likely => "likely",
            Self::Exact => "exact",
        }
    }
}

/// An existing driver that may be the probe.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCandidate {
    pub driver: Driver,
    pub score: u8,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
}

/// Two existing records that look like the same person.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    pub first: Driver,
    pub second: Driver,
    pub score: u8,
    pub confidence: Confidence,
    pub reasons: Vec<String>,
}

/// Normalized comparison view of a driver or probe.
struct Identity {
    license: Option<String>,
    last: String,
    first: String,
    middle: Option<String>,
    birth: Option<String>,
    key: String,
}

impl Identity {
    fn from_probe(probe: &NewDriver) -> Self {
        let last = normalize_name(&probe.last_name);
        let first = normalize_name(&probe.first_name);
        Self {
            license: probe.license_number.as_deref().and_then(normalize_license),
            key: name_key(&last, &first),
            middle: probe
                .middle_name
                .as_deref()
                .map(normalize_name)
                .filter(|m| !m.is_empty()),
            birth: probe.birth_date.clone().filter(|b| !b.is_empty()),
            last,
            first,
        }
    }

    fn from_driver(driver: &Driver) -> Self {
        Self {
            license: driver.license_number.clone(),
            last: driver.last_name.clone(),
            first: driver.first_name.clone(),
            middle: driver.middle_name.clone(),
            birth: driver.birth_date.clone(),
            key: driver.name_key.clone(),
        }
    }

    fn same_name(&self, other: &Self) -> bool {
        let middles_agree = match (&self.middle, &other.middle) {
            (Some(a), Some(b)) => {
                a == b || (a.chars().next() == b.chars().next() && (a.len() == 1 || b.len() == 1))
            }
            _ => true,
        };
        self.last == other.last && self.first == other.first && middles_agree
    }

    fn full_name(&self) -> String {
        format!("{} {}", self.first, self.last)
    }
}

/// Score two identities; `None` when nothing links them.
fn score(a: &Identity, b: &Identity) -> Option<(u8, Vec<String>)> {
    if let (Some(la), Some(lb)) = (&a.license, &b.license) {
        if la == lb {
            return Some((100, vec!["license number matches".to_string()]));
        }
    }

    let same_birth = matches!((&a.birth, &b.birth), (Some(x), Some(y)) if x == y);
    let birth_unknown = a.birth.is_none() || b.birth.is_none();
    let same_name = a.same_name(b);

    if same_name && same_birth {
        return Some((95, vec!["same name".into(), "same birth date".into()]));
    }
    if a.key == b.key && same_birth {
        return Some((85, vec!["name sounds alike".into(), "same birth date".into()]));
    }
    if same_birth {
        let distance = levenshtein_distance(&a.full_name(), &b.full_name());
        if distance <= 2 {
            return Some((
                75,
                vec![format!("name differs by {distance} letter(s)"), "same birth date".into()],
            ));
        }
    }
    if same_name && birth_unknown {
        return Some((70, vec!["same name".into(), "birth date unknown".into()]));
    }
    if a.key == b.key {
        return Some((50, vec!["name sounds alike".into()]));
    }
    None
}

/// Finds existing drivers that may be the same person.
pub struct DuplicateDetectionService<'c> {
    conn: &'c Connection,
}

impl<'c> DuplicateDetectionService<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Rank existing (unmerged) drivers against a probe, best first.
    pub fn find_candidates(&self, probe: &NewDriver) -> Result<Vec<DuplicateCandidate>> {
        let probe = Identity::from_probe(probe);
        self.rank(&probe, None)
    }

    /// Rank other drivers against an existing driver.
    pub fn candidates_for(&self, driver: &Driver) -> Result<Vec<DuplicateCandidate>> {
        self.rank(&Identity::from_driver(driver), Some(&driver.id))
    }

    fn rank(&self, probe: &Identity, exclude: Option<&str>) -> Result<Vec<DuplicateCandidate>> {
        let sql = format!(
            "SELECT {} FROM drivers
             WHERE merged_into IS NULL
               AND id != COALESCE(?5, '')
               AND ((?1 IS NOT NULL AND license_number = ?1)
                    OR name_key = ?2
                    OR (?3 IS NOT NULL AND birth_date = ?3)
                    OR last_name = ?4)",
            Driver::COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let pool = stmt
            .query_map(
                rusqlite::params![probe.license, probe.key, probe.birth, probe.last, exclude],
                Driver::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut candidates: Vec<DuplicateCandidate> = pool
            .into_iter()
            .filter_map(|driver| {
                let (score, reasons) = score(probe, &Identity::from_driver(&driver))?;
                Some(DuplicateCandidate {
                    driver,
                    score,
                    confidence: Confidence::from_score(score),
                    reasons,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.driver.created_at.cmp(&b.driver.created_at))
        });
        debug!(key = %probe.key, found = candidates.len(), "Duplicate candidates ranked");
        Ok(candidates)
    }

    /// All pairs of unmerged drivers at `Likely` confidence or above.
    ///
    /// Drivers are grouped by phonetic key and each group is compared
    /// pairwise; license matches across groups are impossible since
    /// license numbers are unique.
    pub fn scan_duplicates(&self) -> Result<Vec<DuplicatePair>> {
        let sql = format!(
            "SELECT {} FROM drivers WHERE merged_into IS NULL ORDER BY name_key, created_at",
            Driver::COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let drivers = stmt
            .query_map([], Driver::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut groups: HashMap<String, Vec<Driver>> = HashMap::new();
        for driver in drivers {
            groups.entry(driver.name_key.clone()).or_default().push(driver);
        }

        let mut pairs = Vec::new();
        for group in groups.values().filter(|g| g.len() > 1) {
            for (i, a) in group.iter().enumerate() {
                for b in &group[i + 1..] {
                    if let Some((score, reasons)) =
                        score(&Identity::from_driver(a), &Identity::from_driver(b))
                    {
                        if score >= LIKELY_SCORE {
                            pairs.push(DuplicatePair {
                                first: a.clone(),
                                second: b.clone(),
                                score,
                                confidence: Confidence::from_score(score),
                                reasons,
                            });
                        }
                    }
                }
            }
        }

        pairs.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.first.last_name.cmp(&b.first.last_name))
        });
        Ok(pairs)
    }
}
