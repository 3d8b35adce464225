//! Date-ranged reports over citations and payments.
//!
//! Citation figures are bounded by apprehension time; collection figures
//! by the time a payment completed. Void and dismissed citations are left
//! out of every fine total.

use crate::error::Result;
use rusqlite::Connection;
use serde::Serialize;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Half-open `[from, to)` range in Unix milliseconds; `None` is unbounded.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DateRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub range: DateRange,
    pub total_citations: i64,
    pub by_status: Vec<StatusCount>,
    pub fines_assessed: i64,
    pub collected: i64,
    pub outstanding: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViolationStat {
    pub code: String,
    pub name: String,
    pub count: i64,
    pub fines: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Month,
}

impl Period {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" => Some(Self::Day),
            "month" | "monthly" => Some(Self::Month),
            _ => None,
        }
    }

    const fn strftime(self) -> &'static str {
        match self {
            Self::Day => "%Y-%m-%d",
            Self::Month => "%Y-%m",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionRow {
    pub period: String,
    pub count: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OffenderRow {
    pub driver_id: String,
    pub driver_name: String,
    pub license_number: Option<String>,
    pub citations: i64,
    pub total_fines: i64,
    pub outstanding: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfficerRow {
    pub officer: String,
    pub citations: i64,
    pub fines: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgingBucket {
    pub bucket: &'static str,
    pub citations: i64,
    pub balance: i64,
}

pub struct ReportService<'c> {
    conn: &'c Connection,
}

impl<'c> ReportService<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn summary(&self, range: DateRange) -> Result<Summary> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM citations
             WHERE (?1 IS NULL OR apprehended_at >= ?1) AND (?2 IS NULL OR apprehended_at < ?2)
             GROUP BY status ORDER BY status",
        )?;
        let by_status: Vec<StatusCount> = stmt
            .query_map(rusqlite::params![range.from, range.to], |row| {
                Ok(StatusCount {
                    status: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        let (fines_assessed, outstanding): (i64, i64) = self.conn.query_row(
            "SELECT COALESCE(SUM(b.total_fine), 0),
                    COALESCE(SUM(CASE WHEN c.status IN ('pending', 'contested')
                                      THEN MAX(b.total_fine - b.amount_paid, 0) ELSE 0 END), 0)
             FROM citations c JOIN citation_balances b ON b.citation_id = c.id
             WHERE c.status NOT IN ('void', 'dismissed')
               AND (?1 IS NULL OR c.apprehended_at >= ?1) AND (?2 IS NULL OR c.apprehended_at < ?2)",
            rusqlite::params![range.from, range.to],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let collected: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM payments
             WHERE status = 'completed'
               AND (?1 IS NULL OR completed_at >= ?1) AND (?2 IS NULL OR completed_at < ?2)",
            rusqlite::params![range.from, range.to],
            |row| row.get(0),
        )?;

        Ok(Summary {
            range,
            total_citations: by_status.iter().map(|s| s.count).sum(),
            by_status,
            fines_assessed,
            collected,
            outstanding,
        })
    }

    /// Most cited violation types.
    pub fn violations(&self, range: DateRange, top: Option<u32>) -> Result<Vec<ViolationStat>> {
        let mut stmt = self.conn.prepare(
            "SELECT vt.code, vt.name, COUNT(*), COALESCE(SUM(v.fine_amount), 0)
             FROM violations v
             JOIN violation_types vt ON vt.id = v.violation_type_id
             JOIN citations c ON c.id = v.citation_id
             WHERE c.status NOT IN ('void', 'dismissed')
               AND (?1 IS NULL OR c.apprehended_at >= ?1) AND (?2 IS NULL OR c.apprehended_at < ?2)
             GROUP BY vt.id
             ORDER BY 3 DESC, 4 DESC, vt.code
             LIMIT ?3",
        )?;
        let limit = top.map_or(-1, i64::from);
        let rows = stmt.query_map(rusqlite::params![range.from, range.to, limit], |row| {
            Ok(ViolationStat {
                code: row.get(0)?,
                name: row.get(1)?,
                count: row.get(2)?,
                fines: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Completed payments grouped by day or month of completion.
    pub fn collections(&self, range: DateRange, period: Period) -> Result<Vec<CollectionRow>> {
        let sql = format!(
            "SELECT strftime('{}', completed_at / 1000, 'unixepoch') AS period,
                    COUNT(*), SUM(amount)
             FROM payments
             WHERE status = 'completed'
               AND (?1 IS NULL OR completed_at >= ?1) AND (?2 IS NULL OR completed_at < ?2)
             GROUP BY period ORDER BY period",
            period.strftime()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![range.from, range.to], |row| {
            Ok(CollectionRow {
                period: row.get(0)?,
                count: row.get(1)?,
                total: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Drivers with at least `min_citations` counted citations.
    pub fn offenders(&self, range: DateRange, min_citations: u32) -> Result<Vec<OffenderRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.last_name || ', ' || d.first_name, d.license_number,
                    COUNT(*), SUM(b.total_fine),
                    SUM(CASE WHEN c.status IN ('pending', 'contested')
                             THEN MAX(b.total_fine - b.amount_paid, 0) ELSE 0 END)
             FROM citations c
             JOIN drivers d ON d.id = c.driver_id
             JOIN citation_balances b ON b.citation_id = c.id
             WHERE c.status NOT IN ('void', 'dismissed')
               AND (?1 IS NULL OR c.apprehended_at >= ?1) AND (?2 IS NULL OR c.apprehended_at < ?2)
             GROUP BY d.id
             HAVING COUNT(*) >= ?3
             ORDER BY 4 DESC, 5 DESC, 2",
        )?;
        let rows = stmt.query_map(rusqlite::params![range.from, range.to, min_citations], |row| {
            Ok(OffenderRow {
                driver_id: row.get(0)?,
                driver_name: row.get(1)?,
                license_number: row.get(2)?,
                citations: row.get(3)?,
                total_fines: row.get(4)?,
                outstanding: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Citations and fines per apprehending officer.
    pub fn officers(&self, range: DateRange) -> Result<Vec<OfficerRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(NULLIF(TRIM(c.officer), ''), '(unknown)') AS officer,
                    COUNT(*), COALESCE(SUM(b.total_fine), 0)
             FROM citations c JOIN citation_balances b ON b.citation_id = c.id
             WHERE c.status NOT IN ('void', 'dismissed')
               AND (?1 IS NULL OR c.apprehended_at >= ?1) AND (?2 IS NULL OR c.apprehended_at < ?2)
             GROUP BY officer
             ORDER BY 2 DESC, 1",
        )?;
        let rows = stmt.query_map(rusqlite::params![range.from, range.to], |row| {
            Ok(OfficerRow {
                officer: row.get(0)?,
                citations: row.get(1)?,
                fines: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Outstanding balances of pending citations by age at `now`.
    pub fn aging(&self, now: i64) -> Result<Vec<AgingBucket>> {
        let mut buckets = vec![
            AgingBucket { bucket: "0-30", citations: 0, balance: 0 },
            AgingBucket { bucket: "31-60", citations: 0, balance: 0 },
            AgingBucket { bucket: "61-90", citations: 0, balance: 0 },
            AgingBucket { bucket: "90+", citations: 0, balance: 0 },
        ];

        let mut stmt = self.conn.prepare(
            "SELECT c.apprehended_at, b.total_fine - b.amount_paid
             FROM citations c JOIN citation_balances b ON b.citation_id = c.id
             WHERE c.status = 'pending' AND b.total_fine > b.amount_paid",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (at, balance) = row?;
            let days = (now - at).max(0) / DAY_MS;
            let slot = match days {
                0..=30 => 0,
                31..=60 => 1,
                61..=90 => 2,
                _ => 3,
            };
            buckets[slot].citations += 1;
            buckets[slot].balance += balance;
        }
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::service::citation::tests::new_citation;
    use crate::service::citation::CitationService;
    use crate::service::fines::tests::seed_schedule;
    use crate::service::payment::processor::tests::cash;
    use crate::service::payment::PaymentService;
    use crate::storage::SqliteStorage;

    fn seeded() -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        seed_schedule(storage.conn());
        let mut citations = CitationService::new(&mut storage);
        citations.create(&new_citation("T-1", DAY_MS, &["NH"]), "enc").unwrap();
        citations.create(&new_citation("T-2", 50 * DAY_MS, &["NH", "NL"]), "enc").unwrap();
        citations.create(&new_citation("T-3", 100 * DAY_MS, &["NL"]), "enc").unwrap();
        citations.change_status("T-3", "void", Some("duplicate entry"), "enc").unwrap();
        storage
    }

    #[test]
    fn test_summary_and_violation_ranking() {
        let mut storage = seeded();
        let config = AppConfig::default();
        let mut payments = PaymentService::new(&mut storage, &config);
        payments.record(&cash("0000001"), "maria").unwrap();
        payments.confirm_print("0000001", "maria").unwrap();

        let reports = ReportService::new(storage.conn());
        let summary = reports.summary(DateRange::default()).unwrap();
        assert_eq!(summary.total_citations, 3);
        // T-1 NH 1st 1,000 + T-2 NH 2nd 1,500 + NL 1st 3,000
        assert_eq!(summary.fines_assessed, 550_000);
        assert_eq!(summary.collected, 100_000);
        assert_eq!(summary.outstanding, 450_000);

        let top = reports.violations(DateRange::default(), Some(1)).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].code, "NH");
        assert_eq!(top[0].count, 2);

        let early = DateRange { from: None, to: Some(10 * DAY_MS) };
        assert_eq!(reports.summary(early).unwrap().total_citations, 1);
    }

    #[test]
    fn test_offenders_officers_and_aging() {
        let storage = seeded();
        let reports = ReportService::new(storage.conn());

        let offenders = reports.offenders(DateRange::default(), 2).unwrap();
        assert_eq!(offenders.len(), 1);
        assert_eq!(offenders[0].citations, 2);
        assert!(reports.offenders(DateRange::default(), 3).unwrap().is_empty());

        let officers = reports.officers(DateRange::default()).unwrap();
        assert_eq!(officers[0].officer, "PO1 Santos");
        assert_eq!(officers[0].citations, 2);

        let aging = reports.aging(75 * DAY_MS).unwrap();
        assert_eq!(aging[0].citations, 1); // T-2, 25 days
        assert_eq!(aging[3].citations, 0);
        assert_eq!(aging[2].citations, 1); // T-1, 74 days
        assert_eq!(aging[2].balance, 100_000);
    }

    #[test]
    fn test_collections_grouping() {
        let mut storage = seeded();
        let config = AppConfig::default();
        let mut payments = PaymentService::new(&mut storage, &config);
        payments.record(&cash("0000001"), "maria").unwrap();
        payments.confirm_print("0000001", "maria").unwrap();

        let reports = ReportService::new(storage.conn());
        let days = reports.collections(DateRange::default(), Period::Day).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].total, 100_000);
        assert_eq!(days[0].period.len(), 10);
        let months = reports.collections(DateRange::default(), Period::Month).unwrap();
        assert_eq!(months[0].period.len(), 7);
        assert_eq!(Period::parse("Monthly"), Some(Period::Month));
    }
}
