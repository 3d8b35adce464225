//! Collection statistics for a period.

use crate::error::Result;
use rusqlite::Connection;
use serde::Serialize;

/// Count and sum for one grouping key.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Bucket {
    pub key: String,
    pub count: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStats {
    pub from: Option<i64>,
    pub to: Option<i64>,
    /// Sum of completed payments
    pub collected: i64,
    pub refunded: i64,
    pub voided_count: i64,
    pub pending_print_count: i64,
    pub by_status: Vec<Bucket>,
    /// Completed payments only
    pub by_method: Vec<Bucket>,
    /// Completed payments only
    pub by_cashier: Vec<Bucket>,
}

pub struct PaymentStatistics<'c> {
    conn: &'c Connection,
}

impl<'c> PaymentStatistics<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn buckets(&self, column: &str, completed_only: bool, from: Option<i64>, to: Option<i64>) -> Result<Vec<Bucket>> {
        let sql = format!(
            "SELECT {column}, COUNT(*), COALESCE(SUM(amount), 0) FROM payments
             WHERE (?1 IS NULL OR paid_at >= ?1) AND (?2 IS NULL OR paid_at < ?2) {}
             GROUP BY {column} ORDER BY 3 DESC, 1",
            if completed_only { "AND status = 'completed'" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![from, to], |row| {
            Ok(Bucket {
                key: row.get(0)?,
                count: row.get(1)?,
                total: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Payment counts and totals for payments made in `[from, to)`.
    pub fn stats(&self, from: Option<i64>, to: Option<i64>) -> Result<PaymentStats> {
        let by_status = self.buckets("status", false, from, to)?;
        let of = |key: &str| by_status.iter().find(|b| b.key == key).cloned();

        Ok(PaymentStats {
            from,
            to,
            collected: of("completed").map_or(0, |b| b.total),
            refunded: of("refunded").map_or(0, |b| b.total),
            voided_count: of("voided").map_or(0, |b| b.count),
            pending_print_count: of("pending_print").map_or(0, |b| b.count),
            by_method: self.buckets("method", true, from, to)?,
            by_cashier: self.buckets("cashier", true, from, to)?,
            by_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::service::payment::processor::tests::{cash, setup_with_citation};
    use crate::service::payment::processor::PaymentProcessor;

    #[test]
    fn test_stats_split_by_status() {
        let mut storage = setup_with_citation();
        let config = AppConfig::default();
        let mut processor = PaymentProcessor::new(&mut storage, &config);
        processor.record(&cash("0000001"), "maria").unwrap();
        processor.void("0000001", "misprint", "maria").unwrap();
        processor.record(&cash("0000002"), "maria").unwrap();
        processor.confirm_print("0000002", "maria").unwrap();

        let stats = PaymentStatistics::new(storage.conn()).stats(None, None).unwrap();
        assert_eq!(stats.collected, 100_000);
        assert_eq!(stats.voided_count, 1);
        assert_eq!(stats.pending_print_count, 0);
        assert_eq!(
            stats.by_cashier,
            vec![Bucket {
                key: "maria".into(),
                count: 1,
                total: 100_000
            }]
        );

        let future = chrono::Utc::now().timestamp_millis() + 60_000;
        let empty = PaymentStatistics::new(storage.conn()).stats(Some(future), None).unwrap();
        assert_eq!(empty.collected, 0);
        assert!(empty.by_status.is_empty());
    }
}
