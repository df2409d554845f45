//! SQLite-backed metric store
//!
//! Uses a small r2d2 connection pool over a WAL-mode database file. Batch
//! inserts run inside one transaction; rollup inserts use `INSERT OR IGNORE`
//! so replaying a bucket is a no-op at the store.

use std::path::Path;

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::model::{MetricId, Summary};

use super::{MetricStore, RawRow, RollupTable, StoreError};

/// Read connections needed concurrently: the rollup worker plus API queries.
const POOL_SIZE: u32 = 4;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metrics (
    metric_id  TEXT    NOT NULL,
    ts         INTEGER NOT NULL,
    service_id TEXT    NOT NULL,
    min        REAL    NOT NULL,
    max        REAL    NOT NULL,
    avg        REAL    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_metrics_metric_ts ON metrics (metric_id, ts);

CREATE TABLE IF NOT EXISTS rollups120 (
    metric_id  TEXT    NOT NULL,
    ts         INTEGER NOT NULL,
    service_id TEXT    NOT NULL,
    min        REAL    NOT NULL,
    max        REAL    NOT NULL,
    avg        REAL    NOT NULL,
    PRIMARY KEY (metric_id, ts, service_id)
);

CREATE TABLE IF NOT EXISTS rollups300 (
    metric_id  TEXT    NOT NULL,
    ts         INTEGER NOT NULL,
    service_id TEXT    NOT NULL,
    min        REAL    NOT NULL,
    max        REAL    NOT NULL,
    avg        REAL    NOT NULL,
    PRIMARY KEY (metric_id, ts, service_id)
);
";

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            // WAL lets the rollup scans run while the aggregator flushes
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(())
        });
        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;

        let conn = pool.get()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self { pool })
    }
}

impl MetricStore for SqliteStore {
    fn insert_aggregations(&self, summaries: &[Summary]) -> Result<(), StoreError> {
        if summaries.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO metrics (metric_id, ts, service_id, min, max, avg)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for summary in summaries {
                stmt.execute(params![
                    summary.metric_id.as_str(),
                    summary.ts.timestamp(),
                    summary.service_id,
                    summary.min,
                    summary.max,
                    summary.avg,
                ])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    fn insert_rollup(&self, table: RollupTable, summary: &Summary) -> Result<(), StoreError> {
        // Table names are the static strings from RollupTable, never input.
        let sql = format!(
            "INSERT OR IGNORE INTO {} (metric_id, ts, service_id, min, max, avg)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            table.table_name()
        );

        let conn = self.pool.get()?;
        conn.execute(
            &sql,
            params![
                summary.metric_id.as_str(),
                summary.ts.timestamp(),
                summary.service_id,
                summary.min,
                summary.max,
                summary.avg,
            ],
        )?;

        Ok(())
    }

    fn scan_raw(&self, metric: MetricId, since: DateTime<Utc>) -> Result<Vec<RawRow>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT ts, service_id, min, max, avg FROM metrics
             WHERE metric_id = ?1 AND ts > ?2
             ORDER BY ts ASC",
        )?;

        let rows = stmt
            .query_map(params![metric.as_str(), since.timestamp()], |row| {
                Ok(RawRow {
                    ts: DateTime::from_timestamp(row.get(0)?, 0).unwrap_or_default(),
                    service_id: row.get(1)?,
                    min: row.get(2)?,
                    max: row.get(3)?,
                    avg: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn scan_rollup(
        &self,
        table: RollupTable,
        metric: MetricId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Summary>, StoreError> {
        let sql = format!(
            "SELECT metric_id, ts, service_id, min, max, avg FROM {}
             WHERE metric_id = ?1 AND ts >= ?2
             ORDER BY ts ASC",
            table.table_name()
        );

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt
            .query_map(params![metric.as_str(), since.timestamp()], |row| {
                Ok(Summary {
                    metric_id: metric,
                    ts: DateTime::from_timestamp(row.get(1)?, 0).unwrap_or_default(),
                    service_id: row.get(2)?,
                    min: row.get(3)?,
                    max: row.get(4)?,
                    avg: row.get(5)?,
                    count: 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("metrics.db")).unwrap();
        (dir, store)
    }

    fn summary(metric: MetricId, service: &str, ts: i64, value: f64) -> Summary {
        Summary::seed(metric, service, Utc.timestamp_opt(ts, 0).unwrap(), value)
    }

    #[test]
    fn empty_batch_is_a_noop_success() {
        let (_dir, store) = open_store();
        store.insert_aggregations(&[]).unwrap();
        let rows = store
            .scan_raw(MetricId::Cpu, Utc.timestamp_opt(0, 0).unwrap())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn raw_scan_is_strict_and_ascending() {
        let (_dir, store) = open_store();
        store
            .insert_aggregations(&[
                summary(MetricId::Cpu, "s", 300, 3.0),
                summary(MetricId::Cpu, "s", 100, 1.0),
                summary(MetricId::Cpu, "s", 200, 2.0),
                // other metrics must not leak into the scan
                summary(MetricId::Mem, "s", 150, 9.0),
            ])
            .unwrap();

        let rows = store
            .scan_raw(MetricId::Cpu, Utc.timestamp_opt(100, 0).unwrap())
            .unwrap();
        // ts > 100: the row at exactly 100 is excluded
        let timestamps: Vec<i64> = rows.iter().map(|r| r.ts.timestamp()).collect();
        assert_eq!(timestamps, vec![200, 300]);
    }

    #[test]
    fn scan_past_all_data_returns_empty() {
        let (_dir, store) = open_store();
        store
            .insert_aggregations(&[summary(MetricId::Cpu, "s", 100, 1.0)])
            .unwrap();
        let rows = store
            .scan_raw(MetricId::Cpu, Utc.timestamp_opt(10_000, 0).unwrap())
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn rollup_insert_is_idempotent() {
        let (_dir, store) = open_store();
        let row = summary(MetricId::Cpu, "s", 120, 20.0);

        store.insert_rollup(RollupTable::R120, &row).unwrap();
        // same primary key again: conflict suppressed, still one row
        let mut replay = row.clone();
        replay.avg = 99.0;
        store.insert_rollup(RollupTable::R120, &replay).unwrap();

        let rows = store
            .scan_rollup(
                RollupTable::R120,
                MetricId::Cpu,
                Utc.timestamp_opt(0, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].avg, 20.0);
    }

    #[test]
    fn rollup_scan_is_inclusive_of_since() {
        let (_dir, store) = open_store();
        store
            .insert_rollup(RollupTable::R300, &summary(MetricId::Cpu, "s", 0, 1.0))
            .unwrap();
        store
            .insert_rollup(RollupTable::R300, &summary(MetricId::Cpu, "s", 300, 2.0))
            .unwrap();

        let all = store
            .scan_rollup(
                RollupTable::R300,
                MetricId::Cpu,
                Utc.timestamp_opt(0, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(all.len(), 2);

        let later = store
            .scan_rollup(
                RollupTable::R300,
                MetricId::Cpu,
                Utc.timestamp_opt(1, 0).unwrap(),
            )
            .unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].ts.timestamp(), 300);
        // the value count is not persisted
        assert_eq!(later[0].count, 0);
    }

    #[test]
    fn rollup_tables_are_independent() {
        let (_dir, store) = open_store();
        store
            .insert_rollup(RollupTable::R120, &summary(MetricId::Cpu, "s", 120, 1.0))
            .unwrap();
        let rows = store
            .scan_rollup(
                RollupTable::R300,
                MetricId::Cpu,
                Utc.timestamp_opt(0, 0).unwrap(),
            )
            .unwrap();
        assert!(rows.is_empty());
    }
}
