//! Persistence seam for metric summaries
//!
//! The orchestrator only ever talks to [`MetricStore`]; the concrete backend
//! (SQLite, see [`sqlite`]) stays behind the trait so the aggregator and the
//! rollup engine can be exercised against an in-memory double in tests.
//!
//! Three tables share one shape `(metric_id, ts, service_id, min, max, avg)`:
//! `metrics` holds the aggregator's per-minute base summaries, `rollups120`
//! and `rollups300` hold the re-aggregated buckets. Timestamps are stored as
//! unix seconds (UTC, second precision).

use chrono::{DateTime, Utc};

use crate::model::{MetricId, Summary};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// The two rollup targets. Each maps to its own table; widths and cadences
/// belong to the rollup engine, not the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupTable {
    R120,
    R300,
}

impl RollupTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            RollupTable::R120 => "rollups120",
            RollupTable::R300 => "rollups300",
        }
    }
}

/// One row scanned back from the `metrics` table.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub ts: DateTime<Utc>,
    pub service_id: String,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport-level failure talking to the store. Callers log and retry
    /// at their next cadence; nothing above the store layer distinguishes
    /// failure modes further.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Write and scan operations over the three summary tables.
///
/// Scans return eagerly-collected rows in ascending timestamp order; callers
/// consume them in a single forward pass.
pub trait MetricStore: Send + Sync {
    /// Write a batch of base summaries into `metrics` atomically. An empty
    /// batch is a no-op success.
    fn insert_aggregations(&self, summaries: &[Summary]) -> Result<(), StoreError>;

    /// Conditionally insert one row into a rollup table. Succeeds whether or
    /// not the row already existed; a primary-key conflict is not surfaced.
    fn insert_rollup(&self, table: RollupTable, summary: &Summary) -> Result<(), StoreError>;

    /// Rows from `metrics` with `ts > since` for one metric, ascending.
    fn scan_raw(&self, metric: MetricId, since: DateTime<Utc>) -> Result<Vec<RawRow>, StoreError>;

    /// Rows from a rollup table with `ts >= since` for one metric, ascending.
    /// Scanned rows carry `count = 0`: the value count is not persisted.
    fn scan_rollup(
        &self,
        table: RollupTable,
        metric: MetricId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Summary>, StoreError>;
}
