//! Rollup engine - re-aggregates raw summaries into fixed-width buckets
//!
//! One worker task runs two tickers: 120 s buckets every two minutes and
//! 300 s buckets every five. Each round scans the last ten minutes of raw
//! rows per metric, folds them per service into bucket-aligned summaries,
//! and writes a summary out the moment a later bucket shows up for its key.
//! The sink is a conditional insert, so re-reading the same window on the
//! next round (or after a crash) never duplicates a row.
//!
//! The trailing bucket per key is deliberately left unflushed at scan
//! exhaustion: it may still accrue raw rows, and it stays inside the
//! lookback window until a later bucket closes it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::model::{MetricId, Summary};
use crate::store::{MetricStore, RollupTable, StoreError};

/// How far back each rollup pass re-reads raw rows.
const LOOKBACK: Duration = Duration::from_secs(600);

const WIDTH_120: i64 = 120;
const WIDTH_300: i64 = 300;

#[derive(Debug, Clone)]
pub struct RollupConfig {
    pub lookback: Duration,
    pub cadence_120: Duration,
    pub cadence_300: Duration,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            lookback: LOOKBACK,
            cadence_120: Duration::from_secs(120),
            cadence_300: Duration::from_secs(300),
        }
    }
}

pub struct RollupEngine {
    done_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl RollupEngine {
    pub fn start(store: Arc<dyn MetricStore>, config: RollupConfig) -> Self {
        let (done_tx, done_rx) = oneshot::channel();
        let handle = tokio::spawn(run(store, done_rx, config));
        Self { done_tx, handle }
    }

    /// Stop ticking and wait for the worker. An in-flight round completes.
    pub async fn stop(self) {
        let _ = self.done_tx.send(());
        let _ = self.handle.await;
    }
}

async fn run(store: Arc<dyn MetricStore>, mut done_rx: oneshot::Receiver<()>, config: RollupConfig) {
    let mut ticker_120 = tokio::time::interval(config.cadence_120);
    let mut ticker_300 = tokio::time::interval(config.cadence_300);
    ticker_120.tick().await;
    ticker_300.tick().await;

    loop {
        tokio::select! {
            _ = &mut done_rx => {
                tracing::info!("Rollup engine stopping");
                break;
            }
            _ = ticker_120.tick() => {
                run_round(store.as_ref(), RollupTable::R120, WIDTH_120, config.lookback);
            }
            _ = ticker_300.tick() => {
                run_round(store.as_ref(), RollupTable::R300, WIDTH_300, config.lookback);
            }
        }
    }
}

/// One cadence firing: a rollup pass per metric. A failed pass is logged and
/// skipped - the next round re-covers its window.
fn run_round(store: &dyn MetricStore, table: RollupTable, width: i64, lookback: Duration) {
    tracing::info!("Running {} rollup", table.table_name());
    let since = Utc::now() - chrono::Duration::from_std(lookback).unwrap_or(chrono::Duration::zero());

    for metric in MetricId::ALL {
        if let Err(err) = run_rollup(store, metric, width, table, since) {
            tracing::warn!(
                "Rollup pass failed for metric={} table={}: {}",
                metric,
                table.table_name(),
                err
            );
        }
    }
}

/// Fold raw rows (ascending ts) into `width`-second buckets per service.
///
/// A key's summary is flushed when a row from a later bucket arrives for
/// that key; its stored timestamp is the bucket origin `bucket * width`.
/// Returns the number of rows flushed.
pub(crate) fn run_rollup(
    store: &dyn MetricStore,
    metric: MetricId,
    width: i64,
    table: RollupTable,
    since: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let rows = store.scan_raw(metric, since)?;

    let mut summaries: HashMap<String, Summary> = HashMap::new();
    let mut latest_bucket: HashMap<String, i64> = HashMap::new();
    let mut flushed = 0;

    for row in rows {
        let bucket = row.ts.timestamp() / width;

        if let Some(&previous) = latest_bucket.get(&row.service_id) {
            if previous < bucket {
                if let Some(summary) = summaries.remove(&row.service_id) {
                    store.insert_rollup(table, &summary)?;
                    flushed += 1;
                }
                latest_bucket.remove(&row.service_id);
            }
        }

        match summaries.get_mut(&row.service_id) {
            // the row's avg feeds the mean; its own extremes merge into ours
            Some(summary) => summary.fold(row.avg, row.min, row.max),
            None => {
                latest_bucket.insert(row.service_id.clone(), bucket);
                summaries.insert(
                    row.service_id.clone(),
                    Summary {
                        metric_id: metric,
                        ts: DateTime::from_timestamp(bucket * width, 0).unwrap_or_default(),
                        service_id: row.service_id.clone(),
                        min: row.min,
                        max: row.max,
                        avg: row.avg,
                        count: 1,
                    },
                );
            }
        }
    }

    Ok(flushed)
}
