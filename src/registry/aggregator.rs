//! Metrics aggregator - single-writer fold over the sample stream
//!
//! One worker task owns the summaries map outright: samples arrive over a
//! bounded mpsc channel, a flush ticker swaps the live map for an empty one
//! and writes the batch, and a shutdown signal ends the loop. Because the
//! worker is the only writer, ingestion and flushing can never race.
//!
//! A flush that fails at the store is logged and its batch discarded - the
//! map was already swapped, and retaining batches across flushes would grow
//! without bound during a store outage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::model::{MetricId, Sample, Summary};
use crate::store::MetricStore;

/// Bounded ingestion capacity; producers drop (try_send) when full.
const INGEST_CAPACITY: usize = 10_000;

/// Wall-clock flush cadence.
const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub flush_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            flush_interval: FLUSH_INTERVAL,
            channel_capacity: INGEST_CAPACITY,
        }
    }
}

pub struct MetricsAggregator {
    samples_tx: mpsc::Sender<Sample>,
    done_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl MetricsAggregator {
    /// Spawn the worker. It runs until [`stop`](Self::stop) or until every
    /// sample sender is gone.
    pub fn start(store: Arc<dyn MetricStore>, config: AggregatorConfig) -> Self {
        let (samples_tx, samples_rx) = mpsc::channel(config.channel_capacity);
        let (done_tx, done_rx) = oneshot::channel();

        let handle = tokio::spawn(run(store, samples_rx, done_rx, config.flush_interval));

        Self {
            samples_tx,
            done_tx,
            handle,
        }
    }

    /// Ingestion handle for producers (health checkers). Send is expected to
    /// be `try_send`: the channel is the back-pressure boundary.
    pub fn sample_sender(&self) -> mpsc::Sender<Sample> {
        self.samples_tx.clone()
    }

    /// Signal the worker and wait for it to exit. Samples still queued are
    /// not drained; the in-memory table is abandoned unflushed.
    pub async fn stop(self) {
        let _ = self.done_tx.send(());
        let _ = self.handle.await;
    }
}

type SummaryKey = (String, MetricId);

async fn run(
    store: Arc<dyn MetricStore>,
    mut samples_rx: mpsc::Receiver<Sample>,
    mut done_rx: oneshot::Receiver<()>,
    flush_interval: Duration,
) {
    let mut summaries: HashMap<SummaryKey, Summary> = HashMap::new();

    let mut ticker = tokio::time::interval(flush_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut done_rx => {
                tracing::info!("Aggregator stopping");
                break;
            }
            _ = ticker.tick() => {
                flush(store.as_ref(), &mut summaries);
            }
            sample = samples_rx.recv() => match sample {
                Some(sample) => fold(&mut summaries, sample),
                // every producer is gone; nothing more will ever arrive
                None => break,
            }
        }
    }
}

fn fold(summaries: &mut HashMap<SummaryKey, Summary>, sample: Sample) {
    let key = (sample.service_id.clone(), sample.metric_id);
    match summaries.get_mut(&key) {
        Some(summary) => summary.fold(sample.value, sample.value, sample.value),
        None => {
            summaries.insert(
                key,
                Summary::seed(
                    sample.metric_id,
                    &sample.service_id,
                    sample.ts,
                    sample.value,
                ),
            );
        }
    }
}

/// Swap the live table for an empty one, then write the batch. A flush with
/// nothing accumulated performs no store call at all.
fn flush(store: &dyn MetricStore, summaries: &mut HashMap<SummaryKey, Summary>) {
    if summaries.is_empty() {
        return;
    }

    let batch: Vec<Summary> = std::mem::take(summaries).into_values().collect();
    tracing::info!("Storing {} metric aggregations", batch.len());

    if let Err(err) = store.insert_aggregations(&batch) {
        tracing::warn!("Failed to store aggregations, discarding batch: {}", err);
    }
}
