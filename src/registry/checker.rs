//! Per-registrant health-check worker
//!
//! Each registrant gets one task that ticks on a wall-clock interval, polls
//! the sidecar through the heartbeat client, and forwards the returned
//! samples to the aggregator. The worker self-terminates when its retry
//! budget runs out or when it observes a cancel at a tick boundary, and it
//! always announces itself on the registry's exit channel exactly once
//! before exiting - that send is what lets the reaper remove it.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::heartbeat::HeartbeatClient;
use crate::model::{Registrant, Sample};

/// Consecutive failed polls tolerated before the checker terminates.
pub const MAX_HEARTBEAT_RETRIES: u32 = 1;

/// Wall-clock cadence between polls.
const TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Knobs for one checker. Production uses the defaults; tests shrink the
/// cadence and the client's in-call retry policy.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub interval: Duration,
    pub max_retries: u32,
    pub poll_attempts: u32,
    pub poll_base_delay: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            interval: TICK_INTERVAL,
            max_retries: MAX_HEARTBEAT_RETRIES,
            poll_attempts: 4,
            poll_base_delay: Duration::from_millis(500),
        }
    }
}

/// Handle to a running checker. The worker owns all of its state; the
/// handle only carries the registrant identity and the cancel slot.
pub struct HealthChecker {
    info: Registrant,
    cancel_tx: mpsc::Sender<()>,
}

impl HealthChecker {
    /// Construct the checker and start its worker immediately.
    pub fn spawn(
        info: Registrant,
        http: reqwest::Client,
        exit_tx: mpsc::UnboundedSender<Registrant>,
        samples_tx: mpsc::Sender<Sample>,
        config: CheckerConfig,
    ) -> Self {
        // Single-slot cancel signal: observed at the next tick boundary,
        // never mid-poll.
        let (cancel_tx, cancel_rx) = mpsc::channel(1);

        let client = HeartbeatClient::new(http, &info.control_address)
            .with_retry_policy(config.poll_attempts, config.poll_base_delay);

        let worker_info = info.clone();
        tokio::spawn(async move {
            run(worker_info, client, cancel_rx, exit_tx, samples_tx, config).await;
        });

        Self { info, cancel_tx }
    }

    pub fn info(&self) -> &Registrant {
        &self.info
    }

    /// Request termination. The worker still emits on the exit channel, so
    /// removal flows through the reaper like any other exit.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }
}

async fn run(
    info: Registrant,
    client: HeartbeatClient,
    mut cancel_rx: mpsc::Receiver<()>,
    exit_tx: mpsc::UnboundedSender<Registrant>,
    samples_tx: mpsc::Sender<Sample>,
    config: CheckerConfig,
) {
    tracing::info!("Starting healthcheck for {}", info);

    let mut ticker = tokio::time::interval(config.interval);
    // the interval fires immediately once; consume it so the first poll
    // lands one full interval after construction
    ticker.tick().await;

    let mut retries = config.max_retries;
    loop {
        tokio::select! {
            _ = cancel_rx.recv() => {
                tracing::info!("Cancelling healthcheck for {}", info);
                break;
            }
            _ = ticker.tick() => {
                match client.heartbeat().await {
                    Ok(reply) => {
                        retries = config.max_retries;
                        forward_samples(&info, reply.stats.iter().flat_map(|s| s.samples()), &samples_tx);
                    }
                    Err(err) => {
                        retries = retries.saturating_sub(1);
                        tracing::warn!(
                            "Heartbeat failed for {} (retries remaining={}): {}",
                            info, retries, err
                        );
                        if retries == 0 {
                            break;
                        }
                    }
                }
            }
        }
    }

    tracing::info!("Stopping healthcheck for {}", info);
    // guaranteed exactly-once: this is the only send, and the registry keeps
    // the channel open until every checker is gone
    if exit_tx.send(info).is_err() {
        tracing::debug!("Registry gone before checker exit could be reported");
    }
}

/// Best-effort hand-off into the aggregator: the ingestion channel is
/// bounded, and a full channel drops the sample rather than stalling the
/// poll loop.
fn forward_samples(
    info: &Registrant,
    samples: impl Iterator<Item = Sample>,
    samples_tx: &mpsc::Sender<Sample>,
) {
    for sample in samples {
        if samples_tx.try_send(sample).is_err() {
            tracing::warn!("Aggregator channel full, dropping samples from {}", info);
            return;
        }
    }
}
