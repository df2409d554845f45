//! Service registry - lifecycle of per-registrant health checkers
//!
//! The registry owns a RW-locked map from service name to the health
//! checkers registered under it, plus the exit channel every checker
//! announces its termination on. Registration inserts under the write lock;
//! unregistration only *cancels* the matching checkers - the actual removal
//! always flows through the reaper task, the sole consumer of the exit
//! channel. The lock is never held across an await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::heartbeat::default_http_client;
use crate::model::{RegisterRequest, Registrant, Sample, ServiceInfo};

pub mod aggregator;
pub mod checker;

pub use aggregator::{AggregatorConfig, MetricsAggregator};
pub use checker::{CheckerConfig, HealthChecker, MAX_HEARTBEAT_RETRIES};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid registration: {0}")]
    InvalidArgument(&'static str),
    #[error("Registrant already exists!")]
    AlreadyRegistered,
    #[error("service not found")]
    NotFound,
    #[error("registry is shutting down")]
    ShuttingDown,
}

type CheckerMap = HashMap<String, Vec<HealthChecker>>;

pub struct ServiceRegistry {
    checkers: Arc<RwLock<CheckerMap>>,
    http: reqwest::Client,
    samples_tx: mpsc::Sender<Sample>,
    checker_config: CheckerConfig,
    /// Primary exit-channel sender. Dropped at shutdown; the channel itself
    /// only closes once every checker's clone is gone too, so the reaper
    /// always outlives the last checker.
    exit_tx: Mutex<Option<mpsc::UnboundedSender<Registrant>>>,
    exit_rx: Mutex<Option<mpsc::UnboundedReceiver<Registrant>>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceRegistry {
    /// `samples_tx` is the aggregator's ingestion channel; every checker the
    /// registry spawns forwards its polled samples there.
    pub fn new(
        samples_tx: mpsc::Sender<Sample>,
        checker_config: CheckerConfig,
    ) -> anyhow::Result<Self> {
        let http = default_http_client().context("Failed to create heartbeat HTTP client")?;
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();

        Ok(Self {
            checkers: Arc::new(RwLock::new(HashMap::new())),
            http,
            samples_tx,
            checker_config,
            exit_tx: Mutex::new(Some(exit_tx)),
            exit_rx: Mutex::new(Some(exit_rx)),
            reaper: Mutex::new(None),
        })
    }

    /// Spawn the reaper. Must be called once before checkers can be reaped.
    pub fn start(&self) {
        let Some(exit_rx) = self.exit_rx.lock().unwrap().take() else {
            tracing::warn!("Registry already started");
            return;
        };
        let checkers = Arc::clone(&self.checkers);
        let handle = tokio::spawn(reap(checkers, exit_rx));
        *self.reaper.lock().unwrap() = Some(handle);
    }

    /// Validate and admit a registrant, spawning its health checker.
    pub fn register(&self, request: &RegisterRequest) -> Result<(), RegistryError> {
        if request.service_name.is_empty() {
            return Err(RegistryError::InvalidArgument("service_name is empty"));
        }
        if request.control_address.is_empty() {
            return Err(RegistryError::InvalidArgument("control_address is empty"));
        }
        if request.data_address.is_empty() {
            return Err(RegistryError::InvalidArgument("data_address is empty"));
        }

        let info = Registrant::new(
            &request.service_name,
            &request.control_address,
            &request.data_address,
        );
        tracing::info!("Received register request: {}", info);

        // Admission is atomic with shutdown: the exit sender is only cloned
        // while the checker map's write lock is held, the same lock shutdown
        // holds for its cancel sweep. A register therefore either lands
        // before the sweep (and gets cancelled by it) or observes the taken
        // sender and is refused - never a live checker shutdown missed.
        let mut map = self.checkers.write().unwrap();

        let exit_tx = self
            .exit_tx
            .lock()
            .unwrap()
            .clone()
            .ok_or(RegistryError::ShuttingDown)?;

        if let Some(existing) = map.get(&info.service_name) {
            if existing
                .iter()
                .any(|c| c.info().control_address == info.control_address)
            {
                tracing::info!(
                    "Already registered service={} address={}",
                    info.service_name,
                    info.control_address
                );
                return Err(RegistryError::AlreadyRegistered);
            }
        }

        let checker = HealthChecker::spawn(
            info.clone(),
            self.http.clone(),
            exit_tx,
            self.samples_tx.clone(),
            self.checker_config.clone(),
        );
        map.entry(info.service_name.clone()).or_default().push(checker);

        tracing::info!(
            "Successfully registered service={} address={}",
            info.service_name,
            info.control_address
        );
        Ok(())
    }

    /// Cancel every checker under `service_name` whose control address
    /// matches. Removal happens asynchronously once each checker announces
    /// its exit.
    pub fn unregister(
        &self,
        service_name: &str,
        control_address: &str,
    ) -> Result<(), RegistryError> {
        tracing::info!(
            "Trying to unregister service={} control={}",
            service_name,
            control_address
        );

        let map = self.checkers.read().unwrap();
        let Some(checkers) = map.get(service_name) else {
            return Err(RegistryError::NotFound);
        };

        for checker in checkers {
            if checker.info().control_address == control_address {
                checker.cancel();
            }
        }
        Ok(())
    }

    /// Snapshot of the current membership, service names sorted for stable
    /// output.
    pub fn services(&self) -> Vec<ServiceInfo> {
        let map = self.checkers.read().unwrap();
        let mut services: Vec<ServiceInfo> = map
            .iter()
            .map(|(name, checkers)| ServiceInfo {
                service_name: name.clone(),
                registrants: checkers.iter().map(|c| c.info().clone()).collect(),
            })
            .collect();
        services.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        services
    }

    /// Cancel all checkers, wait for the reaper to drain their exits, and
    /// close the exit channel. After this the registry accepts no new
    /// registrations.
    pub async fn shutdown(&self) {
        {
            // Write lock, even though nothing is mutated here: cancelling and
            // retiring the exit sender must be one atomic step against
            // register(), or a concurrent admission could slip a checker in
            // after the sweep while still holding a live sender clone.
            let map = self.checkers.write().unwrap();
            for checkers in map.values() {
                for checker in checkers {
                    checker.cancel();
                }
            }

            // Drop the primary sender. Each live checker still holds a
            // clone, so the channel stays open exactly until the last of
            // them has emitted.
            self.exit_tx.lock().unwrap().take();
        }

        let reaper = self.reaper.lock().unwrap().take();
        if let Some(handle) = reaper {
            let _ = handle.await;
        }
    }
}

/// Single consumer of the exit channel: removes each announced checker from
/// the map, in emission order.
async fn reap(checkers: Arc<RwLock<CheckerMap>>, mut exit_rx: mpsc::UnboundedReceiver<Registrant>) {
    while let Some(info) = exit_rx.recv().await {
        remove_checker(&checkers, &info);
    }
    tracing::info!("Exit channel closed, reaper stopping");
}

fn remove_checker(checkers: &RwLock<CheckerMap>, info: &Registrant) {
    tracing::info!("Removing health checker for {}", info);

    let mut map = checkers.write().unwrap();
    let Some(list) = map.get_mut(&info.service_name) else {
        tracing::warn!("Skipping removal for unknown service={}", info.service_name);
        return;
    };

    list.retain(|c| c.info().control_address != info.control_address);
    if list.is_empty() {
        map.remove(&info.service_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_registry() -> (ServiceRegistry, mpsc::Receiver<Sample>) {
        // the receiver stays alive for the test's duration so forwarded
        // samples have somewhere to go; nothing here asserts on them
        let (samples_tx, samples_rx) = mpsc::channel(64);
        let registry = ServiceRegistry::new(
            samples_tx,
            CheckerConfig {
                interval: Duration::from_millis(20),
                max_retries: 1,
                poll_attempts: 1,
                poll_base_delay: Duration::from_millis(1),
            },
        )
        .unwrap();
        (registry, samples_rx)
    }

    fn request(service: &str, control: &str) -> RegisterRequest {
        RegisterRequest {
            control_address: control.to_string(),
            data_address: "http://127.0.0.1:10010".to_string(),
            service_name: service.to_string(),
        }
    }

    async fn wait_until_empty(registry: &ServiceRegistry) {
        timeout(WAIT, async {
            while !registry.services().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry never drained");
    }

    #[tokio::test]
    async fn duplicate_register_is_rejected_without_mutating_state() {
        let (registry, _samples_rx) = fast_registry();
        registry.start();

        let req = request("echo", "http://127.0.0.1:1");
        registry.register(&req).unwrap();
        let err = registry.register(&req).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered));

        let services = registry.services();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].registrants.len(), 1);
        assert_eq!(services[0].registrants[0].control_address, req.control_address);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn empty_fields_are_invalid() {
        let (registry, _samples_rx) = fast_registry();

        for req in [
            request("", "http://127.0.0.1:1"),
            request("echo", ""),
            RegisterRequest {
                data_address: String::new(),
                ..request("echo", "http://127.0.0.1:1")
            },
        ] {
            let err = registry.register(&req).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidArgument(_)), "{req:?}");
        }
        assert!(registry.services().is_empty());
    }

    #[tokio::test]
    async fn unregister_unknown_service_is_not_found() {
        let (registry, _samples_rx) = fast_registry();
        let err = registry
            .unregister("ghost", "http://127.0.0.1:1")
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound));
    }

    #[tokio::test]
    async fn unregistered_checker_is_reaped() {
        let (registry, _samples_rx) = fast_registry();
        registry.start();

        let req = request("echo", "http://127.0.0.1:1");
        registry.register(&req).unwrap();
        registry
            .unregister(&req.service_name, &req.control_address)
            .unwrap();

        // the checker exits at its next tick and the reaper removes it,
        // dropping the now-empty service key entirely
        wait_until_empty(&registry).await;

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn failing_registrant_is_reaped_after_budget_exhaustion() {
        let (registry, _samples_rx) = fast_registry();
        registry.start();

        // nothing listens on this port: every poll fails and the budget of 1
        // terminates the checker on its first tick
        registry.register(&request("echo", "http://127.0.0.1:9")).unwrap();
        assert_eq!(registry.services().len(), 1);

        wait_until_empty(&registry).await;

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn same_service_accepts_multiple_control_addresses() {
        let (registry, _samples_rx) = fast_registry();
        registry.start();

        registry.register(&request("echo", "http://127.0.0.1:1")).unwrap();
        registry.register(&request("echo", "http://127.0.0.1:2")).unwrap();

        let services = registry.services();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].registrants.len(), 2);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_every_checker_and_rejects_new_registrations() {
        let (registry, _samples_rx) = fast_registry();
        registry.start();

        registry.register(&request("a", "http://127.0.0.1:1")).unwrap();
        registry.register(&request("b", "http://127.0.0.1:2")).unwrap();

        timeout(WAIT, registry.shutdown()).await.unwrap();
        assert!(registry.services().is_empty());

        let err = registry.register(&request("c", "http://127.0.0.1:3")).unwrap_err();
        assert!(matches!(err, RegistryError::ShuttingDown));
    }
}
