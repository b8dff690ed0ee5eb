use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::collector::{Collector, CollectorConfig, CollectorKind};
use super::{Error, Message, Result};
use crate::registry::HostRegistry;

pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 100;

/// How long [`CollectorManager::stop`] waits for relays to flush queued messages
/// into a consumer that has stopped reading.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns every collector and merges their outputs into one channel.
///
/// Shutdown order matters: [`Self::stop`] stops every collector first, waits for each
/// relay to forward what its source still holds, and only then releases the merged
/// channel.
#[derive(Debug)]
pub struct CollectorManager {
    registry: Arc<HostRegistry>,
    collectors: BTreeMap<String, Vec<Collector>>,
    output_capacity: usize,
    output: Option<mpsc::Sender<Message>>,
    relay_cancel: CancellationToken,
    relays: Vec<JoinHandle<()>>,
    started: bool,
}

impl CollectorManager {
    pub fn new(registry: Arc<HostRegistry>, output_capacity: usize) -> Self {
        Self {
            registry,
            collectors: BTreeMap::new(),
            output_capacity: output_capacity.max(1),
            output: None,
            relay_cancel: CancellationToken::new(),
            relays: Vec::new(),
            started: false,
        }
    }

    /// Builds one collector per kind for every registered host.
    ///
    /// A host whose registration fails is logged and skipped.
    ///
    /// # Arguments
    ///
    /// * `kinds` - Collector kinds to build per host.
    /// * `template` - Interval and buffer size; the host is filled in per host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NothingRegistered`] if no collector could be built at all.
    pub fn register_all_hosts(
        &mut self,
        kinds: &[CollectorKind],
        template: &CollectorConfig,
    ) -> Result<()> {
        let hosts = self.registry.host_names();
        for host in &hosts {
            if let Err(err) = self.register_collectors(host, kinds, &template.for_host(host)) {
                log::error!(
                    target: "collector manager",
                    "failed registering collectors: host={}, error={}",
                    host,
                    err
                );
            }
        }

        if self.collector_count() == 0 {
            return Err(Error::NothingRegistered {
                attempted: hosts.len(),
            });
        }
        log::info!(
            "Registered {} collector(s) across {} host(s)",
            self.collector_count(),
            self.collectors.len()
        );
        Ok(())
    }

    /// Builds one collector per kind for `host`. Kinds already registered for the host
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager has been started or the host is unknown.
    pub fn register_collectors(
        &mut self,
        host: &str,
        kinds: &[CollectorKind],
        config: &CollectorConfig,
    ) -> Result<()> {
        if self.started {
            return Err(Error::ManagerStarted);
        }
        let connection = self.registry.get(host)?;

        let collectors = self.collectors.entry(host.to_owned()).or_default();
        for &kind in kinds {
            if collectors.iter().any(|collector| collector.kind() == kind) {
                log::warn!("Collector {kind}@{host} is already registered");
                continue;
            }
            let pass = kind.pass(host, connection.client());
            collectors.push(Collector::new(config.for_host(host), pass));
        }
        Ok(())
    }

    /// Starts every collector and returns the merged output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManagerStarted`] if called more than once.
    pub fn start(&mut self, cancel: &CancellationToken) -> Result<mpsc::Receiver<Message>> {
        if self.started {
            return Err(Error::ManagerStarted);
        }
        self.started = true;

        let (tx, rx) = mpsc::channel(self.output_capacity);
        self.relay_cancel = cancel.child_token();

        for collector in self.collectors.values_mut().flatten() {
            match collector.start(cancel) {
                Ok(source) => self.relays.push(tokio::spawn(relay(
                    collector.name().to_owned(),
                    source,
                    tx.clone(),
                    self.relay_cancel.clone(),
                ))),
                Err(err) => log::error!(
                    target: "collector manager",
                    "failed starting collector: collector={}, error={}",
                    collector.name(),
                    err
                ),
            }
        }
        self.output = Some(tx);
        log::info!("Started {} collector(s)", self.relays.len());

        Ok(rx)
    }

    /// Stops every collector, waits for every relay to drain its source, then closes
    /// the merged output.
    ///
    /// Relays still blocked on a full output after [`DRAIN_TIMEOUT`] are cancelled and
    /// drop the rest. Root cancellation skips the wait.
    pub async fn stop(&mut self) {
        futures::future::join_all(
            self.collectors
                .values_mut()
                .flatten()
                .map(|collector| collector.stop()),
        )
        .await;

        // sources are closed now; relays exit once they have forwarded what is queued
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        for mut relay in self.relays.drain(..) {
            let joined = match tokio::time::timeout_at(deadline, &mut relay).await {
                Ok(joined) => joined,
                Err(_) => {
                    if !self.relay_cancel.is_cancelled() {
                        log::warn!(
                            target: "collector manager",
                            "merged output not drained within {}s, dropping the rest",
                            DRAIN_TIMEOUT.as_secs()
                        );
                        self.relay_cancel.cancel();
                    }
                    relay.await
                }
            };
            if let Err(err) = joined {
                log::error!(target: "collector manager", "relay did not exit cleanly: {err}");
            }
        }

        if self.output.take().is_some() {
            log::info!("Collector manager stopped");
        }
    }

    pub fn collector_count(&self) -> usize {
        self.collectors.values().map(Vec::len).sum()
    }

    /// Hosts with at least one registered collector.
    pub fn hosts(&self) -> Vec<&str> {
        self.collectors
            .iter()
            .filter(|(_, collectors)| !collectors.is_empty())
            .map(|(host, _)| host.as_str())
            .collect()
    }
}

/// Forwards one collector's output onto the merged channel until the source closes.
///
/// Forwarding waits for room on the output. Once `cancel` fires it drops instead.
async fn relay(
    name: String,
    source: flume::Receiver<Message>,
    output: mpsc::Sender<Message>,
    cancel: CancellationToken,
) {
    while let Ok(message) = source.recv_async().await {
        if cancel.is_cancelled() {
            if let Err(err) = output.try_send(message) {
                log::warn!(
                    target: "collector manager",
                    "dropped message on shutdown: collector={}, error={}",
                    name,
                    err
                );
            }
            continue;
        }

        tokio::select! {
            biased;
            sent = output.send(message) => {
                if sent.is_err() {
                    log::debug!("Merged output of {name} has no consumer anymore");
                    break;
                }
            }
            _ = cancel.cancelled() => {
                log::warn!(
                    target: "collector manager",
                    "dropped message on shutdown: collector={}",
                    name
                );
            }
        }
    }
    log::trace!("Relay of {name} exited");
}
