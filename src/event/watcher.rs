use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{ContainerEvent, EventWhitelist};
use crate::docker::{self, DockerApi, EventStream};
use crate::pipeline::now_unix_secs;

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential reconnect delay: doubles per attempt up to a cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait now and doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// How a streaming session ended.
enum SessionEnd {
    Cancelled,
    /// Nobody reads the intake anymore.
    IntakeClosed,
    Closed,
    Failed(docker::Error),
}

/// Watches the live event feed of one host and reconnects when it breaks.
pub struct EventWatcher {
    host: String,
    client: Arc<dyn DockerApi>,
    whitelist: Arc<EventWhitelist>,
    intake: mpsc::Sender<ContainerEvent>,
}

impl EventWatcher {
    pub fn new(
        host: impl Into<String>,
        client: Arc<dyn DockerApi>,
        whitelist: Arc<EventWhitelist>,
        intake: mpsc::Sender<ContainerEvent>,
    ) -> Self {
        Self {
            host: host.into(),
            client,
            whitelist,
            intake,
        }
    }

    /// Connects, streams and reconnects with [`Backoff`] until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut backoff = Backoff::default();

        while !cancel.is_cancelled() {
            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                connected = self.client.event_stream() => connected,
            };

            match connected {
                Ok(stream) => {
                    backoff.reset();
                    log::info!("Streaming events from {}", self.host);
                    match self.forward(stream, &cancel).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::IntakeClosed => {
                            log::debug!("Event intake closed, watcher for {} exits", self.host);
                            break;
                        }
                        SessionEnd::Closed => {
                            log::warn!(target: "event watcher", "event stream closed: host={}", self.host)
                        }
                        SessionEnd::Failed(err) => log::warn!(
                            target: "event watcher",
                            "event stream failed: host={}, error={}",
                            self.host,
                            err
                        ),
                    }
                }
                Err(err) => log::warn!(
                    target: "event watcher",
                    "failed connecting to event stream: host={}, error={}",
                    self.host,
                    err
                ),
            }

            let delay = backoff.next_delay();
            log::info!(
                "Reconnecting to events of {} in {}s",
                self.host,
                delay.as_secs_f32()
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        log::debug!("Event watcher for {} stopped", self.host);
    }

    async fn forward(&self, mut stream: EventStream, cancel: &CancellationToken) -> SessionEnd {
        loop {
            let raw = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = stream.next() => match next {
                    Some(Ok(raw)) => raw,
                    Some(Err(err)) => return SessionEnd::Failed(err),
                    None => return SessionEnd::Closed,
                },
            };

            let Some(event) = self.whitelist.accept(&self.host, raw, now_unix_secs()) else {
                continue;
            };
            log::trace!(
                "Received {} {} event from {}",
                event.typ,
                event.action,
                self.host
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                sent = self.intake.send(event) => {
                    if sent.is_err() {
                        return SessionEnd::IntakeClosed;
                    }
                }
            }
        }
    }
}
