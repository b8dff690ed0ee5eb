//! Polling collectors.
//!
//! A [`Collector`] owns one polling loop bound to one host and one [`CollectorKind`].
//! What a pass actually gathers is delegated to a [`CollectPass`]; the loop, the ring
//! buffer and the `Idle -> Running -> Stopped` lifecycle are shared by every kind.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

mod inspect;
mod list;
mod stats;

pub use inspect::InspectPass;
pub use list::ListPass;
pub use stats::{STATS_DEADLINE, StatsPass};

use super::{Error, Message, Result, RingBuffer};
use crate::docker::DockerApi;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectorKind {
    List,
    Inspect,
    Stats,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 3] = [Self::List, Self::Inspect, Self::Stats];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Inspect => "inspect",
            Self::Stats => "stats",
        }
    }

    /// Builds the pass gathering this kind of data from `client`.
    pub fn pass(self, host: &str, client: Arc<dyn DockerApi>) -> Arc<dyn CollectPass> {
        match self {
            Self::List => Arc::new(ListPass::new(host, client)),
            Self::Inspect => Arc::new(InspectPass::new(host, client)),
            Self::Stats => Arc::new(StatsPass::new(host, client)),
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "list" => Ok(Self::List),
            "inspect" => Ok(Self::Inspect),
            "stats" => Ok(Self::Stats),
            other => Err(Error::UnknownKind(other.to_owned())),
        }
    }
}

/// Per-collector settings, immutable once the collector is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    host: String,
    interval: Duration,
    buffer_size: usize,
}

impl CollectorConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `interval_secs` or `buffer_size` is zero.
    pub fn new(host: impl Into<String>, interval_secs: u64, buffer_size: usize) -> Result<Self> {
        if interval_secs == 0 {
            return Err(Error::InvalidConfig("interval must be at least one second"));
        }
        if buffer_size == 0 {
            return Err(Error::InvalidConfig("buffer size must be at least one"));
        }
        Ok(Self {
            host: host.into(),
            interval: Duration::from_secs(interval_secs),
            buffer_size,
        })
    }

    /// 10 second interval, buffer of 100 messages.
    pub fn with_defaults(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            interval: DEFAULT_INTERVAL,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Copy of these settings bound to another host.
    pub fn for_host(&self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self.clone()
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[cfg(test)]
    pub(crate) fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// One collection pass of a specific kind.
#[async_trait::async_trait]
pub trait CollectPass: Send + Sync {
    fn kind(&self) -> CollectorKind;

    /// Gathers one message. `None` means the pass produced nothing to emit; failures
    /// are logged by the pass itself.
    async fn collect(&self) -> Option<Message>;
}

enum State {
    Idle {
        buffer: RingBuffer<Message>,
        output: flume::Receiver<Message>,
    },
    Running {
        stop: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// A polling loop for one host and one kind.
pub struct Collector {
    name: String,
    config: CollectorConfig,
    pass: Arc<dyn CollectPass>,
    state: State,
}

impl Collector {
    pub fn new(config: CollectorConfig, pass: Arc<dyn CollectPass>) -> Self {
        let (buffer, output) = RingBuffer::new(config.buffer_size);
        Self {
            name: format!("{}@{}", pass.kind(), config.host),
            config,
            pass,
            state: State::Idle { buffer, output },
        }
    }

    /// `<kind>@<host>`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CollectorKind {
        self.pass.kind()
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// Spawns the polling loop and returns the receiving end of its buffer.
    ///
    /// The first pass runs immediately, then one pass per interval until `cancel`
    /// fires or [`Self::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] or [`Error::Stopped`] if the collector is not idle.
    pub fn start(&mut self, cancel: &CancellationToken) -> Result<flume::Receiver<Message>> {
        match std::mem::replace(&mut self.state, State::Stopped) {
            State::Idle { buffer, output } => {
                let stop = cancel.child_token();
                let handle = tokio::spawn(poll(
                    self.name.clone(),
                    self.config.interval,
                    Arc::clone(&self.pass),
                    buffer,
                    stop.clone(),
                ));
                self.state = State::Running { stop, handle };
                log::debug!("Started collector {}", self.name);
                Ok(output)
            }
            running @ State::Running { .. } => {
                self.state = running;
                Err(Error::AlreadyStarted(self.name.clone()))
            }
            State::Stopped => Err(Error::Stopped(self.name.clone())),
        }
    }

    /// Stops the loop and waits for it to exit. The output is closed once this returns.
    ///
    /// Stopping is terminal and idempotent.
    pub async fn stop(&mut self) {
        match std::mem::replace(&mut self.state, State::Stopped) {
            State::Running { stop, handle } => {
                stop.cancel();
                if let Err(err) = handle.await {
                    log::error!(
                        target: "collector",
                        "polling loop did not exit cleanly: collector={}, error={}",
                        self.name,
                        err
                    );
                }
                log::debug!("Stopped collector {}", self.name);
            }
            // dropping the idle buffer closes it
            State::Idle { .. } | State::Stopped => {}
        }
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn poll(
    name: String,
    interval: Duration,
    pass: Arc<dyn CollectPass>,
    mut buffer: RingBuffer<Message>,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let message = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            message = pass.collect() => message,
        };

        if let Some(message) = message {
            log::trace!(
                "Collector {} produced {} entries",
                name,
                message.payload.len()
            );
            buffer.push(message);
        }
    }

    buffer.close();
    log::debug!(
        "Polling loop of {} exited: dropped_total={}",
        name,
        buffer.dropped()
    );
}
