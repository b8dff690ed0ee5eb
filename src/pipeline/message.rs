use std::fmt;
use std::str::FromStr;

use super::Error;
use crate::container::{ContainerInspectDetail, ContainerSummary};
use crate::event::ContainerEvent;
use crate::stats::ContainerStats;

/// Discriminant of a [`Message`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    List,
    Inspect,
    Stats,
    Event,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Inspect => "inspect",
            Self::Stats => "stats",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "list" => Ok(Self::List),
            "inspect" => Ok(Self::Inspect),
            "stats" => Ok(Self::Stats),
            "event" => Ok(Self::Event),
            other => Err(Error::UnknownKind(other.to_owned())),
        }
    }
}

/// Content of a [`Message`]; serialized as `{"type": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    List(Vec<ContainerSummary>),
    Inspect(Vec<ContainerInspectDetail>),
    Stats(Vec<ContainerStats>),
    Event(ContainerEvent),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::List(_) => MessageKind::List,
            Self::Inspect(_) => MessageKind::Inspect,
            Self::Stats(_) => MessageKind::Stats,
            Self::Event(_) => MessageKind::Event,
        }
    }

    /// Number of containers (or events) carried.
    pub fn len(&self) -> usize {
        match self {
            Self::List(containers) => containers.len(),
            Self::Inspect(details) => details.len(),
            Self::Stats(stats) => stats.len(),
            Self::Event(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The single wire format produced by collectors and event watchers.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Message {
    pub host: String,
    /// UNIX epoch seconds at which the message was produced.
    pub timestamp: u64,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Message {
    /// Creates a message for `host` stamped with the current wall-clock time.
    pub fn new(host: impl Into<String>, payload: Payload) -> Self {
        Self {
            host: host.into(),
            timestamp: now_unix_secs(),
            payload,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

impl From<ContainerEvent> for Message {
    fn from(event: ContainerEvent) -> Self {
        Self {
            host: event.host.clone(),
            timestamp: event.timestamp,
            payload: Payload::Event(event),
        }
    }
}

/// Current wall-clock time in UNIX epoch seconds, `0` if the clock is before the epoch.
pub fn now_unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
