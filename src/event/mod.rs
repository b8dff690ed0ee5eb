//! Event subsystem: per-host watchers feeding one dispatcher that broadcasts to
//! independent subscribers.
//!
//! Every [`EventWatcher`] forwards whitelisted events onto a shared intake channel.
//! The [`EventManager`] dispatcher drains that channel and offers each event to every
//! [`Subscriber`] without ever waiting on one: a subscriber whose buffer is full misses
//! the event, all others still receive it.
use std::collections::HashMap;

mod error;
mod filter;
mod manager;
mod watcher;

pub use error::{Error, Result};
pub use filter::EventWhitelist;
pub use manager::{DEFAULT_INTAKE_BUFFER_SIZE, EventFilter, EventManager, Subscriber};
pub use watcher::{Backoff, EventWatcher, INITIAL_BACKOFF, MAX_BACKOFF};

/// A whitelisted daemon event, tagged with the host it came from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContainerEvent {
    pub host: String,
    /// `container`, `image`, `network`, `volume` or `daemon`.
    #[serde(rename = "type")]
    pub typ: String,
    pub action: String,
    pub actor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    /// UNIX epoch seconds at which the event was received.
    pub timestamp: u64,
    pub attributes: HashMap<String, String>,
}
