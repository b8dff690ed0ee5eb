//! The capability set the monitor requires from a container daemon.
//!
//! Collectors and event watchers only ever talk to a daemon through [`DockerApi`]: list
//! containers, inspect one container, stream raw usage frames and stream raw events.
//! [`BollardClient`] implements it on top of the Docker Engine API, and [`Connector`]
//! abstracts how clients are established so the host registry can be exercised
//! without a daemon.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;

mod engine;
mod error;
#[cfg(test)]
pub(crate) mod fake;

pub use engine::{BollardClient, BollardConnector, TlsMaterial};
pub use error::{Error, Result};

use crate::container::{ContainerInspectDetail, ContainerSummary};
use crate::registry::HostConfig;
use crate::stats::RawUsageSnapshot;

/// Stream of raw usage frames of a single container.
pub type StatsStream = BoxStream<'static, Result<RawUsageSnapshot>>;

/// Stream of raw daemon events. The session is broken once it yields an error or ends.
pub type EventStream = BoxStream<'static, Result<RawEvent>>;

/// An event exactly as the daemon reported it, before whitelisting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEvent {
    /// Object type, e.g. `container`, `image` or `network`.
    pub typ: String,
    /// Action with any `: detail` suffix stripped, e.g. `exec_start`.
    pub action: String,
    pub actor_id: String,
    pub attributes: HashMap<String, String>,
}

impl RawEvent {
    /// Normalises a daemon action such as `exec_start: sh -c true` to `exec_start`.
    pub fn normalize_action(action: &str) -> &str {
        action
            .split_once(':')
            .map_or(action, |(action, _)| action)
            .trim()
    }
}

/// The four daemon operations the monitor depends on.
#[async_trait::async_trait]
pub trait DockerApi: Send + Sync + fmt::Debug {
    /// Lists every container, running or not.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// Returns the detailed configuration of one container.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectDetail>;

    /// Opens a streaming usage feed for one container.
    fn stats_stream(&self, id: &str) -> StatsStream;

    /// Opens a live event session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session could not be established.
    async fn event_stream(&self) -> Result<EventStream>;
}

/// Establishes daemon clients for the host registry.
pub trait Connector: Send + Sync {
    /// Connects to a remote host using the connector's TLS material.
    fn connect(&self, host: &HostConfig) -> Result<Arc<dyn DockerApi>>;

    /// Connects to the local daemon without authentication.
    fn connect_local(&self) -> Result<Arc<dyn DockerApi>>;
}
