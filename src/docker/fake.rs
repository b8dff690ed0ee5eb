//! In-memory [`DockerApi`] used by the unit tests.
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use futures::StreamExt;
use futures::stream;

use super::{DockerApi, Error, EventStream, RawEvent, Result, StatsStream};
use crate::container::{ContainerID, ContainerInspectDetail, ContainerSummary};
use crate::stats::RawUsageSnapshot;

/// Scripted outcome of one `event_stream` call.
#[derive(Debug)]
pub(crate) enum EventSession {
    /// The daemon cannot be reached.
    Refused,
    /// The session yields these items and then ends.
    Events(Vec<Result<RawEvent>>),
    /// The session is established but never yields.
    Pending,
}

#[derive(Debug, Default)]
struct State {
    containers: Vec<ContainerSummary>,
    list_failures: usize,
    inspect_failures: HashSet<String>,
    stats: HashMap<String, Vec<RawUsageSnapshot>>,
    stalled: HashSet<String>,
    sessions: VecDeque<EventSession>,
    list_calls: usize,
    event_connects: Vec<tokio::time::Instant>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeDocker {
    state: Mutex<State>,
}

impl FakeDocker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_container(self, id: &str, name: &str) -> Self {
        let summary = ContainerSummary {
            id: ContainerID::new(id).unwrap(),
            name: name.to_owned(),
            image: "busybox:latest".to_owned(),
            state: "running".to_owned(),
            status: "Up 1 minute".to_owned(),
        };
        self.state.lock().unwrap().containers.push(summary);
        self
    }

    /// Fails the next `count` listings.
    pub(crate) fn fail_list(self, count: usize) -> Self {
        self.state.lock().unwrap().list_failures = count;
        self
    }

    pub(crate) fn fail_inspect(self, id: &str) -> Self {
        self.state.lock().unwrap().inspect_failures.insert(id.to_owned());
        self
    }

    pub(crate) fn with_stats(self, id: &str, frames: Vec<RawUsageSnapshot>) -> Self {
        self.state.lock().unwrap().stats.insert(id.to_owned(), frames);
        self
    }

    /// Keeps the stats stream of `id` open without further frames.
    pub(crate) fn stall_stats(self, id: &str) -> Self {
        self.state.lock().unwrap().stalled.insert(id.to_owned());
        self
    }

    pub(crate) fn push_session(self, session: EventSession) -> Self {
        self.state.lock().unwrap().sessions.push_back(session);
        self
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub(crate) fn event_connects(&self) -> Vec<tokio::time::Instant> {
        self.state.lock().unwrap().event_connects.clone()
    }
}

#[async_trait::async_trait]
impl DockerApi for FakeDocker {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.list_failures > 0 {
            state.list_failures -= 1;
            return Err(Error::Unreachable("fake".to_owned()));
        }
        Ok(state.containers.clone())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectDetail> {
        let state = self.state.lock().unwrap();
        if state.inspect_failures.contains(id) {
            return Err(Error::NoSuchContainer(id.to_owned()));
        }
        let summary = state
            .containers
            .iter()
            .find(|c| c.id.as_ref() == id)
            .ok_or_else(|| Error::NoSuchContainer(id.to_owned()))?;

        Ok(ContainerInspectDetail {
            id: summary.id.clone(),
            name: summary.name.clone(),
            image: summary.image.clone(),
            created: "2024-01-01T00:00:00Z".to_owned(),
            platform: "linux".to_owned(),
            restart_count: 0,
            state: None,
            config: None,
            network: None,
            mounts: Vec::new(),
        })
    }

    fn stats_stream(&self, id: &str) -> StatsStream {
        let state = self.state.lock().unwrap();
        let frames = state.stats.get(id).cloned().unwrap_or_default();
        let frames = stream::iter(frames.into_iter().map(Ok));
        if state.stalled.contains(id) {
            frames.chain(stream::pending()).boxed()
        } else {
            frames.boxed()
        }
    }

    async fn event_stream(&self) -> Result<EventStream> {
        let mut state = self.state.lock().unwrap();
        state.event_connects.push(tokio::time::Instant::now());
        match state.sessions.pop_front().unwrap_or(EventSession::Pending) {
            EventSession::Refused => Err(Error::Unreachable("fake".to_owned())),
            EventSession::Events(events) => Ok(stream::iter(events).boxed()),
            EventSession::Pending => Ok(stream::pending().boxed()),
        }
    }
}
