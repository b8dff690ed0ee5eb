use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use dashmap::DashMap;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::event::{ContainerEvent, EventFilter, EventManager, Subscriber};
use crate::pipeline::{Message, MessageKind};
use crate::registry::HostRegistry;

pub mod models;

/// Events held per SSE client before further ones are dropped for it.
pub const SUBSCRIBER_BUFFER_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind `{addr}`")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("API server failed")]
    Serve(#[source] std::io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Latest collector message per `(kind, host)`.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    latest: DashMap<(MessageKind, String), Message>,
}

impl SnapshotStore {
    pub fn record(&self, message: Message) {
        self.latest
            .insert((message.kind(), message.host.clone()), message);
    }

    /// Every recorded message, ordered by kind and host.
    pub fn snapshot(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .latest
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        messages.sort_by(|a, b| (a.kind(), &a.host).cmp(&(b.kind(), &b.host)));
        messages
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    events: Arc<EventManager>,
    snapshots: Arc<SnapshotStore>,
    registry: Arc<HostRegistry>,
    next_subscriber: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        events: Arc<EventManager>,
        snapshots: Arc<SnapshotStore>,
        registry: Arc<HostRegistry>,
    ) -> Self {
        Self {
            events,
            snapshots,
            registry,
            next_subscriber: Arc::new(AtomicU64::new(1)),
        }
    }
}

/// Unsubscribes when the SSE stream is dropped, i.e. when the client disconnects.
struct SubscriptionGuard {
    id: String,
    events: Arc<EventManager>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.events.unsubscribe(&self.id);
    }
}

fn event_stream(
    subscriber: Subscriber,
    guard: SubscriptionGuard,
) -> impl Stream<Item = std::result::Result<Event, axum::Error>> {
    futures::stream::unfold(
        (subscriber, guard),
        |(mut subscriber, guard)| async move {
            let event = subscriber.recv().await?;
            let sse = Event::default().event(event.typ.clone()).json_data(&event);
            Some((sse, (subscriber, guard)))
        },
    )
}

async fn stream_events(
    State(state): State<AppState>,
    Query(params): Query<models::EventsParams>,
) -> Response {
    let id = format!(
        "sse-{}",
        state.next_subscriber.fetch_add(1, Ordering::Relaxed)
    );
    let filter = params.host.map(|host| {
        let filter: EventFilter = Arc::new(move |event: &ContainerEvent| event.host == host);
        filter
    });

    let subscriber = match state.events.subscribe(id.clone(), SUBSCRIBER_BUFFER_SIZE, filter) {
        Ok(subscriber) => subscriber,
        Err(err) => {
            log::error!("Failed to subscribe SSE client: {}", err);
            return (StatusCode::SERVICE_UNAVAILABLE, "event stream unavailable").into_response();
        }
    };
    log::debug!("SSE client {id} connected");

    let guard = SubscriptionGuard {
        id,
        events: Arc::clone(&state.events),
    };
    Sse::new(event_stream(subscriber, guard))
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn snapshot(State(state): State<AppState>) -> Json<Vec<Message>> {
    Json(state.snapshots.snapshot())
}

async fn hosts(State(state): State<AppState>) -> Json<models::HostsBody> {
    Json(models::HostsBody {
        hosts: state.registry.host_names(),
    })
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new(state: AppState) -> Self {
        let router = axum::Router::new()
            .route("/events", get(stream_events))
            .route("/snapshot", get(snapshot))
            .route("/hosts", get(hosts))
            .with_state(state);
        Self { router }
    }

    /// Serves until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if `addr` cannot be bound or the server fails.
    pub async fn listen(self, addr: SocketAddr, cancel: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        log::info!("API listening on {addr}");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(Error::Serve)
    }
}
