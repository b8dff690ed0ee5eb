use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ContainerEvent, Error, EventWatcher, EventWhitelist, Result};
use crate::registry::HostRegistry;

pub const DEFAULT_INTAKE_BUFFER_SIZE: usize = 100;

/// Predicate deciding whether a subscriber receives an event.
pub type EventFilter = Arc<dyn Fn(&ContainerEvent) -> bool + Send + Sync>;

/// Receiving side of a subscription.
#[derive(Debug)]
pub struct Subscriber {
    id: String,
    events: mpsc::Receiver<ContainerEvent>,
}

impl Subscriber {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the next event; `None` once the subscription has been closed.
    pub async fn recv(&mut self) -> Option<ContainerEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ContainerEvent> {
        self.events.try_recv().ok()
    }
}

struct SubscriberEntry {
    sender: mpsc::Sender<ContainerEvent>,
    filter: Option<EventFilter>,
    dropped: AtomicU64,
}

struct WatcherHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the per-host watchers and broadcasts their events to subscribers.
pub struct EventManager {
    registry: Arc<HostRegistry>,
    whitelist: Arc<EventWhitelist>,
    intake_tx: Mutex<Option<mpsc::Sender<ContainerEvent>>>,
    intake_rx: Mutex<Option<mpsc::Receiver<ContainerEvent>>>,
    subscribers: Arc<DashMap<String, SubscriberEntry>>,
    watchers: DashMap<String, WatcherHandle>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl EventManager {
    pub fn new(
        registry: Arc<HostRegistry>,
        whitelist: Arc<EventWhitelist>,
        intake_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(intake_capacity.max(1));
        Self {
            registry,
            whitelist,
            intake_tx: Mutex::new(Some(tx)),
            intake_rx: Mutex::new(Some(rx)),
            subscribers: Arc::new(DashMap::new()),
            watchers: DashMap::new(),
            dispatcher: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Spawns the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] on a second call and [`Error::Stopped`] after
    /// [`Self::stop`].
    pub fn start(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Stopped);
        }
        let intake = lock(&self.intake_rx).take().ok_or(Error::AlreadyStarted)?;

        let handle = tokio::spawn(run_dispatcher(
            intake,
            Arc::clone(&self.subscribers),
            self.cancel.clone(),
        ));
        *lock(&self.dispatcher) = Some(handle);
        log::info!("Event dispatcher started");

        Ok(())
    }

    /// Starts a watcher for `host` unless one is already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not registered or the manager has been stopped.
    pub fn watch_host(&self, host: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Stopped);
        }
        let connection = self.registry.get(host)?;
        let intake = lock(&self.intake_tx).clone().ok_or(Error::Stopped)?;

        if let Entry::Vacant(entry) = self.watchers.entry(host.to_owned()) {
            let cancel = self.cancel.child_token();
            let watcher = EventWatcher::new(
                host,
                connection.client(),
                Arc::clone(&self.whitelist),
                intake,
            );
            let handle = tokio::spawn(watcher.run(cancel.clone()));
            entry.insert(WatcherHandle { cancel, handle });
            log::debug!("Watching events of {host}");
        }

        Ok(())
    }

    /// Starts a watcher for every registered host. Failures are logged per host.
    pub fn watch_all_hosts(&self) {
        for host in self.registry.host_names() {
            if let Err(err) = self.watch_host(&host) {
                log::error!(
                    target: "event manager",
                    "failed watching host: host={}, error={}",
                    host,
                    err
                );
            }
        }
    }

    /// Stops the watcher of `host` and waits for it. Returns `false` if none was running.
    pub async fn unwatch_host(&self, host: &str) -> bool {
        let Some((_, watcher)) = self.watchers.remove(host) else {
            return false;
        };
        watcher.cancel.cancel();
        if let Err(err) = watcher.handle.await {
            log::error!(target: "event manager", "watcher did not exit cleanly: host={host}, error={err}");
        }
        log::debug!("Stopped watching events of {host}");
        true
    }

    /// Registers a subscriber with its own bounded buffer.
    ///
    /// Subscribing again with an existing id replaces the previous subscription, whose
    /// channel is closed.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique subscriber id.
    /// * `buffer_size` - Events held for this subscriber before further ones are dropped.
    /// * `filter` - Optional predicate; rejected events are skipped for this subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] after [`Self::stop`].
    pub fn subscribe(
        &self,
        id: impl Into<String>,
        buffer_size: usize,
        filter: Option<EventFilter>,
    ) -> Result<Subscriber> {
        if self.cancel.is_cancelled() {
            return Err(Error::Stopped);
        }
        let id = id.into();
        let (sender, events) = mpsc::channel(buffer_size.max(1));
        let entry = SubscriberEntry {
            sender,
            filter,
            dropped: AtomicU64::new(0),
        };
        if self.subscribers.insert(id.clone(), entry).is_some() {
            log::debug!("Replaced subscriber {id}");
        } else {
            log::debug!("Added subscriber {id}");
        }

        Ok(Subscriber { id, events })
    }

    /// Removes and closes a subscription. Unknown ids, including ones already closed
    /// by [`Self::stop`], are ignored.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let removed = self.subscribers.remove(id).is_some();
        if removed {
            log::debug!("Removed subscriber {id}");
        }
        removed
    }

    /// Cancels every watcher, closes every subscriber, waits for the watchers and the
    /// dispatcher to exit and finally closes the intake.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.subscribers.clear();

        let hosts: Vec<String> = self.watchers.iter().map(|w| w.key().clone()).collect();
        for host in hosts {
            self.unwatch_host(&host).await;
        }

        let dispatcher = lock(&self.dispatcher).take();
        if let Some(handle) = dispatcher {
            if let Err(err) = handle.await {
                log::error!(target: "event manager", "dispatcher did not exit cleanly: {err}");
            }
        }

        lock(&self.intake_rx).take();
        if lock(&self.intake_tx).take().is_some() {
            log::info!("Event manager stopped");
        }
        // a subscribe racing with the first clear
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Hosts with a running watcher, in ascending order.
    pub fn watched_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.watchers.iter().map(|w| w.key().clone()).collect();
        hosts.sort();
        hosts
    }

    /// Events dropped so far for subscriber `id` because its buffer was full.
    pub fn dropped_events(&self, id: &str) -> Option<u64> {
        self.subscribers
            .get(id)
            .map(|entry| entry.dropped.load(Ordering::Relaxed))
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("subscribers", &self.subscriber_count())
            .field("watched_hosts", &self.watched_hosts())
            .field("stopped", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_dispatcher(
    mut intake: mpsc::Receiver<ContainerEvent>,
    subscribers: Arc<DashMap<String, SubscriberEntry>>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = intake.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        dispatch(&subscribers, &event);
    }
    log::debug!("Event dispatcher exited");
}

/// Offers `event` to every subscriber without waiting. Returns the number of
/// subscribers that received it.
fn dispatch(subscribers: &DashMap<String, SubscriberEntry>, event: &ContainerEvent) -> usize {
    let mut delivered = 0;
    let mut closed = Vec::new();

    for entry in subscribers.iter() {
        let subscriber = entry.value();
        if subscriber
            .filter
            .as_ref()
            .is_some_and(|filter| !filter(event))
        {
            continue;
        }

        match subscriber.sender.try_send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                let dropped = subscriber.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(
                    target: "event manager",
                    "subscriber buffer full, dropped event: subscriber={}, host={}, action={}, dropped_total={}",
                    entry.key(),
                    event.host,
                    event.action,
                    dropped
                );
            }
            Err(TrySendError::Closed(_)) => closed.push(entry.key().clone()),
        }
    }

    for id in closed {
        if subscribers
            .remove_if(&id, |_, entry| entry.sender.is_closed())
            .is_some()
        {
            log::debug!("Removed subscriber {id} whose receiver was dropped");
        }
    }
    log::trace!(
        "Dispatched {} {} event from {} to {} subscriber(s)",
        event.typ,
        event.action,
        event.host,
        delivered
    );

    delivered
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::docker::fake::{EventSession, FakeDocker};
    use crate::docker::{self, Connector, DockerApi, RawEvent};
    use crate::registry::{self, HostConfig};

    fn event(host: &str, action: &str) -> ContainerEvent {
        ContainerEvent {
            host: host.to_owned(),
            typ: "container".to_owned(),
            action: action.to_owned(),
            actor_id: "abc123".to_owned(),
            actor_name: None,
            timestamp: 0,
            attributes: HashMap::new(),
        }
    }

    /// Every host streams one `start` event, then stays connected.
    struct FakeConnector;

    impl Connector for FakeConnector {
        fn connect(&self, _host: &HostConfig) -> docker::Result<Arc<dyn DockerApi>> {
            let raw = RawEvent {
                typ: "container".to_owned(),
                action: "start".to_owned(),
                actor_id: "abc123".to_owned(),
                ..Default::default()
            };
            Ok(Arc::new(FakeDocker::new().push_session(EventSession::Events(vec![Ok(raw)]))))
        }

        fn connect_local(&self) -> docker::Result<Arc<dyn DockerApi>> {
            Ok(Arc::new(FakeDocker::new()))
        }
    }

    fn manager(hosts: &[&str]) -> EventManager {
        let hosts: Vec<HostConfig> = hosts
            .iter()
            .map(|name| HostConfig::new(*name, format!("tcp://{name}:2376")))
            .collect();
        let registry = HostRegistry::register(&hosts, &FakeConnector).unwrap().registry;
        EventManager::new(
            Arc::new(registry),
            Arc::new(EventWhitelist::default()),
            DEFAULT_INTAKE_BUFFER_SIZE,
        )
    }

    #[tokio::test]
    async fn test_full_subscriber_does_not_affect_others() {
        let manager = manager(&["a"]);
        let mut slow = manager.subscribe("slow", 1, None).unwrap();
        let mut fast = manager.subscribe("fast", 8, None).unwrap();

        assert_eq!(dispatch(&manager.subscribers, &event("a", "create")), 2);
        assert_eq!(dispatch(&manager.subscribers, &event("a", "start")), 1);

        assert_eq!(manager.dropped_events("slow"), Some(1));
        assert_eq!(manager.dropped_events("fast"), Some(0));
        assert_eq!(slow.try_recv().unwrap().action, "create");
        assert!(slow.try_recv().is_none());
        assert_eq!(fast.try_recv().unwrap().action, "create");
        assert_eq!(fast.try_recv().unwrap().action, "start");
    }

    #[tokio::test]
    async fn test_filter_skips_rejected_events() {
        let manager = manager(&["a"]);
        let only_b: EventFilter = Arc::new(|event: &ContainerEvent| event.host == "b");
        let mut subscriber = manager.subscribe("b-only", 8, Some(only_b)).unwrap();

        assert_eq!(dispatch(&manager.subscribers, &event("a", "start")), 0);
        assert_eq!(dispatch(&manager.subscribers, &event("b", "start")), 1);
        assert_eq!(subscriber.try_recv().unwrap().host, "b");
        assert_eq!(manager.dropped_events("b-only"), Some(0));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_removed() {
        let manager = manager(&["a"]);
        drop(manager.subscribe("gone", 1, None).unwrap());

        assert_eq!(dispatch(&manager.subscribers, &event("a", "start")), 0);
        assert_eq!(manager.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_previous() {
        let manager = manager(&["a"]);
        let mut old = manager.subscribe("ui", 4, None).unwrap();
        let mut new = manager.subscribe("ui", 4, None).unwrap();

        assert_eq!(manager.subscriber_count(), 1);
        assert!(old.recv().await.is_none());

        dispatch(&manager.subscribers, &event("a", "start"));
        assert_eq!(new.id(), "ui");
        assert!(new.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_tolerant() {
        let manager = manager(&["a"]);
        let mut subscriber = manager.subscribe("ui", 4, None).unwrap();

        assert!(manager.unsubscribe("ui"));
        assert!(!manager.unsubscribe("ui"));
        assert!(subscriber.recv().await.is_none());

        let _other = manager.subscribe("other", 4, None).unwrap();
        manager.stop().await;
        assert!(!manager.unsubscribe("other"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_flow_from_watchers_to_subscribers() {
        let manager = manager(&["a", "b"]);
        manager.start().unwrap();
        let mut subscriber = manager.subscribe("ui", 8, None).unwrap();
        manager.watch_all_hosts();
        assert_eq!(manager.watched_hosts(), vec!["a", "b"]);

        let mut hosts = vec![
            subscriber.recv().await.unwrap().host,
            subscriber.recv().await.unwrap().host,
        ];
        hosts.sort();
        assert_eq!(hosts, vec!["a", "b"]);

        manager.stop().await;
        assert!(subscriber.recv().await.is_none());
        assert!(manager.watched_hosts().is_empty());
    }

    #[tokio::test]
    async fn test_watch_host_is_idempotent() {
        let manager = manager(&["a"]);
        manager.watch_host("a").unwrap();
        manager.watch_host("a").unwrap();
        assert_eq!(manager.watched_hosts(), vec!["a"]);

        assert!(manager.unwatch_host("a").await);
        assert!(!manager.unwatch_host("a").await);
        assert!(manager.watched_hosts().is_empty());
    }

    #[tokio::test]
    async fn test_watch_unknown_host_fails() {
        let manager = manager(&["a"]);
        let err = manager.watch_host("missing").unwrap_err();

        assert!(matches!(
            err,
            Error::Registry(registry::Error::HostNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let manager = manager(&["a"]);
        manager.start().unwrap();
        assert!(matches!(manager.start(), Err(Error::AlreadyStarted)));

        manager.stop().await;
        manager.stop().await;
        assert!(matches!(manager.start(), Err(Error::Stopped)));
        assert!(matches!(manager.subscribe("late", 1, None), Err(Error::Stopped)));
        assert!(matches!(manager.watch_host("a"), Err(Error::Stopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_reconnecting_watchers() {
        let manager = manager(&["a"]);
        manager.start().unwrap();
        manager.watch_host("a").unwrap();

        // the watcher reconnects once after its single event and then idles on an open session
        tokio::time::sleep(Duration::from_secs(1)).await;
        tokio::time::timeout(Duration::from_millis(10), manager.stop())
            .await
            .expect("stop must not wait on daemon streams");
    }
}
