use std::sync::Arc;

use error::ResultOkLogExt;
use tokio_util::sync::CancellationToken;

/// Dockmon: a multi-host container monitor.
///
/// This library connects to one or more container daemons, polls them for container
/// rosters, inspect details and resource usage, watches their live event feeds and
/// exposes everything as typed messages and event subscriptions.
pub mod api;
pub mod config;
pub mod container;
pub mod docker;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod registry;
pub mod stats;

/// Runs the Dockmon application until Ctrl-C.
///
/// Connects every configured host, starts the collector pipeline and the event
/// watchers, serves the API and records the latest collector message per host and
/// kind.
///
/// # Returns
///
/// Returns `Ok(())` after a clean shutdown, or an error if start-up fails.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid environment configuration (e.g., a malformed `DOCKER_HOSTS`).
/// - No configured host could be connected.
/// - No collector could be registered.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::from_env()?;
    log::debug!("Configuration: {config:?}");

    let connector = docker::BollardConnector::new(config.tls(), config.docker_timeout_secs);
    let registration = registry::HostRegistry::register(&config.hosts, &connector)?;
    if !registration.failures.is_empty() {
        log::warn!(
            "{} configured host(s) are unavailable",
            registration.failures.len()
        );
    }
    let registry = Arc::new(registration.registry);
    let root = CancellationToken::new();

    let mut collectors =
        pipeline::CollectorManager::new(Arc::clone(&registry), config.pipeline_buffer_size);
    collectors.register_all_hosts(&config.collectors, &config.collector_template()?)?;
    let mut output = collectors.start(&root)?;

    let events = Arc::new(event::EventManager::new(
        Arc::clone(&registry),
        Arc::new(event::EventWhitelist::default()),
        event::DEFAULT_INTAKE_BUFFER_SIZE,
    ));
    events.start()?;
    events.watch_all_hosts();

    let snapshots = Arc::new(api::SnapshotStore::default());
    let server = {
        let state = api::AppState::new(
            Arc::clone(&events),
            Arc::clone(&snapshots),
            Arc::clone(&registry),
        );
        let server = api::APIServer::new(state);
        let addr = config.api_listen_addr;
        let cancel = root.clone();
        tokio::spawn(async move { server.listen(addr, cancel).await.ok_log() })
    };

    let consumer = {
        let snapshots = Arc::clone(&snapshots);
        tokio::spawn(async move {
            while let Some(message) = output.recv().await {
                log::debug!(
                    "Received {} message from {} with {} entries",
                    message.kind(),
                    message.host,
                    message.payload.len()
                );
                snapshots.record(message);
            }
            log::debug!("Collector output closed");
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C, shutting down: {err}");
    }
    log::info!("Shutting down");

    root.cancel();
    collectors.stop().await;
    events.stop().await;
    consumer.await.ok_log_with("message consumer");
    server.await.ok_log_with("API server");
    registry.close_all();
    log::info!("Shutdown complete");

    Ok(())
}
