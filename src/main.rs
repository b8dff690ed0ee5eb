/// Entry point for the Dockmon container monitor.
///
/// This binary connects to the configured container daemons, collects container
/// rosters, inspect details and resource usage, streams lifecycle events and serves
/// them over HTTP until interrupted.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., invalid environment variables or
/// no reachable daemon).
///
/// # Examples
///
/// ```bash
/// DOCKER_HOSTS='[{"name":"prod-1","addr":"tcp://10.0.0.10:2376"}]' CERT_PATH=./certs cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    dockmon::run().await
}
