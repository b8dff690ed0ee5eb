use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bollard::container::{
    InspectContainerOptions, ListContainersOptions, MemoryStatsStats, Stats, StatsOptions,
};
use bollard::models::{ContainerInspectResponse, ContainerSummary as ListEntry, EventMessage};
use bollard::system::EventsOptions;
use bollard::{API_DEFAULT_VERSION, Docker};
use futures::StreamExt;

use super::{Connector, DockerApi, Error, EventStream, RawEvent, Result, StatsStream};
use crate::container::utils::trim_container_name;
use crate::container::{
    ContainerConfigDetail, ContainerID, ContainerInspectDetail, ContainerNetworkDetail,
    ContainerStateDetail, ContainerSummary, MountPoint, NetworkEndpoint, PortBinding,
};
use crate::registry::HostConfig;
use crate::stats::{CpuUsage, MemoryUsage, NetworkUsage, RawUsageSnapshot};

/// Certificate triple used for every TLS-secured host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsMaterial {
    pub const CA_FILE: &'static str = "ca.pem";
    pub const CERT_FILE: &'static str = "cert.pem";
    pub const KEY_FILE: &'static str = "key.pem";

    /// Resolves `ca.pem`, `cert.pem` and `key.pem` inside `dir`.
    ///
    /// # Example
    ///
    /// ```
    /// # use dockmon::docker::TlsMaterial;
    /// let tls = TlsMaterial::from_dir("/etc/dockmon/certs");
    /// assert!(tls.ca.ends_with("ca.pem"));
    /// ```
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            ca: dir.join(Self::CA_FILE),
            cert: dir.join(Self::CERT_FILE),
            key: dir.join(Self::KEY_FILE),
        }
    }

    /// Checks that every file of the triple exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCertificate`] naming the first missing file.
    pub fn validate(&self) -> Result<()> {
        for path in [&self.ca, &self.cert, &self.key] {
            if !path.is_file() {
                return Err(Error::MissingCertificate { path: path.clone() });
            }
        }
        Ok(())
    }
}

/// Builds [`BollardClient`]s: TLS for remote hosts, local defaults otherwise.
#[derive(Debug, Clone)]
pub struct BollardConnector {
    tls: TlsMaterial,
    timeout_secs: u64,
}

impl BollardConnector {
    pub const LOCAL_HOST: &'static str = "local";

    pub fn new(tls: TlsMaterial, timeout_secs: u64) -> Self {
        Self { tls, timeout_secs }
    }
}

impl Connector for BollardConnector {
    fn connect(&self, host: &HostConfig) -> Result<Arc<dyn DockerApi>> {
        self.tls.validate()?;
        let docker = Docker::connect_with_ssl(
            &host.address,
            &self.tls.key,
            &self.tls.cert,
            &self.tls.ca,
            self.timeout_secs,
            API_DEFAULT_VERSION,
        )
        .map_err(|source| Error::Connect {
            host: host.name.clone(),
            address: host.address.clone(),
            source,
        })?;
        log::debug!("Created TLS client for {} at {}", host.name, host.address);

        Ok(Arc::new(BollardClient::new(&host.name, docker)))
    }

    fn connect_local(&self) -> Result<Arc<dyn DockerApi>> {
        let docker = Docker::connect_with_local_defaults().map_err(|source| Error::Connect {
            host: Self::LOCAL_HOST.to_owned(),
            address: "local defaults".to_owned(),
            source,
        })?;
        log::debug!("Created local client");

        Ok(Arc::new(BollardClient::new(Self::LOCAL_HOST, docker)))
    }
}

/// [`DockerApi`] backed by the Docker Engine API.
#[derive(Clone)]
pub struct BollardClient {
    host: String,
    docker: Docker,
}

impl BollardClient {
    pub fn new(host: impl Into<String>, docker: Docker) -> Self {
        Self {
            host: host.into(),
            docker,
        }
    }
}

impl fmt::Debug for BollardClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BollardClient")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl DockerApi for BollardClient {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let entries = self.docker.list_containers(Some(options)).await?;

        Ok(summaries_from_entries(&self.host, entries))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectDetail> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|err| match err {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => Error::NoSuchContainer(id.to_owned()),
                err => Error::Request(err),
            })?;

        inspect_from_response(response)
    }

    fn stats_stream(&self, id: &str) -> StatsStream {
        let options = StatsOptions {
            stream: true,
            one_shot: false,
        };
        self.docker
            .stats(id, Some(options))
            .map(|frame| frame.map(snapshot_from_stats).map_err(Error::from))
            .boxed()
    }

    async fn event_stream(&self) -> Result<EventStream> {
        // the event request is lazy, a ping tells an unreachable daemon apart from a quiet one
        self.docker.ping().await?;
        log::trace!("Opening event stream for {}", self.host);

        let stream = self
            .docker
            .events(None::<EventsOptions<String>>)
            .map(|event| event.map(event_from_message).map_err(Error::from))
            .boxed();
        Ok(stream)
    }
}

/// Converts a roster, skipping entries without a usable id.
fn summaries_from_entries(host: &str, entries: Vec<ListEntry>) -> Vec<ContainerSummary> {
    entries
        .into_iter()
        .filter_map(|entry| match summary_from_entry(entry) {
            Ok(summary) => Some(summary),
            Err(err) => {
                log::warn!(
                    target: "docker client",
                    "skipping container list entry: host={}, error={}",
                    host,
                    err
                );
                None
            }
        })
        .collect()
}

fn summary_from_entry(entry: ListEntry) -> Result<ContainerSummary> {
    let id = ContainerID::new(entry.id.unwrap_or_default())?;
    let name = entry
        .names
        .and_then(|names| names.into_iter().next())
        .map(|name| trim_container_name(&name).to_owned())
        .unwrap_or_default();

    Ok(ContainerSummary {
        id: id.short(),
        name,
        image: entry.image.unwrap_or_default(),
        state: entry.state.unwrap_or_default(),
        status: entry.status.unwrap_or_default(),
    })
}

fn inspect_from_response(response: ContainerInspectResponse) -> Result<ContainerInspectDetail> {
    let id = ContainerID::new(response.id.unwrap_or_default())?;

    let state = response.state.map(|state| ContainerStateDetail {
        status: state.status.map(|s| s.to_string()).unwrap_or_default(),
        running: state.running.unwrap_or_default(),
        paused: state.paused.unwrap_or_default(),
        restarting: state.restarting.unwrap_or_default(),
        oom_killed: state.oom_killed.unwrap_or_default(),
        dead: state.dead.unwrap_or_default(),
        pid: state.pid.unwrap_or_default(),
        exit_code: state.exit_code.unwrap_or_default(),
        error: state.error.unwrap_or_default(),
        started_at: state.started_at.unwrap_or_default(),
        finished_at: state.finished_at.unwrap_or_default(),
    });

    let config = response.config.map(|config| {
        let mut exposed_ports: Vec<String> = config
            .exposed_ports
            .map(|ports| ports.into_keys().collect())
            .unwrap_or_default();
        exposed_ports.sort();

        ContainerConfigDetail {
            hostname: config.hostname.unwrap_or_default(),
            user: config.user.unwrap_or_default(),
            env: config.env.unwrap_or_default(),
            cmd: config.cmd.unwrap_or_default(),
            entrypoint: config.entrypoint.unwrap_or_default(),
            working_dir: config.working_dir.unwrap_or_default(),
            exposed_ports,
            labels: config.labels.unwrap_or_default(),
        }
    });

    let network = response.network_settings.map(|settings| {
        let ports = settings
            .ports
            .unwrap_or_default()
            .into_iter()
            .map(|(port, bindings)| {
                let bindings = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|binding| PortBinding {
                        host_ip: binding.host_ip.unwrap_or_default(),
                        host_port: binding.host_port.unwrap_or_default(),
                    })
                    .collect();
                (port, bindings)
            })
            .collect();

        let networks: std::collections::HashMap<String, NetworkEndpoint> = settings
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, endpoint)| {
                let endpoint = NetworkEndpoint {
                    network_id: endpoint.network_id.unwrap_or_default(),
                    ip_address: endpoint.ip_address.unwrap_or_default(),
                    gateway: endpoint.gateway.unwrap_or_default(),
                    mac_address: endpoint.mac_address.unwrap_or_default(),
                };
                (name, endpoint)
            })
            .collect();

        let primary = networks
            .iter()
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(_, endpoint)| endpoint.clone())
            .unwrap_or_default();

        ContainerNetworkDetail {
            ip_address: primary.ip_address,
            gateway: primary.gateway,
            mac_address: primary.mac_address,
            ports,
            networks,
        }
    });

    let mounts = response
        .mounts
        .unwrap_or_default()
        .into_iter()
        .map(|mount| MountPoint {
            typ: mount.typ.map(|t| t.to_string()).unwrap_or_default(),
            name: mount.name.unwrap_or_default(),
            source: mount.source.unwrap_or_default(),
            destination: mount.destination.unwrap_or_default(),
            mode: mount.mode.unwrap_or_default(),
            rw: mount.rw.unwrap_or_default(),
        })
        .collect();

    Ok(ContainerInspectDetail {
        id: id.short(),
        name: trim_container_name(response.name.as_deref().unwrap_or_default()).to_owned(),
        image: response.image.unwrap_or_default(),
        created: response.created.unwrap_or_default(),
        platform: response.platform.unwrap_or_default(),
        restart_count: response.restart_count.unwrap_or_default(),
        state,
        config,
        network,
        mounts,
    })
}

fn snapshot_from_stats(stats: Stats) -> RawUsageSnapshot {
    let (cache, inactive_file) = match stats.memory_stats.stats {
        Some(MemoryStatsStats::V1(v1)) => (v1.cache, 0),
        Some(MemoryStatsStats::V2(v2)) => (0, v2.inactive_file),
        None => (0, 0),
    };

    // cgroup v2 hosts report no per-CPU breakdown, only `online_cpus`
    let online_cpus = stats.cpu_stats.online_cpus.unwrap_or_else(|| {
        stats
            .cpu_stats
            .cpu_usage
            .percpu_usage
            .as_ref()
            .map_or(0, |per_cpu| per_cpu.len() as u64)
    });

    let networks = stats
        .networks
        .unwrap_or_default()
        .into_iter()
        .map(|(name, net)| {
            let usage = NetworkUsage {
                rx_bytes: net.rx_bytes,
                tx_bytes: net.tx_bytes,
            };
            (name, usage)
        })
        .collect();

    RawUsageSnapshot {
        cpu: CpuUsage {
            total_usage: stats.cpu_stats.cpu_usage.total_usage,
            system_usage: stats.cpu_stats.system_cpu_usage.unwrap_or_default(),
            online_cpus: u32::try_from(online_cpus).unwrap_or(u32::MAX),
        },
        memory: MemoryUsage {
            usage: stats.memory_stats.usage.unwrap_or_default(),
            limit: stats.memory_stats.limit.unwrap_or_default(),
            cache,
            inactive_file,
        },
        networks,
    }
}

fn event_from_message(message: EventMessage) -> RawEvent {
    let actor = message.actor.unwrap_or_default();
    let action = message.action.unwrap_or_default();

    RawEvent {
        typ: message.typ.map(|t| t.to_string()).unwrap_or_default(),
        action: RawEvent::normalize_action(&action).to_owned(),
        actor_id: actor.id.unwrap_or_default(),
        attributes: actor.attributes.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bollard::models::{
        ContainerState, EndpointSettings, EventActor, EventMessageTypeEnum, NetworkSettings,
    };

    use super::*;

    const FULL_ID: &str = "4f66ad9a0b2e4f66ad9a0b2e4f66ad9a0b2e4f66ad9a0b2e4f66ad9a0b2e1234";

    #[test]
    fn test_tls_material_from_dir() {
        let tls = TlsMaterial::from_dir("/certs");
        assert_eq!(tls.ca, PathBuf::from("/certs/ca.pem"));
        assert_eq!(tls.cert, PathBuf::from("/certs/cert.pem"));
        assert_eq!(tls.key, PathBuf::from("/certs/key.pem"));
    }

    #[test]
    fn test_tls_material_validate() {
        let dir = tempfile::tempdir().unwrap();
        let tls = TlsMaterial::from_dir(dir.path());

        std::fs::write(&tls.ca, "ca").unwrap();
        std::fs::write(&tls.cert, "cert").unwrap();
        match tls.validate() {
            Err(Error::MissingCertificate { path }) => assert_eq!(path, tls.key),
            other => panic!("expected MissingCertificate, got {other:?}"),
        }

        std::fs::write(&tls.key, "key").unwrap();
        assert!(tls.validate().is_ok());
    }

    #[test]
    fn test_connect_requires_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let connector = BollardConnector::new(TlsMaterial::from_dir(dir.path()), 5);
        let host = HostConfig::new("prod-1", "tcp://10.0.0.10:2376");

        let err = connector.connect(&host).unwrap_err();
        assert!(matches!(err, Error::MissingCertificate { .. }));
    }

    #[test]
    fn test_summary_from_entry() {
        let entry = ListEntry {
            id: Some(FULL_ID.to_owned()),
            names: Some(vec!["/web".to_owned(), "/alias".to_owned()]),
            image: Some("nginx:alpine".to_owned()),
            state: Some("running".to_owned()),
            status: Some("Up 2 hours".to_owned()),
            ..Default::default()
        };

        let summary = summary_from_entry(entry).unwrap();
        assert_eq!(summary.id.as_ref(), "4f66ad9a0b2e");
        assert_eq!(summary.name, "web");
        assert_eq!(summary.image, "nginx:alpine");
        assert_eq!(summary.state, "running");
        assert_eq!(summary.status, "Up 2 hours");
    }

    #[test]
    fn test_summary_without_id_is_rejected() {
        let err = summary_from_entry(ListEntry::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidContainer(_)));
    }

    #[test]
    fn test_bad_list_entries_are_skipped() {
        let entries = vec![
            ListEntry::default(),
            ListEntry {
                id: Some(FULL_ID.to_owned()),
                names: Some(vec!["/web".to_owned()]),
                ..Default::default()
            },
            ListEntry {
                id: Some("Not-A-Valid-Id".to_owned()),
                ..Default::default()
            },
        ];

        let summaries = summaries_from_entries("prod-1", entries);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "web");
    }

    #[test]
    fn test_inspect_without_optional_blocks() {
        let response = ContainerInspectResponse {
            id: Some(FULL_ID.to_owned()),
            name: Some("/db".to_owned()),
            restart_count: Some(3),
            ..Default::default()
        };

        let detail = inspect_from_response(response).unwrap();
        assert_eq!(detail.id.as_ref(), "4f66ad9a0b2e");
        assert_eq!(detail.name, "db");
        assert_eq!(detail.restart_count, 3);
        assert!(detail.state.is_none());
        assert!(detail.config.is_none());
        assert!(detail.network.is_none());
        assert!(detail.mounts.is_empty());
    }

    #[test]
    fn test_inspect_state_and_primary_network() {
        let response = ContainerInspectResponse {
            id: Some(FULL_ID.to_owned()),
            state: Some(ContainerState {
                running: Some(true),
                pid: Some(4242),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                networks: Some(HashMap::from([
                    (
                        "zeta".to_owned(),
                        EndpointSettings {
                            ip_address: Some("172.19.0.2".to_owned()),
                            ..Default::default()
                        },
                    ),
                    (
                        "alpha".to_owned(),
                        EndpointSettings {
                            ip_address: Some("172.18.0.2".to_owned()),
                            gateway: Some("172.18.0.1".to_owned()),
                            ..Default::default()
                        },
                    ),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let detail = inspect_from_response(response).unwrap();
        let state = detail.state.unwrap();
        assert!(state.running);
        assert_eq!(state.pid, 4242);

        let network = detail.network.unwrap();
        assert_eq!(network.ip_address, "172.18.0.2");
        assert_eq!(network.gateway, "172.18.0.1");
        assert_eq!(network.networks.len(), 2);
    }

    #[test]
    fn test_event_from_message() {
        let message = EventMessage {
            typ: Some(EventMessageTypeEnum::CONTAINER),
            action: Some("exec_start: sh -c true".to_owned()),
            actor: Some(EventActor {
                id: Some("abc".to_owned()),
                attributes: Some(HashMap::from([("name".to_owned(), "web".to_owned())])),
            }),
            time: Some(1_700_000_000),
            ..Default::default()
        };

        let event = event_from_message(message);
        assert_eq!(event.typ, "container");
        assert_eq!(event.action, "exec_start");
        assert_eq!(event.actor_id, "abc");
        assert_eq!(event.attributes["name"], "web");
    }
}
