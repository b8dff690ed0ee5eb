use std::collections::HashMap;

use super::ContainerID;

/// A point-in-time row from a container listing.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ContainerSummary {
    pub id: ContainerID,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
}

/// Detailed container configuration as reported by an inspect query.
///
/// The optional blocks are only present when the daemon reports them.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ContainerInspectDetail {
    pub id: ContainerID,
    pub name: String,
    pub image: String,
    pub created: String,
    pub platform: String,
    pub restart_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ContainerStateDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ContainerConfigDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<ContainerNetworkDetail>,
    pub mounts: Vec<MountPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ContainerStateDetail {
    /// `running`, `exited`, `paused`, ...
    pub status: String,
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    pub oom_killed: bool,
    pub dead: bool,
    pub pid: i64,
    pub exit_code: i64,
    pub error: String,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ContainerConfigDetail {
    pub hostname: String,
    pub user: String,
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub entrypoint: Vec<String>,
    pub working_dir: String,
    pub exposed_ports: Vec<String>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ContainerNetworkDetail {
    /// Address of the first attached network.
    pub ip_address: String,
    pub gateway: String,
    pub mac_address: String,
    /// Published ports keyed by `<port>/<proto>`.
    pub ports: HashMap<String, Vec<PortBinding>>,
    pub networks: HashMap<String, NetworkEndpoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct NetworkEndpoint {
    pub network_id: String,
    pub ip_address: String,
    pub gateway: String,
    pub mac_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MountPoint {
    /// `bind`, `volume`, `tmpfs`, ...
    #[serde(rename = "type")]
    pub typ: String,
    pub name: String,
    pub source: String,
    pub destination: String,
    pub mode: String,
    pub rw: bool,
}
