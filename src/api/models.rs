#[derive(Debug, Default, serde::Deserialize)]
pub struct EventsParams {
    /// Only stream events of this host.
    pub host: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct HostsBody {
    pub hosts: Vec<String>,
}
