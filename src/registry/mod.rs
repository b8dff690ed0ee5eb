//! Host Registry: one daemon client per named host.
//!
//! The registry is built once at start-up from the configured host list and only
//! shrinks afterwards, when [`HostRegistry::close_all`] tears it down at shutdown.
//! Lookups take a shared shard lock, so concurrent readers never block each other.
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

mod error;

pub use error::{Error, Result};

use crate::docker::{Connector, DockerApi};

/// Name of the connection created when no host list is configured.
pub const LOCAL_HOST: &str = "local";

/// One configured remote daemon.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct HostConfig {
    pub name: String,
    /// Daemon endpoint, e.g. `tcp://10.0.0.10:2376`.
    #[serde(rename = "addr", alias = "address")]
    pub address: String,
}

impl HostConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// An established client for one host.
pub struct HostConnection {
    name: String,
    address: String,
    client: Arc<dyn DockerApi>,
}

impl HostConnection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn client(&self) -> Arc<dyn DockerApi> {
        Arc::clone(&self.client)
    }
}

impl fmt::Debug for HostConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConnection")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Result of [`HostRegistry::register`]: the usable hosts plus one error per host
/// that could not be connected.
#[derive(Debug)]
pub struct Registration {
    pub registry: HostRegistry,
    pub failures: Vec<Error>,
}

/// Thread-safe map of host name to [`HostConnection`].
#[derive(Debug, Default)]
pub struct HostRegistry {
    hosts: DashMap<String, Arc<HostConnection>>,
}

impl HostRegistry {
    /// Connects every host in `hosts`, or the local daemon when `hosts` is empty.
    ///
    /// Hosts that fail to connect are logged and returned in
    /// [`Registration::failures`]; the remaining hosts are still registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoHosts`] if not a single host could be connected.
    pub fn register(hosts: &[HostConfig], connector: &dyn Connector) -> Result<Registration> {
        let registry = Self::default();
        let mut failures = Vec::new();

        if hosts.is_empty() {
            log::info!("No hosts configured, falling back to the local daemon");
            match connector.connect_local() {
                Ok(client) => registry.insert(LOCAL_HOST, "local", client),
                Err(source) => failures.push(Error::Connect {
                    host: LOCAL_HOST.to_owned(),
                    source,
                }),
            }
        }

        for host in hosts {
            if registry.hosts.contains_key(&host.name) {
                failures.push(Error::DuplicateHost(host.name.clone()));
                continue;
            }
            match connector.connect(host) {
                Ok(client) => registry.insert(&host.name, &host.address, client),
                Err(source) => failures.push(Error::Connect {
                    host: host.name.clone(),
                    source,
                }),
            }
        }

        for failure in &failures {
            match std::error::Error::source(failure) {
                Some(source) => log::error!(target: "host registry", "{failure}: {source}"),
                None => log::error!(target: "host registry", "{failure}"),
            }
        }

        if registry.is_empty() {
            return Err(Error::NoHosts {
                attempted: hosts.len().max(1),
            });
        }
        log::info!(
            "Registered {} host(s): {}",
            registry.len(),
            registry.host_names().join(", ")
        );

        Ok(Registration { registry, failures })
    }

    fn insert(&self, name: &str, address: &str, client: Arc<dyn DockerApi>) {
        let connection = HostConnection {
            name: name.to_owned(),
            address: address.to_owned(),
            client,
        };
        self.hosts.insert(name.to_owned(), Arc::new(connection));
    }

    /// Looks up the connection of host `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HostNotFound`] for unknown hosts and after [`Self::close_all`].
    pub fn get(&self, name: &str) -> Result<Arc<HostConnection>> {
        self.hosts
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::HostNotFound(name.to_owned()))
    }

    /// Registered host names in ascending order.
    pub fn host_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hosts.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Drops every held connection. Calling it again is a no-op.
    pub fn close_all(&self) {
        for name in self.host_names() {
            if let Some((name, connection)) = self.hosts.remove(&name) {
                let holders = Arc::strong_count(&connection) - 1;
                if holders > 0 {
                    log::warn!(
                        target: "host registry",
                        "connection still referenced on close: host={name}, holders={holders}"
                    );
                }
                log::debug!("Closed connection to {name} ({})", connection.address);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::docker::{self, fake::FakeDocker};

    #[derive(Default)]
    struct FakeConnector {
        unreachable: HashSet<String>,
        local_unreachable: bool,
    }

    impl Connector for FakeConnector {
        fn connect(&self, host: &HostConfig) -> docker::Result<Arc<dyn DockerApi>> {
            if self.unreachable.contains(&host.name) {
                return Err(docker::Error::Unreachable(host.address.clone()));
            }
            Ok(Arc::new(FakeDocker::new()))
        }

        fn connect_local(&self) -> docker::Result<Arc<dyn DockerApi>> {
            if self.local_unreachable {
                return Err(docker::Error::Unreachable("local".to_owned()));
            }
            Ok(Arc::new(FakeDocker::new()))
        }
    }

    fn hosts(names: &[&str]) -> Vec<HostConfig> {
        names
            .iter()
            .map(|name| HostConfig::new(*name, format!("tcp://{name}:2376")))
            .collect()
    }

    #[test]
    fn test_register_all_hosts() {
        let registration =
            HostRegistry::register(&hosts(&["b", "a"]), &FakeConnector::default()).unwrap();

        assert!(registration.failures.is_empty());
        assert_eq!(registration.registry.host_names(), vec!["a", "b"]);
        let a = registration.registry.get("a").unwrap();
        assert_eq!(a.name(), "a");
        assert_eq!(a.address(), "tcp://a:2376");
    }

    #[test]
    fn test_register_without_hosts_uses_local() {
        let registration = HostRegistry::register(&[], &FakeConnector::default()).unwrap();

        assert_eq!(registration.registry.host_names(), vec![LOCAL_HOST]);
    }

    #[test]
    fn test_register_partial_success() {
        let connector = FakeConnector {
            unreachable: HashSet::from(["down".to_owned()]),
            ..Default::default()
        };
        let registration = HostRegistry::register(&hosts(&["up", "down"]), &connector).unwrap();

        assert_eq!(registration.registry.len(), 1);
        assert!(registration.registry.get("up").is_ok());
        assert!(matches!(
            registration.registry.get("down"),
            Err(Error::HostNotFound(name)) if name == "down"
        ));
        assert_eq!(registration.failures.len(), 1);
        assert!(matches!(
            &registration.failures[0],
            Error::Connect { host, .. } if host == "down"
        ));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registration =
            HostRegistry::register(&hosts(&["a", "a"]), &FakeConnector::default()).unwrap();

        assert_eq!(registration.registry.len(), 1);
        assert!(matches!(
            &registration.failures[..],
            [Error::DuplicateHost(name)] if name == "a"
        ));
    }

    #[test]
    fn test_register_fails_without_any_host() {
        let connector = FakeConnector {
            local_unreachable: true,
            ..Default::default()
        };
        let err = HostRegistry::register(&[], &connector).unwrap_err();
        assert!(matches!(err, Error::NoHosts { attempted: 1 }));
    }

    #[test]
    fn test_close_all_is_idempotent() {
        let registry = HostRegistry::register(&hosts(&["a", "b"]), &FakeConnector::default())
            .unwrap()
            .registry;

        registry.close_all();
        assert!(registry.is_empty());
        assert!(registry.get("a").is_err());

        registry.close_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_host_config_accepts_both_address_keys() {
        let hosts: Vec<HostConfig> = serde_json::from_str(
            r#"[{"name":"a","addr":"tcp://a:2376"},{"name":"b","address":"tcp://b:2376"}]"#,
        )
        .unwrap();

        assert_eq!(hosts[0], HostConfig::new("a", "tcp://a:2376"));
        assert_eq!(hosts[1], HostConfig::new("b", "tcp://b:2376"));
    }
}
