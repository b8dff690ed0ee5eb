//! Process configuration, read once from the environment at start-up.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

mod error;

pub use error::{Error, Result};

use crate::docker::TlsMaterial;
use crate::pipeline::{self, CollectorConfig, CollectorKind};
use crate::registry::HostConfig;

pub const DEFAULT_CERT_PATH: &str = "./certs";
pub const DEFAULT_COLLECT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_COLLECT_BUFFER_SIZE: usize = 100;
pub const DEFAULT_PIPELINE_BUFFER_SIZE: usize = 100;
pub const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_API_LISTEN_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Remote hosts; empty means the local daemon.
    pub hosts: Vec<HostConfig>,
    /// Directory holding `ca.pem`, `cert.pem` and `key.pem`.
    pub cert_path: PathBuf,
    pub collect_interval_secs: u64,
    pub collect_buffer_size: usize,
    pub pipeline_buffer_size: usize,
    pub collectors: Vec<CollectorKind>,
    pub docker_timeout_secs: u64,
    pub api_listen_addr: SocketAddr,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `DOCKER_HOSTS` | none, i.e. the local daemon |
    /// | `CERT_PATH` | `./certs` |
    /// | `COLLECT_INTERVAL_SECS` | `10` |
    /// | `COLLECT_BUFFER_SIZE` | `100` |
    /// | `PIPELINE_BUFFER_SIZE` | `100` |
    /// | `COLLECTORS` | `list,inspect,stats` |
    /// | `DOCKER_TIMEOUT_SECS` | `120` |
    /// | `API_LISTEN_ADDR` | `0.0.0.0:3000` |
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is set to an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let hosts = match var("DOCKER_HOSTS") {
            Some(raw) => serde_json::from_str(&raw).map_err(Error::InvalidHosts)?,
            None => Vec::new(),
        };
        let collectors = match var("COLLECTORS") {
            Some(raw) => parse_collectors(&raw)?,
            None => CollectorKind::ALL.to_vec(),
        };
        let api_listen_addr = {
            let value = var("API_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_API_LISTEN_ADDR.to_owned());
            SocketAddr::from_str(value.trim())
                .map_err(|source| Error::InvalidAddress { value, source })?
        };

        Ok(Self {
            hosts,
            cert_path: var("CERT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CERT_PATH)),
            collect_interval_secs: positive(
                "COLLECT_INTERVAL_SECS",
                var("COLLECT_INTERVAL_SECS"),
                DEFAULT_COLLECT_INTERVAL_SECS,
            )?,
            collect_buffer_size: positive(
                "COLLECT_BUFFER_SIZE",
                var("COLLECT_BUFFER_SIZE"),
                DEFAULT_COLLECT_BUFFER_SIZE,
            )?,
            pipeline_buffer_size: positive(
                "PIPELINE_BUFFER_SIZE",
                var("PIPELINE_BUFFER_SIZE"),
                DEFAULT_PIPELINE_BUFFER_SIZE,
            )?,
            collectors,
            docker_timeout_secs: positive(
                "DOCKER_TIMEOUT_SECS",
                var("DOCKER_TIMEOUT_SECS"),
                DEFAULT_DOCKER_TIMEOUT_SECS,
            )?,
            api_listen_addr,
        })
    }

    pub fn tls(&self) -> TlsMaterial {
        TlsMaterial::from_dir(&self.cert_path)
    }

    /// Collector settings shared by every host.
    pub fn collector_template(&self) -> pipeline::Result<CollectorConfig> {
        CollectorConfig::new("", self.collect_interval_secs, self.collect_buffer_size)
    }
}

fn positive<T>(key: &'static str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr<Err = std::num::ParseIntError> + PartialEq + Default,
{
    let Some(value) = value else {
        return Ok(default);
    };
    let parsed: T = value
        .trim()
        .parse()
        .map_err(|source| Error::InvalidNumber {
            key,
            value: value.clone(),
            source,
        })?;
    if parsed == T::default() {
        return Err(Error::NotPositive(key));
    }
    Ok(parsed)
}

fn parse_collectors(raw: &str) -> Result<Vec<CollectorKind>> {
    let mut kinds = Vec::new();
    for part in raw.split(',').filter(|part| !part.trim().is_empty()) {
        let kind = part
            .parse::<CollectorKind>()
            .map_err(Error::InvalidCollectors)?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err(Error::NoCollectors);
    }
    Ok(kinds)
}
