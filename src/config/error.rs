use crate::pipeline;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid number for `{key}`: {value:?}")]
    InvalidNumber {
        key: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`{0}` must be greater than zero")]
    NotPositive(&'static str),
    #[error("invalid host list in `DOCKER_HOSTS`")]
    InvalidHosts(#[source] serde_json::Error),
    #[error("invalid collector list in `COLLECTORS`")]
    InvalidCollectors(#[source] pipeline::Error),
    #[error("`COLLECTORS` names no collector")]
    NoCollectors,
    #[error("invalid listen address {value:?}")]
    InvalidAddress {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
