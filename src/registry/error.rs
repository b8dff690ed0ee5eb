use crate::docker;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("host `{0}` is not registered")]
    HostNotFound(String),
    #[error("host `{0}` is configured more than once")]
    DuplicateHost(String),
    #[error("failed to connect to host `{host}`")]
    Connect {
        host: String,
        #[source]
        source: docker::Error,
    },
    #[error("none of the {attempted} configured host(s) could be connected")]
    NoHosts { attempted: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
