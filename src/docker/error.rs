use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to docker host `{host}` at `{address}`: {source}")]
    Connect {
        host: String,
        address: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("missing certificate file `{path}`")]
    MissingCertificate { path: PathBuf },
    #[error("docker request failed: {0}")]
    Request(#[from] bollard::errors::Error),
    #[error("no such container `{0}`")]
    NoSuchContainer(String),
    #[error("daemon reported an invalid container: {0}")]
    InvalidContainer(#[from] crate::container::Error),
    #[error("stats stream of container `{0}` ended before two frames were received")]
    IncompleteStats(String),
    #[error("docker host `{0}` is unreachable")]
    Unreachable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
