use crate::{docker, registry};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("collector `{0}` has already been started")]
    AlreadyStarted(String),
    #[error("collector `{0}` has been stopped and cannot be restarted")]
    Stopped(String),
    #[error("invalid collector configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("unknown collector kind `{0}`")]
    UnknownKind(String),
    #[error("collector manager has already been started")]
    ManagerStarted,
    #[error("no collector could be registered for any of the {attempted} host(s)")]
    NothingRegistered { attempted: usize },
    #[error("collection pass failed")]
    Docker(#[from] docker::Error),
    #[error(transparent)]
    Registry(#[from] registry::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
