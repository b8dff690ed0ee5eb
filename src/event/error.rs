use crate::registry;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("event manager has already been started")]
    AlreadyStarted,
    #[error("event manager has been stopped")]
    Stopped,
    #[error(transparent)]
    Registry(#[from] registry::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
