//! Container identity and the point-in-time container payloads produced by the collectors.
use std::fmt;
use std::sync::Arc;

mod error;
mod models;
pub(crate) mod utils;

pub use error::{Error, Result};
pub use models::{
    ContainerConfigDetail, ContainerInspectDetail, ContainerNetworkDetail, ContainerStateDetail,
    ContainerSummary, MountPoint, NetworkEndpoint, PortBinding,
};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Length of the abbreviated id the daemon CLI displays.
pub const SHORT_ID_LEN: usize = 12;

/// A validated container identifier.
///
/// # Examples
///
/// ```
/// # use dockmon::container::{ContainerID, Error};
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.short().as_ref(), "abc123abc123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty, longer than
    /// [`CONTAINER_ID_MAX_LEN`], or contains anything but lowercase letters and digits.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dockmon::container::{ContainerID, Error};
    /// assert!(ContainerID::new("abcdef012345").is_ok());
    /// assert!(ContainerID::new("").is_err());
    /// assert!(ContainerID::new("ABC").is_err());
    /// ```
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty()
            || src.len() > CONTAINER_ID_MAX_LEN
            || !utils::is_lowercase_alpha_numeric(src.as_bytes())
        {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Returns the id truncated to [`SHORT_ID_LEN`] characters.
    pub fn short(&self) -> Self {
        if self.0.len() <= SHORT_ID_LEN {
            return self.clone();
        }
        // ids are ASCII, so every index is a char boundary
        Self(self.0[..SHORT_ID_LEN].into())
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for ContainerID {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}
