#![forbid(unsafe_code)]

//! Construction-time errors.
//!
//! Runtime conditions (container not there yet, an element without an id,
//! a scroll position that satisfies both triggers) are never errors: the
//! engine logs them and does nothing this tick. Only startup can fail.

use core::fmt;

use crate::config::ConfigError;

/// Error returned when the engine cannot be started.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualizerError {
    /// The configuration did not validate.
    Config(ConfigError),
    /// A collaborator the engine cannot work without is missing
    /// (e.g. the host has no document body).
    MissingCollaborator(&'static str),
}

impl fmt::Display for VirtualizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::MissingCollaborator(what) => write!(f, "required collaborator missing: {what}"),
        }
    }
}

impl std::error::Error for VirtualizerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::MissingCollaborator(_) => None,
        }
    }
}

impl From<ConfigError> for VirtualizerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}
