//! This module defines the errors that can be returned by ringbound.
//!
//! Note that most failure paths of a distribution pass are value-level (see
//! [`crate::ring::RebalanceReport::halted_at`]). The variants here cover the
//! precondition violations that are rejected before the ring is mutated.
use std::fmt::Display;

use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

/// Error enum with all possible variants
#[derive(Debug, Serialize)]
pub enum Error {
    /// A server with this name is already a member of the ring
    DuplicateServer { name: String },
    /// Two virtual nodes hashed to the same ring position
    HashCollision {
        hash: u64,
        existing: String,
        incoming: String,
    },
    InvalidConfig {
        reason: String,
    },
    Io {
        reason: String,
    },
}

impl Error {
    /// Returns true if this is an instance of a [`Error::DuplicateServer`] variant
    pub fn is_duplicate_server(&self) -> bool {
        matches!(self, Error::DuplicateServer { .. })
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig {
            reason: err.to_string(),
        }
    }
}
