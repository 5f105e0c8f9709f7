//! Errors raised while parsing the textual forms of shared types.

use thiserror::Error;

/// Parse errors for stored or transmitted type names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Not a known entity kind.
    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// Not a known object kind.
    #[error("Unknown object kind: {0}")]
    UnknownObjectKind(String),

    /// Not a known object permission type.
    #[error("Unknown object permission type: {0}")]
    UnknownObjectPermission(String),

    /// Not a known system permission type.
    #[error("Unknown system permission type: {0}")]
    UnknownSystemPermission(String),
}

/// Result alias for parsing shared types.
pub type Result<T> = std::result::Result<T, Error>;
