//! Authorization Error Types

use portcullis_common::Entity;
use thiserror::Error;

/// Errors raised by the authorization core and its storage collaborators.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// The entity a query was seeded with does not exist in storage.
    #[error("Unknown entity: {0}")]
    UnknownEntity(Entity),

    /// Attempted to insert an entity that already exists.
    #[error("Entity already exists: {0}")]
    EntityAlreadyExists(Entity),

    /// Membership edges may only point at user groups.
    #[error("Not a user group: {0}")]
    NotAGroup(Entity),

    /// A guarded operation was refused by its access policy.
    #[error("Permission denied")]
    PermissionDenied,

    /// Database error.
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be interpreted.
    #[error("Invalid stored value: {0}")]
    InvalidRow(#[from] portcullis_common::Error),
}

impl AuthzError {
    /// Whether this error is a policy denial rather than a fault.
    #[must_use]
    pub const fn is_denial(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

/// Result type for authorization operations.
pub type AuthzResult<T> = Result<T, AuthzError>;
