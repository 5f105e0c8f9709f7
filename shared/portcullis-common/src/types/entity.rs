//! Entity Types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Kind of entity that can hold permissions or group memberships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    /// An individual user.
    User,
    /// A user group. Groups may themselves be members of other groups.
    UserGroup,
}

impl EntityKind {
    /// Stored form of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::UserGroup => "USER_GROUP",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Self::User),
            "USER_GROUP" => Ok(Self::UserGroup),
            other => Err(Error::UnknownEntityKind(other.to_string())),
        }
    }
}

/// A user or user group.
///
/// Identifiers are unique within a kind, so the pair of identifier and kind
/// names exactly one entity. A user and a group may share an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    /// Username or group name.
    pub identifier: String,
    /// Whether this is a user or a group.
    pub kind: EntityKind,
}

impl Entity {
    /// Create an entity of the given kind.
    pub fn new(identifier: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
        }
    }

    /// Create a user entity.
    pub fn user(identifier: impl Into<String>) -> Self {
        Self::new(identifier, EntityKind::User)
    }

    /// Create a user group entity.
    pub fn group(identifier: impl Into<String>) -> Self {
        Self::new(identifier, EntityKind::UserGroup)
    }

    /// Whether this entity is a user group.
    #[must_use]
    pub const fn is_group(&self) -> bool {
        matches!(self.kind, EntityKind::UserGroup)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntityKind::User => write!(f, "user:{}", self.identifier),
            EntityKind::UserGroup => write!(f, "group:{}", self.identifier),
        }
    }
}
