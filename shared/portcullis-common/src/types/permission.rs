//! Object Permission Types
//!
//! Object permissions grant an entity one kind of access to one object,
//! scoped by the kind of object the identifier refers to.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityKind};
use crate::Error;

/// Kind of object an object permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectKind {
    /// A remote desktop connection.
    Connection,
    /// A group of connections.
    ConnectionGroup,
    /// A profile for sharing an active connection.
    SharingProfile,
    /// A user account.
    User,
    /// A user group.
    UserGroup,
}

impl ObjectKind {
    /// Every object kind.
    pub const ALL: [Self; 5] = [
        Self::Connection,
        Self::ConnectionGroup,
        Self::SharingProfile,
        Self::User,
        Self::UserGroup,
    ];

    /// Object kind under which permissions on an entity are stored.
    #[must_use]
    pub const fn for_entity(kind: EntityKind) -> Self {
        match kind {
            EntityKind::User => Self::User,
            EntityKind::UserGroup => Self::UserGroup,
        }
    }

    /// Stored form of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "CONNECTION",
            Self::ConnectionGroup => "CONNECTION_GROUP",
            Self::SharingProfile => "SHARING_PROFILE",
            Self::User => "USER",
            Self::UserGroup => "USER_GROUP",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownObjectKind(s.to_string()))
    }
}

/// Type of access an object permission grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectPermissionType {
    /// Read the object.
    Read,
    /// Modify the object.
    Update,
    /// Delete the object.
    Delete,
    /// Grant and revoke permissions on the object.
    Administer,
}

impl ObjectPermissionType {
    /// Every object permission type.
    pub const ALL: [Self; 4] = [Self::Read, Self::Update, Self::Delete, Self::Administer];

    /// Stored form of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Administer => "ADMINISTER",
        }
    }
}

impl fmt::Display for ObjectPermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectPermissionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|permission| permission.as_str() == s)
            .ok_or_else(|| Error::UnknownObjectPermission(s.to_string()))
    }
}

bitflags! {
    /// Set of object permission types, used wherever a check accepts
    /// "any of these types".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ObjectPermissionTypes: u8 {
        /// See [`ObjectPermissionType::Read`].
        const READ       = 1 << 0;
        /// See [`ObjectPermissionType::Update`].
        const UPDATE     = 1 << 1;
        /// See [`ObjectPermissionType::Delete`].
        const DELETE     = 1 << 2;
        /// See [`ObjectPermissionType::Administer`].
        const ADMINISTER = 1 << 3;
    }
}

impl ObjectPermissionTypes {
    /// Check if the set includes the given type.
    #[must_use]
    pub fn has(self, permission: ObjectPermissionType) -> bool {
        self.contains(Self::from(permission))
    }

    /// The individual types in this set, in declaration order.
    pub fn types(self) -> impl Iterator<Item = ObjectPermissionType> {
        ObjectPermissionType::ALL
            .into_iter()
            .filter(move |permission| self.has(*permission))
    }
}

impl Default for ObjectPermissionTypes {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<ObjectPermissionType> for ObjectPermissionTypes {
    fn from(permission: ObjectPermissionType) -> Self {
        match permission {
            ObjectPermissionType::Read => Self::READ,
            ObjectPermissionType::Update => Self::UPDATE,
            ObjectPermissionType::Delete => Self::DELETE,
            ObjectPermissionType::Administer => Self::ADMINISTER,
        }
    }
}

impl FromIterator<ObjectPermissionType> for ObjectPermissionTypes {
    fn from_iter<I: IntoIterator<Item = ObjectPermissionType>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |set, permission| set | Self::from(permission))
    }
}

/// A stored object permission row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectPermission {
    /// Entity the permission is stored against.
    pub grantee: Entity,
    /// Kind of object the identifier refers to.
    pub object_kind: ObjectKind,
    /// Granted access.
    pub permission: ObjectPermissionType,
    /// Identifier of the affected object.
    pub object_identifier: String,
}

impl ObjectPermission {
    /// Create an object permission row.
    pub fn new(
        grantee: Entity,
        object_kind: ObjectKind,
        permission: ObjectPermissionType,
        object_identifier: impl Into<String>,
    ) -> Self {
        Self {
            grantee,
            object_kind,
            permission,
            object_identifier: object_identifier.into(),
        }
    }
}
