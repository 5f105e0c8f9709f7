//! System-level permissions.
//!
//! These permissions are not tied to any object. They cover creation of new
//! objects and platform-wide administration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::entity::Entity;
use crate::Error;

/// System-level permission type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemPermissionType {
    /// Create new connections
    CreateConnection,
    /// Create new connection groups
    CreateConnectionGroup,
    /// Create new sharing profiles
    CreateSharingProfile,
    /// Create new users
    CreateUser,
    /// Create new user groups
    CreateUserGroup,
    /// View the session history of every user
    Audit,
    /// Administer the system as a whole; satisfies administrator access rules
    Administer,
}

impl SystemPermissionType {
    /// Stored form of the type.
    ///
    /// # Examples
    ///
    /// ```
    /// use portcullis_common::SystemPermissionType;
    ///
    /// assert_eq!(SystemPermissionType::CreateUserGroup.as_str(), "CREATE_USER_GROUP");
    /// ```
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateConnection => "CREATE_CONNECTION",
            Self::CreateConnectionGroup => "CREATE_CONNECTION_GROUP",
            Self::CreateSharingProfile => "CREATE_SHARING_PROFILE",
            Self::CreateUser => "CREATE_USER",
            Self::CreateUserGroup => "CREATE_USER_GROUP",
            Self::Audit => "AUDIT",
            Self::Administer => "ADMINISTER",
        }
    }

    /// Returns all system permission types as a slice.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::CreateConnection,
            Self::CreateConnectionGroup,
            Self::CreateSharingProfile,
            Self::CreateUser,
            Self::CreateUserGroup,
            Self::Audit,
            Self::Administer,
        ]
    }

    /// Returns a human-readable description of the permission.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::CreateConnection => "Create connections",
            Self::CreateConnectionGroup => "Create connection groups",
            Self::CreateSharingProfile => "Create sharing profiles",
            Self::CreateUser => "Create users",
            Self::CreateUserGroup => "Create user groups",
            Self::Audit => "View session history of all users",
            Self::Administer => "Administer the whole system",
        }
    }
}

impl fmt::Display for SystemPermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemPermissionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .find(|permission| permission.as_str() == s)
            .copied()
            .ok_or_else(|| Error::UnknownSystemPermission(s.to_string()))
    }
}

/// A stored system permission row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemPermission {
    /// Entity the permission is stored against.
    pub grantee: Entity,
    /// Granted capability.
    pub permission: SystemPermissionType,
}

impl SystemPermission {
    /// Create a system permission row.
    #[must_use]
    pub const fn new(grantee: Entity, permission: SystemPermissionType) -> Self {
        Self {
            grantee,
            permission,
        }
    }
}
