//! Storage collaborator interface.
//!
//! The authorization core never walks tables itself. It asks a
//! [`MembershipStore`] for a read-only [`MembershipReader`] snapshot and
//! does the closure and evaluation logic on top of it. Implementations:
//! - [`crate::db::PgStore`]: `PostgreSQL` via sqlx, one `REPEATABLE READ`
//!   transaction per snapshot
//! - [`MemoryStore`]: in-process state, one read guard per snapshot
//!
//! Every read made through one snapshot sees the same committed state, so a
//! closure walk and the grant lookup that follows it cannot observe half of
//! a concurrent change.

mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use portcullis_common::{
    Entity, ObjectKind, ObjectPermission, ObjectPermissionTypes, SystemPermissionType,
};

pub use memory::{MemorySnapshot, MemoryStore};

use crate::error::AuthzResult;

/// Raw membership and permission facts, read from one consistent state.
///
/// Wherever a method takes `effective_groups`, `None` restricts the lookup
/// to rows stored directly against `entity`; `Some(groups)` additionally
/// matches rows stored against any of those user groups. Methods seeded
/// with an entity fail with [`crate::AuthzError::UnknownEntity`] if it is
/// not stored.
#[async_trait]
pub trait MembershipReader: Send + Sync {
    /// Identifiers of the groups `entity` is directly a member of.
    async fn direct_group_identifiers(&self, entity: &Entity) -> AuthzResult<HashSet<String>>;

    /// Identifiers of the groups any of `groups` is directly a member of.
    ///
    /// Identifiers with no stored group contribute nothing.
    async fn parent_group_identifiers(&self, groups: &[String]) -> AuthzResult<HashSet<String>>;

    /// Look up one object permission row granting any of `permissions`.
    ///
    /// A row stored directly against `entity` is returned in preference to
    /// one inherited from a group. An empty set matches nothing.
    async fn object_permission(
        &self,
        entity: &Entity,
        object_kind: ObjectKind,
        permissions: ObjectPermissionTypes,
        object_identifier: &str,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<Option<ObjectPermission>>;

    /// The subset of `identifiers` on which at least one of `permissions`
    /// is granted.
    async fn accessible_identifiers(
        &self,
        entity: &Entity,
        object_kind: ObjectKind,
        effective_groups: Option<&HashSet<String>>,
        permissions: ObjectPermissionTypes,
        identifiers: &[String],
    ) -> AuthzResult<HashSet<String>>;

    /// Every object permission row held by `entity`.
    async fn object_permissions(
        &self,
        entity: &Entity,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<Vec<ObjectPermission>>;

    /// Whether the system permission is granted.
    async fn system_permission(
        &self,
        entity: &Entity,
        permission: SystemPermissionType,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<bool>;
}

/// An authorization backend.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Read view pinned to one committed state.
    type Snapshot: MembershipReader + 'static;

    /// Insert a new entity, returning the number of rows inserted.
    ///
    /// Fails with [`crate::AuthzError::EntityAlreadyExists`] on duplicates.
    async fn insert_entity(&self, entity: &Entity) -> AuthzResult<u64>;

    /// Open a read view. Writes committed after this call are not visible
    /// through it.
    async fn snapshot(&self) -> AuthzResult<Self::Snapshot>;
}
