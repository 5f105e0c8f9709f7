//! In-process membership store.
//!
//! Holds every fact in one state behind a `RwLock`. A snapshot keeps a read
//! guard for its whole life, so writers wait until the check using it is
//! done and never interleave with it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use portcullis_common::{
    Entity, ObjectKind, ObjectPermission, ObjectPermissionTypes, SystemPermission,
    SystemPermissionType,
};
use tokio::sync::{OwnedRwLockReadGuard, RwLock};

use super::{MembershipReader, MembershipStore};
use crate::error::{AuthzError, AuthzResult};

#[derive(Debug, Default)]
struct State {
    entities: HashSet<Entity>,
    /// Member entity -> identifiers of the groups it directly belongs to.
    memberships: HashMap<Entity, BTreeSet<String>>,
    object_grants: HashSet<ObjectPermission>,
    system_grants: HashSet<SystemPermission>,
}

impl State {
    fn require(&self, entity: &Entity) -> AuthzResult<()> {
        if self.entities.contains(entity) {
            Ok(())
        } else {
            Err(AuthzError::UnknownEntity(entity.clone()))
        }
    }
}

/// Whether a row stored against `grantee` applies to `entity`.
fn applies_to(
    grantee: &Entity,
    entity: &Entity,
    effective_groups: Option<&HashSet<String>>,
) -> bool {
    if grantee == entity {
        return true;
    }
    grantee.is_group()
        && effective_groups.is_some_and(|groups| groups.contains(&grantee.identifier))
}

/// Membership store backed by process memory.
///
/// The administrative writes (`add_group_member`, `grant_*`, `revoke_*`)
/// exist for seeding; the authorization core itself only reads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `member` a direct member of `group`.
    ///
    /// Returns `false` if the edge already existed.
    pub async fn add_group_member(&self, group: &Entity, member: &Entity) -> AuthzResult<bool> {
        if !group.is_group() {
            return Err(AuthzError::NotAGroup(group.clone()));
        }

        let mut state = self.inner.write().await;
        state.require(group)?;
        state.require(member)?;

        Ok(state
            .memberships
            .entry(member.clone())
            .or_default()
            .insert(group.identifier.clone()))
    }

    /// Remove a direct membership edge.
    ///
    /// Returns `true` if an edge was removed.
    pub async fn remove_group_member(&self, group: &Entity, member: &Entity) -> bool {
        let mut state = self.inner.write().await;
        state
            .memberships
            .get_mut(member)
            .is_some_and(|groups| groups.remove(&group.identifier))
    }

    /// Store an object permission row.
    ///
    /// Returns `false` if the identical row already existed.
    pub async fn grant_object_permission(&self, permission: ObjectPermission) -> AuthzResult<bool> {
        let mut state = self.inner.write().await;
        state.require(&permission.grantee)?;
        Ok(state.object_grants.insert(permission))
    }

    /// Delete an object permission row.
    ///
    /// Returns `true` if a row was deleted.
    pub async fn revoke_object_permission(&self, permission: &ObjectPermission) -> bool {
        self.inner.write().await.object_grants.remove(permission)
    }

    /// Store a system permission row.
    ///
    /// Returns `false` if the identical row already existed.
    pub async fn grant_system_permission(
        &self,
        entity: &Entity,
        permission: SystemPermissionType,
    ) -> AuthzResult<bool> {
        let mut state = self.inner.write().await;
        state.require(entity)?;
        Ok(state
            .system_grants
            .insert(SystemPermission::new(entity.clone(), permission)))
    }

    /// Delete a system permission row.
    ///
    /// Returns `true` if a row was deleted.
    pub async fn revoke_system_permission(
        &self,
        entity: &Entity,
        permission: SystemPermissionType,
    ) -> bool {
        self.inner
            .write()
            .await
            .system_grants
            .remove(&SystemPermission::new(entity.clone(), permission))
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn insert_entity(&self, entity: &Entity) -> AuthzResult<u64> {
        let mut state = self.inner.write().await;
        if !state.entities.insert(entity.clone()) {
            return Err(AuthzError::EntityAlreadyExists(entity.clone()));
        }
        Ok(1)
    }

    async fn snapshot(&self) -> AuthzResult<MemorySnapshot> {
        Ok(MemorySnapshot {
            state: Arc::clone(&self.inner).read_owned().await,
        })
    }
}

/// Read view over a [`MemoryStore`], holding its read guard.
#[derive(Debug)]
pub struct MemorySnapshot {
    state: OwnedRwLockReadGuard<State>,
}

#[async_trait]
impl MembershipReader for MemorySnapshot {
    async fn direct_group_identifiers(&self, entity: &Entity) -> AuthzResult<HashSet<String>> {
        self.state.require(entity)?;

        Ok(self
            .state
            .memberships
            .get(entity)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn parent_group_identifiers(&self, groups: &[String]) -> AuthzResult<HashSet<String>> {
        Ok(groups
            .iter()
            .filter_map(|identifier| {
                self.state
                    .memberships
                    .get(&Entity::group(identifier.as_str()))
            })
            .flat_map(|parents| parents.iter().cloned())
            .collect())
    }

    async fn object_permission(
        &self,
        entity: &Entity,
        object_kind: ObjectKind,
        permissions: ObjectPermissionTypes,
        object_identifier: &str,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<Option<ObjectPermission>> {
        self.state.require(entity)?;

        let direct = permissions
            .types()
            .map(|permission| {
                ObjectPermission::new(entity.clone(), object_kind, permission, object_identifier)
            })
            .find(|row| self.state.object_grants.contains(row));
        if direct.is_some() {
            return Ok(direct);
        }

        let Some(groups) = effective_groups else {
            return Ok(None);
        };

        // Smallest matching group keeps the answer stable between calls.
        Ok(groups
            .iter()
            .flat_map(|group| {
                permissions.types().map(move |permission| {
                    ObjectPermission::new(
                        Entity::group(group.as_str()),
                        object_kind,
                        permission,
                        object_identifier,
                    )
                })
            })
            .filter(|row| self.state.object_grants.contains(row))
            .min())
    }

    async fn accessible_identifiers(
        &self,
        entity: &Entity,
        object_kind: ObjectKind,
        effective_groups: Option<&HashSet<String>>,
        permissions: ObjectPermissionTypes,
        identifiers: &[String],
    ) -> AuthzResult<HashSet<String>> {
        self.state.require(entity)?;

        let candidates: HashSet<&str> = identifiers.iter().map(String::as_str).collect();

        Ok(self
            .state
            .object_grants
            .iter()
            .filter(|row| row.object_kind == object_kind)
            .filter(|row| permissions.has(row.permission))
            .filter(|row| candidates.contains(row.object_identifier.as_str()))
            .filter(|row| applies_to(&row.grantee, entity, effective_groups))
            .map(|row| row.object_identifier.clone())
            .collect())
    }

    async fn object_permissions(
        &self,
        entity: &Entity,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<Vec<ObjectPermission>> {
        self.state.require(entity)?;

        let mut rows: Vec<ObjectPermission> = self
            .state
            .object_grants
            .iter()
            .filter(|row| applies_to(&row.grantee, entity, effective_groups))
            .cloned()
            .collect();
        rows.sort();
        Ok(rows)
    }

    async fn system_permission(
        &self,
        entity: &Entity,
        permission: SystemPermissionType,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<bool> {
        self.state.require(entity)?;

        Ok(self.state.system_grants.iter().any(|row| {
            row.permission == permission && applies_to(&row.grantee, entity, effective_groups)
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use portcullis_common::ObjectPermissionType;

    use super::*;

    async fn seeded() -> (MemoryStore, Entity, Entity) {
        let store = MemoryStore::new();
        let alice = Entity::user("alice");
        let ops = Entity::group("ops");
        store.insert_entity(&alice).await.unwrap();
        store.insert_entity(&ops).await.unwrap();
        store.add_group_member(&ops, &alice).await.unwrap();
        (store, alice, ops)
    }

    fn groups(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| (*id).to_string()).collect()
    }

    fn read(permission: ObjectPermissionType) -> ObjectPermissionTypes {
        permission.into()
    }

    #[tokio::test]
    async fn test_insert_duplicate_entity_fails() {
        let store = MemoryStore::new();
        let alice = Entity::user("alice");

        assert_eq!(store.insert_entity(&alice).await.unwrap(), 1);
        let err = store.insert_entity(&alice).await.unwrap_err();
        assert!(matches!(err, AuthzError::EntityAlreadyExists(e) if e == alice));

        // Same identifier, other kind, is a different entity.
        assert_eq!(store.insert_entity(&Entity::group("alice")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_direct_groups_of_unknown_entity_fail() {
        let store = MemoryStore::new();
        let err = store
            .snapshot()
            .await
            .unwrap()
            .direct_group_identifiers(&Entity::user("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnknownEntity(_)));
    }

    #[tokio::test]
    async fn test_membership_requires_group_target() {
        let (store, alice, ops) = seeded().await;
        let err = store.add_group_member(&alice, &ops).await.unwrap_err();
        assert!(matches!(err, AuthzError::NotAGroup(_)));
    }

    #[tokio::test]
    async fn test_membership_edges_are_idempotent() {
        let (store, alice, ops) = seeded().await;
        assert!(!store.add_group_member(&ops, &alice).await.unwrap());
        assert!(store.remove_group_member(&ops, &alice).await);
        assert!(!store.remove_group_member(&ops, &alice).await);

        let view = store.snapshot().await.unwrap();
        assert!(view.direct_group_identifiers(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parent_groups_ignore_users_and_unknown_ids() {
        let (store, _alice, ops) = seeded().await;
        let admins = Entity::group("admins");
        store.insert_entity(&admins).await.unwrap();
        store.add_group_member(&admins, &ops).await.unwrap();

        // "alice" names a user, not a group, and "external" is not stored.
        let parents = store
            .snapshot()
            .await
            .unwrap()
            .parent_group_identifiers(&["ops".into(), "alice".into(), "external".into()])
            .await
            .unwrap();
        assert_eq!(parents, groups(&["admins"]));
    }

    #[tokio::test]
    async fn test_direct_row_preferred_over_inherited() {
        let (store, alice, ops) = seeded().await;
        let direct = ObjectPermission::new(
            alice.clone(),
            ObjectKind::Connection,
            ObjectPermissionType::Read,
            "conn-1",
        );
        let inherited = ObjectPermission::new(
            ops,
            ObjectKind::Connection,
            ObjectPermissionType::Read,
            "conn-1",
        );
        store.grant_object_permission(inherited.clone()).await.unwrap();
        store.grant_object_permission(direct.clone()).await.unwrap();

        let found = store
            .snapshot()
            .await
            .unwrap()
            .object_permission(
                &alice,
                ObjectKind::Connection,
                read(ObjectPermissionType::Read),
                "conn-1",
                Some(&groups(&["ops"])),
            )
            .await
            .unwrap();
        assert_eq!(found, Some(direct.clone()));

        store.revoke_object_permission(&direct).await;
        let found = store
            .snapshot()
            .await
            .unwrap()
            .object_permission(
                &alice,
                ObjectKind::Connection,
                read(ObjectPermissionType::Read),
                "conn-1",
                Some(&groups(&["ops"])),
            )
            .await
            .unwrap();
        assert_eq!(found, Some(inherited));
    }

    #[tokio::test]
    async fn test_object_permission_matches_any_type_in_set() {
        let (store, alice, _ops) = seeded().await;
        let delete = ObjectPermission::new(
            alice.clone(),
            ObjectKind::Connection,
            ObjectPermissionType::Delete,
            "conn-1",
        );
        store.grant_object_permission(delete.clone()).await.unwrap();
        let view = store.snapshot().await.unwrap();

        let found = view
            .object_permission(
                &alice,
                ObjectKind::Connection,
                ObjectPermissionTypes::READ | ObjectPermissionTypes::DELETE,
                "conn-1",
                None,
            )
            .await
            .unwrap();
        assert_eq!(found, Some(delete));

        let none = view
            .object_permission(
                &alice,
                ObjectKind::Connection,
                ObjectPermissionTypes::empty(),
                "conn-1",
                None,
            )
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn test_object_kind_scopes_rows() {
        let (store, alice, _ops) = seeded().await;
        store
            .grant_object_permission(ObjectPermission::new(
                alice.clone(),
                ObjectKind::User,
                ObjectPermissionType::Read,
                "bob",
            ))
            .await
            .unwrap();

        let accessible = store
            .snapshot()
            .await
            .unwrap()
            .accessible_identifiers(
                &alice,
                ObjectKind::UserGroup,
                None,
                ObjectPermissionTypes::all(),
                &["bob".into()],
            )
            .await
            .unwrap();
        assert!(accessible.is_empty());
    }

    #[tokio::test]
    async fn test_group_rows_ignored_without_effective_groups() {
        let (store, alice, ops) = seeded().await;
        store
            .grant_system_permission(&ops, SystemPermissionType::Audit)
            .await
            .unwrap();
        let view = store.snapshot().await.unwrap();

        assert!(!view
            .system_permission(&alice, SystemPermissionType::Audit, None)
            .await
            .unwrap());
        assert!(view
            .system_permission(&alice, SystemPermissionType::Audit, Some(&groups(&["ops"])))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_user_row_never_matches_through_group_name() {
        let (store, alice, _ops) = seeded().await;
        let namesake = Entity::user("ops");
        store.insert_entity(&namesake).await.unwrap();
        store
            .grant_system_permission(&namesake, SystemPermissionType::Administer)
            .await
            .unwrap();

        assert!(!store
            .snapshot()
            .await
            .unwrap()
            .system_permission(
                &alice,
                SystemPermissionType::Administer,
                Some(&groups(&["ops"]))
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_grant_to_unknown_entity_fails() {
        let store = MemoryStore::new();
        let err = store
            .grant_system_permission(&Entity::user("ghost"), SystemPermissionType::Audit)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnknownEntity(_)));
    }

    #[tokio::test]
    async fn test_snapshot_hides_later_writes() {
        let (store, alice, ops) = seeded().await;
        let store = Arc::new(store);
        let view = store.snapshot().await.unwrap();

        let writer = tokio::spawn({
            let store = Arc::clone(&store);
            let (alice, ops) = (alice.clone(), ops.clone());
            async move { store.remove_group_member(&ops, &alice).await }
        });

        // The writer cannot finish while the snapshot is alive.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());
        assert_eq!(
            view.direct_group_identifiers(&alice).await.unwrap(),
            groups(&["ops"])
        );

        drop(view);
        assert!(writer.await.unwrap());
        let after = store.snapshot().await.unwrap();
        assert!(after.direct_group_identifiers(&alice).await.unwrap().is_empty());
    }
}
