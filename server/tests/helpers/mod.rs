//! Reusable test helpers for evaluator integration tests.
//!
//! Provides [`CountingStore`], a [`MembershipStore`] wrapper that records
//! how many snapshots were opened and how many times each read was made,
//! [`RacingStore`], which commits a batch of membership edits while the
//! first snapshot is in use, plus seeding shortcuts for building membership
//! graphs in a [`MemoryStore`].
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use portcullis::{AuthzResult, MembershipReader, MembershipStore, MemorySnapshot, MemoryStore};
use portcullis_common::{
    Entity, ObjectKind, ObjectPermission, ObjectPermissionType, ObjectPermissionTypes,
    SystemPermissionType,
};
use tokio::task::JoinHandle;

/// Storage call counters.
#[derive(Debug, Default)]
pub struct Calls {
    pub snapshots: AtomicUsize,
    pub direct_groups: AtomicUsize,
    pub parent_groups: AtomicUsize,
    pub object_permission: AtomicUsize,
    pub accessible_identifiers: AtomicUsize,
    pub object_permissions: AtomicUsize,
    pub system_permission: AtomicUsize,
}

impl Calls {
    /// Total number of storage reads, not counting snapshots.
    pub fn total(&self) -> usize {
        [
            &self.direct_groups,
            &self.parent_groups,
            &self.object_permission,
            &self.accessible_identifiers,
            &self.object_permissions,
            &self.system_permission,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum()
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// Delegates to a [`MemoryStore`] and counts every snapshot and read.
#[derive(Debug, Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub calls: Arc<Calls>,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Arc::default(),
        })
    }
}

#[async_trait]
impl MembershipStore for CountingStore {
    type Snapshot = CountingSnapshot;

    async fn insert_entity(&self, entity: &Entity) -> AuthzResult<u64> {
        self.inner.insert_entity(entity).await
    }

    async fn snapshot(&self) -> AuthzResult<CountingSnapshot> {
        bump(&self.calls.snapshots);
        Ok(CountingSnapshot {
            inner: self.inner.snapshot().await?,
            calls: Arc::clone(&self.calls),
        })
    }
}

#[derive(Debug)]
pub struct CountingSnapshot {
    inner: MemorySnapshot,
    calls: Arc<Calls>,
}

#[async_trait]
impl MembershipReader for CountingSnapshot {
    async fn direct_group_identifiers(&self, entity: &Entity) -> AuthzResult<HashSet<String>> {
        bump(&self.calls.direct_groups);
        self.inner.direct_group_identifiers(entity).await
    }

    async fn parent_group_identifiers(&self, groups: &[String]) -> AuthzResult<HashSet<String>> {
        bump(&self.calls.parent_groups);
        self.inner.parent_group_identifiers(groups).await
    }

    async fn object_permission(
        &self,
        entity: &Entity,
        object_kind: ObjectKind,
        permissions: ObjectPermissionTypes,
        object_identifier: &str,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<Option<ObjectPermission>> {
        bump(&self.calls.object_permission);
        self.inner
            .object_permission(
                entity,
                object_kind,
                permissions,
                object_identifier,
                effective_groups,
            )
            .await
    }

    async fn accessible_identifiers(
        &self,
        entity: &Entity,
        object_kind: ObjectKind,
        effective_groups: Option<&HashSet<String>>,
        permissions: ObjectPermissionTypes,
        identifiers: &[String],
    ) -> AuthzResult<HashSet<String>> {
        bump(&self.calls.accessible_identifiers);
        self.inner
            .accessible_identifiers(
                entity,
                object_kind,
                effective_groups,
                permissions,
                identifiers,
            )
            .await
    }

    async fn object_permissions(
        &self,
        entity: &Entity,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<Vec<ObjectPermission>> {
        bump(&self.calls.object_permissions);
        self.inner.object_permissions(entity, effective_groups).await
    }

    async fn system_permission(
        &self,
        entity: &Entity,
        permission: SystemPermissionType,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<bool> {
        bump(&self.calls.system_permission);
        self.inner
            .system_permission(entity, permission, effective_groups)
            .await
    }
}

/// One membership change applied by [`RacingStore`].
#[derive(Debug, Clone)]
pub enum Edit {
    Join { member: Entity, group: Entity },
    Leave { member: Entity, group: Entity },
}

#[derive(Debug)]
struct PendingEdits {
    armed: AtomicBool,
    edits: Vec<Edit>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

/// Starts a concurrent writer right after the first direct-group read of
/// the first snapshot, then gives it time to run before the read returns.
#[derive(Debug)]
pub struct RacingStore {
    pub inner: Arc<MemoryStore>,
    pending: Arc<PendingEdits>,
}

impl RacingStore {
    pub fn new(inner: MemoryStore, edits: Vec<Edit>) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(inner),
            pending: Arc::new(PendingEdits {
                armed: AtomicBool::new(true),
                edits,
                writer: Mutex::new(None),
            }),
        })
    }

    /// Wait until the concurrent edits are committed.
    pub async fn settle(&self) {
        let writer = self.pending.writer.lock().unwrap().take();
        if let Some(writer) = writer {
            writer.await.expect("Writer task panicked");
        }
    }
}

#[async_trait]
impl MembershipStore for RacingStore {
    type Snapshot = RacingSnapshot;

    async fn insert_entity(&self, entity: &Entity) -> AuthzResult<u64> {
        self.inner.insert_entity(entity).await
    }

    async fn snapshot(&self) -> AuthzResult<RacingSnapshot> {
        Ok(RacingSnapshot {
            inner: self.inner.snapshot().await?,
            store: Arc::clone(&self.inner),
            pending: Arc::clone(&self.pending),
        })
    }
}

#[derive(Debug)]
pub struct RacingSnapshot {
    inner: MemorySnapshot,
    store: Arc<MemoryStore>,
    pending: Arc<PendingEdits>,
}

impl RacingSnapshot {
    async fn race(&self) {
        if !self.pending.armed.swap(false, Ordering::SeqCst) {
            return;
        }

        let store = Arc::clone(&self.store);
        let edits = self.pending.edits.clone();
        let writer = tokio::spawn(async move {
            for edit in edits {
                match edit {
                    Edit::Join { member, group } => {
                        store
                            .add_group_member(&group, &member)
                            .await
                            .expect("Failed to add group member");
                    }
                    Edit::Leave { member, group } => {
                        store.remove_group_member(&group, &member).await;
                    }
                }
            }
        });
        *self.pending.writer.lock().unwrap() = Some(writer);

        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[async_trait]
impl MembershipReader for RacingSnapshot {
    async fn direct_group_identifiers(&self, entity: &Entity) -> AuthzResult<HashSet<String>> {
        let direct = self.inner.direct_group_identifiers(entity).await;
        self.race().await;
        direct
    }

    async fn parent_group_identifiers(&self, groups: &[String]) -> AuthzResult<HashSet<String>> {
        self.inner.parent_group_identifiers(groups).await
    }

    async fn object_permission(
        &self,
        entity: &Entity,
        object_kind: ObjectKind,
        permissions: ObjectPermissionTypes,
        object_identifier: &str,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<Option<ObjectPermission>> {
        self.inner
            .object_permission(
                entity,
                object_kind,
                permissions,
                object_identifier,
                effective_groups,
            )
            .await
    }

    async fn accessible_identifiers(
        &self,
        entity: &Entity,
        object_kind: ObjectKind,
        effective_groups: Option<&HashSet<String>>,
        permissions: ObjectPermissionTypes,
        identifiers: &[String],
    ) -> AuthzResult<HashSet<String>> {
        self.inner
            .accessible_identifiers(
                entity,
                object_kind,
                effective_groups,
                permissions,
                identifiers,
            )
            .await
    }

    async fn object_permissions(
        &self,
        entity: &Entity,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<Vec<ObjectPermission>> {
        self.inner.object_permissions(entity, effective_groups).await
    }

    async fn system_permission(
        &self,
        entity: &Entity,
        permission: SystemPermissionType,
        effective_groups: Option<&HashSet<String>>,
    ) -> AuthzResult<bool> {
        self.inner
            .system_permission(entity, permission, effective_groups)
            .await
    }
}

/// Insert every entity, panicking on failure.
pub async fn insert_all(store: &MemoryStore, entities: &[&Entity]) {
    for entity in entities {
        store
            .insert_entity(entity)
            .await
            .expect("Failed to insert entity");
    }
}

/// Make `member` a direct member of `group`.
pub async fn join(store: &MemoryStore, member: &Entity, group: &Entity) {
    store
        .add_group_member(group, member)
        .await
        .expect("Failed to add group member");
}

/// Grant a connection permission.
pub async fn grant_connection(
    store: &MemoryStore,
    grantee: &Entity,
    permission: ObjectPermissionType,
    connection: &str,
) {
    store
        .grant_object_permission(ObjectPermission::new(
            grantee.clone(),
            ObjectKind::Connection,
            permission,
            connection,
        ))
        .await
        .expect("Failed to grant permission");
}

/// Owned identifier set from string literals.
pub fn set(values: &[&str]) -> HashSet<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

/// Owned identifier list from string literals.
pub fn list(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}
