//! Group closure resolution.
//!
//! Walks the membership graph breadth-first, one storage round-trip per
//! level, every level read from the same snapshot. A visited set bounds the
//! walk, so cyclic memberships terminate.

use std::collections::HashSet;
use std::sync::Arc;

use portcullis_common::Entity;
use tracing::trace;

use crate::error::AuthzResult;
use crate::store::{MembershipReader, MembershipStore};

/// Computes effective group sets from stored membership edges.
#[derive(Debug)]
pub struct GroupClosureResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for GroupClosureResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: MembershipStore> GroupClosureResolver<S> {
    /// Create a resolver over the given store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Every group identifier reachable from `entity`, plus `known_groups`.
    ///
    /// The entity's own identifier only appears when a cycle leads back to
    /// it. Known groups are expanded like stored ones; those with no stored
    /// group simply contribute nothing further.
    ///
    /// # Errors
    ///
    /// [`crate::AuthzError::UnknownEntity`] if `entity` is not stored, or any
    /// storage fault.
    #[tracing::instrument(skip(self, known_groups), fields(known = known_groups.len()))]
    pub async fn effective_groups(
        &self,
        entity: &Entity,
        known_groups: &HashSet<String>,
    ) -> AuthzResult<HashSet<String>> {
        let view = self.store.snapshot().await?;
        resolve(&view, entity, known_groups).await
    }
}

/// Breadth-first closure over one read view.
pub(super) async fn resolve<R: MembershipReader + ?Sized>(
    view: &R,
    entity: &Entity,
    known_groups: &HashSet<String>,
) -> AuthzResult<HashSet<String>> {
    let direct = view.direct_group_identifiers(entity).await?;

    let mut visited: HashSet<String> = known_groups.clone();
    let mut frontier: Vec<String> = known_groups.iter().cloned().collect();
    for group in direct {
        if visited.insert(group.clone()) {
            frontier.push(group);
        }
    }

    let mut depth = 0_usize;
    while !frontier.is_empty() {
        trace!(depth, frontier = frontier.len(), "Expanding group level");

        let parents = view.parent_group_identifiers(&frontier).await?;
        frontier = parents
            .into_iter()
            .filter(|group| visited.insert(group.clone()))
            .collect();
        depth += 1;
    }

    trace!(groups = visited.len(), depth, "Group closure resolved");
    Ok(visited)
}
