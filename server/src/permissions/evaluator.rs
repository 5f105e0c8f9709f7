//! Permission evaluation.
//!
//! Answers single-object checks and bulk filters for a [`Principal`]. When
//! inheritance is requested the principal's effective groups are resolved
//! once per call and handed to the store; otherwise only rows stored
//! directly against the entity count.
//!
//! Every operation opens one store snapshot and runs both the closure walk
//! and the grant lookup on it.

use std::collections::HashSet;
use std::sync::Arc;

use portcullis_common::{
    ObjectKind, ObjectPermission, ObjectPermissionType, ObjectPermissionTypes,
    SystemPermissionType,
};
use tracing::debug;

use super::closure::{self, GroupClosureResolver};
use super::principal::Principal;
use crate::config::EvaluatorConfig;
use crate::error::AuthzResult;
use crate::store::{MembershipReader, MembershipStore};

/// Evaluates object and system permissions against a [`MembershipStore`].
#[derive(Debug)]
pub struct PermissionEvaluator<S> {
    store: Arc<S>,
    resolver: GroupClosureResolver<S>,
    config: EvaluatorConfig,
}

impl<S> Clone for PermissionEvaluator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            resolver: self.resolver.clone(),
            config: self.config,
        }
    }
}

impl<S: MembershipStore> PermissionEvaluator<S> {
    /// Create an evaluator with default settings.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EvaluatorConfig::default())
    }

    /// Create an evaluator with explicit settings.
    #[must_use]
    pub fn with_config(store: Arc<S>, config: EvaluatorConfig) -> Self {
        Self {
            resolver: GroupClosureResolver::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    /// The settings this evaluator was built with.
    #[must_use]
    pub const fn config(&self) -> EvaluatorConfig {
        self.config
    }

    /// The principal's effective group set.
    pub async fn effective_groups(&self, principal: &Principal) -> AuthzResult<HashSet<String>> {
        self.resolver
            .effective_groups(&principal.entity, &principal.known_groups)
            .await
    }

    /// Groups to hand to the store, or `None` for a direct-only lookup.
    async fn groups_for(
        view: &S::Snapshot,
        principal: &Principal,
        inherit: bool,
    ) -> AuthzResult<Option<HashSet<String>>> {
        if inherit {
            closure::resolve(view, &principal.entity, &principal.known_groups)
                .await
                .map(Some)
        } else {
            Ok(None)
        }
    }

    /// Find the row granting `permission` on one object.
    ///
    /// A row stored directly against the principal's entity wins over one
    /// inherited from a group. Returns `None` if neither exists.
    ///
    /// # Errors
    ///
    /// [`crate::AuthzError::UnknownEntity`] if the entity is not stored, or
    /// any storage fault.
    #[tracing::instrument(skip(self, principal), fields(entity = %principal.entity))]
    pub async fn has_direct_or_inherited(
        &self,
        principal: &Principal,
        object_kind: ObjectKind,
        permission: ObjectPermissionType,
        object_identifier: &str,
        inherit: bool,
    ) -> AuthzResult<Option<ObjectPermission>> {
        let view = self.store.snapshot().await?;
        let groups = Self::groups_for(&view, principal, inherit).await?;
        let found = view
            .object_permission(
                &principal.entity,
                object_kind,
                permission.into(),
                object_identifier,
                groups.as_ref(),
            )
            .await?;

        debug!(granted = found.is_some(), "Object permission checked");
        Ok(found)
    }

    /// Whether any of `permissions` is granted on one object, answered with
    /// a single grant lookup for the whole set.
    ///
    /// An empty set is never satisfied, but the entity must still exist.
    #[tracing::instrument(skip(self, principal), fields(entity = %principal.entity))]
    pub async fn has_any_of(
        &self,
        principal: &Principal,
        object_kind: ObjectKind,
        permissions: ObjectPermissionTypes,
        object_identifier: &str,
        inherit: bool,
    ) -> AuthzResult<bool> {
        let view = self.store.snapshot().await?;
        let groups = Self::groups_for(&view, principal, inherit).await?;
        let granted = view
            .object_permission(
                &principal.entity,
                object_kind,
                permissions,
                object_identifier,
                groups.as_ref(),
            )
            .await?
            .is_some();

        debug!(granted, "Permission set checked");
        Ok(granted)
    }

    /// The subset of `object_identifiers` on which any of `permissions` is
    /// granted, computed with a single bulk storage query.
    ///
    /// Never returns an identifier that was not passed in.
    #[tracing::instrument(
        skip(self, principal, object_identifiers),
        fields(entity = %principal.entity, candidates = object_identifiers.len())
    )]
    pub async fn filter_accessible(
        &self,
        principal: &Principal,
        object_kind: ObjectKind,
        permissions: ObjectPermissionTypes,
        object_identifiers: &[String],
        inherit: bool,
    ) -> AuthzResult<HashSet<String>> {
        let view = self.store.snapshot().await?;
        let groups = Self::groups_for(&view, principal, inherit).await?;
        let accessible = view
            .accessible_identifiers(
                &principal.entity,
                object_kind,
                groups.as_ref(),
                permissions,
                object_identifiers,
            )
            .await?;

        let candidates: HashSet<&str> = object_identifiers.iter().map(String::as_str).collect();
        let accessible: HashSet<String> = accessible
            .into_iter()
            .filter(|identifier| candidates.contains(identifier.as_str()))
            .collect();

        debug!(accessible = accessible.len(), "Identifiers filtered");
        Ok(accessible)
    }

    /// Whether a system permission is granted.
    #[tracing::instrument(skip(self, principal), fields(entity = %principal.entity))]
    pub async fn has_system_permission(
        &self,
        principal: &Principal,
        permission: SystemPermissionType,
        inherit: bool,
    ) -> AuthzResult<bool> {
        let view = self.store.snapshot().await?;
        let groups = Self::groups_for(&view, principal, inherit).await?;
        let granted = view
            .system_permission(&principal.entity, permission, groups.as_ref())
            .await?;

        debug!(granted, "System permission checked");
        Ok(granted)
    }

    /// Whether the principal holds `ADMINISTER`, directly or inherited.
    pub async fn is_administrator(&self, principal: &Principal) -> AuthzResult<bool> {
        self.has_system_permission(principal, SystemPermissionType::Administer, true)
            .await
    }

    /// Every object permission row the principal holds.
    #[tracing::instrument(skip(self, principal), fields(entity = %principal.entity))]
    pub async fn object_permissions(
        &self,
        principal: &Principal,
        inherit: bool,
    ) -> AuthzResult<Vec<ObjectPermission>> {
        let view = self.store.snapshot().await?;
        let groups = Self::groups_for(&view, principal, inherit).await?;
        view.object_permissions(&principal.entity, groups.as_ref())
            .await
    }

    /// [`Self::has_direct_or_inherited`] with the configured inherit flag.
    pub async fn has_direct_or_inherited_default(
        &self,
        principal: &Principal,
        object_kind: ObjectKind,
        permission: ObjectPermissionType,
        object_identifier: &str,
    ) -> AuthzResult<Option<ObjectPermission>> {
        self.has_direct_or_inherited(
            principal,
            object_kind,
            permission,
            object_identifier,
            self.config.inherit_by_default,
        )
        .await
    }

    /// [`Self::has_any_of`] with the configured inherit flag.
    pub async fn has_any_of_default(
        &self,
        principal: &Principal,
        object_kind: ObjectKind,
        permissions: ObjectPermissionTypes,
        object_identifier: &str,
    ) -> AuthzResult<bool> {
        self.has_any_of(
            principal,
            object_kind,
            permissions,
            object_identifier,
            self.config.inherit_by_default,
        )
        .await
    }

    /// [`Self::filter_accessible`] with the configured inherit flag.
    pub async fn filter_accessible_default(
        &self,
        principal: &Principal,
        object_kind: ObjectKind,
        permissions: ObjectPermissionTypes,
        object_identifiers: &[String],
    ) -> AuthzResult<HashSet<String>> {
        self.filter_accessible(
            principal,
            object_kind,
            permissions,
            object_identifiers,
            self.config.inherit_by_default,
        )
        .await
    }

    /// [`Self::has_system_permission`] with the configured inherit flag.
    pub async fn has_system_permission_default(
        &self,
        principal: &Principal,
        permission: SystemPermissionType,
    ) -> AuthzResult<bool> {
        self.has_system_permission(principal, permission, self.config.inherit_by_default)
            .await
    }
}
