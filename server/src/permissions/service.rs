//! Guarded permission operations.

use portcullis_common::{Entity, ObjectPermission};

use super::evaluator::PermissionEvaluator;
use super::policy::{AccessGuard, AccessPolicy};
use super::principal::Principal;
use crate::error::AuthzResult;
use crate::store::MembershipStore;

/// Permission operations that consult an [`AccessPolicy`] before reading.
#[derive(Debug)]
pub struct PermissionService<S> {
    guard: AccessGuard<S>,
}

impl<S> Clone for PermissionService<S> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
        }
    }
}

impl<S: MembershipStore> PermissionService<S> {
    /// Create a service over an evaluator.
    #[must_use]
    pub const fn new(evaluator: PermissionEvaluator<S>) -> Self {
        Self {
            guard: AccessGuard::new(evaluator),
        }
    }

    /// The guard used by this service.
    #[must_use]
    pub const fn guard(&self) -> &AccessGuard<S> {
        &self.guard
    }

    /// The object permissions held by `target`, as seen by `acting`.
    ///
    /// With `inherit`, rows held through the target's effective groups are
    /// included.
    ///
    /// # Errors
    ///
    /// [`crate::AuthzError::PermissionDenied`] when the read policy refuses
    /// `acting`; [`crate::AuthzError::UnknownEntity`] when either entity is
    /// missing from storage.
    #[tracing::instrument(skip(self, acting), fields(acting = %acting.entity))]
    pub async fn retrieve_permissions(
        &self,
        acting: &Principal,
        target: &Entity,
        inherit: bool,
    ) -> AuthzResult<Vec<ObjectPermission>> {
        self.guard
            .require(&AccessPolicy::read_permissions(), acting, target)
            .await?;

        // The acting principal's own claims apply only when reading itself.
        let subject = if acting.entity == *target {
            acting.clone()
        } else {
            Principal::from(target.clone())
        };

        self.guard
            .evaluator()
            .object_permissions(&subject, inherit)
            .await
    }
}
