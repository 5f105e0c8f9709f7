//! Access policy guard.
//!
//! Guarded operations are described as an ordered list of rules. Rules are
//! tried in order and the first one that matches allows the operation;
//! rules before it never touch storage for the rules after it.
//!
//! Read permissions:
//! 1. Self access (an entity may always read its own grants)
//! 2. System administrator
//! 3. Explicit READ on the target entity, direct or inherited

use portcullis_common::{Entity, ObjectKind, ObjectPermissionType};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::evaluator::PermissionEvaluator;
use super::principal::Principal;
use crate::error::{AuthzError, AuthzResult};
use crate::store::MembershipStore;

/// One rule of an [`AccessPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    /// The acting entity is the target.
    ///
    /// Compares identifier and kind together, so a user and a group that
    /// share an identifier never match each other here; a user named like a
    /// group needs an explicit grant to read that group's permissions.
    SelfAccess,
    /// The acting principal holds system `ADMINISTER`.
    SystemAdministrator,
    /// The acting principal holds this permission on the target entity.
    ExplicitGrant(ObjectPermissionType),
}

/// Ordered, first-match-wins list of rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    rules: Vec<PolicyRule>,
}

impl AccessPolicy {
    /// Build a policy from rules in precedence order.
    pub fn new(rules: impl Into<Vec<PolicyRule>>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// Who may read an entity's permission grants.
    #[must_use]
    pub fn read_permissions() -> Self {
        Self::new([
            PolicyRule::SelfAccess,
            PolicyRule::SystemAdministrator,
            PolicyRule::ExplicitGrant(ObjectPermissionType::Read),
        ])
    }

    /// Who may change an entity's permission grants.
    ///
    /// Self access alone never suffices here.
    #[must_use]
    pub fn alter_permissions() -> Self {
        Self::new([
            PolicyRule::SystemAdministrator,
            PolicyRule::ExplicitGrant(ObjectPermissionType::Administer),
        ])
    }

    /// Rules in precedence order.
    #[must_use]
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }
}

/// Outcome of evaluating an [`AccessPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Allowed by the named rule.
    Allowed(PolicyRule),
    /// No rule matched.
    Denied,
}

impl Decision {
    /// Whether the operation may proceed.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

/// Applies access policies on top of a [`PermissionEvaluator`].
#[derive(Debug)]
pub struct AccessGuard<S> {
    evaluator: PermissionEvaluator<S>,
}

impl<S> Clone for AccessGuard<S> {
    fn clone(&self) -> Self {
        Self {
            evaluator: self.evaluator.clone(),
        }
    }
}

impl<S: MembershipStore> AccessGuard<S> {
    /// Create a guard over an evaluator.
    #[must_use]
    pub const fn new(evaluator: PermissionEvaluator<S>) -> Self {
        Self { evaluator }
    }

    /// The evaluator backing this guard.
    #[must_use]
    pub const fn evaluator(&self) -> &PermissionEvaluator<S> {
        &self.evaluator
    }

    async fn matches(
        &self,
        rule: PolicyRule,
        acting: &Principal,
        target: &Entity,
    ) -> AuthzResult<bool> {
        match rule {
            PolicyRule::SelfAccess => Ok(acting.entity == *target),
            PolicyRule::SystemAdministrator => self.evaluator.is_administrator(acting).await,
            PolicyRule::ExplicitGrant(permission) => {
                self.evaluator
                    .has_any_of(
                        acting,
                        ObjectKind::for_entity(target.kind),
                        permission.into(),
                        &target.identifier,
                        true,
                    )
                    .await
            }
        }
    }

    /// Evaluate `policy` for `acting` against `target`.
    ///
    /// # Errors
    ///
    /// Storage faults and unknown entities encountered by the first rule
    /// that needs storage.
    #[tracing::instrument(
        skip(self, policy, acting),
        fields(acting = %acting.entity, target = %target)
    )]
    pub async fn evaluate(
        &self,
        policy: &AccessPolicy,
        acting: &Principal,
        target: &Entity,
    ) -> AuthzResult<Decision> {
        for &rule in policy.rules() {
            if self.matches(rule, acting, target).await? {
                debug!(?rule, "Access allowed");
                return Ok(Decision::Allowed(rule));
            }
        }

        debug!("Access denied");
        Ok(Decision::Denied)
    }

    /// Evaluate `policy`, failing with [`AuthzError::PermissionDenied`] when
    /// no rule matches. Returns the rule that allowed the operation.
    pub async fn require(
        &self,
        policy: &AccessPolicy,
        acting: &Principal,
        target: &Entity,
    ) -> AuthzResult<PolicyRule> {
        match self.evaluate(policy, acting, target).await? {
            Decision::Allowed(rule) => Ok(rule),
            Decision::Denied => Err(AuthzError::PermissionDenied),
        }
    }

    /// Whether `acting` may read the permission grants of `target`.
    pub async fn can_read_permissions(
        &self,
        acting: &Principal,
        target: &Entity,
    ) -> AuthzResult<bool> {
        self.evaluate(&AccessPolicy::read_permissions(), acting, target)
            .await
            .map(Decision::is_allowed)
    }

    /// Whether `acting` may change the permission grants of `target`.
    pub async fn can_alter_permissions(
        &self,
        acting: &Principal,
        target: &Entity,
    ) -> AuthzResult<bool> {
        self.evaluate(&AccessPolicy::alter_permissions(), acting, target)
            .await
            .map(Decision::is_allowed)
    }
}
