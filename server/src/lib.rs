//! Portcullis Authorization Core
//!
//! Decides which objects a user or user group may access, and with which
//! permission, when grants can be held directly or inherited through
//! nested, possibly cyclic, group memberships.

pub mod config;
pub mod db;
pub mod error;
pub mod permissions;
pub mod store;

pub use error::{AuthzError, AuthzResult};
pub use permissions::{
    AccessGuard, AccessPolicy, Decision, GroupClosureResolver, PermissionEvaluator,
    PermissionService, PolicyRule, Principal,
};
pub use store::{MembershipReader, MembershipStore, MemorySnapshot, MemoryStore};
