//! Authorization core.
//!
//! Layered leaves first:
//! - [`GroupClosureResolver`]: effective (transitive) group sets
//! - [`PermissionEvaluator`]: object and system permission checks
//! - [`AccessGuard`]: ordered override rules for guarded operations
//! - [`PermissionService`]: guarded reads built on the guard

mod closure;
mod evaluator;
mod policy;
mod principal;
mod service;

pub use closure::GroupClosureResolver;
pub use evaluator::PermissionEvaluator;
pub use policy::{AccessGuard, AccessPolicy, Decision, PolicyRule};
pub use principal::Principal;
pub use service::PermissionService;
