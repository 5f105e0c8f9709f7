//! Acting identity for permission checks.

use std::collections::HashSet;

use portcullis_common::Entity;
use serde::{Deserialize, Serialize};

/// An entity together with the group claims its authentication carried.
///
/// Known groups are treated as effective whether or not storage records
/// the membership. They need not exist in storage at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The stored entity checks are made for.
    pub entity: Entity,

    /// Externally asserted group identifiers.
    #[serde(default)]
    pub known_groups: HashSet<String>,
}

impl Principal {
    /// Create a principal with no asserted groups.
    #[must_use]
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            known_groups: HashSet::new(),
        }
    }

    /// Attach externally asserted group identifiers.
    #[must_use]
    pub fn with_known_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_groups.extend(groups.into_iter().map(Into::into));
        self
    }
}

impl From<Entity> for Principal {
    fn from(entity: Entity) -> Self {
        Self::new(entity)
    }
}
