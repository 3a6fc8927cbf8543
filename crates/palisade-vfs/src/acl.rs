//! Access control entries.

use std::fmt;

use palisade_common_core::{GroupId, ResourceId, UserId};
use serde::{Deserialize, Serialize};

use crate::permission::PermissionSet;

/// The identity an entry grants permissions to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Principal {
    User(UserId),
    Group(GroupId),
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::User(id) => write!(f, "{}", id),
            Principal::Group(id) => write!(f, "{}", id),
        }
    }
}

/// Binds a principal to a permission set on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    /// Content identity the entry is attached to; siblings share it.
    pub resource: ResourceId,
    pub principal: Principal,
    pub permissions: PermissionSet,
    /// Applies to descendants of a folder as well.
    pub inheriting: bool,
    /// Set on entries read from an ancestor rather than defined on the resource.
    pub inherited: bool,
}

impl AccessControlEntry {
    pub fn new(resource: ResourceId, principal: Principal, permissions: PermissionSet) -> Self {
        Self {
            resource,
            principal,
            permissions,
            inheriting: false,
            inherited: false,
        }
    }

    pub fn inheriting(mut self) -> Self {
        self.inheriting = true;
        self
    }

    /// Copy of this entry as seen from a descendant.
    pub fn as_inherited(&self) -> Self {
        Self {
            inherited: true,
            ..self.clone()
        }
    }
}
