//! Role hierarchy checks.
//!
//! A role held for an organizational unit is also held for every unit below it, and a
//! role implies every role below it in the hierarchy. Storage failures while collecting
//! memberships count as "role absent".

use palisade_vfs::{Group, OrgUnitPath, Project, Resource, Role, StorageDriver, User};
use tracing::warn;

use crate::error::{SecurityError, SecurityResult};

/// The role itself followed by every role that implies it, nearest first.
pub fn role_closure(role: Role) -> impl Iterator<Item = Role> {
    std::iter::successors(Some(role), |r| r.parent())
}

/// Whether the memberships grant `role`, optionally for a specific unit.
///
/// Org-unit independent roles only count when backed by a group of the root unit; the
/// queried unit is ignored for them.
pub fn matches_role(groups: &[Group], role: Role, org_unit: Option<&OrgUnitPath>) -> bool {
    role_closure(role).any(|candidate| {
        groups.iter().filter(|g| g.role == Some(candidate)).any(|group| {
            if candidate.is_org_unit_independent() {
                return group.org_unit.is_root();
            }
            match org_unit {
                Some(ou) => group.org_unit.is_ancestor_or_self_of(ou),
                None => true,
            }
        })
    })
}

/// Answers role questions against the storage's group memberships.
pub struct RoleResolver<'a> {
    storage: &'a dyn StorageDriver,
}

impl<'a> RoleResolver<'a> {
    pub fn new(storage: &'a dyn StorageDriver) -> Self {
        Self { storage }
    }

    fn role_groups(&self, user: &User) -> Option<Vec<Group>> {
        match self.storage.groups_of_user(user.id, &OrgUnitPath::root(), true, true, false) {
            Ok(groups) => Some(groups),
            Err(e) => {
                warn!(user = %user.fqn(), error = %e, "Reading role memberships failed, treating roles as absent");
                None
            }
        }
    }

    /// Whether the user holds `role` in any unit.
    pub fn has_role(&self, user: &User, role: Role) -> bool {
        self.has_role_for_org_unit(user, role, None)
    }

    pub fn has_role_for_org_unit(&self, user: &User, role: Role, org_unit: Option<&OrgUnitPath>) -> bool {
        self.role_groups(user)
            .is_some_and(|groups| matches_role(&groups, role, org_unit))
    }

    /// Whether the user holds `role` for any unit the resource belongs to.
    pub fn has_role_for_resource(&self, user: &User, role: Role, resource: &Resource) -> bool {
        let units = match self.storage.org_units_for_resource(resource) {
            Ok(units) => units,
            Err(e) => {
                warn!(path = %resource.root_path, error = %e, "Reading organizational units failed, treating roles as absent");
                return false;
            }
        };
        if units.is_empty() {
            return false;
        }
        let Some(groups) = self.role_groups(user) else {
            return false;
        };
        units.iter().any(|ou| matches_role(&groups, role, Some(ou)))
    }

    /// Owner, project manager in any unit, or member of the project's manager group.
    ///
    /// Nobody manages the Online project.
    pub fn has_manager_of_project_role(&self, user: &User, project: &Project) -> bool {
        if project.is_online() {
            return false;
        }
        if project.owner == user.id {
            return true;
        }
        let groups = match self.storage.groups_of_user(user.id, &OrgUnitPath::root(), true, false, false) {
            Ok(groups) => groups,
            Err(e) => {
                warn!(user = %user.fqn(), project = %project.name, error = %e, "Reading memberships failed, treating user as non-manager");
                return false;
            }
        };
        let roles: Vec<Group> = groups.iter().filter(|g| g.is_role()).cloned().collect();
        matches_role(&roles, Role::ProjectManager, None) || groups.iter().any(|g| g.id == project.manager_group)
    }

    pub fn check_role(&self, user: &User, role: Role) -> SecurityResult<()> {
        self.check_role_for_org_unit(user, role, None)
    }

    pub fn check_role_for_org_unit(&self, user: &User, role: Role, org_unit: Option<&OrgUnitPath>) -> SecurityResult<()> {
        if self.has_role_for_org_unit(user, role, org_unit) {
            Ok(())
        } else {
            Err(SecurityError::RoleViolation {
                user: user.fqn(),
                role,
                org_unit: org_unit.cloned(),
            })
        }
    }

    pub fn check_role_for_resource(&self, user: &User, role: Role, resource: &Resource) -> SecurityResult<()> {
        if self.has_role_for_resource(user, role, resource) {
            Ok(())
        } else {
            Err(SecurityError::RoleViolation {
                user: user.fqn(),
                role,
                org_unit: None,
            })
        }
    }

    pub fn check_manager_of_project_role(&self, user: &User, project: &Project) -> SecurityResult<()> {
        if self.has_manager_of_project_role(user, project) {
            Ok(())
        } else {
            Err(SecurityError::NotManagerOfProject {
                user: user.fqn(),
                project: project.name.clone(),
            })
        }
    }
}
