//! User, group and organizational unit operations.
//!
//! Account changes need the account manager role, unit changes the administrator role,
//! both for the unit concerned. Every change drops the cached verdicts.

use palisade_common_core::{GroupId, UserId};
use palisade_vfs::{Group, OrgUnitPath, OrganizationalUnit, ResourceFilter, Role, StorageError, User};
use tracing::info;

use super::SecurityManager;
use crate::context::{DbContext, RequestContext};
use crate::error::{SecurityError, SecurityResult};

impl SecurityManager {
    pub fn read_user(&self, ctx: &RequestContext, name: &str) -> SecurityResult<User> {
        self.run("read_user", ctx, "Reading the user failed", |_| {
            self.storage.read_user_by_name(name).map_err(|e| principal_not_found(e, name))
        })
    }

    pub fn create_user(&self, ctx: &RequestContext, name: &str, org_unit: &OrgUnitPath) -> SecurityResult<User> {
        self.run("create_user", ctx, "Creating the user failed", |dbc| {
            self.roles()
                .check_role_for_org_unit(dbc.user(), Role::AccountManager, Some(org_unit))?;
            let user = User::new(name, org_unit.clone());
            self.check_name_free(self.storage.read_user_by_name(&user.fqn()), &user.fqn())?;
            let created = self.storage.create_user(user)?;
            self.cache.clear();
            info!(user = %created.fqn(), "User created");
            Ok(created)
        })
    }

    /// Deletes a user and releases their locks. Default users and the caller are kept.
    pub fn delete_user(&self, ctx: &RequestContext, id: UserId) -> SecurityResult<()> {
        self.run("delete_user", ctx, "Deleting the user failed", |dbc| {
            let user = self.storage.read_user(id)?;
            if user.org_unit.is_root() && self.config.default_users.is_default_user(&user.name) {
                return Err(SecurityError::DefaultUser { name: user.name });
            }
            if user.id == dbc.user().id {
                return Err(SecurityError::SelfDeletion);
            }
            self.roles()
                .check_role_for_org_unit(dbc.user(), Role::AccountManager, Some(&user.org_unit))?;
            self.storage.delete_user(id)?;
            let released = self.locks.release_user(id);
            self.cache.clear();
            info!(user = %user.fqn(), released_locks = released, "User deleted");
            Ok(())
        })
    }

    pub fn create_group(
        &self,
        ctx: &RequestContext,
        name: &str,
        org_unit: &OrgUnitPath,
        parent: Option<GroupId>,
    ) -> SecurityResult<Group> {
        self.run("create_group", ctx, "Creating the group failed", |dbc| {
            self.roles()
                .check_role_for_org_unit(dbc.user(), Role::AccountManager, Some(org_unit))?;
            let mut group = Group::new(name, org_unit.clone());
            group.parent = match parent {
                Some(parent) => Some(self.storage.read_group(parent)?.id),
                None => None,
            };
            self.check_name_free(self.storage.read_group_by_name(&group.fqn()), &group.fqn())?;
            let created = self.storage.create_group(group)?;
            self.cache.clear();
            Ok(created)
        })
    }

    pub fn delete_group(&self, ctx: &RequestContext, id: GroupId) -> SecurityResult<()> {
        self.run("delete_group", ctx, "Deleting the group failed", |dbc| {
            let group = self.storage.read_group(id)?;
            self.roles()
                .check_role_for_org_unit(dbc.user(), Role::AccountManager, Some(&group.org_unit))?;
            self.storage.delete_group(id)?;
            self.cache.clear();
            Ok(())
        })
    }

    /// Adds a user to a group. Role groups additionally need the role itself.
    pub fn add_user_to_group(&self, ctx: &RequestContext, user: UserId, group: GroupId) -> SecurityResult<()> {
        self.run("add_user_to_group", ctx, "Adding the user to the group failed", |dbc| {
            self.check_membership_change(dbc, user, group)?;
            self.storage.add_user_to_group(user, group)?;
            self.cache.clear();
            Ok(())
        })
    }

    pub fn remove_user_from_group(&self, ctx: &RequestContext, user: UserId, group: GroupId) -> SecurityResult<()> {
        self.run("remove_user_from_group", ctx, "Removing the user from the group failed", |dbc| {
            self.check_membership_change(dbc, user, group)?;
            self.storage.remove_user_from_group(user, group)?;
            self.cache.clear();
            Ok(())
        })
    }

    fn check_membership_change(&self, dbc: &DbContext, user: UserId, group: GroupId) -> SecurityResult<()> {
        self.storage.read_user(user)?;
        let group = self.storage.read_group(group)?;
        let roles = self.roles();
        roles.check_role_for_org_unit(dbc.user(), Role::AccountManager, Some(&group.org_unit))?;
        if let Some(role) = group.role {
            roles.check_role_for_org_unit(dbc.user(), role, Some(&group.org_unit))?;
        }
        Ok(())
    }

    fn check_name_free<T>(&self, existing: Result<T, StorageError>, fqn: &str) -> SecurityResult<()> {
        match existing {
            Ok(_) => Err(SecurityError::AlreadyExists { path: fqn.to_string() }),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn create_org_unit(&self, ctx: &RequestContext, path: &OrgUnitPath, description: &str) -> SecurityResult<OrganizationalUnit> {
        self.run("create_org_unit", ctx, "Creating the organizational unit failed", |dbc| {
            let parent = path.parent().ok_or_else(|| SecurityError::AlreadyExists {
                path: path.to_string(),
            })?;
            self.roles()
                .check_role_for_org_unit(dbc.user(), Role::Administrator, Some(&parent))?;
            let created = self
                .storage
                .create_org_unit(OrganizationalUnit::new(path.clone(), description))?;
            self.cache.clear();
            Ok(created)
        })
    }

    /// Assigns a resource to a unit, widening the unit's administrative scope.
    pub fn add_resource_to_org_unit(&self, ctx: &RequestContext, unit: &OrgUnitPath, root_path: &str) -> SecurityResult<()> {
        self.run("add_resource_to_org_unit", ctx, "Assigning the resource failed", |dbc| {
            self.check_unit_resource_change(dbc, unit, root_path)?;
            self.storage.add_resource_to_org_unit(unit, root_path)?;
            self.cache.clear();
            Ok(())
        })
    }

    pub fn remove_resource_from_org_unit(
        &self,
        ctx: &RequestContext,
        unit: &OrgUnitPath,
        root_path: &str,
    ) -> SecurityResult<()> {
        self.run("remove_resource_from_org_unit", ctx, "Unassigning the resource failed", |dbc| {
            self.check_unit_resource_change(dbc, unit, root_path)?;
            self.storage.remove_resource_from_org_unit(unit, root_path)?;
            self.cache.clear();
            Ok(())
        })
    }

    fn check_unit_resource_change(&self, dbc: &DbContext, unit: &OrgUnitPath, root_path: &str) -> SecurityResult<()> {
        Self::check_offline(dbc)?;
        self.roles()
            .check_role_for_org_unit(dbc.user(), Role::Administrator, Some(unit))?;
        self.read(dbc, root_path)?;
        Ok(())
    }

    /// Units administering the resource at the path.
    pub fn org_units_for_resource(&self, ctx: &RequestContext, root_path: &str) -> SecurityResult<Vec<OrgUnitPath>> {
        self.run("org_units_for_resource", ctx, "Reading the organizational units failed", |dbc| {
            let resource = self.read(dbc, root_path)?;
            self.check(dbc, &resource, palisade_vfs::Permissions::READ, false, ResourceFilter::ALL)?;
            Ok(self.storage.org_units_for_resource(&resource)?)
        })
    }
}

fn principal_not_found(error: StorageError, name: &str) -> SecurityError {
    if error.is_not_found() {
        SecurityError::InvalidOperation(format!("unknown principal {}", name))
    } else {
        error.into()
    }
}
