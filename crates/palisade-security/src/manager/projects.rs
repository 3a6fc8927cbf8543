//! Project operations.

use palisade_common_core::{GroupId, ProjectId};
use palisade_vfs::{path, OrgUnitPath, Project, Role};
use tracing::info;

use super::SecurityManager;
use crate::context::{DbContext, RequestContext};
use crate::error::{SecurityError, SecurityResult};

impl SecurityManager {
    pub fn read_project(&self, ctx: &RequestContext, id: ProjectId) -> SecurityResult<Project> {
        self.run("read_project", ctx, "Reading the project failed", |_| Ok(self.storage.read_project(id)?))
    }

    /// Creates a project owned by the caller. Needs the project manager role in some unit.
    pub fn create_project(
        &self,
        ctx: &RequestContext,
        name: &str,
        description: &str,
        manager_group: GroupId,
        user_group: GroupId,
        org_unit: &OrgUnitPath,
    ) -> SecurityResult<Project> {
        self.run("create_project", ctx, "Creating the project failed", |dbc| {
            self.roles().check_role(dbc.user(), Role::ProjectManager)?;
            if name == Project::ONLINE_NAME {
                return Err(SecurityError::AlreadyExists { path: name.to_string() });
            }
            self.storage.read_group(manager_group)?;
            self.storage.read_group(user_group)?;
            self.storage.read_org_unit(org_unit)?;

            let mut project = Project::new(name, dbc.user().id, manager_group, user_group, org_unit.clone());
            project.description = description.to_string();
            let created = self.storage.create_project(project)?;
            info!(project = %created.name, owner = %dbc.user().fqn(), "Project created");
            Ok(created)
        })
    }

    /// Deletes a project and drops its locks.
    pub fn delete_project(&self, ctx: &RequestContext, id: ProjectId) -> SecurityResult<()> {
        self.run("delete_project", ctx, "Deleting the project failed", |dbc| {
            let project = self.managed_project(dbc, id)?;
            self.storage.delete_project(project.id)?;
            let released = self.locks.unlock_project(project.id);
            info!(project = %project.name, released_locks = released, "Project deleted");
            Ok(())
        })
    }

    /// Drops every non-system lock held in a project.
    pub fn unlock_project(&self, ctx: &RequestContext, id: ProjectId) -> SecurityResult<usize> {
        self.run("unlock_project", ctx, "Unlocking the project failed", |dbc| {
            let project = self.managed_project(dbc, id)?;
            let released = self.locks.unlock_project(project.id);
            info!(project = %project.name, released_locks = released, "Project unlocked");
            Ok(released)
        })
    }

    pub fn count_locked_resources(&self, ctx: &RequestContext, id: ProjectId) -> SecurityResult<usize> {
        self.run("count_locked_resources", ctx, "Counting locked resources failed", |dbc| {
            let project = self.managed_project(dbc, id)?;
            Ok(self.locks.count_in_project(project.id))
        })
    }

    /// Adds a resource root to the current project.
    pub fn copy_resource_to_project(&self, ctx: &RequestContext, root_path: &str) -> SecurityResult<()> {
        self.run("copy_resource_to_project", ctx, "Adding the resource to the project failed", |dbc| {
            let mut project = self.editable_project(dbc)?;
            let resource = self.read(dbc, root_path)?;
            let covered = project
                .resources
                .iter()
                .any(|root| *root == resource.root_path || path::is_below(&resource.root_path, root));
            if !covered {
                project.resources.push(resource.root_path);
                self.storage.write_project(&project)?;
            }
            Ok(())
        })
    }

    pub fn remove_resource_from_project(&self, ctx: &RequestContext, root_path: &str) -> SecurityResult<()> {
        self.run("remove_resource_from_project", ctx, "Removing the resource from the project failed", |dbc| {
            let mut project = self.editable_project(dbc)?;
            let before = project.resources.len();
            project.resources.retain(|root| root != root_path);
            if project.resources.len() == before {
                return Err(SecurityError::not_found(root_path));
            }
            self.storage.write_project(&project)?;
            Ok(())
        })
    }

    /// Whether the caller manages the current project.
    pub fn is_manager_of_project(&self, ctx: &RequestContext) -> bool {
        self.roles().has_manager_of_project_role(&ctx.user, &ctx.project)
    }

    fn managed_project(&self, dbc: &DbContext, id: ProjectId) -> SecurityResult<Project> {
        let project = self.storage.read_project(id)?;
        if project.is_online() {
            return Err(SecurityError::OnlineProject);
        }
        self.roles().check_manager_of_project_role(dbc.user(), &project)?;
        Ok(project)
    }

    /// Current project as stored, checked to be offline, managed by the caller and unlocked.
    fn editable_project(&self, dbc: &DbContext) -> SecurityResult<Project> {
        Self::check_offline(dbc)?;
        let project = self.storage.read_project(dbc.project().id)?;
        self.roles().check_manager_of_project_role(dbc.user(), &project)?;
        if !project.is_unlocked() {
            return Err(SecurityError::ProjectLocked { project: project.name });
        }
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use crate::context::RequestContext;
    use crate::error::SecurityError;
    use crate::lock::LockType;
    use crate::manager::tests::Harness;
    use palisade_test_utils::assert_err_matches;
    use palisade_vfs::{OrgUnitPath, ProjectState, ResourceType, Role, StorageDriver};

    #[test]
    fn test_create_project_needs_project_manager() {
        let h = Harness::new();
        let plain = h.storage.add_user("plain", OrgUnitPath::root());
        let pm = h.storage.add_user("pm", OrgUnitPath::root());
        h.storage.grant_role(&pm, Role::ProjectManager, OrgUnitPath::parse("/dept/").unwrap());
        let managers = h.storage.add_group("Managers", OrgUnitPath::root());
        let users = h.storage.add_group("Editors", OrgUnitPath::root());

        assert_err_matches!(
            h.manager
                .create_project(&h.offline(&plain), "Spring", "", managers.id, users.id, &OrgUnitPath::root()),
            SecurityError::RoleViolation { role: Role::ProjectManager, .. }
        );
        let project = h
            .manager
            .create_project(&h.offline(&pm), "Spring", "Spring campaign", managers.id, users.id, &OrgUnitPath::root())
            .unwrap();
        assert_eq!(project.owner, pm.id);
        assert_eq!(project.description, "Spring campaign");
        assert!(h.manager.read_project(&h.offline(&pm), project.id).is_ok());
    }

    #[test]
    fn test_unlock_and_count_need_manager() {
        let h = Harness::new();
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        h.storage.import_resource("/b.txt", ResourceType::PLAIN).unwrap();
        let ctx = h.admin();
        let project = ctx.project.id;
        h.manager.lock_resource(&ctx, "/a.txt", LockType::Exclusive).unwrap();
        h.manager.lock_resource(&ctx, "/b.txt", LockType::Exclusive).unwrap();

        let outsider = h.storage.add_user("outsider", OrgUnitPath::root());
        assert_err_matches!(
            h.manager.count_locked_resources(&h.offline(&outsider), project),
            SecurityError::NotManagerOfProject { .. }
        );
        assert_eq!(h.manager.count_locked_resources(&ctx, project).unwrap(), 2);
        assert_eq!(h.manager.unlock_project(&ctx, project).unwrap(), 2);
        assert_eq!(h.manager.count_locked_resources(&ctx, project).unwrap(), 0);
    }

    #[test]
    fn test_online_project_cannot_be_managed() {
        let h = Harness::new();
        let admin = h.storage.admin().unwrap();
        let online = h.storage.online_project().unwrap();
        assert_err_matches!(h.manager.delete_project(&h.admin(), online.id), SecurityError::OnlineProject);
        assert!(!h.manager.is_manager_of_project(&h.online(&admin)));
        assert!(h.manager.is_manager_of_project(&h.admin()));
    }

    #[test]
    fn test_manager_group_member_manages() {
        let h = Harness::new();
        let member = h.storage.add_user("member", OrgUnitPath::root());
        let project = h.storage.offline_project().unwrap();
        let managers = h.storage.read_group(project.manager_group).unwrap();
        assert!(!h.manager.is_manager_of_project(&h.offline(&member)));
        h.storage.add_member(&member, &managers);
        assert!(h.manager.is_manager_of_project(&h.offline(&member)));
    }

    #[test]
    fn test_delete_project_drops_its_locks() {
        let h = Harness::new();
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        let ctx = h.admin();
        let project = h
            .manager
            .create_project(&ctx, "Summer", "", ctx.project.manager_group, ctx.project.user_group, &OrgUnitPath::root())
            .unwrap();
        let in_summer = ctx.in_project(project.clone());
        h.manager.lock_resource(&in_summer, "/a.txt", LockType::Exclusive).unwrap();

        h.manager.delete_project(&ctx, project.id).unwrap();
        assert!(h.manager.lock_table().is_empty());
        assert!(h.storage.read_project(project.id).is_err());
    }

    #[test]
    fn test_project_resources() {
        let h = Harness::new();
        h.storage.import_resource("/a/", ResourceType::FOLDER).unwrap();
        h.storage.import_resource("/a/b.txt", ResourceType::PLAIN).unwrap();
        let ctx = h.admin();
        let project = h
            .manager
            .create_project(&ctx, "Autumn", "", ctx.project.manager_group, ctx.project.user_group, &OrgUnitPath::root())
            .unwrap();
        let in_autumn: RequestContext = ctx.in_project(project.clone());

        h.manager.copy_resource_to_project(&in_autumn, "/a/").unwrap();
        h.manager.copy_resource_to_project(&in_autumn, "/a/b.txt").unwrap();
        assert_eq!(h.storage.read_project(project.id).unwrap().resources, vec!["/a/"]);

        h.manager.remove_resource_from_project(&in_autumn, "/a/").unwrap();
        assert!(h.storage.read_project(project.id).unwrap().resources.is_empty());
        assert_err_matches!(
            h.manager.remove_resource_from_project(&in_autumn, "/a/"),
            SecurityError::ResourceNotFound { .. }
        );
    }

    #[test]
    fn test_locked_project_rejects_resource_changes() {
        let h = Harness::new();
        h.storage.import_resource("/a/", ResourceType::FOLDER).unwrap();
        let ctx = h.admin();
        let mut project = h.storage.read_project(ctx.project.id).unwrap();
        project.state = ProjectState::LockedForPublish;
        h.storage.write_project(&project).unwrap();

        assert_err_matches!(
            h.manager.copy_resource_to_project(&ctx, "/a/"),
            SecurityError::ProjectLocked { .. }
        );
    }
}
