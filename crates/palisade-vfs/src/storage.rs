//! Storage driver contract.
//!
//! The security layer never touches persisted state directly. It asks a [`StorageDriver`]
//! for resources, principals and access control data, and hands it mutations only after
//! every authorization check has passed. Drivers perform no authorization of their own.

use palisade_common_core::{GroupId, ProjectId, ResourceId, StructureId, UserId};

use crate::acl::{AccessControlEntry, Principal};
use crate::permission::PermissionSet;
use crate::principal::{Group, OrgUnitPath, OrganizationalUnit, User};
use crate::project::Project;
use crate::publish::PublishList;
use crate::resource::{Resource, ResourceFlags, ResourceType};

/// Storage operation result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// How a copy relates to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    /// Independent content with a new content identity.
    #[default]
    AsNew,
    /// Shares the content identity of the source.
    AsSibling,
}

/// Whether a delete also removes siblings sharing the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    #[default]
    PreserveSiblings,
    DeleteSiblings,
}

/// Attribute edits applied by [`StorageDriver::write_resource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceUpdate {
    pub flags: Option<ResourceFlags>,
    pub type_id: Option<ResourceType>,
    pub date_released: Option<Option<chrono::DateTime<chrono::Utc>>>,
    pub date_expired: Option<Option<chrono::DateTime<chrono::Utc>>>,
}

/// Backend for resources, principals, projects and publishing.
///
/// Resource reads and writes are performed in the view of the given project: the Online
/// project sees the published tree, every other project the shared working tree.
pub trait StorageDriver: Send + Sync {
    // Resources

    /// Reads a resource by root path, deleted ones included.
    fn read_resource(&self, project: &Project, path: &str) -> StorageResult<Resource>;

    fn read_resource_by_id(&self, project: &Project, id: StructureId) -> StorageResult<Resource>;

    /// Direct children of a folder in path order.
    fn read_child_resources(&self, project: &Project, folder: &Resource) -> StorageResult<Vec<Resource>>;

    /// Every resource sharing the content of `resource`, itself included.
    fn read_siblings(&self, project: &Project, resource: &Resource) -> StorageResult<Vec<Resource>>;

    /// Stores a new resource; its parent folder must exist.
    fn create_resource(&self, project: &Project, resource: Resource) -> StorageResult<Resource>;

    fn write_resource(&self, project: &Project, resource: &Resource, update: &ResourceUpdate) -> StorageResult<Resource>;

    /// Copies a single resource to `destination`.
    fn copy_resource(
        &self,
        project: &Project,
        source: &Resource,
        destination: &str,
        mode: CopyMode,
    ) -> StorageResult<Resource>;

    /// Moves a single resource to `destination`, keeping its structure id.
    fn move_resource(&self, project: &Project, resource: &Resource, destination: &str) -> StorageResult<Resource>;

    /// Deletes a single resource. Unpublished resources disappear, others are marked deleted.
    fn delete_resource(&self, project: &Project, resource: &Resource) -> StorageResult<()>;

    fn undelete_resource(&self, project: &Project, resource: &Resource) -> StorageResult<Resource>;

    /// Restores the published state. Returns `None` if the resource was never published.
    fn undo_changes(&self, project: &Project, resource: &Resource) -> StorageResult<Option<Resource>>;

    fn read_property(&self, project: &Project, resource: &Resource, name: &str) -> StorageResult<Option<String>>;

    /// Sets a property, or removes it when `value` is `None`.
    fn write_property(
        &self,
        project: &Project,
        resource: &Resource,
        name: &str,
        value: Option<&str>,
    ) -> StorageResult<()>;

    // Access control

    /// Composed permission set of `user` on `resource`.
    fn acl_permissions(&self, project: &Project, user: &User, resource: &Resource) -> StorageResult<PermissionSet>;

    fn access_control_entries(
        &self,
        project: &Project,
        resource: &Resource,
        include_inherited: bool,
    ) -> StorageResult<Vec<AccessControlEntry>>;

    /// Inserts or replaces the entry for the principal on the resource.
    fn write_access_control_entry(&self, project: &Project, entry: AccessControlEntry) -> StorageResult<()>;

    fn remove_access_control_entry(
        &self,
        project: &Project,
        resource: ResourceId,
        principal: Principal,
    ) -> StorageResult<()>;

    // Principals

    fn read_user(&self, id: UserId) -> StorageResult<User>;

    fn read_user_by_name(&self, fqn: &str) -> StorageResult<User>;

    fn create_user(&self, user: User) -> StorageResult<User>;

    fn delete_user(&self, id: UserId) -> StorageResult<()>;

    fn read_group(&self, id: GroupId) -> StorageResult<Group>;

    fn read_group_by_name(&self, fqn: &str) -> StorageResult<Group>;

    fn create_group(&self, group: Group) -> StorageResult<Group>;

    fn delete_group(&self, id: GroupId) -> StorageResult<()>;

    fn add_user_to_group(&self, user: UserId, group: GroupId) -> StorageResult<()>;

    fn remove_user_from_group(&self, user: UserId, group: GroupId) -> StorageResult<()>;

    /// Groups of a user within `scope`.
    ///
    /// `include_sub_units` widens the scope to units below it, `roles_only` keeps only
    /// role-backing groups, and `direct_only` skips groups reached through parent groups.
    fn groups_of_user(
        &self,
        user: UserId,
        scope: &OrgUnitPath,
        include_sub_units: bool,
        roles_only: bool,
        direct_only: bool,
    ) -> StorageResult<Vec<Group>>;

    // Organizational units

    fn read_org_unit(&self, path: &OrgUnitPath) -> StorageResult<OrganizationalUnit>;

    fn create_org_unit(&self, unit: OrganizationalUnit) -> StorageResult<OrganizationalUnit>;

    fn add_resource_to_org_unit(&self, unit: &OrgUnitPath, root_path: &str) -> StorageResult<()>;

    fn remove_resource_from_org_unit(&self, unit: &OrgUnitPath, root_path: &str) -> StorageResult<()>;

    /// Units administering the resource, i.e. those with an assigned root at or above it.
    fn org_units_for_resource(&self, resource: &Resource) -> StorageResult<Vec<OrgUnitPath>>;

    // Projects

    fn read_project(&self, id: ProjectId) -> StorageResult<Project>;

    fn create_project(&self, project: Project) -> StorageResult<Project>;

    fn write_project(&self, project: &Project) -> StorageResult<()>;

    fn delete_project(&self, id: ProjectId) -> StorageResult<()>;

    // Publishing

    /// Collects the pending changes the list's scope covers.
    fn fill_publish_list(&self, project: &Project, list: PublishList) -> StorageResult<PublishList>;

    /// Promotes the listed resources into the Online view.
    fn publish(&self, project: &Project, list: &PublishList) -> StorageResult<()>;
}
