//! In-memory storage driver.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use palisade_common_core::{GroupId, ProjectId, ResourceId, StructureId, UserId};
use parking_lot::RwLock;
use tracing::debug;

use crate::acl::{AccessControlEntry, Principal};
use crate::path;
use crate::permission::PermissionSet;
use crate::principal::{Group, OrgUnitPath, OrganizationalUnit, Role, User};
use crate::project::Project;
use crate::publish::{PublishList, PublishScope};
use crate::resource::{Resource, ResourceState, ResourceType};
use crate::storage::{CopyMode, ResourceUpdate, StorageDriver, StorageError, StorageResult};

type View = BTreeMap<String, Resource>;

#[derive(Default)]
struct State {
    online: View,
    offline: View,
    properties: HashMap<StructureId, BTreeMap<String, String>>,
    entries: HashMap<ResourceId, Vec<AccessControlEntry>>,
    users: HashMap<UserId, User>,
    groups: HashMap<GroupId, Group>,
    memberships: HashMap<UserId, BTreeSet<GroupId>>,
    org_units: BTreeMap<OrgUnitPath, OrganizationalUnit>,
    projects: HashMap<ProjectId, Project>,
}

impl State {
    fn view(&self, project: &Project) -> &View {
        if project.is_online() {
            &self.online
        } else {
            &self.offline
        }
    }

    fn view_mut(&mut self, project: &Project) -> StorageResult<&mut View> {
        if project.is_online() {
            return Err(StorageError::backend("the online view is read-only"));
        }
        Ok(&mut self.offline)
    }

    fn entries_for(&self, resource: ResourceId, principals: &HashSet<Principal>, inheriting_only: bool) -> PermissionSet {
        self.entries
            .get(&resource)
            .into_iter()
            .flatten()
            .filter(|e| principals.contains(&e.principal) && (!inheriting_only || e.inheriting))
            .fold(PermissionSet::EMPTY, |acc, e| acc.union(e.permissions))
    }

    fn require_parent(view: &View, target: &str) -> StorageResult<()> {
        if !path::is_valid(target) {
            return Err(StorageError::InvalidPath(target.to_string()));
        }
        let parent = path::parent_folder(target).ok_or_else(|| StorageError::InvalidPath(target.to_string()))?;
        match view.get(parent) {
            Some(folder) if folder.is_folder() && !folder.state.is_deleted() => Ok(()),
            _ => Err(StorageError::not_found(parent)),
        }
    }

    fn require_free(view: &View, target: &str) -> StorageResult<()> {
        if view.contains_key(target) {
            return Err(StorageError::AlreadyExists(target.to_string()));
        }
        Ok(())
    }

    fn find_org_unit_mut(&mut self, unit: &OrgUnitPath) -> StorageResult<&mut OrganizationalUnit> {
        self.org_units
            .get_mut(unit)
            .ok_or_else(|| StorageError::not_found(unit.to_string()))
    }

    fn find_group_by_name(&self, fqn: &str) -> Option<&Group> {
        let fqn = normalize_fqn(fqn);
        self.groups.values().find(|g| g.fqn() == fqn)
    }
}

fn normalize_fqn(fqn: &str) -> String {
    if fqn.starts_with('/') {
        fqn.to_string()
    } else {
        format!("/{}", fqn)
    }
}

fn is_pending(resource: &Resource) -> bool {
    !resource.state.is_unchanged()
}

/// Thread-safe in-memory storage.
///
/// Keeps a published and a working copy of the tree. The working copy is shared by every
/// offline project. Created seeded with the root unit, the root folder, an `Admin` user,
/// the `Administrators` and `Users` groups, the Online project and one `Offline` project.
pub struct MemoryStorage {
    state: RwLock<State>,
    fail_principal_reads: AtomicBool,
    admin: UserId,
    offline: ProjectId,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let root = OrgUnitPath::root();
        let mut state = State::default();

        let mut root_unit = OrganizationalUnit::new(root.clone(), "Root organizational unit");
        root_unit.resources.push(path::ROOT.to_string());
        state.org_units.insert(root.clone(), root_unit);

        let root_folder = Resource::new(path::ROOT, ResourceType::FOLDER).with_state(ResourceState::Unchanged);
        state.online.insert(path::ROOT.to_string(), root_folder.clone());
        state.offline.insert(path::ROOT.to_string(), root_folder);

        let admin = User::new("Admin", root.clone());
        let administrators = Group::new("Administrators", root.clone());
        let users = Group::new("Users", root.clone());
        let root_admins = Group::for_role(Role::RootAdmin, root.clone());
        state
            .memberships
            .entry(admin.id)
            .or_default()
            .extend([administrators.id, users.id, root_admins.id]);

        let online = Project::online(admin.id, administrators.id, users.id);
        let mut offline = Project::new("Offline", admin.id, administrators.id, users.id, root);
        offline.resources.push(path::ROOT.to_string());

        let ids = (admin.id, offline.id);
        state.users.insert(admin.id, admin);
        for group in [administrators, users, root_admins] {
            state.groups.insert(group.id, group);
        }
        state.projects.insert(online.id, online);
        state.projects.insert(offline.id, offline);

        Self {
            state: RwLock::new(state),
            fail_principal_reads: AtomicBool::new(false),
            admin: ids.0,
            offline: ids.1,
        }
    }

    /// The seeded administrator.
    pub fn admin(&self) -> StorageResult<User> {
        self.read_user(self.admin)
    }

    pub fn online_project(&self) -> StorageResult<Project> {
        self.read_project(ProjectId::NIL)
    }

    /// The seeded offline project.
    pub fn offline_project(&self) -> StorageResult<Project> {
        self.read_project(self.offline)
    }

    /// Makes group and org unit lookups fail, simulating an unavailable principal backend.
    pub fn set_fail_principal_reads(&self, fail: bool) {
        self.fail_principal_reads.store(fail, Ordering::SeqCst);
    }

    fn check_principal_backend(&self) -> StorageResult<()> {
        if self.fail_principal_reads.load(Ordering::SeqCst) {
            return Err(StorageError::backend("principal backend unavailable"));
        }
        Ok(())
    }

    /// Adds a user, creating its organizational unit chain if necessary.
    pub fn add_user(&self, name: &str, org_unit: OrgUnitPath) -> User {
        let user = User::new(name, org_unit.clone());
        let mut state = self.state.write();
        Self::ensure_org_unit(&mut state, &org_unit);
        state.users.insert(user.id, user.clone());
        user
    }

    /// Adds a group, creating its organizational unit chain if necessary.
    pub fn add_group(&self, name: &str, org_unit: OrgUnitPath) -> Group {
        let group = Group::new(name, org_unit.clone());
        let mut state = self.state.write();
        Self::ensure_org_unit(&mut state, &org_unit);
        state.groups.insert(group.id, group.clone());
        group
    }

    pub fn add_member(&self, user: &User, group: &Group) {
        let mut state = self.state.write();
        state.memberships.entry(user.id).or_default().insert(group.id);
    }

    /// Grants `role` within `org_unit` by adding the user to the backing group.
    pub fn grant_role(&self, user: &User, role: Role, org_unit: OrgUnitPath) -> Group {
        let mut state = self.state.write();
        Self::ensure_org_unit(&mut state, &org_unit);
        let existing = state
            .groups
            .values()
            .find(|g| g.role == Some(role) && g.org_unit == org_unit)
            .cloned();
        let group = existing.unwrap_or_else(|| {
            let group = Group::for_role(role, org_unit);
            state.groups.insert(group.id, group.clone());
            group
        });
        state.memberships.entry(user.id).or_default().insert(group.id);
        group
    }

    /// Stores a resource as already published in both views.
    pub fn import_resource(&self, root_path: &str, type_id: ResourceType) -> StorageResult<Resource> {
        let mut state = self.state.write();
        State::require_parent(&state.offline, root_path)?;
        State::require_free(&state.offline, root_path)?;
        let resource = Resource::new(root_path, type_id).with_state(ResourceState::Unchanged);
        state.online.insert(root_path.to_string(), resource.clone());
        state.offline.insert(root_path.to_string(), resource.clone());
        Ok(resource)
    }

    /// Sets the working state of a resource without any other change.
    pub fn set_state(&self, root_path: &str, resource_state: ResourceState) -> StorageResult<Resource> {
        let mut state = self.state.write();
        let resource = state
            .offline
            .get_mut(root_path)
            .ok_or_else(|| StorageError::not_found(root_path))?;
        resource.state = resource_state;
        Ok(resource.clone())
    }

    /// Attaches an access control entry to the resource at `root_path`.
    pub fn set_acl(
        &self,
        root_path: &str,
        principal: Principal,
        permissions: PermissionSet,
        inheriting: bool,
    ) -> StorageResult<()> {
        let mut state = self.state.write();
        let resource_id = state
            .offline
            .get(root_path)
            .map(|r| r.resource_id)
            .ok_or_else(|| StorageError::not_found(root_path))?;
        let mut entry = AccessControlEntry::new(resource_id, principal, permissions);
        entry.inheriting = inheriting;
        let entries = state.entries.entry(resource_id).or_default();
        entries.retain(|e| e.principal != principal);
        entries.push(entry);
        Ok(())
    }

    fn ensure_org_unit(state: &mut State, unit: &OrgUnitPath) {
        for path in unit.self_and_ancestors() {
            state
                .org_units
                .entry(path.clone())
                .or_insert_with(|| OrganizationalUnit::new(path, ""));
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageDriver for MemoryStorage {
    fn read_resource(&self, project: &Project, path: &str) -> StorageResult<Resource> {
        let state = self.state.read();
        state
            .view(project)
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::not_found(path))
    }

    fn read_resource_by_id(&self, project: &Project, id: StructureId) -> StorageResult<Resource> {
        let state = self.state.read();
        state
            .view(project)
            .values()
            .find(|r| r.structure_id == id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(id.to_string()))
    }

    fn read_child_resources(&self, project: &Project, folder: &Resource) -> StorageResult<Vec<Resource>> {
        let state = self.state.read();
        let parent = folder.root_path.as_str();
        let children = state
            .view(project)
            .range::<str, _>((Bound::Excluded(parent), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(parent))
            .filter(|(key, _)| path::parent_folder(key) == Some(parent))
            .map(|(_, r)| r.clone())
            .collect();
        Ok(children)
    }

    fn read_siblings(&self, project: &Project, resource: &Resource) -> StorageResult<Vec<Resource>> {
        let state = self.state.read();
        Ok(state
            .view(project)
            .values()
            .filter(|r| r.resource_id == resource.resource_id)
            .cloned()
            .collect())
    }

    fn create_resource(&self, project: &Project, mut resource: Resource) -> StorageResult<Resource> {
        let mut state = self.state.write();
        let view = state.view_mut(project)?;
        State::require_parent(view, &resource.root_path)?;
        State::require_free(view, &resource.root_path)?;
        resource.state = ResourceState::New;
        resource.date_last_modified = Utc::now();
        view.insert(resource.root_path.clone(), resource.clone());
        debug!(path = %resource.root_path, "Resource created");
        Ok(resource)
    }

    fn write_resource(&self, project: &Project, resource: &Resource, update: &ResourceUpdate) -> StorageResult<Resource> {
        let mut state = self.state.write();
        let view = state.view_mut(project)?;
        let stored = view
            .get_mut(&resource.root_path)
            .ok_or_else(|| StorageError::not_found(resource.root_path.as_str()))?;
        if let Some(flags) = update.flags {
            stored.flags = flags;
        }
        if let Some(type_id) = update.type_id {
            stored.type_id = type_id;
        }
        if let Some(released) = update.date_released {
            stored.date_released = released;
        }
        if let Some(expired) = update.date_expired {
            stored.date_expired = expired;
        }
        stored.state = stored.state.after_edit();
        stored.date_last_modified = Utc::now();
        Ok(stored.clone())
    }

    fn copy_resource(
        &self,
        project: &Project,
        source: &Resource,
        destination: &str,
        mode: CopyMode,
    ) -> StorageResult<Resource> {
        let mut state = self.state.write();
        let view = state.view_mut(project)?;
        State::require_parent(view, destination)?;
        State::require_free(view, destination)?;

        let mut copy = source.clone();
        copy.structure_id = StructureId::new();
        copy.root_path = destination.to_string();
        copy.state = ResourceState::New;
        copy.date_last_modified = Utc::now();
        if mode == CopyMode::AsNew {
            copy.resource_id = ResourceId::new();
        }
        view.insert(copy.root_path.clone(), copy.clone());

        if let Some(props) = state.properties.get(&source.structure_id).cloned() {
            state.properties.insert(copy.structure_id, props);
        }
        if mode == CopyMode::AsNew {
            let copied: Vec<AccessControlEntry> = state
                .entries
                .get(&source.resource_id)
                .into_iter()
                .flatten()
                .map(|e| AccessControlEntry {
                    resource: copy.resource_id,
                    ..e.clone()
                })
                .collect();
            if !copied.is_empty() {
                state.entries.insert(copy.resource_id, copied);
            }
        }
        Ok(copy)
    }

    fn move_resource(&self, project: &Project, resource: &Resource, destination: &str) -> StorageResult<Resource> {
        let mut state = self.state.write();
        let view = state.view_mut(project)?;
        State::require_parent(view, destination)?;
        State::require_free(view, destination)?;
        let mut moved = view
            .remove(&resource.root_path)
            .ok_or_else(|| StorageError::not_found(resource.root_path.as_str()))?;
        moved.root_path = destination.to_string();
        moved.state = moved.state.after_edit();
        moved.date_last_modified = Utc::now();
        view.insert(moved.root_path.clone(), moved.clone());
        Ok(moved)
    }

    fn delete_resource(&self, project: &Project, resource: &Resource) -> StorageResult<()> {
        let mut state = self.state.write();
        let view = state.view_mut(project)?;
        let stored = view
            .get_mut(&resource.root_path)
            .ok_or_else(|| StorageError::not_found(resource.root_path.as_str()))?;
        if stored.state.is_new() {
            view.remove(&resource.root_path);
            state.properties.remove(&resource.structure_id);
        } else {
            stored.state = ResourceState::Deleted;
        }
        Ok(())
    }

    fn undelete_resource(&self, project: &Project, resource: &Resource) -> StorageResult<Resource> {
        let mut state = self.state.write();
        let view = state.view_mut(project)?;
        let stored = view
            .get_mut(&resource.root_path)
            .ok_or_else(|| StorageError::not_found(resource.root_path.as_str()))?;
        if stored.state.is_deleted() {
            stored.state = ResourceState::Changed;
        }
        Ok(stored.clone())
    }

    fn undo_changes(&self, project: &Project, resource: &Resource) -> StorageResult<Option<Resource>> {
        let mut state = self.state.write();
        let published = state
            .online
            .values()
            .find(|r| r.structure_id == resource.structure_id)
            .cloned();
        let view = state.view_mut(project)?;
        match published {
            Some(published) => {
                if published.root_path != resource.root_path {
                    State::require_free(view, &published.root_path)?;
                }
                view.remove(&resource.root_path);
                view.insert(published.root_path.clone(), published.clone());
                Ok(Some(published))
            }
            None => {
                view.remove(&resource.root_path);
                state.properties.remove(&resource.structure_id);
                Ok(None)
            }
        }
    }

    fn read_property(&self, _project: &Project, resource: &Resource, name: &str) -> StorageResult<Option<String>> {
        let state = self.state.read();
        Ok(state
            .properties
            .get(&resource.structure_id)
            .and_then(|props| props.get(name))
            .cloned())
    }

    fn write_property(
        &self,
        project: &Project,
        resource: &Resource,
        name: &str,
        value: Option<&str>,
    ) -> StorageResult<()> {
        let mut state = self.state.write();
        let view = state.view_mut(project)?;
        let stored = view
            .get_mut(&resource.root_path)
            .ok_or_else(|| StorageError::not_found(resource.root_path.as_str()))?;
        stored.state = stored.state.after_edit();
        let props = state.properties.entry(resource.structure_id).or_default();
        match value {
            Some(value) => {
                props.insert(name.to_string(), value.to_string());
            }
            None => {
                props.remove(name);
            }
        }
        Ok(())
    }

    fn acl_permissions(&self, project: &Project, user: &User, resource: &Resource) -> StorageResult<PermissionSet> {
        let groups = self.groups_of_user(user.id, &OrgUnitPath::root(), true, false, false)?;
        let mut principals: HashSet<Principal> = groups.iter().map(|g| Principal::Group(g.id)).collect();
        principals.insert(Principal::User(user.id));

        let state = self.state.read();
        let view = state.view(project);
        let ancestors: Vec<&str> = path::ancestors(&resource.root_path).collect();
        let mut composed = PermissionSet::EMPTY;
        for folder in ancestors.iter().rev() {
            if let Some(parent) = view.get(*folder) {
                composed = composed.overlay(state.entries_for(parent.resource_id, &principals, true));
            }
        }
        Ok(composed.overlay(state.entries_for(resource.resource_id, &principals, false)))
    }

    fn access_control_entries(
        &self,
        project: &Project,
        resource: &Resource,
        include_inherited: bool,
    ) -> StorageResult<Vec<AccessControlEntry>> {
        let state = self.state.read();
        let mut result = Vec::new();
        if include_inherited {
            let view = state.view(project);
            for folder in path::ancestors(&resource.root_path) {
                let Some(parent) = view.get(folder) else { continue };
                result.extend(
                    state
                        .entries
                        .get(&parent.resource_id)
                        .into_iter()
                        .flatten()
                        .filter(|e| e.inheriting)
                        .map(AccessControlEntry::as_inherited),
                );
            }
        }
        result.extend(state.entries.get(&resource.resource_id).into_iter().flatten().cloned());
        Ok(result)
    }

    fn write_access_control_entry(&self, project: &Project, entry: AccessControlEntry) -> StorageResult<()> {
        let mut state = self.state.write();
        state.view_mut(project)?;
        let entries = state.entries.entry(entry.resource).or_default();
        entries.retain(|e| e.principal != entry.principal);
        entries.push(AccessControlEntry {
            inherited: false,
            ..entry
        });
        Ok(())
    }

    fn remove_access_control_entry(
        &self,
        project: &Project,
        resource: ResourceId,
        principal: Principal,
    ) -> StorageResult<()> {
        let mut state = self.state.write();
        state.view_mut(project)?;
        if let Some(entries) = state.entries.get_mut(&resource) {
            entries.retain(|e| e.principal != principal);
        }
        Ok(())
    }

    fn read_user(&self, id: UserId) -> StorageResult<User> {
        let state = self.state.read();
        state
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(id.to_string()))
    }

    fn read_user_by_name(&self, fqn: &str) -> StorageResult<User> {
        let state = self.state.read();
        let fqn = normalize_fqn(fqn);
        state
            .users
            .values()
            .find(|u| u.fqn() == fqn)
            .cloned()
            .ok_or_else(|| StorageError::not_found(fqn))
    }

    fn create_user(&self, user: User) -> StorageResult<User> {
        let mut state = self.state.write();
        if !state.org_units.contains_key(&user.org_unit) {
            return Err(StorageError::not_found(user.org_unit.to_string()));
        }
        let fqn = user.fqn();
        if state.users.values().any(|u| u.fqn() == fqn) {
            return Err(StorageError::AlreadyExists(fqn));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn delete_user(&self, id: UserId) -> StorageResult<()> {
        let mut state = self.state.write();
        state
            .users
            .remove(&id)
            .ok_or_else(|| StorageError::not_found(id.to_string()))?;
        state.memberships.remove(&id);
        for entries in state.entries.values_mut() {
            entries.retain(|e| e.principal != Principal::User(id));
        }
        Ok(())
    }

    fn read_group(&self, id: GroupId) -> StorageResult<Group> {
        let state = self.state.read();
        state
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(id.to_string()))
    }

    fn read_group_by_name(&self, fqn: &str) -> StorageResult<Group> {
        let state = self.state.read();
        state
            .find_group_by_name(fqn)
            .cloned()
            .ok_or_else(|| StorageError::not_found(fqn))
    }

    fn create_group(&self, group: Group) -> StorageResult<Group> {
        let mut state = self.state.write();
        if !state.org_units.contains_key(&group.org_unit) {
            return Err(StorageError::not_found(group.org_unit.to_string()));
        }
        if state.find_group_by_name(&group.fqn()).is_some() {
            return Err(StorageError::AlreadyExists(group.fqn()));
        }
        state.groups.insert(group.id, group.clone());
        Ok(group)
    }

    fn delete_group(&self, id: GroupId) -> StorageResult<()> {
        let mut state = self.state.write();
        state
            .groups
            .remove(&id)
            .ok_or_else(|| StorageError::not_found(id.to_string()))?;
        for groups in state.memberships.values_mut() {
            groups.remove(&id);
        }
        for group in state.groups.values_mut() {
            if group.parent == Some(id) {
                group.parent = None;
            }
        }
        for entries in state.entries.values_mut() {
            entries.retain(|e| e.principal != Principal::Group(id));
        }
        Ok(())
    }

    fn add_user_to_group(&self, user: UserId, group: GroupId) -> StorageResult<()> {
        let mut state = self.state.write();
        if !state.users.contains_key(&user) {
            return Err(StorageError::not_found(user.to_string()));
        }
        if !state.groups.contains_key(&group) {
            return Err(StorageError::not_found(group.to_string()));
        }
        state.memberships.entry(user).or_default().insert(group);
        Ok(())
    }

    fn remove_user_from_group(&self, user: UserId, group: GroupId) -> StorageResult<()> {
        let mut state = self.state.write();
        let removed = state
            .memberships
            .get_mut(&user)
            .map(|groups| groups.remove(&group))
            .unwrap_or(false);
        if !removed {
            return Err(StorageError::not_found(format!("{} in {}", user, group)));
        }
        Ok(())
    }

    fn groups_of_user(
        &self,
        user: UserId,
        scope: &OrgUnitPath,
        include_sub_units: bool,
        roles_only: bool,
        direct_only: bool,
    ) -> StorageResult<Vec<Group>> {
        self.check_principal_backend()?;
        let state = self.state.read();
        let mut pending: Vec<GroupId> = state
            .memberships
            .get(&user)
            .map(|groups| groups.iter().copied().collect())
            .unwrap_or_default();
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(group) = state.groups.get(&id) else { continue };
            if !direct_only {
                pending.extend(group.parent);
            }
            let in_scope = if include_sub_units {
                scope.is_ancestor_or_self_of(&group.org_unit)
            } else {
                group.org_unit == *scope
            };
            if in_scope && (!roles_only || group.is_role()) {
                result.push(group.clone());
            }
        }
        result.sort_by_key(Group::fqn);
        Ok(result)
    }

    fn read_org_unit(&self, path: &OrgUnitPath) -> StorageResult<OrganizationalUnit> {
        let state = self.state.read();
        state
            .org_units
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::not_found(path.to_string()))
    }

    fn create_org_unit(&self, unit: OrganizationalUnit) -> StorageResult<OrganizationalUnit> {
        let mut state = self.state.write();
        if state.org_units.contains_key(&unit.path) {
            return Err(StorageError::AlreadyExists(unit.path.to_string()));
        }
        let parent = unit
            .path
            .parent()
            .ok_or_else(|| StorageError::AlreadyExists(unit.path.to_string()))?;
        if !state.org_units.contains_key(&parent) {
            return Err(StorageError::not_found(parent.to_string()));
        }
        state.org_units.insert(unit.path.clone(), unit.clone());
        Ok(unit)
    }

    fn add_resource_to_org_unit(&self, unit: &OrgUnitPath, root_path: &str) -> StorageResult<()> {
        let mut state = self.state.write();
        if !state.offline.contains_key(root_path) {
            return Err(StorageError::not_found(root_path));
        }
        let unit = state.find_org_unit_mut(unit)?;
        if !unit.resources.iter().any(|r| r == root_path) {
            unit.resources.push(root_path.to_string());
        }
        Ok(())
    }

    fn remove_resource_from_org_unit(&self, unit: &OrgUnitPath, root_path: &str) -> StorageResult<()> {
        let mut state = self.state.write();
        let unit = state.find_org_unit_mut(unit)?;
        let before = unit.resources.len();
        unit.resources.retain(|r| r != root_path);
        if unit.resources.len() == before {
            return Err(StorageError::not_found(root_path));
        }
        Ok(())
    }

    fn org_units_for_resource(&self, resource: &Resource) -> StorageResult<Vec<OrgUnitPath>> {
        self.check_principal_backend()?;
        let state = self.state.read();
        let target = resource.root_path.as_str();
        Ok(state
            .org_units
            .values()
            .filter(|unit| {
                unit.resources
                    .iter()
                    .any(|root| root == target || path::is_below(target, root))
            })
            .map(|unit| unit.path.clone())
            .collect())
    }

    fn read_project(&self, id: ProjectId) -> StorageResult<Project> {
        let state = self.state.read();
        state
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(id.to_string()))
    }

    fn create_project(&self, project: Project) -> StorageResult<Project> {
        let mut state = self.state.write();
        if state.projects.values().any(|p| p.name == project.name) {
            return Err(StorageError::AlreadyExists(project.name));
        }
        state.projects.insert(project.id, project.clone());
        Ok(project)
    }

    fn write_project(&self, project: &Project) -> StorageResult<()> {
        let mut state = self.state.write();
        let stored = state
            .projects
            .get_mut(&project.id)
            .ok_or_else(|| StorageError::not_found(project.id.to_string()))?;
        *stored = project.clone();
        Ok(())
    }

    fn delete_project(&self, id: ProjectId) -> StorageResult<()> {
        if id.is_nil() {
            return Err(StorageError::backend("the online project cannot be deleted"));
        }
        let mut state = self.state.write();
        state
            .projects
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(id.to_string()))
    }

    fn fill_publish_list(&self, project: &Project, mut list: PublishList) -> StorageResult<PublishList> {
        let state = self.state.read();
        let view = state.view(project);
        match list.scope.clone() {
            PublishScope::Project => {
                for resource in view.values().filter(|r| is_pending(r)) {
                    let covered = project
                        .resources
                        .iter()
                        .any(|root| *root == resource.root_path || path::is_below(&resource.root_path, root));
                    if covered {
                        list.add(resource.clone());
                    }
                }
            }
            PublishScope::Direct {
                resources,
                publish_siblings,
                include_sub_resources,
            } => {
                for requested in &resources {
                    let Some(current) = view.get(&requested.root_path) else { continue };
                    if is_pending(current) {
                        list.add(current.clone());
                    }
                    if include_sub_resources && current.is_folder() {
                        let below = view
                            .range::<str, _>((Bound::Excluded(current.root_path.as_str()), Bound::Unbounded))
                            .take_while(|(key, _)| key.starts_with(current.root_path.as_str()))
                            .map(|(_, r)| r)
                            .filter(|r| is_pending(r))
                            .cloned()
                            .collect::<Vec<_>>();
                        for resource in below {
                            list.add(resource);
                        }
                    }
                    if publish_siblings {
                        let siblings = view
                            .values()
                            .filter(|r| r.resource_id == current.resource_id && is_pending(r))
                            .cloned()
                            .collect::<Vec<_>>();
                        for sibling in siblings {
                            list.add(sibling);
                        }
                    }
                }
            }
        }
        list.sort();
        debug!(project = %project.name, count = list.len(), "Publish list filled");
        Ok(list)
    }

    fn publish(&self, project: &Project, list: &PublishList) -> StorageResult<()> {
        let mut state = self.state.write();
        state.view_mut(project)?;
        for resource in list.resources() {
            let previous = state
                .online
                .iter()
                .find(|(_, r)| r.structure_id == resource.structure_id)
                .map(|(key, _)| key.clone());
            if let Some(key) = previous {
                state.online.remove(&key);
            }
            if resource.state.is_deleted() {
                state.offline.remove(&resource.root_path);
                continue;
            }
            let Some(stored) = state.offline.get_mut(&resource.root_path) else { continue };
            stored.state = ResourceState::Unchanged;
            let published = stored.clone();
            state.online.insert(published.root_path.clone(), published);
        }
        debug!(project = %project.name, count = list.len(), "Resources published");
        Ok(())
    }
}
