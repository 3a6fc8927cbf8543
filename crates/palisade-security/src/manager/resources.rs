//! Resource operations.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use palisade_common_core::{ResourceId, StructureId, UserId};
use palisade_vfs::{
    path, CopyMode, DeleteMode, PermissionSet, Permissions, Resource, ResourceFilter, ResourceFlags, ResourceType,
    ResourceUpdate, Role,
};
use tracing::{info, warn};

use super::SecurityManager;
use crate::context::{DbContext, RequestContext};
use crate::error::{SecurityError, SecurityResult};
use crate::lock::{LockError, LockType};

/// Folder receiving resources that lost their place in the tree.
pub const LOST_AND_FOUND_FOLDER: &str = "/system/lost-found/";

enum DeleteStep {
    Visit(Resource),
    Finish(Resource),
}

impl SecurityManager {
    /// Reads a resource the user may read and that passes `filter`. Works online.
    pub fn read_resource(&self, ctx: &RequestContext, root_path: &str, filter: ResourceFilter) -> SecurityResult<Resource> {
        self.run("read_resource", ctx, "Reading the resource failed", |dbc| {
            self.read_checked(dbc, root_path, filter)
        })
    }

    fn read_checked(&self, dbc: &DbContext, root_path: &str, filter: ResourceFilter) -> SecurityResult<Resource> {
        let resource = self.read(dbc, root_path)?;
        self.check(dbc, &resource, Permissions::READ, true, filter)?;
        Ok(resource)
    }

    /// Children of a folder; children the user may not read are left out.
    pub fn read_child_resources(
        &self,
        ctx: &RequestContext,
        folder: &str,
        filter: ResourceFilter,
    ) -> SecurityResult<Vec<Resource>> {
        self.run("read_child_resources", ctx, "Reading the folder content failed", |dbc| {
            let parent = self.read_checked(dbc, folder, filter)?;
            let resolver = self.resolver();
            let children = self.storage.read_child_resources(dbc.project(), &parent)?;
            Ok(children
                .into_iter()
                .filter(|child| resolver.has_permissions(dbc, child, Permissions::READ, true, filter))
                .collect())
        })
    }

    /// Whether a readable resource passing `filter` exists at the path.
    pub fn exists_resource(&self, ctx: &RequestContext, root_path: &str, filter: ResourceFilter) -> bool {
        let dbc = DbContext::open("exists_resource", ctx);
        self.read_checked(&dbc, root_path, filter).is_ok()
    }

    /// Creates a resource and locks it for the creator.
    pub fn create_resource(&self, ctx: &RequestContext, root_path: &str, type_id: ResourceType) -> SecurityResult<Resource> {
        self.run("create_resource", ctx, "Creating the resource failed", |dbc| {
            Self::check_offline(dbc)?;
            check_path_form(root_path, type_id.is_folder())?;
            self.check_free(dbc, root_path)?;
            let parent = self.read_parent(dbc, root_path)?;
            self.check(dbc, &parent, Permissions::WRITE, false, ResourceFilter::IGNORE_EXPIRATION)?;

            let user = dbc.user().id;
            self.locks.check_lockable(root_path, user)?;
            let created = self
                .storage
                .create_resource(dbc.project(), Resource::new(root_path, type_id))?;
            self.locks.lock(root_path, user, dbc.project().id, LockType::Exclusive)?;
            info!(path = %root_path, type_id = %type_id, "Resource created");
            Ok(created)
        })
    }

    fn check_free(&self, dbc: &DbContext, root_path: &str) -> SecurityResult<()> {
        match self.storage.read_resource(dbc.project(), root_path) {
            Ok(_) => Err(SecurityError::AlreadyExists {
                path: root_path.to_string(),
            }),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Copies a resource, folders with their content, and locks the copy.
    pub fn copy_resource(
        &self,
        ctx: &RequestContext,
        source: &str,
        destination: &str,
        mode: CopyMode,
    ) -> SecurityResult<Resource> {
        self.run("copy_resource", ctx, "Copying the resource failed", |dbc| {
            Self::check_offline(dbc)?;
            let source = self.read(dbc, source)?;
            self.check(dbc, &source, Permissions::READ, false, ResourceFilter::IGNORE_EXPIRATION)?;
            check_path_form(destination, source.is_folder())?;
            check_not_inside(&source, destination)?;
            self.check_free(dbc, destination)?;
            let parent = self.read_parent(dbc, destination)?;
            self.check(dbc, &parent, Permissions::WRITE, false, ResourceFilter::IGNORE_EXPIRATION)?;

            let user = dbc.user().id;
            self.locks.check_lockable(destination, user)?;

            let mut copied_root = None;
            let mut pending = vec![(source.clone(), destination.to_string())];
            while let Some((item, target)) = pending.pop() {
                if copied_root.is_some() {
                    if item.state.is_deleted() {
                        continue;
                    }
                    self.check(dbc, &item, Permissions::READ, false, ResourceFilter::IGNORE_EXPIRATION)?;
                }
                let item_mode = if item.is_folder() { CopyMode::AsNew } else { mode };
                let copy = self.storage.copy_resource(dbc.project(), &item, &target, item_mode)?;
                if item.is_folder() {
                    let children = self.storage.read_child_resources(dbc.project(), &item)?;
                    pending.extend(
                        children
                            .into_iter()
                            .rev()
                            .map(|child| {
                                let child_target = format!("{}{}", target, path::name(&child.root_path));
                                (child, child_target)
                            }),
                    );
                }
                copied_root.get_or_insert(copy);
            }

            let copy = copied_root.ok_or_else(|| SecurityError::not_found(&source.root_path))?;
            self.locks.lock(destination, user, dbc.project().id, LockType::Exclusive)?;
            Ok(copy)
        })
    }

    /// Moves a resource, folders with their content.
    ///
    /// Each resource is checked right before it moves; a failure part way leaves the
    /// earlier moves in place. The destination is re-locked on a best-effort basis.
    pub fn move_resource(&self, ctx: &RequestContext, source: &str, destination: &str) -> SecurityResult<Resource> {
        self.run("move_resource", ctx, "Moving the resource failed", |dbc| self.move_in(dbc, source, destination))
    }

    fn move_in(&self, dbc: &DbContext, source: &str, destination: &str) -> SecurityResult<Resource> {
        Self::check_offline(dbc)?;
        let source = self.read(dbc, source)?;
        self.check(
            dbc,
            &source,
            Permissions::READ | Permissions::WRITE,
            true,
            ResourceFilter::IGNORE_EXPIRATION,
        )?;
        check_path_form(destination, source.is_folder())?;
        check_not_inside(&source, destination)?;
        self.check_free(dbc, destination)?;
        let parent = self.read_parent(dbc, destination)?;
        self.check(dbc, &parent, Permissions::WRITE, false, ResourceFilter::IGNORE_EXPIRATION)?;
        if self.locks.has_system_locks(&source.root_path) {
            return Err(LockError::SystemLocked {
                path: source.root_path.clone(),
            }
            .into());
        }

        let mut moved_root = None;
        for item in self.subtree(dbc, &source)? {
            let target = format!("{}{}", destination, &item.root_path[source.root_path.len()..]);
            self.check(dbc, &item, Permissions::WRITE, true, ResourceFilter::ALL)?;
            let moved = self.storage.move_resource(dbc.project(), &item, &target)?;
            moved_root.get_or_insert(moved);
        }

        self.locks.remove_subtree(&source.root_path);
        // Inherited access control entries follow the new position.
        self.cache.clear();
        let user = dbc.user().id;
        if let Err(e) = self.locks.lock(destination, user, dbc.project().id, LockType::Exclusive) {
            warn!(path = %destination, error = %e, "Re-locking the moved resource failed");
        }
        moved_root.ok_or_else(|| SecurityError::not_found(&source.root_path))
    }

    /// The resource followed by everything below it, parents before children.
    fn subtree(&self, dbc: &DbContext, root: &Resource) -> SecurityResult<Vec<Resource>> {
        let mut result = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(item) = pending.pop() {
            if item.is_folder() {
                let children = self.storage.read_child_resources(dbc.project(), &item)?;
                pending.extend(children.into_iter().rev());
            }
            result.push(item);
        }
        Ok(result)
    }

    /// Deletes a resource, folders with their content.
    ///
    /// Children are deleted before their folder, each after its own permission check.
    /// With [`DeleteMode::DeleteSiblings`] every resource sharing a file's content goes too.
    pub fn delete_resource(&self, ctx: &RequestContext, root_path: &str, mode: DeleteMode) -> SecurityResult<()> {
        self.run("delete_resource", ctx, "Deleting the resource failed", |dbc| {
            Self::check_offline(dbc)?;
            let resource = self.read(dbc, root_path)?;
            self.check(dbc, &resource, Permissions::WRITE, true, ResourceFilter::IGNORE_EXPIRATION)?;
            if self.locks.has_system_locks(root_path) {
                return Err(LockError::SystemLocked {
                    path: root_path.to_string(),
                }
                .into());
            }

            let mut processed: HashSet<StructureId> = HashSet::new();
            let mut shared_content: HashSet<ResourceId> = HashSet::new();
            let mut pending = vec![DeleteStep::Visit(resource)];
            while let Some(step) = pending.pop() {
                match step {
                    DeleteStep::Visit(item) if item.is_folder() => {
                        let children = self.storage.read_child_resources(dbc.project(), &item)?;
                        pending.push(DeleteStep::Finish(item));
                        pending.extend(children.into_iter().rev().map(DeleteStep::Visit));
                    }
                    DeleteStep::Visit(item) | DeleteStep::Finish(item) => {
                        self.delete_one(dbc, &item, &mut processed)?;
                        if mode == DeleteMode::DeleteSiblings && !item.is_folder() && shared_content.insert(item.resource_id)
                        {
                            for sibling in self.storage.read_siblings(dbc.project(), &item)? {
                                if processed.contains(&sibling.structure_id) {
                                    continue;
                                }
                                self.check(dbc, &sibling, Permissions::WRITE, false, ResourceFilter::ALL)?;
                                self.locks
                                    .lock(&sibling.root_path, dbc.user().id, dbc.project().id, LockType::Exclusive)?;
                                self.delete_one(dbc, &sibling, &mut processed)?;
                            }
                        }
                    }
                }
            }
            Ok(())
        })
    }

    fn delete_one(&self, dbc: &DbContext, item: &Resource, processed: &mut HashSet<StructureId>) -> SecurityResult<()> {
        if !processed.insert(item.structure_id) || item.state.is_deleted() {
            return Ok(());
        }
        self.check(dbc, item, Permissions::WRITE, true, ResourceFilter::ALL)?;
        self.storage.delete_resource(dbc.project(), item)?;
        match self.storage.read_resource(dbc.project(), &item.root_path) {
            Err(e) if e.is_not_found() => {
                self.locks.remove(&item.root_path);
            }
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }
        Ok(())
    }

    /// Applies attribute edits to a locked resource.
    pub fn write_resource(&self, ctx: &RequestContext, root_path: &str, update: &ResourceUpdate) -> SecurityResult<Resource> {
        self.run("write_resource", ctx, "Writing the resource failed", |dbc| {
            self.write_in(dbc, root_path, update)
        })
    }

    fn write_in(&self, dbc: &DbContext, root_path: &str, update: &ResourceUpdate) -> SecurityResult<Resource> {
        let resource = self.writable(dbc, root_path, ResourceFilter::IGNORE_EXPIRATION)?;
        let written = self.storage.write_resource(dbc.project(), &resource, update)?;
        if update.type_id.is_some_and(|t| t != resource.type_id) {
            self.cache.clear();
        }
        Ok(written)
    }

    /// Offline, readable through `filter`, and writable under the user's lock.
    fn writable(&self, dbc: &DbContext, root_path: &str, filter: ResourceFilter) -> SecurityResult<Resource> {
        Self::check_offline(dbc)?;
        let resource = self.read(dbc, root_path)?;
        self.check(dbc, &resource, Permissions::WRITE, true, filter)?;
        Ok(resource)
    }

    pub fn chflags(&self, ctx: &RequestContext, root_path: &str, flags: ResourceFlags) -> SecurityResult<Resource> {
        let update = ResourceUpdate {
            flags: Some(flags),
            ..ResourceUpdate::default()
        };
        self.run("chflags", ctx, "Changing the flags failed", |dbc| {
            self.write_in(dbc, root_path, &update)
        })
    }

    /// Changes the type. The script floor depends on it, so cached verdicts are dropped.
    pub fn chtype(&self, ctx: &RequestContext, root_path: &str, type_id: ResourceType) -> SecurityResult<Resource> {
        let update = ResourceUpdate {
            type_id: Some(type_id),
            ..ResourceUpdate::default()
        };
        self.run("chtype", ctx, "Changing the type failed", |dbc| {
            let written = self.write_in(dbc, root_path, &update)?;
            self.cache.clear();
            Ok(written)
        })
    }

    pub fn undelete_resource(&self, ctx: &RequestContext, root_path: &str) -> SecurityResult<Resource> {
        self.run("undelete_resource", ctx, "Restoring the resource failed", |dbc| {
            let resource = self.writable(dbc, root_path, ResourceFilter::ALL)?;
            Ok(self.storage.undelete_resource(dbc.project(), &resource)?)
        })
    }

    /// Restores the published state. A never published resource disappears with its lock.
    pub fn undo_changes(&self, ctx: &RequestContext, root_path: &str) -> SecurityResult<Option<Resource>> {
        self.run("undo_changes", ctx, "Undoing the changes failed", |dbc| {
            let resource = self.writable(dbc, root_path, ResourceFilter::ALL)?;
            let restored = self.storage.undo_changes(dbc.project(), &resource)?;
            match &restored {
                None => {
                    self.locks.remove_subtree(root_path);
                }
                Some(published) if published.root_path != resource.root_path => {
                    self.cache.clear();
                }
                Some(_) => {}
            }
            Ok(restored)
        })
    }

    pub fn set_date_released(
        &self,
        ctx: &RequestContext,
        root_path: &str,
        released: Option<DateTime<Utc>>,
    ) -> SecurityResult<Resource> {
        let update = ResourceUpdate {
            date_released: Some(released),
            ..ResourceUpdate::default()
        };
        self.run("set_date_released", ctx, "Setting the release date failed", |dbc| {
            self.write_in(dbc, root_path, &update)
        })
    }

    pub fn set_date_expired(
        &self,
        ctx: &RequestContext,
        root_path: &str,
        expired: Option<DateTime<Utc>>,
    ) -> SecurityResult<Resource> {
        let update = ResourceUpdate {
            date_expired: Some(expired),
            ..ResourceUpdate::default()
        };
        self.run("set_date_expired", ctx, "Setting the expiration date failed", |dbc| {
            self.write_in(dbc, root_path, &update)
        })
    }

    pub fn read_property(&self, ctx: &RequestContext, root_path: &str, name: &str) -> SecurityResult<Option<String>> {
        self.run("read_property", ctx, "Reading the property failed", |dbc| {
            let resource = self.read_checked(dbc, root_path, ResourceFilter::ALL)?;
            Ok(self.storage.read_property(dbc.project(), &resource, name)?)
        })
    }

    /// Sets a property, or removes it when `value` is `None`.
    pub fn write_property(&self, ctx: &RequestContext, root_path: &str, name: &str, value: Option<&str>) -> SecurityResult<()> {
        self.run("write_property", ctx, "Writing the property failed", |dbc| {
            let resource = self.writable(dbc, root_path, ResourceFilter::IGNORE_EXPIRATION)?;
            Ok(self.storage.write_property(dbc.project(), &resource, name, value)?)
        })
    }

    pub fn write_properties(
        &self,
        ctx: &RequestContext,
        root_path: &str,
        properties: &BTreeMap<String, Option<String>>,
    ) -> SecurityResult<()> {
        self.run("write_properties", ctx, "Writing the properties failed", |dbc| {
            let resource = self.writable(dbc, root_path, ResourceFilter::IGNORE_EXPIRATION)?;
            for (name, value) in properties {
                self.storage
                    .write_property(dbc.project(), &resource, name, value.as_deref())?;
            }
            Ok(())
        })
    }

    /// Moves a resource into the lost-and-found folder under a free name.
    ///
    /// With `name_only` nothing moves; the free name is only computed.
    pub fn move_to_lost_and_found(&self, ctx: &RequestContext, root_path: &str, name_only: bool) -> SecurityResult<String> {
        self.run("move_to_lost_and_found", ctx, "Moving to lost and found failed", |dbc| {
            let resource = self.read(dbc, root_path)?;
            self.check(dbc, &resource, Permissions::READ, false, ResourceFilter::ALL)?;
            let destination = self.free_lost_and_found_name(dbc, &resource)?;
            if !name_only {
                self.check(dbc, &resource, Permissions::WRITE, true, ResourceFilter::ALL)?;
                self.ensure_lost_and_found(dbc)?;
                self.move_in(dbc, root_path, &destination)?;
                info!(from = %root_path, to = %destination, "Moved to lost and found");
            }
            Ok(destination)
        })
    }

    fn free_lost_and_found_name(&self, dbc: &DbContext, resource: &Resource) -> SecurityResult<String> {
        let name = path::name(&resource.root_path).trim_end_matches(path::SEPARATOR);
        let (stem, extension) = match name.rfind('.') {
            Some(idx) if idx > 0 && !resource.is_folder() => (&name[..idx], &name[idx..]),
            _ => (name, ""),
        };
        let suffix = if resource.is_folder() { "/" } else { "" };
        for counter in 0u32.. {
            let candidate = if counter == 0 {
                format!("{}{}{}{}", LOST_AND_FOUND_FOLDER, stem, extension, suffix)
            } else {
                format!("{}{}_{}{}{}", LOST_AND_FOUND_FOLDER, stem, counter, extension, suffix)
            };
            match self.storage.read_resource(dbc.project(), &candidate) {
                Err(e) if e.is_not_found() => return Ok(candidate),
                Err(e) => return Err(e.into()),
                Ok(_) => {}
            }
        }
        Err(SecurityError::invalid("no free name in lost and found"))
    }

    fn ensure_lost_and_found(&self, dbc: &DbContext) -> SecurityResult<()> {
        let system = path::parent_folder(LOST_AND_FOUND_FOLDER).unwrap_or(path::ROOT);
        for folder in [system, LOST_AND_FOUND_FOLDER] {
            match self.storage.read_resource(dbc.project(), folder) {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    self.storage
                        .create_resource(dbc.project(), Resource::new(folder, ResourceType::FOLDER))?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Permissions `user` holds on the resource. The caller needs VIEW.
    pub fn get_permissions(&self, ctx: &RequestContext, root_path: &str, user: UserId) -> SecurityResult<PermissionSet> {
        self.run("get_permissions", ctx, "Reading the permissions failed", |dbc| {
            let resource = self.read(dbc, root_path)?;
            self.check(dbc, &resource, Permissions::VIEW, false, ResourceFilter::ALL)?;
            let user = self.storage.read_user(user)?;
            if self.roles().has_role_for_resource(&user, Role::VfsManager, &resource) {
                return Ok(PermissionSet::ALL);
            }
            Ok(self.storage.acl_permissions(dbc.project(), &user, &resource)?)
        })
    }
}

/// Folder types need folder paths and vice versa.
fn check_path_form(root_path: &str, folder: bool) -> SecurityResult<()> {
    if !path::is_valid(root_path) || root_path == path::ROOT {
        return Err(SecurityError::invalid(format!("invalid path {}", root_path)));
    }
    if path::is_folder_path(root_path) != folder {
        return Err(SecurityError::invalid(format!(
            "{} does not match the resource kind ({})",
            root_path,
            if folder { "folder" } else { "file" }
        )));
    }
    Ok(())
}

fn check_not_inside(source: &Resource, destination: &str) -> SecurityResult<()> {
    if source.is_folder() && (destination == source.root_path || path::is_below(destination, &source.root_path)) {
        return Err(SecurityError::RecursiveInclusion {
            source_path: source.root_path.clone(),
            destination: destination.to_string(),
        });
    }
    Ok(())
}
