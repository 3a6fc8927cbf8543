//! Lock operations and lock table persistence.

use palisade_common_core::UserId;
use palisade_common_log::spans::{lock_store_span, Timer};
use palisade_vfs::{Permissions, ResourceFilter, Role};
use tracing::{debug, info};

use super::SecurityManager;
use crate::context::RequestContext;
use crate::error::{SecurityError, SecurityResult};
use crate::lock::{Lock, LockType};

impl SecurityManager {
    /// Own or inherited lock of a resource.
    pub fn get_lock(&self, ctx: &RequestContext, root_path: &str) -> SecurityResult<Option<Lock>> {
        self.run("get_lock", ctx, "Reading the lock failed", |dbc| {
            let resource = self.read(dbc, root_path)?;
            Ok(self.locks.get_lock(&resource.root_path))
        })
    }

    /// Locks a resource for the caller. Needs WRITE, without the lock check.
    pub fn lock_resource(&self, ctx: &RequestContext, root_path: &str, lock_type: LockType) -> SecurityResult<Lock> {
        self.run("lock_resource", ctx, "Locking the resource failed", |dbc| {
            Self::check_offline(dbc)?;
            if !lock_type.is_user_settable() {
                return Err(SecurityError::invalid(format!("{:?} locks cannot be set by users", lock_type)));
            }
            let resource = self.read(dbc, root_path)?;
            self.check(dbc, &resource, Permissions::WRITE, false, ResourceFilter::IGNORE_EXPIRATION)?;
            let lock = self
                .locks
                .lock(&resource.root_path, dbc.user().id, dbc.project().id, lock_type)?;
            Ok(lock)
        })
    }

    /// Takes over another user's lock.
    pub fn change_lock(&self, ctx: &RequestContext, root_path: &str) -> SecurityResult<Lock> {
        self.run("change_lock", ctx, "Changing the lock failed", |dbc| {
            Self::check_offline(dbc)?;
            let resource = self.read(dbc, root_path)?;
            self.check(dbc, &resource, Permissions::WRITE, false, ResourceFilter::IGNORE_EXPIRATION)?;
            let previous = self.locks.get_lock(&resource.root_path);
            let lock = self
                .locks
                .change_lock(&resource.root_path, dbc.user().id, dbc.project().id)?;
            if let Some(previous) = previous.filter(|p| !p.is_owned_by(dbc.user().id)) {
                info!(path = %root_path, from = %previous.owner, to = %dbc.user().fqn(), "Lock stolen");
            }
            Ok(lock)
        })
    }

    pub fn unlock_resource(&self, ctx: &RequestContext, root_path: &str) -> SecurityResult<()> {
        self.run("unlock_resource", ctx, "Unlocking the resource failed", |dbc| {
            Self::check_offline(dbc)?;
            let resource = self.read(dbc, root_path)?;
            self.check(dbc, &resource, Permissions::WRITE, true, ResourceFilter::ALL)?;
            self.locks.unlock(&resource.root_path, dbc.user().id)?;
            Ok(())
        })
    }

    /// Own lock records at or below a folder the caller may read.
    pub fn locked_resources(&self, ctx: &RequestContext, folder: &str) -> SecurityResult<Vec<Lock>> {
        self.run("locked_resources", ctx, "Reading the locked resources failed", |dbc| {
            let resource = self.read(dbc, folder)?;
            self.check(dbc, &resource, Permissions::READ, false, ResourceFilter::ALL)?;
            Ok(self.locks.locked_resources(&resource.root_path))
        })
    }

    /// Drops the temporary locks of a user. Releasing somebody else's needs the administrator role.
    pub fn release_temporary_locks(&self, ctx: &RequestContext, user: UserId) -> SecurityResult<usize> {
        self.run("release_temporary_locks", ctx, "Releasing temporary locks failed", |dbc| {
            if dbc.user().id != user {
                self.roles().check_role(dbc.user(), Role::Administrator)?;
            }
            let released = self.locks.release_temporary(user);
            debug!(user = %user, released, "Temporary locks released");
            Ok(released)
        })
    }

    /// Replaces the lock table with the persisted records.
    pub fn read_locks(&self) -> SecurityResult<usize> {
        let target = self.lock_store.describe();
        let _span = lock_store_span("read", &target).entered();
        let timer = Timer::start("read_locks");
        let restored = self.lock_store.load()?;
        let count = restored.len();
        self.locks.restore(restored);
        info!(locks = count, "Lock table restored");
        timer.finish();
        Ok(count)
    }

    /// Persists the lock table. Temporary locks are skipped unless configured otherwise.
    pub fn write_locks(&self) -> SecurityResult<usize> {
        let target = self.lock_store.describe();
        let _span = lock_store_span("write", &target).entered();
        let timer = Timer::start("write_locks");
        let snapshot = self.locks.snapshot(self.persist_temporary);
        self.lock_store.save(&snapshot)?;
        debug!(locks = snapshot.len(), "Lock table written");
        timer.finish();
        Ok(snapshot.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SecurityError;
    use crate::lock::{LockError, LockType};
    use crate::manager::tests::Harness;
    use palisade_test_utils::assert_err_matches;
    use palisade_vfs::{OrgUnitPath, PermissionSet, Principal, ResourceType, Role};

    fn writer(h: &Harness, name: &str) -> palisade_vfs::User {
        let user = h.storage.add_user(name, OrgUnitPath::root());
        h.storage
            .set_acl("/", Principal::User(user.id), PermissionSet::ACCESS_WRITE, true)
            .unwrap();
        user
    }

    #[test]
    fn test_lock_needs_write_permission() {
        let h = Harness::new();
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        let reader = h.storage.add_user("reader", OrgUnitPath::root());
        h.storage
            .set_acl("/", Principal::User(reader.id), PermissionSet::ACCESS_READ, true)
            .unwrap();
        assert_err_matches!(
            h.manager.lock_resource(&h.offline(&reader), "/a.txt", LockType::Exclusive),
            SecurityError::PermissionDenied { .. }
        );
        assert!(h.manager.get_lock(&h.admin(), "/a.txt").unwrap().is_none());
    }

    #[test]
    fn test_second_user_is_rejected() {
        let h = Harness::new();
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        let first = writer(&h, "first");
        let second = writer(&h, "second");
        h.manager
            .lock_resource(&h.offline(&first), "/a.txt", LockType::Exclusive)
            .unwrap();
        assert_err_matches!(
            h.manager.lock_resource(&h.offline(&second), "/a.txt", LockType::Exclusive),
            SecurityError::Lock(LockError::LockedByOther { .. })
        );
    }

    #[test]
    fn test_system_lock_types_are_rejected() {
        let h = Harness::new();
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        assert_err_matches!(
            h.manager.lock_resource(&h.admin(), "/a.txt", LockType::System),
            SecurityError::InvalidOperation(_)
        );
        assert_err_matches!(
            h.manager.lock_resource(&h.admin(), "/a.txt", LockType::Publish),
            SecurityError::InvalidOperation(_)
        );
        assert_err_matches!(
            h.manager.lock_resource(&h.admin(), "/a.txt", LockType::SharedWorkflow),
            SecurityError::InvalidOperation(_)
        );
        assert!(h.manager.lock_table().get_lock("/a.txt").is_none());
    }

    #[test]
    fn test_online_locking_is_rejected() {
        let h = Harness::new();
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        let admin = h.storage.admin().unwrap();
        assert_err_matches!(
            h.manager.lock_resource(&h.online(&admin), "/a.txt", LockType::Exclusive),
            SecurityError::OnlineProject
        );
    }

    #[test]
    fn test_folder_lock_is_reported_on_children() {
        let h = Harness::new();
        h.storage.import_resource("/a/", ResourceType::FOLDER).unwrap();
        h.storage.import_resource("/a/b.txt", ResourceType::PLAIN).unwrap();
        let ctx = h.admin();
        h.manager.lock_resource(&ctx, "/a/", LockType::Exclusive).unwrap();
        let lock = h.manager.get_lock(&ctx, "/a/b.txt").unwrap().unwrap();
        assert_eq!(lock.owner, ctx.user.id);
        assert_eq!(lock.inherited_from.as_deref(), Some("/a/"));
        assert_err_matches!(
            h.manager.unlock_resource(&ctx, "/a/b.txt"),
            SecurityError::Lock(LockError::InheritedLock { .. })
        );
    }

    #[test]
    fn test_unlock_needs_own_lock() {
        let h = Harness::new();
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        let owner = writer(&h, "owner");
        let other = writer(&h, "other");
        h.manager
            .lock_resource(&h.offline(&owner), "/a.txt", LockType::Exclusive)
            .unwrap();
        assert_err_matches!(
            h.manager.unlock_resource(&h.offline(&other), "/a.txt"),
            SecurityError::LockRequired { .. }
        );
        h.manager.unlock_resource(&h.offline(&owner), "/a.txt").unwrap();
        assert!(h.manager.get_lock(&h.admin(), "/a.txt").unwrap().is_none());
    }

    #[test]
    fn test_change_lock_steals() {
        let h = Harness::new();
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        let owner = writer(&h, "owner");
        let thief = writer(&h, "thief");
        h.manager
            .lock_resource(&h.offline(&owner), "/a.txt", LockType::Temporary)
            .unwrap();
        let lock = h.manager.change_lock(&h.offline(&thief), "/a.txt").unwrap();
        assert_eq!(lock.owner, thief.id);
        assert_eq!(lock.lock_type, LockType::Exclusive);

        h.manager.lock_table().lock_system("/a.txt", owner.id, lock.project);
        assert_err_matches!(
            h.manager.change_lock(&h.offline(&thief), "/a.txt"),
            SecurityError::Lock(LockError::SystemLocked { .. })
        );
    }

    #[test]
    fn test_locked_resources_lists_subtree() {
        let h = Harness::new();
        h.storage.import_resource("/a/", ResourceType::FOLDER).unwrap();
        h.storage.import_resource("/a/b.txt", ResourceType::PLAIN).unwrap();
        h.storage.import_resource("/a/c.txt", ResourceType::PLAIN).unwrap();
        h.storage.import_resource("/d.txt", ResourceType::PLAIN).unwrap();
        let ctx = h.admin();
        for path in ["/a/b.txt", "/a/c.txt", "/d.txt"] {
            h.manager.lock_resource(&ctx, path, LockType::Exclusive).unwrap();
        }
        let paths: Vec<String> = h
            .manager
            .locked_resources(&ctx, "/a/")
            .unwrap()
            .into_iter()
            .map(|l| l.root_path)
            .collect();
        assert_eq!(paths, vec!["/a/b.txt", "/a/c.txt"]);
    }

    #[test]
    fn test_release_temporary_locks() {
        let h = Harness::new();
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        h.storage.import_resource("/b.txt", ResourceType::PLAIN).unwrap();
        let user = writer(&h, "editor");
        let other = writer(&h, "other");
        let ctx = h.offline(&user);
        h.manager.lock_resource(&ctx, "/a.txt", LockType::Temporary).unwrap();
        h.manager.lock_resource(&ctx, "/b.txt", LockType::Exclusive).unwrap();

        assert_err_matches!(
            h.manager.release_temporary_locks(&h.offline(&other), user.id),
            SecurityError::RoleViolation { role: Role::Administrator, .. }
        );
        assert_eq!(h.manager.release_temporary_locks(&ctx, user.id).unwrap(), 1);
        assert!(h.manager.lock_table().get_lock("/a.txt").is_none());
        assert!(h.manager.lock_table().get_lock("/b.txt").is_some());
    }

    #[test]
    fn test_write_locks_skips_temporary() {
        let h = Harness::new();
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        h.storage.import_resource("/b.txt", ResourceType::PLAIN).unwrap();
        let ctx = h.admin();
        h.manager.lock_resource(&ctx, "/a.txt", LockType::Temporary).unwrap();
        h.manager.lock_resource(&ctx, "/b.txt", LockType::Exclusive).unwrap();

        assert_eq!(h.manager.write_locks().unwrap(), 1);
        let stored = h.store.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].root_path, "/b.txt");

        h.manager.lock_table().restore(Vec::new());
        assert_eq!(h.manager.read_locks().unwrap(), 1);
        assert!(h.manager.lock_table().get_lock("/b.txt").is_some());
    }
}
