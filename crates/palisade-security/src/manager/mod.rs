//! The security facade.
//!
//! Every public operation opens a [`DbContext`], checks permissions, roles and locks, then
//! delegates to the storage driver. Failures are logged once, on the context, and returned
//! unchanged.

mod access;
mod locks;
mod principals;
mod projects;
mod publish;
mod resources;

use std::sync::Arc;

use palisade_common_config::{PalisadeConfig, SecurityConfig};
use parking_lot::Mutex;
use palisade_vfs::{
    path, OrgUnitPath, Permissions, Resource, ResourceFilter, Role, StorageDriver, StorageError,
};
use tracing::info;

use crate::cache::PermissionCache;
use crate::context::{DbContext, RequestContext};
use crate::error::{SecurityError, SecurityResult};
use crate::lock::LockTable;
use crate::resolver::{PermissionResolver, Verdict};
use crate::role::RoleResolver;
use crate::store::{FileLockStore, LockStore};

/// Authorization facade over a storage driver.
pub struct SecurityManager {
    storage: Arc<dyn StorageDriver>,
    cache: PermissionCache,
    locks: LockTable,
    lock_store: Arc<dyn LockStore>,
    config: SecurityConfig,
    persist_temporary: bool,
    /// Serializes the project state check-and-set that starts a publish.
    publish_guard: Mutex<()>,
}

impl SecurityManager {
    pub fn new(storage: Arc<dyn StorageDriver>, config: &SecurityConfig, lock_store: Arc<dyn LockStore>) -> Self {
        Self {
            storage,
            cache: PermissionCache::new(config.permission_cache_size),
            locks: LockTable::new(),
            lock_store,
            config: config.clone(),
            persist_temporary: false,
            publish_guard: Mutex::new(()),
        }
    }

    /// Keeps temporary locks when the table is written.
    pub fn with_persist_temporary(mut self, persist: bool) -> Self {
        self.persist_temporary = persist;
        self
    }

    /// Builds a manager with a file lock store and restores the persisted locks.
    pub fn from_config(storage: Arc<dyn StorageDriver>, config: &PalisadeConfig) -> SecurityResult<Self> {
        let store = Arc::new(FileLockStore::new(&config.locks.store_path));
        let manager = Self::new(storage, &config.security, store).with_persist_temporary(config.locks.persist_temporary);
        let restored = manager.read_locks()?;
        info!(
            locks = restored,
            cache_size = config.security.permission_cache_size,
            "Security manager initialized"
        );
        Ok(manager)
    }

    pub fn storage(&self) -> &dyn StorageDriver {
        self.storage.as_ref()
    }

    pub fn permission_cache(&self) -> &PermissionCache {
        &self.cache
    }

    pub fn lock_table(&self) -> &LockTable {
        &self.locks
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Drops every cached verdict.
    pub fn clear_permission_cache(&self) {
        self.cache.clear();
    }

    fn resolver(&self) -> PermissionResolver<'_> {
        PermissionResolver::new(self.storage.as_ref(), &self.locks, &self.cache)
    }

    fn roles(&self) -> RoleResolver<'_> {
        RoleResolver::new(self.storage.as_ref())
    }

    /// Non-failing permission check.
    pub fn has_permissions(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        required: Permissions,
        check_lock: bool,
        filter: ResourceFilter,
    ) -> SecurityResult<Verdict> {
        let dbc = DbContext::open("has_permissions", ctx);
        self.resolver().resolve(&dbc, resource, required, check_lock, filter)
    }

    /// Failing permission check.
    pub fn check_permissions(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        required: Permissions,
        check_lock: bool,
        filter: ResourceFilter,
    ) -> SecurityResult<()> {
        let dbc = DbContext::open("check_permissions", ctx);
        self.resolver().check(&dbc, resource, required, check_lock, filter)
    }

    pub fn has_role(&self, ctx: &RequestContext, role: Role) -> bool {
        self.roles().has_role(&ctx.user, role)
    }

    pub fn has_role_for_org_unit(&self, ctx: &RequestContext, role: Role, org_unit: &OrgUnitPath) -> bool {
        self.roles().has_role_for_org_unit(&ctx.user, role, Some(org_unit))
    }

    pub fn has_role_for_resource(&self, ctx: &RequestContext, role: Role, resource: &Resource) -> bool {
        self.roles().has_role_for_resource(&ctx.user, role, resource)
    }

    pub fn check_role(&self, ctx: &RequestContext, role: Role) -> SecurityResult<()> {
        self.roles().check_role(&ctx.user, role)
    }

    pub fn check_role_for_org_unit(&self, ctx: &RequestContext, role: Role, org_unit: &OrgUnitPath) -> SecurityResult<()> {
        self.roles().check_role_for_org_unit(&ctx.user, role, Some(org_unit))
    }

    pub fn check_role_for_resource(&self, ctx: &RequestContext, role: Role, resource: &Resource) -> SecurityResult<()> {
        self.roles().check_role_for_resource(&ctx.user, role, resource)
    }

    /// Persists the lock table, logging instead of failing.
    pub fn shutdown(&self) {
        match self.write_locks() {
            Ok(count) => info!(locks = count, "Security manager shut down"),
            Err(e) => tracing::error!(error = %e, "Persisting locks at shutdown failed"),
        }
    }

    // Shared checks

    /// Runs one operation inside its own context, reporting a failure under `failure`.
    fn run<T>(
        &self,
        operation: &'static str,
        ctx: &RequestContext,
        failure: &str,
        body: impl FnOnce(&DbContext) -> SecurityResult<T>,
    ) -> SecurityResult<T> {
        let dbc = DbContext::open(operation, ctx);
        body(&dbc).map_err(|e| dbc.report(e, failure))
    }

    fn check_offline(dbc: &DbContext) -> SecurityResult<()> {
        if dbc.project().is_online() {
            return Err(SecurityError::OnlineProject);
        }
        Ok(())
    }

    /// Reads a resource, reporting a missing one as [`SecurityError::ResourceNotFound`].
    fn read(&self, dbc: &DbContext, root_path: &str) -> SecurityResult<Resource> {
        self.storage
            .read_resource(dbc.project(), root_path)
            .map_err(|e| not_found_or(e, root_path))
    }

    fn read_parent(&self, dbc: &DbContext, root_path: &str) -> SecurityResult<Resource> {
        let parent = path::parent_folder(root_path)
            .ok_or_else(|| SecurityError::invalid(format!("{} has no parent folder", root_path)))?;
        self.read(dbc, parent)
    }

    fn check(
        &self,
        dbc: &DbContext,
        resource: &Resource,
        required: Permissions,
        check_lock: bool,
        filter: ResourceFilter,
    ) -> SecurityResult<()> {
        self.resolver().check(dbc, resource, required, check_lock, filter)
    }
}

fn not_found_or(error: StorageError, root_path: &str) -> SecurityError {
    if error.is_not_found() {
        SecurityError::not_found(root_path)
    } else {
        error.into()
    }
}

impl std::fmt::Debug for SecurityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityManager")
            .field("cache", &self.cache)
            .field("locks", &self.locks.len())
            .field("lock_store", &self.lock_store.describe())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryLockStore;
    use palisade_vfs::{MemoryStorage, User};

    pub(crate) struct Harness {
        pub storage: Arc<MemoryStorage>,
        pub manager: SecurityManager,
        pub store: Arc<MemoryLockStore>,
    }

    impl Harness {
        pub fn new() -> Self {
            let storage = Arc::new(MemoryStorage::new());
            let store = Arc::new(MemoryLockStore::new());
            let manager = SecurityManager::new(storage.clone(), &SecurityConfig::default(), store.clone());
            Self { storage, manager, store }
        }

        pub fn admin(&self) -> RequestContext {
            RequestContext::new(self.storage.admin().unwrap(), self.storage.offline_project().unwrap())
        }

        pub fn offline(&self, user: &User) -> RequestContext {
            RequestContext::new(user.clone(), self.storage.offline_project().unwrap())
        }

        pub fn online(&self, user: &User) -> RequestContext {
            RequestContext::new(user.clone(), self.storage.online_project().unwrap())
        }
    }

    #[test]
    fn test_from_config_restores_locks() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PalisadeConfig::default();
        config.locks.store_path = dir.path().join("locks.json").display().to_string();

        let storage = Arc::new(MemoryStorage::new());
        let manager = SecurityManager::from_config(storage.clone(), &config).unwrap();
        let ctx = RequestContext::new(storage.admin().unwrap(), storage.offline_project().unwrap());
        storage.import_resource("/a.txt", palisade_vfs::ResourceType::PLAIN).unwrap();
        manager.lock_resource(&ctx, "/a.txt", crate::lock::LockType::Exclusive).unwrap();
        manager.shutdown();

        let restarted = SecurityManager::from_config(storage, &config).unwrap();
        let lock = restarted.lock_table().get_lock("/a.txt").unwrap();
        assert_eq!(lock.owner, ctx.user.id);
    }

    #[test]
    fn test_offline_required() {
        let h = Harness::new();
        let admin = h.storage.admin().unwrap();
        let dbc = DbContext::open("test", &h.online(&admin));
        assert!(matches!(
            SecurityManager::check_offline(&dbc),
            Err(SecurityError::OnlineProject)
        ));
    }

    #[test]
    fn test_missing_resource_is_not_found() {
        let h = Harness::new();
        let dbc = DbContext::open("test", &h.admin());
        assert!(matches!(
            h.manager.read(&dbc, "/missing.txt"),
            Err(SecurityError::ResourceNotFound { .. })
        ));
        assert!(matches!(
            h.manager.read_parent(&dbc, "/"),
            Err(SecurityError::InvalidOperation(_))
        ));
    }
}
