//! Permission resolution.
//!
//! Combines the resource filter, lock ownership, the Online write ban, role overrides,
//! the script floor and the storage ACL into one [`Verdict`].

use palisade_vfs::{PermissionSet, Permissions, Resource, ResourceFilter, Role, StorageDriver};
use serde::Serialize;
use tracing::debug;

use crate::audit::AuthzDecision;
use crate::cache::{PermissionCache, PermissionCacheKey};
use crate::context::DbContext;
use crate::error::{SecurityError, SecurityResult};
use crate::lock::LockTable;
use crate::role::RoleResolver;

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allowed,
    Denied,
    /// The resource failed the caller's filter.
    Filtered,
    /// Write access needs a lock the user does not hold.
    NotLocked,
}

impl Verdict {
    pub fn is_allowed(self) -> bool {
        self == Verdict::Allowed
    }

    /// Filter and lock outcomes depend on state the cache does not track.
    pub fn is_cacheable(self) -> bool {
        matches!(self, Verdict::Allowed | Verdict::Denied)
    }
}

/// Resolves permission questions for one request.
pub struct PermissionResolver<'a> {
    storage: &'a dyn StorageDriver,
    locks: &'a LockTable,
    cache: &'a PermissionCache,
}

impl<'a> PermissionResolver<'a> {
    pub fn new(storage: &'a dyn StorageDriver, locks: &'a LockTable, cache: &'a PermissionCache) -> Self {
        Self { storage, locks, cache }
    }

    /// Non-failing permission check.
    ///
    /// Only storage errors while reading the ACL are returned as errors.
    pub fn resolve(
        &self,
        dbc: &DbContext,
        resource: &Resource,
        required: Permissions,
        check_lock: bool,
        filter: ResourceFilter,
    ) -> SecurityResult<Verdict> {
        if !filter.is_valid(dbc.request_time(), resource) {
            return Ok(Verdict::Filtered);
        }

        let user = dbc.user();
        if check_lock && required.requires_write_access() {
            let lockable = self
                .locks
                .get_lock(&resource.root_path)
                .is_some_and(|lock| lock.is_lockable_by(user.id));
            if !lockable {
                return Ok(Verdict::NotLocked);
            }
        }

        let key = PermissionCacheKey::new(
            filter.requires_visible(),
            check_lock,
            user.id,
            dbc.project().id,
            resource.structure_id,
            required,
        );
        if let Some(verdict) = self.cache.get(&key) {
            return Ok(verdict);
        }

        let mut denied = Permissions::empty();
        if dbc.project().is_online() {
            denied |= Permissions::WRITE;
        }

        let roles = RoleResolver::new(self.storage);
        let can_ignore_permissions = roles.has_role_for_resource(user, Role::VfsManager, resource);

        if required.requires_write_access()
            && resource.type_id.is_script()
            && !roles.has_role_for_resource(user, Role::Developer, resource)
        {
            denied |= Permissions::WRITE | Permissions::CONTROL;
        }

        let mut permissions = if can_ignore_permissions {
            PermissionSet::ALL
        } else {
            self.storage.acl_permissions(dbc.project(), user, resource)?
        };
        permissions.deny(denied);

        let mut required = required;
        if !permissions.permissions().contains(Permissions::VIEW) {
            if filter.requires_visible() {
                required |= Permissions::VIEW;
            } else {
                permissions.grant(Permissions::VIEW);
            }
        }

        let verdict = if permissions.satisfies(required) {
            Verdict::Allowed
        } else {
            debug!(
                user = %user.fqn(),
                path = %resource.root_path,
                required = %required.symbols(),
                granted = %permissions,
                "Permission denied"
            );
            Verdict::Denied
        };
        self.cache.put(key, verdict);
        Ok(verdict)
    }

    /// Failing permission check.
    ///
    /// `Filtered` surfaces as "not found", `Denied` as a permission violation and
    /// `NotLocked` as a missing lock.
    pub fn check(
        &self,
        dbc: &DbContext,
        resource: &Resource,
        required: Permissions,
        check_lock: bool,
        filter: ResourceFilter,
    ) -> SecurityResult<()> {
        let verdict = self.resolve(dbc, resource, required, check_lock, filter)?;
        AuthzDecision::new(
            dbc.user().fqn(),
            dbc.project().name.clone(),
            dbc.operation(),
            &resource.root_path,
            required,
            verdict,
        )
        .log();

        match verdict {
            Verdict::Allowed => Ok(()),
            Verdict::Filtered => Err(SecurityError::not_found(&resource.root_path)),
            Verdict::Denied => Err(SecurityError::PermissionDenied {
                path: resource.root_path.clone(),
                user: dbc.user().fqn(),
                required,
            }),
            Verdict::NotLocked => Err(SecurityError::LockRequired {
                path: resource.root_path.clone(),
                user: dbc.user().fqn(),
            }),
        }
    }

    /// Whether the user holds `required`, treating storage failures as "no".
    pub fn has_permissions(
        &self,
        dbc: &DbContext,
        resource: &Resource,
        required: Permissions,
        check_lock: bool,
        filter: ResourceFilter,
    ) -> bool {
        match self.resolve(dbc, resource, required, check_lock, filter) {
            Ok(verdict) => verdict.is_allowed(),
            Err(e) => {
                debug!(path = %resource.root_path, error = %e, "Permission lookup failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockType;
    use palisade_vfs::{MemoryStorage, OrgUnitPath, Principal, ResourceState, ResourceType};

    struct Fixture {
        storage: MemoryStorage,
        locks: LockTable,
        cache: PermissionCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                storage: MemoryStorage::new(),
                locks: LockTable::new(),
                cache: PermissionCache::new(100),
            }
        }

        fn resolver(&self) -> PermissionResolver<'_> {
            PermissionResolver::new(&self.storage, &self.locks, &self.cache)
        }
    }

    #[test]
    fn test_acl_grant_and_denial() {
        let fx = Fixture::new();
        let alice = fx.storage.add_user("alice", OrgUnitPath::root());
        let doc = fx.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
        fx.storage
            .set_acl("/doc.txt", Principal::User(alice.id), PermissionSet::ACCESS_READ, false)
            .unwrap();
        let dbc = DbContext::new("test", &alice, &fx.storage.offline_project().unwrap());
        let resolver = fx.resolver();
        assert_eq!(
            resolver.resolve(&dbc, &doc, Permissions::READ, false, ResourceFilter::ALL).unwrap(),
            Verdict::Allowed
        );
        assert_eq!(
            resolver.resolve(&dbc, &doc, Permissions::WRITE, false, ResourceFilter::ALL).unwrap(),
            Verdict::Denied
        );
        assert!(matches!(
            resolver.check(&dbc, &doc, Permissions::WRITE, false, ResourceFilter::ALL),
            Err(SecurityError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn test_filtered_is_not_found() {
        let fx = Fixture::new();
        let admin = fx.storage.admin().unwrap();
        fx.storage.import_resource("/gone.txt", ResourceType::PLAIN).unwrap();
        let gone = fx.storage.set_state("/gone.txt", ResourceState::Deleted).unwrap();
        let dbc = DbContext::new("test", &admin, &fx.storage.offline_project().unwrap());
        let resolver = fx.resolver();
        assert_eq!(
            resolver.resolve(&dbc, &gone, Permissions::READ, false, ResourceFilter::DEFAULT).unwrap(),
            Verdict::Filtered
        );
        assert!(matches!(
            resolver.check(&dbc, &gone, Permissions::READ, false, ResourceFilter::DEFAULT),
            Err(SecurityError::ResourceNotFound { .. })
        ));
        assert!(fx.cache.is_empty());
    }

    #[test]
    fn test_lock_gate() {
        let fx = Fixture::new();
        let admin = fx.storage.admin().unwrap();
        let project = fx.storage.offline_project().unwrap();
        let doc = fx.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
        let dbc = DbContext::new("test", &admin, &project);
        let resolver = fx.resolver();

        assert_eq!(
            resolver.resolve(&dbc, &doc, Permissions::WRITE, true, ResourceFilter::ALL).unwrap(),
            Verdict::NotLocked
        );
        assert!(matches!(
            resolver.check(&dbc, &doc, Permissions::WRITE, true, ResourceFilter::ALL),
            Err(SecurityError::LockRequired { .. })
        ));
        assert_eq!(
            resolver.resolve(&dbc, &doc, Permissions::READ, true, ResourceFilter::ALL).unwrap(),
            Verdict::Allowed
        );

        fx.locks.lock("/doc.txt", admin.id, project.id, LockType::Exclusive).unwrap();
        assert_eq!(
            resolver.resolve(&dbc, &doc, Permissions::WRITE, true, ResourceFilter::ALL).unwrap(),
            Verdict::Allowed
        );
    }

    #[test]
    fn test_view_is_granted_unless_visibility_required() {
        let fx = Fixture::new();
        let alice = fx.storage.add_user("alice", OrgUnitPath::root());
        let doc = fx.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
        fx.storage
            .set_acl("/doc.txt", Principal::User(alice.id), PermissionSet::ACCESS_READ, false)
            .unwrap();
        let dbc = DbContext::new("test", &alice, &fx.storage.offline_project().unwrap());
        let resolver = fx.resolver();
        assert_eq!(
            resolver.resolve(&dbc, &doc, Permissions::READ, false, ResourceFilter::ALL).unwrap(),
            Verdict::Allowed
        );
        assert_eq!(
            resolver.resolve(&dbc, &doc, Permissions::READ, false, ResourceFilter::ONLY_VISIBLE).unwrap(),
            Verdict::Denied
        );
    }

    #[test]
    fn test_acl_storage_failure_propagates() {
        let fx = Fixture::new();
        let alice = fx.storage.add_user("alice", OrgUnitPath::root());
        let doc = fx.storage.import_resource("/doc.txt", ResourceType::PLAIN).unwrap();
        let dbc = DbContext::new("test", &alice, &fx.storage.offline_project().unwrap());
        fx.storage.set_fail_principal_reads(true);
        let resolver = fx.resolver();
        assert!(matches!(
            resolver.resolve(&dbc, &doc, Permissions::READ, false, ResourceFilter::ALL),
            Err(SecurityError::Storage(_))
        ));
        assert!(!resolver.has_permissions(&dbc, &doc, Permissions::READ, false, ResourceFilter::ALL));
    }
}
