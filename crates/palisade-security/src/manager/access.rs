//! Access control entry operations. Every mutation drops the cached verdicts.

use palisade_vfs::{AccessControlEntry, PermissionSet, Permissions, Principal, ResourceFilter};

use super::SecurityManager;
use crate::context::RequestContext;
use crate::error::SecurityResult;

impl SecurityManager {
    /// Entries of a resource, optionally with those inherited from its folders.
    pub fn access_control_entries(
        &self,
        ctx: &RequestContext,
        root_path: &str,
        include_inherited: bool,
    ) -> SecurityResult<Vec<AccessControlEntry>> {
        self.run("access_control_entries", ctx, "Reading the access control list failed", |dbc| {
            let resource = self.read(dbc, root_path)?;
            self.check(dbc, &resource, Permissions::READ, false, ResourceFilter::ALL)?;
            Ok(self
                .storage
                .access_control_entries(dbc.project(), &resource, include_inherited)?)
        })
    }

    /// Sets the entry of `principal` on a resource, replacing any previous one.
    pub fn write_access_control_entry(
        &self,
        ctx: &RequestContext,
        root_path: &str,
        principal: Principal,
        permissions: PermissionSet,
        inheriting: bool,
    ) -> SecurityResult<()> {
        self.run("write_access_control_entry", ctx, "Writing the access control entry failed", |dbc| {
            Self::check_offline(dbc)?;
            let resource = self.read(dbc, root_path)?;
            self.check(dbc, &resource, Permissions::CONTROL, true, ResourceFilter::ALL)?;
            let mut entry = AccessControlEntry::new(resource.resource_id, principal, permissions);
            entry.inheriting = inheriting;
            self.storage.write_access_control_entry(dbc.project(), entry)?;
            self.cache.clear();
            Ok(())
        })
    }

    pub fn remove_access_control_entry(
        &self,
        ctx: &RequestContext,
        root_path: &str,
        principal: Principal,
    ) -> SecurityResult<()> {
        self.run("remove_access_control_entry", ctx, "Removing the access control entry failed", |dbc| {
            Self::check_offline(dbc)?;
            let resource = self.read(dbc, root_path)?;
            self.check(dbc, &resource, Permissions::CONTROL, true, ResourceFilter::ALL)?;
            self.storage
                .remove_access_control_entry(dbc.project(), resource.resource_id, principal)?;
            self.cache.clear();
            Ok(())
        })
    }

    /// Copies the direct entries of `source` onto `destination`.
    pub fn copy_access_control_entries(&self, ctx: &RequestContext, source: &str, destination: &str) -> SecurityResult<()> {
        self.run("copy_access_control_entries", ctx, "Copying the access control list failed", |dbc| {
            Self::check_offline(dbc)?;
            let source = self.read(dbc, source)?;
            self.check(dbc, &source, Permissions::READ, false, ResourceFilter::ALL)?;
            let target = self.read(dbc, destination)?;
            self.check(dbc, &target, Permissions::CONTROL, true, ResourceFilter::ALL)?;

            for entry in self.storage.access_control_entries(dbc.project(), &source, false)? {
                let copied = AccessControlEntry {
                    resource: target.resource_id,
                    inherited: false,
                    ..entry
                };
                self.storage.write_access_control_entry(dbc.project(), copied)?;
            }
            self.cache.clear();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SecurityError;
    use crate::lock::LockType;
    use crate::manager::tests::Harness;
    use crate::resolver::Verdict;
    use palisade_test_utils::assert_err_matches;
    use palisade_vfs::{OrgUnitPath, PermissionSet, Permissions, Principal, ResourceFilter, ResourceType};

    #[test]
    fn test_write_entry_needs_control_and_lock() {
        let h = Harness::new();
        let ctx = h.admin();
        let user = h.storage.add_user("u", OrgUnitPath::root());
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();

        assert_err_matches!(
            h.manager
                .write_access_control_entry(&ctx, "/a.txt", Principal::User(user.id), PermissionSet::ACCESS_READ, false),
            SecurityError::LockRequired { .. }
        );
        h.manager.lock_resource(&ctx, "/a.txt", LockType::Exclusive).unwrap();
        h.manager
            .write_access_control_entry(&ctx, "/a.txt", Principal::User(user.id), PermissionSet::ACCESS_READ, false)
            .unwrap();
        let entries = h.manager.access_control_entries(&ctx, "/a.txt", false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].permissions, PermissionSet::ACCESS_READ);
    }

    #[test]
    fn test_entry_changes_invalidate_cached_verdicts() {
        let h = Harness::new();
        let ctx = h.admin();
        let user = h.storage.add_user("u", OrgUnitPath::root());
        let doc = h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        h.manager.lock_resource(&ctx, "/a.txt", LockType::Exclusive).unwrap();
        let user_ctx = h.offline(&user);

        h.manager
            .write_access_control_entry(&ctx, "/a.txt", Principal::User(user.id), PermissionSet::ACCESS_READ, false)
            .unwrap();
        let first = h
            .manager
            .has_permissions(&user_ctx, &doc, Permissions::READ, false, ResourceFilter::ALL)
            .unwrap();
        assert_eq!(first, Verdict::Allowed);

        h.manager
            .remove_access_control_entry(&ctx, "/a.txt", Principal::User(user.id))
            .unwrap();
        let second = h
            .manager
            .has_permissions(&user_ctx, &doc, Permissions::READ, false, ResourceFilter::ALL)
            .unwrap();
        assert_eq!(second, Verdict::Denied);
    }

    #[test]
    fn test_copy_entries() {
        let h = Harness::new();
        let ctx = h.admin();
        let user = h.storage.add_user("u", OrgUnitPath::root());
        h.storage.import_resource("/a.txt", ResourceType::PLAIN).unwrap();
        h.storage.import_resource("/b.txt", ResourceType::PLAIN).unwrap();
        h.storage
            .set_acl("/a.txt", Principal::User(user.id), PermissionSet::ACCESS_WRITE, false)
            .unwrap();
        h.manager.lock_resource(&ctx, "/b.txt", LockType::Exclusive).unwrap();
        h.manager.copy_access_control_entries(&ctx, "/a.txt", "/b.txt").unwrap();
        let entries = h.manager.access_control_entries(&ctx, "/b.txt", false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].principal, Principal::User(user.id));
    }
}
