//! Shared setup for the security integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use palisade_common_config::SecurityConfig;
use palisade_security::{MemoryLockStore, RequestContext, SecurityManager};
use palisade_vfs::{MemoryStorage, OrgUnitPath, PermissionSet, Principal, User};

pub struct Setup {
    pub storage: Arc<MemoryStorage>,
    pub manager: SecurityManager,
}

impl Setup {
    pub fn new() -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let manager = SecurityManager::new(
            storage.clone(),
            &SecurityConfig::default(),
            Arc::new(MemoryLockStore::new()),
        );
        Self { storage, manager }
    }

    pub fn admin(&self) -> RequestContext {
        self.offline(&self.storage.admin().unwrap())
    }

    pub fn offline(&self, user: &User) -> RequestContext {
        RequestContext::new(user.clone(), self.storage.offline_project().unwrap())
    }

    pub fn online(&self, user: &User) -> RequestContext {
        RequestContext::new(user.clone(), self.storage.online_project().unwrap())
    }

    /// A root unit user with `permissions` on the whole tree.
    pub fn user_with(&self, name: &str, permissions: PermissionSet) -> User {
        let user = self.storage.add_user(name, OrgUnitPath::root());
        self.storage
            .set_acl("/", Principal::User(user.id), permissions, true)
            .unwrap();
        user
    }
}

pub fn ou(path: &str) -> OrgUnitPath {
    OrgUnitPath::parse(path).unwrap()
}
