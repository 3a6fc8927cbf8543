//! Lock table.
//!
//! Locks are keyed by root path. A folder lock covers every descendant without a record of
//! its own; lookups walk up the path to the nearest recorded ancestor. Each public method
//! takes the table lock once, so every acquisition or release is a single atomic transition.

use std::collections::BTreeMap;
use std::ops::Bound;

use palisade_common_core::{ProjectId, UserId};
use palisade_vfs::path;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Kind of lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    /// Regular user lock.
    Exclusive,
    /// User lock dropped at shutdown unless configured otherwise.
    Temporary,
    /// Held on behalf of a workflow shared by several users.
    SharedWorkflow,
    /// Set while a resource is being published.
    Publish,
    /// Set by the system; never overridable by user operations.
    System,
}

impl LockType {
    pub fn is_system(self) -> bool {
        self == LockType::System
    }

    /// Locks a user operation may create.
    pub fn is_user_settable(self) -> bool {
        matches!(self, LockType::Exclusive | LockType::Temporary)
    }
}

/// A lock record, own or inherited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub root_path: String,
    pub owner: UserId,
    pub project: ProjectId,
    pub lock_type: LockType,
    /// Folder the lock was inherited from, `None` for own records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
}

impl Lock {
    pub fn new(root_path: impl Into<String>, owner: UserId, project: ProjectId, lock_type: LockType) -> Self {
        Self {
            root_path: root_path.into(),
            owner,
            project,
            lock_type,
            inherited_from: None,
        }
    }

    pub fn is_inherited(&self) -> bool {
        self.inherited_from.is_some()
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// Whether `user` may write under this lock.
    pub fn is_lockable_by(&self, user: UserId) -> bool {
        self.is_owned_by(user) && !self.lock_type.is_system()
    }

    fn inherited(&self, root_path: &str) -> Self {
        Self {
            root_path: root_path.to_string(),
            inherited_from: Some(self.root_path.clone()),
            ..self.clone()
        }
    }
}

/// Lock errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("{path} is locked by the system")]
    SystemLocked { path: String },

    #[error("{path} is locked by {owner}")]
    LockedByOther { path: String, owner: UserId },

    #[error("{path} inherits its lock from {folder}")]
    InheritedLock { path: String, folder: String },

    #[error("{path} is not locked")]
    NotLocked { path: String },

    #[error("cannot lock {path}: {locked} is locked by another user")]
    SubtreeLocked { path: String, locked: String },
}

type LockMap = BTreeMap<String, Lock>;

fn nearest_ancestor<'m>(locks: &'m LockMap, root_path: &str) -> Option<&'m Lock> {
    path::ancestors(root_path).find_map(|folder| locks.get(folder))
}

fn descendants<'m>(locks: &'m LockMap, folder: &'m str) -> impl Iterator<Item = &'m Lock> + 'm {
    locks
        .range::<str, _>((Bound::Excluded(folder), Bound::Unbounded))
        .take_while(move |(key, _)| key.starts_with(folder))
        .map(|(_, lock)| lock)
}

/// Concurrent map from resource path to lock record.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: RwLock<LockMap>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Own lock of the resource, or the nearest ancestor's lock marked as inherited.
    pub fn get_lock(&self, root_path: &str) -> Option<Lock> {
        let locks = self.locks.read();
        if let Some(own) = locks.get(root_path) {
            return Some(own.clone());
        }
        nearest_ancestor(&locks, root_path).map(|folder| folder.inherited(root_path))
    }

    /// Checks whether [`Self::lock`] would succeed without changing anything.
    pub fn check_lockable(&self, root_path: &str, user: UserId) -> Result<(), LockError> {
        let locks = self.locks.read();
        Self::lock_conflict(&locks, root_path, user, LockType::Exclusive).map(|_| ())
    }

    /// Locks a resource for `user`.
    ///
    /// Re-locking an own lock updates its type. A resource covered by an inherited lock of
    /// the same user stays covered and no record is added. Locking a folder absorbs the
    /// user's own locks below it.
    pub fn lock(
        &self,
        root_path: &str,
        user: UserId,
        project: ProjectId,
        lock_type: LockType,
    ) -> Result<Lock, LockError> {
        let mut locks = self.locks.write();
        if let Some(inherited) = Self::lock_conflict(&locks, root_path, user, lock_type)? {
            return Ok(inherited);
        }

        if path::is_folder_path(root_path) {
            let absorbed: Vec<String> = descendants(&locks, root_path).map(|l| l.root_path.clone()).collect();
            for key in absorbed {
                locks.remove(&key);
            }
        }

        let lock = Lock::new(root_path, user, project, lock_type);
        locks.insert(root_path.to_string(), lock.clone());
        debug!(path = %root_path, user = %user, lock_type = ?lock_type, "Resource locked");
        Ok(lock)
    }

    /// Returns the covering inherited lock if locking is a no-op, or the conflict.
    fn lock_conflict(
        locks: &LockMap,
        root_path: &str,
        user: UserId,
        lock_type: LockType,
    ) -> Result<Option<Lock>, LockError> {
        if let Some(own) = locks.get(root_path) {
            if own.lock_type.is_system() && !lock_type.is_system() {
                return Err(LockError::SystemLocked {
                    path: root_path.to_string(),
                });
            }
            if !own.is_owned_by(user) {
                return Err(LockError::LockedByOther {
                    path: root_path.to_string(),
                    owner: own.owner,
                });
            }
        } else if let Some(folder) = nearest_ancestor(locks, root_path) {
            if folder.lock_type.is_system() {
                return Err(LockError::SystemLocked {
                    path: folder.root_path.clone(),
                });
            }
            if !folder.is_owned_by(user) {
                return Err(LockError::LockedByOther {
                    path: folder.root_path.clone(),
                    owner: folder.owner,
                });
            }
            return Ok(Some(folder.inherited(root_path)));
        }

        if path::is_folder_path(root_path) {
            if let Some(foreign) = descendants(locks, root_path).find(|l| !l.is_lockable_by(user)) {
                return Err(LockError::SubtreeLocked {
                    path: root_path.to_string(),
                    locked: foreign.root_path.clone(),
                });
            }
        }
        Ok(None)
    }

    /// Releases an own, non-system lock.
    pub fn unlock(&self, root_path: &str, user: UserId) -> Result<Lock, LockError> {
        let mut locks = self.locks.write();
        let Some(own) = locks.get(root_path) else {
            return Err(Self::missing(&locks, root_path));
        };
        if own.lock_type.is_system() {
            return Err(LockError::SystemLocked {
                path: root_path.to_string(),
            });
        }
        if !own.is_owned_by(user) {
            return Err(LockError::LockedByOther {
                path: root_path.to_string(),
                owner: own.owner,
            });
        }
        let released = locks.remove(root_path);
        debug!(path = %root_path, user = %user, "Resource unlocked");
        released.ok_or_else(|| LockError::NotLocked {
            path: root_path.to_string(),
        })
    }

    /// Reassigns another user's lock to `user` as an exclusive lock.
    pub fn change_lock(&self, root_path: &str, user: UserId, project: ProjectId) -> Result<Lock, LockError> {
        let mut locks = self.locks.write();
        let Some(own) = locks.get_mut(root_path) else {
            return Err(Self::missing(&locks, root_path));
        };
        if own.lock_type.is_system() {
            return Err(LockError::SystemLocked {
                path: root_path.to_string(),
            });
        }
        if !own.is_owned_by(user) {
            debug!(path = %root_path, from = %own.owner, to = %user, "Lock changed");
        }
        own.owner = user;
        own.project = project;
        own.lock_type = LockType::Exclusive;
        Ok(own.clone())
    }

    fn missing(locks: &LockMap, root_path: &str) -> LockError {
        match nearest_ancestor(locks, root_path) {
            Some(folder) => LockError::InheritedLock {
                path: root_path.to_string(),
                folder: folder.root_path.clone(),
            },
            None => LockError::NotLocked {
                path: root_path.to_string(),
            },
        }
    }

    /// Sets a system lock regardless of existing user locks.
    pub fn lock_system(&self, root_path: &str, owner: UserId, project: ProjectId) -> Lock {
        let lock = Lock::new(root_path, owner, project, LockType::System);
        self.locks.write().insert(root_path.to_string(), lock.clone());
        lock
    }

    /// Removes the own record of a resource, of any type.
    pub fn remove(&self, root_path: &str) -> Option<Lock> {
        self.locks.write().remove(root_path)
    }

    /// Removes the record of a resource and of everything below it, of any type.
    pub fn remove_subtree(&self, root_path: &str) -> usize {
        let mut locks = self.locks.write();
        let mut keys: Vec<String> = Vec::new();
        if locks.contains_key(root_path) {
            keys.push(root_path.to_string());
        }
        if path::is_folder_path(root_path) {
            keys.extend(descendants(&locks, root_path).map(|l| l.root_path.clone()));
        }
        for key in &keys {
            locks.remove(key);
        }
        keys.len()
    }

    /// Whether the resource, an ancestor or a descendant carries a system lock.
    pub fn has_system_locks(&self, root_path: &str) -> bool {
        let locks = self.locks.read();
        let on_path = std::iter::once(root_path)
            .chain(path::ancestors(root_path))
            .filter_map(|p| locks.get(p))
            .any(|l| l.lock_type.is_system());
        on_path || (path::is_folder_path(root_path) && descendants(&locks, root_path).any(|l| l.lock_type.is_system()))
    }

    /// Own records at or below `folder`, in path order.
    pub fn locked_resources(&self, folder: &str) -> Vec<Lock> {
        let locks = self.locks.read();
        locks.get(folder).into_iter().chain(descendants(&locks, folder)).cloned().collect()
    }

    /// Drops every non-system lock of a project.
    pub fn unlock_project(&self, project: ProjectId) -> usize {
        self.remove_where(|l| l.project == project && !l.lock_type.is_system())
    }

    /// Drops every temporary lock of a user.
    pub fn release_temporary(&self, user: UserId) -> usize {
        self.remove_where(|l| l.owner == user && l.lock_type == LockType::Temporary)
    }

    /// Drops every non-system lock of a user.
    pub fn release_user(&self, user: UserId) -> usize {
        self.remove_where(|l| l.owner == user && !l.lock_type.is_system())
    }

    fn remove_where(&self, predicate: impl Fn(&Lock) -> bool) -> usize {
        let mut locks = self.locks.write();
        let before = locks.len();
        locks.retain(|_, lock| !predicate(lock));
        before - locks.len()
    }

    pub fn count_in_project(&self, project: ProjectId) -> usize {
        self.locks.read().values().filter(|l| l.project == project).count()
    }

    /// Records to persist; temporary locks only when `include_temporary` is set.
    pub fn snapshot(&self, include_temporary: bool) -> Vec<Lock> {
        self.locks
            .read()
            .values()
            .filter(|l| include_temporary || l.lock_type != LockType::Temporary)
            .cloned()
            .collect()
    }

    /// Replaces the table content with restored records.
    pub fn restore(&self, restored: Vec<Lock>) {
        let mut locks = self.locks.write();
        locks.clear();
        for lock in restored {
            locks.insert(lock.root_path.clone(), Lock {
                inherited_from: None,
                ..lock
            });
        }
    }

    pub fn len(&self) -> usize {
        self.locks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.read().is_empty()
    }
}
