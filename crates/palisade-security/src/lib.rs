//! Access control, locking and publish authorization.
//!
//! [`SecurityManager`] is the entry point. Every operation opens a [`DbContext`], runs
//! its permission, role and lock checks, and only then hands the mutation to the
//! [`palisade_vfs::StorageDriver`].

pub mod audit;
pub mod cache;
pub mod context;
pub mod error;
pub mod lock;
pub mod manager;
pub mod publish;
pub mod resolver;
pub mod role;
pub mod store;

pub use audit::AuthzDecision;
pub use cache::{CacheStats, PermissionCache, PermissionCacheKey};
pub use context::{DbContext, RequestContext};
pub use error::{SecurityError, SecurityResult};
pub use lock::{Lock, LockError, LockTable, LockType};
pub use manager::SecurityManager;
pub use publish::{PublishAuthorizer, PublishFailure, PublishIssue, PublishIssues};
pub use resolver::{PermissionResolver, Verdict};
pub use role::{matches_role, role_closure, RoleResolver};
pub use store::{FileLockStore, LockStore, LockStoreError, MemoryLockStore};
