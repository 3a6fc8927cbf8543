//! Resource tree model and storage contract.
//!
//! This crate holds the data the authorization layer reasons about (resources, permission
//! sets, access control entries, principals, organizational units, projects and publish
//! lists) together with the [`StorageDriver`] contract and an in-memory driver.

pub mod acl;
pub mod filter;
pub mod memory;
pub mod path;
pub mod permission;
pub mod principal;
pub mod project;
pub mod publish;
pub mod resource;
pub mod storage;

pub use acl::{AccessControlEntry, Principal};
pub use filter::ResourceFilter;
pub use memory::MemoryStorage;
pub use permission::{PermissionSet, Permissions};
pub use principal::{Group, OrgUnitParseError, OrgUnitPath, OrganizationalUnit, Role, User};
pub use project::{Project, ProjectState};
pub use publish::{PublishList, PublishScope};
pub use resource::{Resource, ResourceFlags, ResourceState, ResourceType};
pub use storage::{CopyMode, DeleteMode, ResourceUpdate, StorageDriver, StorageError, StorageResult};
