//! Security error types.

use palisade_vfs::{OrgUnitPath, Permissions, Role, StorageError};
use thiserror::Error;

use crate::lock::LockError;
use crate::publish::PublishFailure;
use crate::store::LockStoreError;

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Failures raised by the security layer.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// The resource does not exist or was filtered out for the caller.
    #[error("Resource not found: {path}")]
    ResourceNotFound { path: String },

    #[error("Permission denied for {user} on {path}: requires {}", .required.symbols())]
    PermissionDenied {
        path: String,
        user: String,
        required: Permissions,
    },

    #[error("{path} must be locked by {user} first")]
    LockRequired { path: String, user: String },

    #[error("{user} does not hold role {role}{}", org_unit_suffix(.org_unit))]
    RoleViolation {
        user: String,
        role: Role,
        org_unit: Option<OrgUnitPath>,
    },

    #[error("{user} is not a manager of project {project}")]
    NotManagerOfProject { user: String, project: String },

    #[error(transparent)]
    Publish(#[from] PublishFailure),

    #[error("The Online project is read-only")]
    OnlineProject,

    #[error("Project {project} is locked for publishing")]
    ProjectLocked { project: String },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Cannot copy or move {source_path} into itself at {destination}")]
    RecursiveInclusion { source_path: String, destination: String },

    #[error("Default user {name} cannot be deleted")]
    DefaultUser { name: String },

    #[error("Users cannot delete themselves")]
    SelfDeletion,

    #[error("Already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Lock persistence failed: {0}")]
    Persistence(#[from] LockStoreError),
}

fn org_unit_suffix(org_unit: &Option<OrgUnitPath>) -> String {
    match org_unit {
        Some(ou) => format!(" for {}", ou),
        None => String::new(),
    }
}

impl SecurityError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::ResourceNotFound { path: path.into() }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Whether the error is an authorization outcome rather than an operational failure.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            Self::ResourceNotFound { .. }
                | Self::PermissionDenied { .. }
                | Self::LockRequired { .. }
                | Self::RoleViolation { .. }
                | Self::NotManagerOfProject { .. }
                | Self::Publish(_)
        )
    }
}

impl From<palisade_vfs::OrgUnitParseError> for SecurityError {
    fn from(err: palisade_vfs::OrgUnitParseError) -> Self {
        Self::InvalidOperation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_names_missing_flags() {
        let err = SecurityError::PermissionDenied {
            path: "/a.txt".into(),
            user: "/alice".into(),
            required: Permissions::WRITE | Permissions::CONTROL,
        };
        let msg = err.to_string();
        assert!(msg.contains("/a.txt"));
        assert!(msg.contains(&(Permissions::WRITE | Permissions::CONTROL).symbols()));
        assert!(err.is_authorization_failure());
    }

    #[test]
    fn test_role_violation_message() {
        let err = SecurityError::RoleViolation {
            user: "/bob".into(),
            role: Role::AccountManager,
            org_unit: Some(OrgUnitPath::parse("/a/").unwrap()),
        };
        assert_eq!(err.to_string(), "/bob does not hold role account_manager for /a/");
    }

    #[test]
    fn test_storage_errors_are_not_authorization_failures() {
        let err: SecurityError = StorageError::backend("disk").into();
        assert!(!err.is_authorization_failure());
        assert!(!SecurityError::OnlineProject.is_authorization_failure());
    }
}
