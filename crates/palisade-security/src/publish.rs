//! Publish authorization.
//!
//! Direct publishes are checked resource by resource and every problem is collected, so a
//! caller can report them all at once.

use std::collections::HashSet;
use std::fmt;

use palisade_vfs::{path, Permissions, PublishList, PublishScope, Resource, ResourceFilter, StorageDriver};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::context::DbContext;
use crate::error::{SecurityError, SecurityResult};
use crate::resolver::PermissionResolver;
use crate::role::RoleResolver;

/// One reason a resource cannot be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublishIssue {
    /// The parent folder has never been published.
    ParentNew { path: String, parent: String },
    /// The parent folder is deleted or missing.
    ParentDeleted { path: String, parent: String },
    /// The user may not publish the resource directly.
    PermissionDenied { path: String },
}

impl PublishIssue {
    pub fn path(&self) -> &str {
        match self {
            Self::ParentNew { path, .. } | Self::ParentDeleted { path, .. } | Self::PermissionDenied { path } => path,
        }
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    pub fn is_structural(&self) -> bool {
        !self.is_permission()
    }
}

impl fmt::Display for PublishIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParentNew { path, parent } => write!(f, "{}: parent folder {} is new", path, parent),
            Self::ParentDeleted { path, parent } => write!(f, "{}: parent folder {} is deleted", path, parent),
            Self::PermissionDenied { path } => write!(f, "{}: direct publish not permitted", path),
        }
    }
}

/// Every issue found while authorizing a publish.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Publishing is not possible: {}", summary(.issues))]
pub struct PublishFailure {
    issues: Vec<PublishIssue>,
}

fn summary(issues: &[PublishIssue]) -> String {
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl PublishFailure {
    pub fn issues(&self) -> &[PublishIssue] {
        &self.issues
    }

    pub fn structural(&self) -> impl Iterator<Item = &PublishIssue> {
        self.issues.iter().filter(|i| i.is_structural())
    }

    pub fn permission(&self) -> impl Iterator<Item = &PublishIssue> {
        self.issues.iter().filter(|i| i.is_permission())
    }
}

/// Collects publish issues.
#[derive(Debug, Default)]
pub struct PublishIssues {
    issues: Vec<PublishIssue>,
    checked_parents: HashSet<String>,
}

impl PublishIssues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time a parent folder is seen.
    pub fn first_check_of(&mut self, parent: &str) -> bool {
        self.checked_parents.insert(parent.to_string())
    }

    pub fn push(&mut self, issue: PublishIssue) {
        self.issues.push(issue);
    }

    pub fn has_permission_issues(&self) -> bool {
        self.issues.iter().any(PublishIssue::is_permission)
    }

    pub fn discard_permission_issues(&mut self) {
        self.issues.retain(PublishIssue::is_structural);
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn finish(self) -> Result<(), PublishFailure> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(PublishFailure { issues: self.issues })
        }
    }
}

/// Decides whether a user may publish a list.
pub struct PublishAuthorizer<'a> {
    storage: &'a dyn StorageDriver,
    resolver: &'a PermissionResolver<'a>,
}

impl<'a> PublishAuthorizer<'a> {
    pub fn new(storage: &'a dyn StorageDriver, resolver: &'a PermissionResolver<'a>) -> Self {
        Self { storage, resolver }
    }

    /// Authorizes `list` for the context's user and project.
    ///
    /// A direct publish is checked on the resources the user selected, not on the pending
    /// resources the storage added below them.
    pub fn authorize(&self, dbc: &DbContext, list: &PublishList) -> SecurityResult<()> {
        let project = dbc.project();
        if project.is_online() {
            return Err(SecurityError::OnlineProject);
        }
        if !project.is_unlocked() {
            return Err(SecurityError::ProjectLocked {
                project: project.name.clone(),
            });
        }

        let roles = RoleResolver::new(self.storage);
        if let PublishScope::Project = list.scope {
            return roles.check_manager_of_project_role(dbc.user(), project);
        }

        let mut issues = PublishIssues::new();
        for resource in list.direct_publish_resources() {
            self.check_parent(dbc, resource, &mut issues)?;
            let allowed = self.resolver.resolve(
                dbc,
                resource,
                Permissions::DIRECT_PUBLISH,
                false,
                ResourceFilter::ALL,
            )?;
            if !allowed.is_allowed() {
                issues.push(PublishIssue::PermissionDenied {
                    path: resource.root_path.clone(),
                });
            }
        }

        if issues.has_permission_issues() && roles.has_manager_of_project_role(dbc.user(), project) {
            debug!(user = %dbc.user().fqn(), "Project manager, ignoring direct publish permissions");
            issues.discard_permission_issues();
        }
        if !issues.is_empty() {
            info!(user = %dbc.user().fqn(), issues = issues.len(), "Publish rejected");
        }
        Ok(issues.finish()?)
    }

    fn check_parent(
        &self,
        dbc: &DbContext,
        resource: &Resource,
        issues: &mut PublishIssues,
    ) -> SecurityResult<()> {
        let Some(parent_path) = path::parent_folder(&resource.root_path) else {
            return Ok(());
        };
        if !issues.first_check_of(parent_path) {
            return Ok(());
        }
        let parent = match self.storage.read_resource(dbc.project(), parent_path) {
            Ok(parent) => parent,
            Err(e) if e.is_not_found() => {
                issues.push(PublishIssue::ParentDeleted {
                    path: resource.root_path.clone(),
                    parent: parent_path.to_string(),
                });
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if parent.state.is_deleted() {
            issues.push(PublishIssue::ParentDeleted {
                path: resource.root_path.clone(),
                parent: parent_path.to_string(),
            });
        } else if parent.state.is_new() {
            issues.push(PublishIssue::ParentNew {
                path: resource.root_path.clone(),
                parent: parent_path.to_string(),
            });
        }
        Ok(())
    }
}
