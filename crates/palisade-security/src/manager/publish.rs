//! Publish operations.

use palisade_vfs::{Project, ProjectState, PublishList};
use tracing::{info, warn};

use super::SecurityManager;
use crate::context::{DbContext, RequestContext};
use crate::error::{SecurityError, SecurityResult};
use crate::publish::PublishAuthorizer;

impl SecurityManager {
    /// Fills a publish list with the pending resources in its scope, then authorizes it.
    pub fn fill_publish_list(&self, ctx: &RequestContext, list: PublishList) -> SecurityResult<PublishList> {
        self.run("fill_publish_list", ctx, "Filling the publish list failed", |dbc| {
            let project = self.publishable_project(dbc)?;
            let filled = self.storage.fill_publish_list(&project, list)?;
            self.authorize_publish(dbc, &filled)?;
            Ok(filled)
        })
    }

    /// Collects every problem with the list before failing.
    pub fn check_publish_permissions(&self, ctx: &RequestContext, list: &PublishList) -> SecurityResult<()> {
        self.run("check_publish_permissions", ctx, "Publishing is not allowed", |dbc| {
            self.publishable_project(dbc)?;
            self.authorize_publish(dbc, list)
        })
    }

    /// Publishes a list, filling it first if empty. Returns the number of published resources.
    ///
    /// The project is locked for publishing while the storage publishes and unlocked again
    /// afterwards, also when publishing fails.
    pub fn publish_project(&self, ctx: &RequestContext, list: PublishList) -> SecurityResult<usize> {
        self.run("publish_project", ctx, "Publishing the project failed", |dbc| {
            let project = self.publishable_project(dbc)?;
            let list = if list.is_empty() {
                self.storage.fill_publish_list(&project, list)?
            } else {
                list
            };
            self.authorize_publish(dbc, &list)?;

            let mut project = self.begin_publish(dbc)?;
            let published = self.storage.publish(&project, &list);
            project.state = ProjectState::Unlocked;
            if let Err(e) = self.storage.write_project(&project) {
                warn!(project = %project.name, error = %e, "Unlocking the project after publishing failed");
            }
            published?;

            for resource in list.resources() {
                self.locks.remove(&resource.root_path);
            }
            self.cache.clear();
            info!(project = %project.name, count = list.len(), "Project published");
            Ok(list.len())
        })
    }

    /// Current project as stored, offline and not in the middle of a publish.
    fn publishable_project(&self, dbc: &DbContext) -> SecurityResult<Project> {
        Self::check_offline(dbc)?;
        let project = self.storage.read_project(dbc.project().id)?;
        if !project.is_unlocked() {
            return Err(SecurityError::ProjectLocked { project: project.name });
        }
        Ok(project)
    }

    /// Moves the project from `Unlocked` to `LockedForPublish` in one step.
    ///
    /// Only one caller wins when several publishes of the same project race.
    fn begin_publish(&self, dbc: &DbContext) -> SecurityResult<Project> {
        let _guard = self.publish_guard.lock();
        let mut project = self.publishable_project(dbc)?;
        project.state = ProjectState::LockedForPublish;
        self.storage.write_project(&project)?;
        Ok(project)
    }

    fn authorize_publish(&self, dbc: &DbContext, list: &PublishList) -> SecurityResult<()> {
        let resolver = self.resolver();
        PublishAuthorizer::new(self.storage.as_ref(), &resolver).authorize(dbc, list)
    }
}
