//! Request-scoped security context.

use chrono::{DateTime, Utc};
use palisade_common_log::spans::{record_error, security_span};
use palisade_vfs::{Project, User};
use tracing::span::EnteredSpan;
use tracing::warn;

/// Caller identity handed to every facade operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
    pub project: Project,
    /// Fixed evaluation time; the current time when `None`.
    pub request_time: Option<DateTime<Utc>>,
}

impl RequestContext {
    pub fn new(user: User, project: Project) -> Self {
        Self {
            user,
            project,
            request_time: None,
        }
    }

    pub fn at(mut self, request_time: DateTime<Utc>) -> Self {
        self.request_time = Some(request_time);
        self
    }

    /// The same caller working in another project.
    pub fn in_project(&self, project: Project) -> Self {
        Self {
            project,
            ..self.clone()
        }
    }
}

/// Who is acting, in which project, and when, for the duration of one operation.
///
/// Opening a context enters the operation's tracing span; dropping it leaves the span.
pub struct DbContext {
    user: User,
    project: Project,
    request_time: DateTime<Utc>,
    operation: &'static str,
    span: EnteredSpan,
}

impl DbContext {
    pub fn new(operation: &'static str, user: &User, project: &Project) -> Self {
        let span = security_span(operation, &user.fqn(), &project.name).entered();
        Self {
            user: user.clone(),
            project: project.clone(),
            request_time: Utc::now(),
            operation,
            span,
        }
    }

    /// Opens the context of one facade operation.
    pub fn open(operation: &'static str, request: &RequestContext) -> Self {
        let dbc = Self::new(operation, &request.user, &request.project);
        match request.request_time {
            Some(at) => dbc.at(at),
            None => dbc,
        }
    }

    /// Pins the request time, e.g. to evaluate release windows at a fixed instant.
    pub fn at(mut self, request_time: DateTime<Utc>) -> Self {
        self.request_time = request_time;
        self
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn request_time(&self) -> DateTime<Utc> {
        self.request_time
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Logs a failed operation and hands the error back unchanged.
    pub fn report<E: std::error::Error>(&self, error: E, message: &str) -> E {
        record_error(&self.span, &error);
        warn!(op = self.operation, user = %self.user.fqn(), error = %error, "{}", message);
        error
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("user", &self.user.fqn())
            .field("project", &self.project.name)
            .field("request_time", &self.request_time)
            .field("operation", &self.operation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palisade_vfs::{MemoryStorage, StorageError};

    #[test]
    fn test_context_carries_request_data() {
        let storage = MemoryStorage::new();
        let admin = storage.admin().unwrap();
        let project = storage.offline_project().unwrap();
        let at = Utc::now() - chrono::Duration::days(1);
        let dbc = DbContext::new("read_resource", &admin, &project).at(at);
        assert_eq!(dbc.user().id, admin.id);
        assert_eq!(dbc.project().id, project.id);
        assert_eq!(dbc.request_time(), at);
        assert_eq!(dbc.operation(), "read_resource");
    }

    #[test]
    fn test_open_uses_pinned_time() {
        let storage = MemoryStorage::new();
        let at = Utc::now() + chrono::Duration::hours(3);
        let request = RequestContext::new(storage.admin().unwrap(), storage.offline_project().unwrap()).at(at);
        assert_eq!(DbContext::open("lock_resource", &request).request_time(), at);
        let online = request.in_project(storage.online_project().unwrap());
        assert!(online.project.is_online());
    }

    #[test]
    fn test_report_returns_error_unchanged() {
        let storage = MemoryStorage::new();
        let admin = storage.admin().unwrap();
        let dbc = DbContext::new("delete_resource", &admin, &storage.offline_project().unwrap());
        let err = dbc.report(StorageError::not_found("/x"), "Deleting failed");
        assert!(err.is_not_found());
    }
}
