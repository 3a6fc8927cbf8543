//! Authorization audit logging.

use chrono::{DateTime, Utc};
use palisade_vfs::Permissions;
use serde::Serialize;
use tracing::info;

use crate::resolver::Verdict;

/// One blocking permission check and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct AuthzDecision {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub project: String,
    pub operation: String,
    pub resource: String,
    pub required: String,
    pub verdict: Verdict,
}

impl AuthzDecision {
    pub fn new(
        user: impl Into<String>,
        project: impl Into<String>,
        operation: &str,
        resource: &str,
        required: Permissions,
        verdict: Verdict,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            user: user.into(),
            project: project.into(),
            operation: operation.to_string(),
            resource: resource.to_string(),
            required: required.symbols(),
            verdict,
        }
    }

    pub fn granted(&self) -> bool {
        self.verdict.is_allowed()
    }

    pub fn log(&self) {
        if self.granted() {
            info!(
                event = "authz_granted",
                user = %self.user,
                project = %self.project,
                op = %self.operation,
                resource = %self.resource,
                required = %self.required,
                "Authorization granted"
            );
        } else {
            info!(
                event = "authz_denied",
                user = %self.user,
                project = %self.project,
                op = %self.operation,
                resource = %self.resource,
                required = %self.required,
                verdict = ?self.verdict,
                "Authorization denied"
            );
        }
    }
}
