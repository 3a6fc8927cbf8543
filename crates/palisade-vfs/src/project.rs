//! Projects: working areas and the Online view.

use palisade_common_core::{GroupId, ProjectId, UserId};
use serde::{Deserialize, Serialize};

use crate::principal::OrgUnitPath;

/// Publish state of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    #[default]
    Unlocked,
    LockedForPublish,
}

/// A named working area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub owner: UserId,
    pub manager_group: GroupId,
    pub user_group: GroupId,
    pub org_unit: OrgUnitPath,
    pub state: ProjectState,
    /// Root paths this project may modify.
    pub resources: Vec<String>,
}

impl Project {
    pub const ONLINE_NAME: &'static str = "Online";

    /// The published, read-only view.
    pub fn online(owner: UserId, manager_group: GroupId, user_group: GroupId) -> Self {
        Self {
            id: ProjectId::NIL,
            name: Self::ONLINE_NAME.to_string(),
            description: "The published view".to_string(),
            owner,
            manager_group,
            user_group,
            org_unit: OrgUnitPath::root(),
            state: ProjectState::Unlocked,
            resources: vec![crate::path::ROOT.to_string()],
        }
    }

    pub fn new(
        name: impl Into<String>,
        owner: UserId,
        manager_group: GroupId,
        user_group: GroupId,
        org_unit: OrgUnitPath,
    ) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            description: String::new(),
            owner,
            manager_group,
            user_group,
            org_unit,
            state: ProjectState::Unlocked,
            resources: Vec::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.id.is_nil()
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == ProjectState::Unlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_project() {
        let p = Project::online(UserId::new(), GroupId::new(), GroupId::new());
        assert!(p.is_online());
        assert!(p.is_unlocked());
        assert_eq!(p.name, "Online");
    }

    #[test]
    fn test_offline_project() {
        let p = Project::new("Offline", UserId::new(), GroupId::new(), GroupId::new(), OrgUnitPath::root());
        assert!(!p.is_online());
        assert_eq!(p.state, ProjectState::Unlocked);
    }
}
