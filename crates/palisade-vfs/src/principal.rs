//! Users, groups, roles and organizational units.

use std::fmt;
use std::str::FromStr;

use palisade_common_core::{GroupId, UserId};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Fully-qualified organizational unit path.
///
/// Stored as segments so that ancestry is a segment prefix test, never a string prefix
/// test: `/ab/` is not below `/a/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct OrgUnitPath {
    segments: Vec<String>,
}

/// Error for malformed organizational unit names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid organizational unit name: {0}")]
pub struct OrgUnitParseError(pub String);

impl OrgUnitPath {
    /// The root unit `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses `/a/b/`, `a/b` or `/a/b`. The empty string and `/` are the root.
    pub fn parse(s: &str) -> Result<Self, OrgUnitParseError> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let segments: Vec<String> = trimmed.split('/').map(str::to_owned).collect();
        if segments.iter().any(|s| s.is_empty() || s.trim() != s) {
            return Err(OrgUnitParseError(s.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Simple name of the unit, empty for the root.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    /// Whether `self` equals `other` or lies above it.
    pub fn is_ancestor_or_self_of(&self, other: &OrgUnitPath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Iterates from this unit up to the root, inclusive.
    pub fn self_and_ancestors(&self) -> impl Iterator<Item = OrgUnitPath> {
        std::iter::successors(Some(self.clone()), OrgUnitPath::parent)
    }

    /// Fully-qualified name of a principal living in this unit.
    pub fn qualify(&self, name: &str) -> String {
        format!("{}{}", self, name)
    }
}

impl fmt::Display for OrgUnitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/")?;
        for segment in &self.segments {
            write!(f, "{}/", segment)?;
        }
        Ok(())
    }
}

impl FromStr for OrgUnitPath {
    type Err = OrgUnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<OrgUnitPath> for String {
    fn from(path: OrgUnitPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for OrgUnitPath {
    type Error = OrgUnitParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

/// An organizational unit and the resource roots it administers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationalUnit {
    pub path: OrgUnitPath,
    pub description: String,
    /// Root paths of the resources assigned to this unit.
    pub resources: Vec<String>,
}

impl OrganizationalUnit {
    pub fn new(path: OrgUnitPath, description: impl Into<String>) -> Self {
        Self {
            path,
            description: description.into(),
            resources: Vec::new(),
        }
    }
}

/// Fixed role hierarchy.
///
/// Every role implies the roles below it. Each role is backed by a group named
/// [`Role::group_name`] in the unit the role is granted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    RootAdmin,
    WorkplaceManager,
    DatabaseManager,
    Administrator,
    ProjectManager,
    AccountManager,
    VfsManager,
    Developer,
    WorkplaceUser,
}

impl Role {
    /// The next role up, which implies this one.
    pub fn parent(self) -> Option<Role> {
        match self {
            Role::RootAdmin => None,
            Role::WorkplaceManager | Role::DatabaseManager | Role::Administrator => Some(Role::RootAdmin),
            Role::ProjectManager | Role::AccountManager | Role::VfsManager => Some(Role::Administrator),
            Role::Developer => Some(Role::VfsManager),
            Role::WorkplaceUser => Some(Role::Developer),
        }
    }

    /// Roles that hold regardless of organizational unit.
    pub fn is_org_unit_independent(self) -> bool {
        matches!(self, Role::RootAdmin | Role::WorkplaceManager | Role::DatabaseManager)
    }

    /// Name of the backing group.
    pub fn group_name(self) -> &'static str {
        match self {
            Role::RootAdmin => "RoleRootAdmins",
            Role::WorkplaceManager => "RoleWorkplaceManager",
            Role::DatabaseManager => "RoleDatabaseManager",
            Role::Administrator => "RoleAdministrators",
            Role::ProjectManager => "RoleProjectmanagers",
            Role::AccountManager => "RoleAccountManagers",
            Role::VfsManager => "RoleVfsManagers",
            Role::Developer => "RoleDevelopers",
            Role::WorkplaceUser => "RoleWorkplaceUsers",
        }
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub org_unit: OrgUnitPath,
}

impl User {
    pub fn new(name: impl Into<String>, org_unit: OrgUnitPath) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            org_unit,
        }
    }

    pub fn fqn(&self) -> String {
        self.org_unit.qualify(&self.name)
    }
}

/// A group of users, optionally backing a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub org_unit: OrgUnitPath,
    /// Membership in this group implies membership in the parent group.
    pub parent: Option<GroupId>,
    pub role: Option<Role>,
}

impl Group {
    pub fn new(name: impl Into<String>, org_unit: OrgUnitPath) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            org_unit,
            parent: None,
            role: None,
        }
    }

    /// The group backing `role` within `org_unit`.
    pub fn for_role(role: Role, org_unit: OrgUnitPath) -> Self {
        let mut group = Self::new(role.group_name(), org_unit);
        group.role = Some(role);
        group
    }

    pub fn fqn(&self) -> String {
        self.org_unit.qualify(&self.name)
    }

    pub fn is_role(&self) -> bool {
        self.role.is_some()
    }
}
