//! Resources of the versioned tree.

use std::fmt;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use palisade_common_core::{ResourceId, StructureId};
use serde::{Deserialize, Serialize};

use crate::path;

/// Numeric resource type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(u32);

impl ResourceType {
    pub const FOLDER: Self = Self(0);
    pub const PLAIN: Self = Self(1);
    pub const BINARY: Self = Self(2);
    pub const IMAGE: Self = Self(3);
    /// Executable script content, subject to the developer write floor.
    pub const SCRIPT: Self = Self(4);
    pub const POINTER: Self = Self(5);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    pub fn is_folder(self) -> bool {
        self == Self::FOLDER
    }

    pub fn is_script(self) -> bool {
        self == Self::SCRIPT
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::FOLDER => f.write_str("folder"),
            Self::PLAIN => f.write_str("plain"),
            Self::BINARY => f.write_str("binary"),
            Self::IMAGE => f.write_str("image"),
            Self::SCRIPT => f.write_str("script"),
            Self::POINTER => f.write_str("pointer"),
            Self(other) => write!(f, "type#{}", other),
        }
    }
}

/// Lifecycle state of a resource in the working view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    #[default]
    Unchanged,
    New,
    Changed,
    Deleted,
}

impl ResourceState {
    pub fn is_unchanged(self) -> bool {
        self == Self::Unchanged
    }

    pub fn is_new(self) -> bool {
        self == Self::New
    }

    pub fn is_deleted(self) -> bool {
        self == Self::Deleted
    }

    /// State after an edit: new resources stay new.
    pub fn after_edit(self) -> Self {
        match self {
            Self::New => Self::New,
            _ => Self::Changed,
        }
    }
}

bitflags! {
    /// Resource flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ResourceFlags: u32 {
        const LABELED = 2;
        /// Only reachable through the workplace, never delivered to visitors.
        const INTERNAL = 512;
        const TEMPFILE = 1024;
    }
}

/// A node of the resource tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable across renames and moves.
    pub structure_id: StructureId,
    /// Shared by siblings.
    pub resource_id: ResourceId,
    pub root_path: String,
    pub type_id: ResourceType,
    pub state: ResourceState,
    pub flags: ResourceFlags,
    /// `None` means released since forever.
    pub date_released: Option<DateTime<Utc>>,
    /// `None` means never expires.
    pub date_expired: Option<DateTime<Utc>>,
    pub date_last_modified: DateTime<Utc>,
}

impl Resource {
    /// Creates a new, unpublished resource.
    pub fn new(root_path: impl Into<String>, type_id: ResourceType) -> Self {
        Self {
            structure_id: StructureId::new(),
            resource_id: ResourceId::new(),
            root_path: root_path.into(),
            type_id,
            state: ResourceState::New,
            flags: ResourceFlags::empty(),
            date_released: None,
            date_expired: None,
            date_last_modified: Utc::now(),
        }
    }

    pub fn with_state(mut self, state: ResourceState) -> Self {
        self.state = state;
        self
    }

    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_folder(&self) -> bool {
        self.type_id.is_folder() || path::is_folder_path(&self.root_path)
    }

    pub fn is_file(&self) -> bool {
        !self.is_folder()
    }

    pub fn is_internal(&self) -> bool {
        self.flags.contains(ResourceFlags::INTERNAL)
    }

    pub fn name(&self) -> &str {
        path::name(&self.root_path)
    }

    /// Parent folder path, `None` for the root folder.
    pub fn parent_path(&self) -> Option<&str> {
        path::parent_folder(&self.root_path)
    }

    pub fn is_released(&self, at: DateTime<Utc>) -> bool {
        self.date_released.map_or(true, |released| released <= at)
    }

    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        self.date_expired.map_or(false, |expired| expired <= at)
    }

    pub fn is_released_and_not_expired(&self, at: DateTime<Utc>) -> bool {
        self.is_released(at) && !self.is_expired(at)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root_path)
    }
}
