//! Resource filters.

use chrono::{DateTime, Utc};

use crate::resource::{Resource, ResourceState, ResourceType};

/// Selects which resources an operation may see.
///
/// Filters are composed from a few independent requirements. `require_visible` is not
/// evaluated here; it feeds into the VIEW handling of the permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceFilter {
    exclude_deleted: bool,
    require_timerange: bool,
    require_visible: bool,
    only_state: Option<ResourceState>,
    only_type: Option<ResourceType>,
}

impl ResourceFilter {
    /// Everything, including deleted and expired resources.
    pub const ALL: Self = Self {
        exclude_deleted: false,
        require_timerange: false,
        require_visible: false,
        only_state: None,
        only_type: None,
    };

    /// Excludes deleted resources and resources outside their release window.
    pub const DEFAULT: Self = Self {
        exclude_deleted: true,
        require_timerange: true,
        ..Self::ALL
    };

    /// Like [`Self::DEFAULT`] without the release window check.
    pub const IGNORE_EXPIRATION: Self = Self {
        exclude_deleted: true,
        ..Self::ALL
    };

    /// Everything the user has VIEW permission on.
    pub const ONLY_VISIBLE: Self = Self {
        require_visible: true,
        ..Self::ALL
    };

    pub const ONLY_VISIBLE_NO_DELETED: Self = Self {
        require_visible: true,
        exclude_deleted: true,
        ..Self::ALL
    };

    pub fn add_exclude_deleted(mut self) -> Self {
        self.exclude_deleted = true;
        self
    }

    pub fn add_require_timerange(mut self) -> Self {
        self.require_timerange = true;
        self
    }

    pub fn add_require_visible(mut self) -> Self {
        self.require_visible = true;
        self
    }

    pub fn add_require_state(mut self, state: ResourceState) -> Self {
        self.only_state = Some(state);
        self
    }

    pub fn add_require_type(mut self, type_id: ResourceType) -> Self {
        self.only_type = Some(type_id);
        self
    }

    pub fn excludes_deleted(&self) -> bool {
        self.exclude_deleted
    }

    pub fn requires_timerange(&self) -> bool {
        self.require_timerange
    }

    pub fn requires_visible(&self) -> bool {
        self.require_visible
    }

    /// Whether the resource passes this filter at the given request time.
    pub fn is_valid(&self, at: DateTime<Utc>, resource: &Resource) -> bool {
        if self.exclude_deleted && resource.state.is_deleted() {
            return false;
        }
        if self.require_timerange && !resource.is_released_and_not_expired(at) {
            return false;
        }
        if self.only_state.is_some_and(|state| state != resource.state) {
            return false;
        }
        if self.only_type.is_some_and(|type_id| type_id != resource.type_id) {
            return false;
        }
        true
    }
}
