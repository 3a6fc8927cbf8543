//! Publish lists.

use palisade_common_core::{ProjectId, PublishId, StructureId};
use serde::{Deserialize, Serialize};

use crate::resource::Resource;

/// What a publish list was requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishScope {
    /// Every pending change of the project.
    Project,
    /// An explicit resource set.
    Direct {
        resources: Vec<Resource>,
        publish_siblings: bool,
        include_sub_resources: bool,
    },
}

/// The changes to promote into the Online view.
///
/// Created empty with a scope, then filled by the storage driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishList {
    pub id: PublishId,
    pub project: ProjectId,
    pub scope: PublishScope,
    resources: Vec<Resource>,
}

impl PublishList {
    pub fn for_project(project: ProjectId) -> Self {
        Self {
            id: PublishId::new(),
            project,
            scope: PublishScope::Project,
            resources: Vec::new(),
        }
    }

    pub fn direct(project: ProjectId, resources: Vec<Resource>) -> Self {
        Self {
            id: PublishId::new(),
            project,
            scope: PublishScope::Direct {
                resources,
                publish_siblings: false,
                include_sub_resources: true,
            },
            resources: Vec::new(),
        }
    }

    pub fn with_siblings(mut self, publish_siblings: bool) -> Self {
        if let PublishScope::Direct { publish_siblings: flag, .. } = &mut self.scope {
            *flag = publish_siblings;
        }
        self
    }

    pub fn with_sub_resources(mut self, include: bool) -> Self {
        if let PublishScope::Direct { include_sub_resources: flag, .. } = &mut self.scope {
            *flag = include;
        }
        self
    }

    pub fn is_direct_publish(&self) -> bool {
        matches!(self.scope, PublishScope::Direct { .. })
    }

    /// The explicitly requested resources of a direct publish.
    pub fn direct_publish_resources(&self) -> &[Resource] {
        match &self.scope {
            PublishScope::Direct { resources, .. } => resources,
            PublishScope::Project => &[],
        }
    }

    /// The filled resources, folders first in path order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn contains(&self, structure_id: StructureId) -> bool {
        self.resources.iter().any(|r| r.structure_id == structure_id)
    }

    /// Adds a resource unless already listed.
    pub fn add(&mut self, resource: Resource) {
        if !self.contains(resource.structure_id) {
            self.resources.push(resource);
        }
    }

    /// Orders folders before files and parents before children.
    pub fn sort(&mut self) {
        self.resources
            .sort_by(|a, b| b.is_folder().cmp(&a.is_folder()).then_with(|| a.root_path.cmp(&b.root_path)));
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
