//! Concurrent map of live resources.

use std::sync::Arc;

use dashmap::DashMap;
use tether_core::ResourceId;
use tracing::info;

use super::Resource;

/// Owns every live [`Resource`], keyed by id.
pub struct ResourceManager {
    resources: DashMap<ResourceId, Arc<Resource>>,
    backlog_capacity: usize,
}

impl ResourceManager {
    /// Create an empty manager. New resources keep `backlog_capacity` console lines.
    pub fn new(backlog_capacity: usize) -> Self {
        Self {
            resources: DashMap::new(),
            backlog_capacity,
        }
    }

    /// Get or create a resource. The flag is `true` when it was created by this call.
    pub fn create(&self, id: ResourceId) -> (Arc<Resource>, bool) {
        let mut created = false;
        let key = id.clone();
        let resource = self
            .resources
            .entry(id)
            .or_insert_with(|| {
                created = true;
                info!(resource_id = %key, "resource created");
                Arc::new(Resource::new(key, self.backlog_capacity))
            })
            .value()
            .clone();
        (resource, created)
    }

    /// Look up a resource.
    pub fn get(&self, id: &ResourceId) -> Option<Arc<Resource>> {
        self.resources.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and delete a resource, force-closing its sessions.
    pub fn remove(&self, id: &ResourceId) -> Option<Arc<Resource>> {
        let (_, resource) = self.resources.remove(id)?;
        let _ = resource.delete();
        Some(resource)
    }

    /// Ids of every live resource, sorted.
    pub fn list(&self) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self.resources.iter().map(|e| e.key().clone()).collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// Number of live resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether no resources exist.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Open sessions across every resource.
    pub fn session_count(&self) -> usize {
        self.resources.iter().map(|e| e.value().sessions().len()).sum()
    }
}
