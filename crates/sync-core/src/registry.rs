//! Name-keyed adapter registry.

use crate::DestinationAdapter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of destination adapters keyed by destination name.
///
/// Cloning shares the same underlying map, so a registry built once at
/// startup can be handed to both the worker and the unified manager.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Arc<RwLock<HashMap<String, Arc<dyn DestinationAdapter>>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one under the same name.
    pub fn register(
        &self,
        name: impl Into<String>,
        adapter: Arc<dyn DestinationAdapter>,
    ) -> Option<Arc<dyn DestinationAdapter>> {
        self.adapters.write().insert(name.into(), adapter)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn DestinationAdapter>> {
        self.adapters.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DestinationAdapter>> {
        self.adapters.read().get(name).cloned()
    }

    /// Registered destination names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.read().is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingAdapter;

    #[test]
    fn register_get_unregister() {
        let registry = AdapterRegistry::new();
        assert!(registry.is_empty());

        let previous = registry.register("notes", Arc::new(RecordingAdapter::new("notes")));
        assert!(previous.is_none());
        registry.register("tasks", Arc::new(RecordingAdapter::new("tasks")));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["notes".to_string(), "tasks".to_string()]);
        assert!(registry.get("notes").is_some());
        assert!(registry.get("missing").is_none());

        assert!(registry.unregister("notes").is_some());
        assert!(registry.unregister("notes").is_none());
        assert_eq!(registry.names(), vec!["tasks".to_string()]);
    }

    #[test]
    fn clones_share_state() {
        let registry = AdapterRegistry::new();
        let shared = registry.clone();
        shared.register("notes", Arc::new(RecordingAdapter::new("notes")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_replaces_existing() {
        let registry = AdapterRegistry::new();
        registry.register("notes", Arc::new(RecordingAdapter::new("a")));
        let replaced = registry.register("notes", Arc::new(RecordingAdapter::new("b")));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);
    }
}
