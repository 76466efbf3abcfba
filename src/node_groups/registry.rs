//! Versioned snapshots of the registered node groups.
//!
//! Readers clone an `Arc<Snapshot>` and never observe a partially built set.
//! Writers build a complete replacement and swap it in.

use crate::node_groups::{NodeGroup, ScaleSet};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Default)]
pub struct Snapshot {
    version: u64,
    node_groups: Vec<Arc<ScaleSet>>,
    // lowercase instance id -> node group name
    instances: HashMap<String, String>,
}

impl Snapshot {
    /// 0 until the first node groups are installed.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node_groups(&self) -> &[Arc<ScaleSet>] {
        &self.node_groups
    }

    /// Lowercase instance id to node group name.
    pub fn instances(&self) -> &HashMap<String, String> {
        &self.instances
    }

    pub fn find(&self, name: &str) -> Option<&Arc<ScaleSet>> {
        self.node_groups
            .iter()
            .find(|g| g.id().eq_ignore_ascii_case(name))
    }

    pub fn find_for_instance(&self, instance_id: &str) -> Option<&Arc<ScaleSet>> {
        self.instances
            .get(&instance_id.to_ascii_lowercase())
            .and_then(|name| self.find(name))
    }

    pub fn len(&self) -> usize {
        self.node_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_groups.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    current: RwLock<Arc<Snapshot>>,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.read())
    }

    pub fn get(&self) -> Vec<Arc<ScaleSet>> {
        self.snapshot().node_groups.clone()
    }

    pub fn find(&self, name: &str) -> Option<Arc<ScaleSet>> {
        self.snapshot().find(name).cloned()
    }

    pub fn find_for_instance(&self, instance_id: &str) -> Option<Arc<ScaleSet>> {
        self.snapshot().find_for_instance(instance_id).cloned()
    }

    /// Installs a complete set of node groups and returns the new version.
    pub fn replace(
        &self,
        node_groups: Vec<Arc<ScaleSet>>,
        instances: HashMap<String, String>,
    ) -> u64 {
        let mut current = self.write();
        let version = current.version + 1;

        *current = Arc::new(Snapshot {
            version,
            node_groups,
            instances,
        });

        version
    }

    /// Adds or updates a single node group. Returns `false` if a node group
    /// with the same name and bounds is already registered.
    pub fn register(&self, node_group: Arc<ScaleSet>) -> bool {
        self.update(|node_groups| register(node_groups, node_group))
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.update(|node_groups| unregister(node_groups, name))
    }

    fn update(&self, f: impl FnOnce(&mut Vec<Arc<ScaleSet>>) -> bool) -> bool {
        let mut current = self.write();
        let mut node_groups = current.node_groups.clone();

        if !f(&mut node_groups) {
            return false;
        }

        let snapshot = Snapshot {
            version: current.version + 1,
            node_groups,
            instances: current.instances.clone(),
        };
        *current = Arc::new(snapshot);

        true
    }

    fn read(&self) -> RwLockReadGuard<'_, Arc<Snapshot>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<Snapshot>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn register(node_groups: &mut Vec<Arc<ScaleSet>>, node_group: Arc<ScaleSet>) -> bool {
    match node_groups
        .iter()
        .position(|g| g.id().eq_ignore_ascii_case(node_group.id()))
    {
        Some(i) => {
            if node_groups[i].has_same_bounds(&node_group) {
                return false;
            }

            debug!(name = node_group.id(), "Updating node group");
            node_groups[i] = node_group;
        }
        None => {
            debug!(name = node_group.id(), "Registering node group");
            node_groups.push(node_group);
        }
    }

    true
}

pub(crate) fn unregister(node_groups: &mut Vec<Arc<ScaleSet>>, name: &str) -> bool {
    let before = node_groups.len();
    node_groups.retain(|g| !g.id().eq_ignore_ascii_case(name));

    if node_groups.len() != before {
        debug!(name, "Unregistered node group");
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud_provider::MockScaleSetClient;
    use crate::node_groups::Inventory;
    use std::time::Duration;

    fn node_group(name: &str, min: u64, max: u64) -> Arc<ScaleSet> {
        let inventory = Inventory::new(
            Arc::new(MockScaleSetClient::new()),
            "rg",
            Duration::from_secs(1),
        );
        Arc::new(ScaleSet::new(name.into(), min, max, inventory))
    }

    #[test]
    fn starts_empty() {
        let registry = Registry::new();

        assert!(registry.get().is_empty());
        assert_eq!(registry.snapshot().version(), 0);
    }

    #[test]
    fn replace_installs_a_new_snapshot() {
        let registry = Registry::new();
        registry.replace(vec![node_group("a", 1, 2)], HashMap::new());
        let old = registry.snapshot();

        let version = registry.replace(
            vec![node_group("b", 1, 2), node_group("c", 0, 3)],
            vec![("vm-0".to_string(), "c".to_string())]
                .into_iter()
                .collect(),
        );

        assert_eq!(version, 2);
        // readers holding the previous snapshot are unaffected
        assert_eq!(old.len(), 1);
        assert!(old.find("a").is_some());

        let ids: Vec<String> = registry.get().iter().map(|g| g.id().to_owned()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(registry.find("a").is_none());
        assert_eq!(registry.find_for_instance("VM-0").unwrap().id(), "c");
    }

    #[test]
    fn register_adds_and_updates() {
        let registry = Registry::new();

        assert!(registry.register(node_group("a", 1, 2)));
        assert!(!registry.register(node_group("A", 1, 2)));
        assert!(registry.register(node_group("a", 1, 4)));

        assert_eq!(registry.get().len(), 1);
        assert_eq!(registry.find("a").unwrap().max_size(), 4);
        assert_eq!(registry.snapshot().version(), 2);
    }

    #[test]
    fn unregister_removes_by_name() {
        let registry = Registry::new();
        registry.register(node_group("a", 1, 2));
        registry.register(node_group("b", 1, 2));

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(registry.find("a").is_none());
        assert_eq!(registry.get().len(), 1);
    }
}
