//! Host observations held per node.

use rustc_hash::FxHashMap;
use squirrel_host::{NodeKey, ObserverId};

/// Which host observations are live for one node. At most one of each.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObservationRecord {
    pub subtree: Option<ObserverId>,
    pub resize: Option<ObserverId>,
}

/// One record per observed node.
#[derive(Debug, Default)]
pub struct Observations {
    records: FxHashMap<NodeKey, ObservationRecord>,
}

impl Observations {
    /// True if `node` already has a structural observation.
    pub fn has_subtree(&self, node: NodeKey) -> bool {
        self.records
            .get(&node)
            .is_some_and(|record| record.subtree.is_some())
    }

    /// True if `node` already has a resize observation.
    pub fn has_resize(&self, node: NodeKey) -> bool {
        self.records
            .get(&node)
            .is_some_and(|record| record.resize.is_some())
    }

    pub fn set_subtree(&mut self, node: NodeKey, id: ObserverId) {
        self.records.entry(node).or_default().subtree = Some(id);
    }

    pub fn set_resize(&mut self, node: NodeKey, id: ObserverId) {
        self.records.entry(node).or_default().resize = Some(id);
    }

    /// Forget `node`, returning its record so the caller can cancel the
    /// host observations.
    pub fn remove(&mut self, node: NodeKey) -> Option<ObservationRecord> {
        self.records.remove(&node)
    }

    pub fn nodes(&self) -> Vec<NodeKey> {
        self.records.keys().copied().collect()
    }

    /// Forget everything, returning every record.
    pub fn drain(&mut self) -> Vec<ObservationRecord> {
        self.records.drain().map(|(_, record)| record).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
