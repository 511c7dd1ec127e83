//! Entry storage with a per-node reverse index.
//!
//! Style and rect entries are indexed by the node they describe so that
//! invalidating a node touches only its own entries.

use crate::key::{CacheKey, CacheValue, KindTag};
use core::time::Duration;
use rustc_hash::{FxHashMap, FxHashSet};
use squirrel_host::NodeKey;
use std::time::Instant;

/// A memoized value and the time it was read.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub value: CacheValue,
    pub created_at: Instant,
}

impl CacheEntry {
    pub const fn new(value: CacheValue, created_at: Instant) -> Self {
        Self { value, created_at }
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

#[derive(Debug, Default)]
pub struct Store {
    entries: FxHashMap<CacheKey, CacheEntry>,
    /// Node -> style and rect keys describing it.
    by_node: FxHashMap<NodeKey, FxHashSet<CacheKey>>,
}

impl Store {
    #[inline]
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: CacheKey, entry: CacheEntry) {
        if key.is_node_local() {
            self.by_node
                .entry(key.node)
                .or_default()
                .insert(key.clone());
        }
        self.entries.insert(key, entry);
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        if key.is_node_local() {
            self.unindex(key);
        }
        Some(removed)
    }

    /// Drop every style and rect entry for `node`. Returns how many went.
    pub fn remove_node(&mut self, node: NodeKey) -> usize {
        let Some(keys) = self.by_node.remove(&node) else {
            return 0;
        };
        keys.into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .count()
    }

    /// Keep only the entries for which `keep` returns true. Returns how
    /// many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&CacheKey, &CacheEntry) -> bool) -> usize {
        let doomed: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|&(key, entry)| !keep(key, entry))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }

    /// Every node an entry refers to, as key or as cached value.
    pub fn referenced_nodes(&self) -> FxHashSet<NodeKey> {
        let mut nodes = FxHashSet::default();
        for (key, entry) in &self.entries {
            nodes.insert(key.node);
            if let Some(node) = entry.value.as_node() {
                nodes.insert(node);
            }
        }
        nodes
    }

    /// Live entries of one kind.
    pub fn count(&self, kind: KindTag) -> usize {
        self.entries
            .keys()
            .filter(|key| key.kind.tag() == kind)
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_node.clear();
    }

    fn unindex(&mut self, key: &CacheKey) {
        if let Some(keys) = self.by_node.get_mut(&key.node) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_node.remove(&key.node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squirrel_host::Rect;

    fn entry(value: CacheValue) -> CacheEntry {
        CacheEntry::new(value, Instant::now())
    }

    #[test]
    fn remove_node_spares_structural_entries() {
        let mut store = Store::default();
        let node = NodeKey(7);
        store.insert(CacheKey::structural(node, ".item"), entry(CacheValue::Node(NodeKey(8))));
        store.insert(CacheKey::style(node, "color"), entry(CacheValue::Style(None)));
        store.insert(CacheKey::style(node, "width"), entry(CacheValue::Style(Some("4px".into()))));
        store.insert(CacheKey::rect(node), entry(CacheValue::Rect(Rect::default())));
        store.insert(CacheKey::rect(NodeKey(9)), entry(CacheValue::Rect(Rect::default())));

        assert_eq!(store.remove_node(node), 3);
        assert_eq!(store.remove_node(node), 0);
        assert_eq!(store.count(KindTag::Structural), 1);
        assert_eq!(store.count(KindTag::Rect), 1);
    }

    #[test]
    fn retain_keeps_the_index_consistent() {
        let mut store = Store::default();
        let node = NodeKey(3);
        store.insert(CacheKey::style(node, "color"), entry(CacheValue::Style(None)));
        store.insert(CacheKey::rect(node), entry(CacheValue::Rect(Rect::default())));
        let dropped = store.retain(|key, _| key.kind.tag() != KindTag::Rect);
        assert_eq!(dropped, 1);
        assert_eq!(store.remove_node(node), 1);
        assert_eq!(store.count(KindTag::Style) + store.count(KindTag::Rect), 0);
    }
}
