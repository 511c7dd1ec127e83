//! An in-memory document implementing every host capability.
//!
//! Nodes live in an `indextree` arena keyed by [`NodeKey`]. Mutations notify
//! subtree observers on the mutated node and all its ancestors; rect updates
//! notify resize observers only when the size changes. Callbacks always run
//! after the internal borrow is released, so they may call straight back into
//! the document.

use crate::document::{
    ChangeCallback, Document, Event, EventHost, HostListener, HostListenerId, ListenerOptions,
    ObserverId, ResizeObserver, SubtreeObserver,
};
use crate::node::{NodeKey, Rect};
use crate::selector::{ElementAdapter, SelectorList, matches_list, parse_list};
use anyhow::{Result, anyhow, bail};
use indextree::{Arena, NodeId};
use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element { tag: String },
}

#[derive(Debug, Clone)]
struct NodeRecord {
    key: NodeKey,
    kind: NodeKind,
    attrs: SmallVec<(String, String), 4>,
    style: FxHashMap<String, String>,
    rect: Rect,
}

impl NodeRecord {
    fn new(key: NodeKey, kind: NodeKind) -> Self {
        Self {
            key,
            kind,
            attrs: SmallVec::new(),
            style: FxHashMap::default(),
            rect: Rect::default(),
        }
    }
}

struct ListenerEntry {
    target: NodeKey,
    kind: String,
    options: ListenerOptions,
    listener: HostListener,
}

/// How often each expensive read was answered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadCounters {
    /// `query_selector` and `query_selector_all` calls.
    pub queries: u64,
    /// `computed_style` calls.
    pub style_reads: u64,
    /// `bounding_rect` calls.
    pub rect_reads: u64,
}

struct State {
    arena: Arena<NodeRecord>,
    root: NodeId,
    ids: FxHashMap<NodeKey, NodeId>,
    next_key: u64,
    next_observer: u64,
    subtree_observers: BTreeMap<ObserverId, (NodeKey, ChangeCallback)>,
    resize_observers: BTreeMap<ObserverId, (NodeKey, ChangeCallback)>,
    next_listener: u64,
    listeners: BTreeMap<HostListenerId, ListenerEntry>,
    suspended: FxHashSet<NodeKey>,
}

impl State {
    fn id(&self, node: NodeKey) -> Result<NodeId> {
        self.ids
            .get(&node)
            .copied()
            .ok_or_else(|| anyhow!("node {} does not exist", node.get()))
    }

    fn record(&self, node: NodeKey) -> Result<&NodeRecord> {
        let id = self.id(node)?;
        self.arena
            .get(id)
            .map(indextree::Node::get)
            .ok_or_else(|| anyhow!("node {} was removed from the arena", node.get()))
    }

    fn record_mut(&mut self, node: NodeKey) -> Result<&mut NodeRecord> {
        let id = self.id(node)?;
        self.arena
            .get_mut(id)
            .map(indextree::Node::get_mut)
            .ok_or_else(|| anyhow!("node {} was removed from the arena", node.get()))
    }

    fn key_of(&self, id: NodeId) -> Option<NodeKey> {
        self.arena.get(id).map(|node| node.get().key)
    }

    /// `node` and its ancestors, innermost first.
    fn chain(&self, node: NodeKey) -> Vec<NodeKey> {
        self.ids.get(&node).map_or_else(Vec::new, |&id| {
            id.ancestors(&self.arena)
                .filter_map(|ancestor| self.key_of(ancestor))
                .collect()
        })
    }

    /// Subtree callbacks interested in a mutation at `node`.
    fn subtree_callbacks(&self, node: NodeKey) -> Vec<(NodeKey, ChangeCallback)> {
        let chain = self.chain(node);
        self.subtree_observers
            .values()
            .filter(|(observed, _)| chain.contains(observed))
            .map(|(observed, callback)| (*observed, ChangeCallback::clone(callback)))
            .collect()
    }

    fn collect_listeners(
        &self,
        node: NodeKey,
        kind: &str,
        capture: bool,
        plan: &mut Vec<(HostListenerId, NodeKey, HostListener)>,
    ) {
        for (id, entry) in &self.listeners {
            if entry.target == node && entry.kind == kind && entry.options.capture == capture {
                plan.push((*id, node, HostListener::clone(&entry.listener)));
            }
        }
    }

    fn adapter(&self) -> Adapter<'_> {
        Adapter { arena: &self.arena }
    }
}

/// Selector view over the arena.
struct Adapter<'arena> {
    arena: &'arena Arena<NodeRecord>,
}

impl ElementAdapter for Adapter<'_> {
    type Handle = NodeId;

    fn parent(&self, element: NodeId) -> Option<NodeId> {
        self.arena.get(element)?.parent()
    }

    fn previous_sibling_element(&self, element: NodeId) -> Option<NodeId> {
        element
            .preceding_siblings(self.arena)
            .skip(1)
            .find(|&sibling| self.is_element(sibling))
    }

    fn is_element(&self, element: NodeId) -> bool {
        self.arena
            .get(element)
            .is_some_and(|node| matches!(node.get().kind, NodeKind::Element { .. }))
    }

    fn tag_name(&self, element: NodeId) -> &str {
        match self.arena.get(element).map(|node| &node.get().kind) {
            Some(NodeKind::Element { tag }) => tag.as_str(),
            _ => "",
        }
    }

    fn attr(&self, element: NodeId, name: &str) -> Option<&str> {
        self.arena
            .get(element)?
            .get()
            .attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }
}

fn parse(selector: &str) -> Result<SelectorList> {
    Ok(parse_list(selector)?)
}

/// A deterministic document for tests and headless use.
pub struct MemoryDocument {
    state: RefCell<State>,
    reads: Cell<ReadCounters>,
    transition_toggles: Cell<u64>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// An empty document holding only the root node.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(NodeRecord::new(NodeKey::ROOT, NodeKind::Document));
        let mut ids = FxHashMap::default();
        ids.insert(NodeKey::ROOT, root);
        Self {
            state: RefCell::new(State {
                arena,
                root,
                ids,
                next_key: 1,
                next_observer: 1,
                subtree_observers: BTreeMap::new(),
                resize_observers: BTreeMap::new(),
                next_listener: 1,
                listeners: BTreeMap::new(),
                suspended: FxHashSet::default(),
            }),
            reads: Cell::new(ReadCounters::default()),
            transition_toggles: Cell::new(0),
        }
    }

    /// Create a detached element. Tag names are stored lowercase.
    pub fn create_element(&self, tag: &str) -> NodeKey {
        let mut state = self.state.borrow_mut();
        let key = NodeKey(state.next_key);
        state.next_key = state.next_key.saturating_add(1);
        let record = NodeRecord::new(
            key,
            NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
            },
        );
        let id = state.arena.new_node(record);
        state.ids.insert(key, id);
        key
    }

    /// Create an element and append it to `parent`.
    pub fn append_element(&self, parent: NodeKey, tag: &str) -> Result<NodeKey> {
        let child = self.create_element(tag);
        self.append_child(parent, child)?;
        Ok(child)
    }

    /// Move `child` to the end of `parent`'s children.
    pub fn append_child(&self, parent: NodeKey, child: NodeKey) -> Result<()> {
        if child == NodeKey::ROOT {
            bail!("the root cannot be re-parented");
        }
        let mut notify = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            let parent_id = state.id(parent)?;
            let child_id = state.id(child)?;
            if parent_id.ancestors(&state.arena).any(|ancestor| ancestor == child_id) {
                bail!("cannot append node {} inside itself", child.get());
            }
            notify.extend(state.subtree_callbacks(child));
            child_id.detach(&mut state.arena);
            parent_id
                .checked_append(child_id, &mut state.arena)
                .map_err(|err| anyhow!("cannot append node {}: {err}", child.get()))?;
            for entry in state.subtree_callbacks(parent) {
                if !notify.iter().any(|(observed, _)| *observed == entry.0) {
                    notify.push(entry);
                }
            }
        }
        trace!("appended node {} to {}", child.get(), parent.get());
        run(notify);
        Ok(())
    }

    /// Detach `node` (and its subtree) from its parent. The nodes stay
    /// readable and can be re-attached.
    pub fn remove(&self, node: NodeKey) -> Result<()> {
        if node == NodeKey::ROOT {
            bail!("the root cannot be removed");
        }
        let notify = {
            let mut state = self.state.borrow_mut();
            let id = state.id(node)?;
            let notify = state.subtree_callbacks(node);
            id.detach(&mut state.arena);
            notify
        };
        trace!("detached node {}", node.get());
        run(notify);
        Ok(())
    }

    /// Remove `node` and its subtree for good. Later reads of any of these
    /// keys return errors.
    pub fn destroy(&self, node: NodeKey) -> Result<()> {
        if node == NodeKey::ROOT {
            bail!("the root cannot be destroyed");
        }
        let notify = {
            let mut state = self.state.borrow_mut();
            let id = state.id(node)?;
            let notify = state.subtree_callbacks(node);
            let doomed: Vec<NodeKey> = id
                .descendants(&state.arena)
                .filter_map(|descendant| state.key_of(descendant))
                .collect();
            for key in &doomed {
                state.ids.remove(key);
            }
            id.remove_subtree(&mut state.arena);
            debug!("destroyed node {} ({} nodes)", node.get(), doomed.len());
            notify
        };
        run(notify);
        Ok(())
    }

    /// Set an attribute, replacing any previous value.
    pub fn set_attribute(&self, node: NodeKey, name: &str, value: &str) -> Result<()> {
        let notify = {
            let mut state = self.state.borrow_mut();
            let record = state.record_mut(node)?;
            let name = name.to_ascii_lowercase();
            if let Some(slot) = record.attrs.iter_mut().find(|(attr, _)| *attr == name) {
                value.clone_into(&mut slot.1);
            } else {
                record.attrs.push((name, value.to_owned()));
            }
            state.subtree_callbacks(node)
        };
        run(notify);
        Ok(())
    }

    /// Set a computed style value.
    pub fn set_style(&self, node: NodeKey, property: &str, value: &str) -> Result<()> {
        let notify = {
            let mut state = self.state.borrow_mut();
            state
                .record_mut(node)?
                .style
                .insert(property.to_owned(), value.to_owned());
            state.subtree_callbacks(node)
        };
        run(notify);
        Ok(())
    }

    /// Set the layout rectangle. Resize observers on `node` fire only when
    /// the size differs from the previous rectangle.
    pub fn set_rect(&self, node: NodeKey, rect: Rect) -> Result<()> {
        let notify: Vec<(NodeKey, ChangeCallback)> = {
            let mut state = self.state.borrow_mut();
            let record = state.record_mut(node)?;
            let resized = !record.rect.same_size(&rect);
            record.rect = rect;
            if resized {
                state
                    .resize_observers
                    .values()
                    .filter(|(observed, _)| *observed == node)
                    .map(|(observed, callback)| (*observed, ChangeCallback::clone(callback)))
                    .collect()
            } else {
                Vec::new()
            }
        };
        run(notify);
        Ok(())
    }

    /// Dispatch an event at `target`: capture listeners from the root down,
    /// then bubble listeners from the target up. Returns how many listeners ran.
    ///
    /// Listeners removed by an earlier listener of the same dispatch are skipped.
    pub fn dispatch(&self, target: NodeKey, kind: &str, detail: Value) -> Result<usize> {
        let mut plan = Vec::new();
        {
            let state = self.state.borrow();
            state.id(target)?;
            let path = state.chain(target);
            for &node in path.iter().rev() {
                state.collect_listeners(node, kind, true, &mut plan);
            }
            for &node in &path {
                state.collect_listeners(node, kind, false, &mut plan);
            }
        }

        let base = Event::new(kind, target).with_detail(detail);
        let mut invoked = 0;
        for (id, current_target, listener) in plan {
            if !self.state.borrow().listeners.contains_key(&id) {
                continue;
            }
            listener(&base.retargeted(current_target));
            invoked += 1;
        }
        Ok(invoked)
    }

    /// Raw listeners currently attached to `node`.
    pub fn listener_count(&self, node: NodeKey) -> usize {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|entry| entry.target == node)
            .count()
    }

    /// Raw listeners attached anywhere.
    pub fn total_listeners(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    /// Live subtree and resize observations.
    pub fn observer_counts(&self) -> (usize, usize) {
        let state = self.state.borrow();
        (state.subtree_observers.len(), state.resize_observers.len())
    }

    /// Read counters so far.
    pub fn reads(&self) -> ReadCounters {
        self.reads.get()
    }

    /// True while transitions are suspended on `node`.
    pub fn transitions_suspended(&self, node: NodeKey) -> bool {
        self.state.borrow().suspended.contains(&node)
    }

    /// Number of suspend/restore requests received.
    pub fn transition_toggles(&self) -> u64 {
        self.transition_toggles.get()
    }

    fn count(&self, bump: impl FnOnce(&mut ReadCounters)) {
        let mut reads = self.reads.get();
        bump(&mut reads);
        self.reads.set(reads);
    }

    fn next_observer(&self) -> ObserverId {
        let mut state = self.state.borrow_mut();
        let id = ObserverId(state.next_observer);
        state.next_observer = state.next_observer.saturating_add(1);
        id
    }
}

fn run(notify: Vec<(NodeKey, ChangeCallback)>) {
    for (observed, callback) in notify {
        callback(observed);
    }
}

impl Document for MemoryDocument {
    fn root(&self) -> NodeKey {
        NodeKey::ROOT
    }

    fn is_attached(&self, node: NodeKey) -> bool {
        let state = self.state.borrow();
        state.ids.get(&node).is_some_and(|&id| {
            let root = state.root;
            id.ancestors(&state.arena).any(|ancestor| ancestor == root)
        })
    }

    fn contains(&self, ancestor: NodeKey, node: NodeKey) -> bool {
        let state = self.state.borrow();
        let (Some(&outer), Some(&inner)) = (state.ids.get(&ancestor), state.ids.get(&node)) else {
            return false;
        };
        inner.ancestors(&state.arena).any(|candidate| candidate == outer)
    }

    fn parent(&self, node: NodeKey) -> Option<NodeKey> {
        let state = self.state.borrow();
        let id = *state.ids.get(&node)?;
        let parent = state.arena.get(id)?.parent()?;
        state.key_of(parent)
    }

    fn query_selector(&self, scope: NodeKey, selector: &str) -> Result<Option<NodeKey>> {
        self.count(|reads| reads.queries = reads.queries.saturating_add(1));
        let list = parse(selector)?;
        let state = self.state.borrow();
        let scope_id = state.id(scope)?;
        let adapter = state.adapter();
        Ok(scope_id
            .descendants(&state.arena)
            .skip(1)
            .find(|&candidate| matches_list(&adapter, candidate, &list))
            .and_then(|found| state.key_of(found)))
    }

    fn query_selector_all(&self, scope: NodeKey, selector: &str) -> Result<Vec<NodeKey>> {
        self.count(|reads| reads.queries = reads.queries.saturating_add(1));
        let list = parse(selector)?;
        let state = self.state.borrow();
        let scope_id = state.id(scope)?;
        let adapter = state.adapter();
        Ok(scope_id
            .descendants(&state.arena)
            .skip(1)
            .filter(|&candidate| matches_list(&adapter, candidate, &list))
            .filter_map(|found| state.key_of(found))
            .collect())
    }

    fn matches(&self, node: NodeKey, selector: &str) -> Result<bool> {
        let list = parse(selector)?;
        let state = self.state.borrow();
        let id = state.id(node)?;
        Ok(matches_list(&state.adapter(), id, &list))
    }

    fn closest(&self, node: NodeKey, selector: &str) -> Result<Option<NodeKey>> {
        let list = parse(selector)?;
        let state = self.state.borrow();
        let id = state.id(node)?;
        let adapter = state.adapter();
        Ok(id
            .ancestors(&state.arena)
            .find(|&candidate| matches_list(&adapter, candidate, &list))
            .and_then(|found| state.key_of(found)))
    }

    fn computed_style(&self, node: NodeKey, property: &str) -> Result<Option<String>> {
        self.count(|reads| reads.style_reads = reads.style_reads.saturating_add(1));
        let state = self.state.borrow();
        Ok(state.record(node)?.style.get(property).cloned())
    }

    fn bounding_rect(&self, node: NodeKey) -> Result<Rect> {
        self.count(|reads| reads.rect_reads = reads.rect_reads.saturating_add(1));
        let state = self.state.borrow();
        Ok(state.record(node)?.rect)
    }

    fn set_transitions_suspended(&self, scope: NodeKey, suspended: bool) {
        self.transition_toggles
            .set(self.transition_toggles.get().saturating_add(1));
        let mut state = self.state.borrow_mut();
        if suspended {
            state.suspended.insert(scope);
        } else {
            state.suspended.remove(&scope);
        }
    }
}

impl SubtreeObserver for MemoryDocument {
    fn observe_subtree(&self, node: NodeKey, on_change: ChangeCallback) -> ObserverId {
        let id = self.next_observer();
        self.state
            .borrow_mut()
            .subtree_observers
            .insert(id, (node, on_change));
        id
    }

    fn unobserve_subtree(&self, id: ObserverId) {
        self.state.borrow_mut().subtree_observers.remove(&id);
    }
}

impl ResizeObserver for MemoryDocument {
    fn observe_resize(&self, node: NodeKey, on_change: ChangeCallback) -> ObserverId {
        let id = self.next_observer();
        self.state
            .borrow_mut()
            .resize_observers
            .insert(id, (node, on_change));
        id
    }

    fn unobserve_resize(&self, id: ObserverId) {
        self.state.borrow_mut().resize_observers.remove(&id);
    }
}

impl EventHost for MemoryDocument {
    fn add_listener(
        &self,
        target: NodeKey,
        kind: &str,
        options: ListenerOptions,
        listener: HostListener,
    ) -> HostListenerId {
        let mut state = self.state.borrow_mut();
        let id = HostListenerId(state.next_listener);
        state.next_listener = state.next_listener.saturating_add(1);
        state.listeners.insert(
            id,
            ListenerEntry {
                target,
                kind: kind.to_owned(),
                options,
                listener,
            },
        );
        id
    }

    fn remove_listener(&self, id: HostListenerId) {
        self.state.borrow_mut().listeners.remove(&id);
    }
}
