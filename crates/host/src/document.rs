//! Host capability traits.
//!
//! Each trait is object-safe so the composition root can hold the host as a
//! bundle of `Rc<dyn Trait>` handles (see [`Host`]).

use crate::memory::MemoryDocument;
use crate::node::{NodeKey, Rect};
use crate::scheduler::{ManualScheduler, Scheduler};
use anyhow::Result;
use serde_json::Value;
use std::rc::Rc;

/// Structural queries and the expensive style/geometry reads.
///
/// Every read is authoritative: it reflects the document as it is right now.
/// Errors are returned for reads that cannot be answered at all (for example
/// the node no longer exists), never for "nothing matched".
pub trait Document {
    /// The document root, the default scope for structural queries.
    fn root(&self) -> NodeKey;

    /// True if `node` exists and is connected to the root.
    fn is_attached(&self, node: NodeKey) -> bool;

    /// True if `node` is `ancestor` or one of its descendants.
    fn contains(&self, ancestor: NodeKey, node: NodeKey) -> bool;

    /// Parent of `node`, `None` for the root and for detached subtree roots.
    fn parent(&self, node: NodeKey) -> Option<NodeKey>;

    /// First descendant of `scope` (document order) matching `selector`.
    fn query_selector(&self, scope: NodeKey, selector: &str) -> Result<Option<NodeKey>>;

    /// All descendants of `scope` matching `selector`, in document order.
    fn query_selector_all(&self, scope: NodeKey, selector: &str) -> Result<Vec<NodeKey>>;

    /// True if `node` itself matches `selector`.
    fn matches(&self, node: NodeKey, selector: &str) -> Result<bool>;

    /// Nearest inclusive ancestor of `node` matching `selector`.
    fn closest(&self, node: NodeKey, selector: &str) -> Result<Option<NodeKey>>;

    /// Computed value of a style property, `None` when the property is unset.
    fn computed_style(&self, node: NodeKey, property: &str) -> Result<Option<String>>;

    /// Current layout rectangle of `node`.
    fn bounding_rect(&self, node: NodeKey) -> Result<Rect>;

    /// Suspend or restore visual transitions for the subtree rooted at `scope`.
    fn set_transitions_suspended(&self, scope: NodeKey, suspended: bool);
}

/// Callback invoked with the observed node when a notification fires.
pub type ChangeCallback = Rc<dyn Fn(NodeKey)>;

/// Identifier of a host observation, used to cancel it.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ObserverId(pub u64);

/// Structural change notifications ("a mutation happened at or under this node").
pub trait SubtreeObserver {
    /// Start observing `node`; `on_change` receives `node` on every mutation under it.
    fn observe_subtree(&self, node: NodeKey, on_change: ChangeCallback) -> ObserverId;

    /// Stop an observation. Unknown ids are ignored.
    fn unobserve_subtree(&self, id: ObserverId);
}

/// Size change notifications.
pub trait ResizeObserver {
    /// Start observing `node`; `on_change` receives `node` whenever its size changes.
    fn observe_resize(&self, node: NodeKey, on_change: ChangeCallback) -> ObserverId;

    /// Stop an observation. Unknown ids are ignored.
    fn unobserve_resize(&self, id: ObserverId);
}

/// An event delivered by the host.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Event type, e.g. `"click"`.
    pub kind: String,
    /// The node the event was dispatched to.
    pub target: NodeKey,
    /// The node whose listener is running. Delegated dispatch sets this to
    /// the descendant that matched the delegated selector.
    pub current_target: NodeKey,
    /// Free-form payload (pointer coordinates, scroll offsets, ...).
    pub detail: Value,
}

impl Event {
    /// A new event targeted at `target` with an empty payload.
    pub fn new(kind: impl Into<String>, target: NodeKey) -> Self {
        Self {
            kind: kind.into(),
            target,
            current_target: target,
            detail: Value::Null,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    /// Copy of this event seen from another current target.
    #[must_use]
    pub fn retargeted(&self, current_target: NodeKey) -> Self {
        Self {
            current_target,
            ..self.clone()
        }
    }
}

/// Listener flags passed through to the host subscription.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Run during the capture phase instead of the bubble phase.
    pub capture: bool,
    /// The listener promises not to cancel the event.
    pub passive: bool,
}

impl ListenerOptions {
    /// Passive, bubble-phase options.
    pub const PASSIVE: Self = Self {
        capture: false,
        passive: true,
    };
}

/// Raw host listener.
pub type HostListener = Rc<dyn Fn(&Event)>;

/// Identifier of a raw host subscription.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct HostListenerId(pub u64);

/// Raw listener subscription on host nodes.
pub trait EventHost {
    /// Subscribe `listener` to `kind` events reaching `target`.
    fn add_listener(
        &self,
        target: NodeKey,
        kind: &str,
        options: ListenerOptions,
        listener: HostListener,
    ) -> HostListenerId;

    /// Remove a subscription. Unknown ids are ignored.
    fn remove_listener(&self, id: HostListenerId);
}

/// The full set of host capabilities, as shared handles.
#[derive(Clone)]
pub struct Host {
    pub document: Rc<dyn Document>,
    pub subtree: Rc<dyn SubtreeObserver>,
    pub resize: Rc<dyn ResizeObserver>,
    pub events: Rc<dyn EventHost>,
    pub scheduler: Rc<dyn Scheduler>,
}

impl Host {
    /// Wire every capability to an in-memory document and a manual scheduler.
    pub fn in_memory(document: &Rc<MemoryDocument>, scheduler: &Rc<ManualScheduler>) -> Self {
        Self {
            document: Rc::clone(document) as Rc<dyn Document>,
            subtree: Rc::clone(document) as Rc<dyn SubtreeObserver>,
            resize: Rc::clone(document) as Rc<dyn ResizeObserver>,
            events: Rc::clone(document) as Rc<dyn EventHost>,
            scheduler: Rc::clone(scheduler) as Rc<dyn Scheduler>,
        }
    }
}
