//! The event router.

use crate::callback::{Callback, invoke};
use crate::cleanup::{Cleanup, Registration};
use crate::coalesce::{ClickGate, DebounceState, ThrottleState, ThrottleStep};
use crate::config::RouterConfig;
use crate::metrics::RouterMetrics;
use crate::registry::{
    Behavior, DelegateEntry, DelegateGroup, DirectKey, DirectRecord, GroupKey, Mode,
    RegistrationId, Registry, ReleaseHook,
};
use core::time::Duration;
use log::{debug, trace, warn};
use squirrel_host::{
    ChangeCallback, Event, Host, HostListener, ListenerOptions, NodeKey, TimerId,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, Default)]
struct Counters {
    delegated: u64,
    direct: u64,
    throttled: u64,
    debounced: u64,
    reclaimed: u64,
    released: u64,
}

/// Everything needed to create one direct registration.
pub(crate) struct DirectSpec {
    pub target: NodeKey,
    pub kind: String,
    /// Identity used for de-duplication; usually the user callback's.
    pub identity: usize,
    pub mode: Mode,
    /// What actually runs on dispatch.
    pub callback: Callback,
    pub options: ListenerOptions,
    pub release: Option<ReleaseHook>,
}

/// Decision taken under the registry borrow, acted on after it is released.
enum Action {
    Run(Callback),
    Leading(Callback),
    ArmTrailing {
        delay: Duration,
        generation: u64,
    },
    Restart {
        previous: Option<TimerId>,
        delay: Duration,
        generation: u64,
    },
    Coalesced,
    Suppressed,
}

pub(crate) struct Inner {
    pub(crate) host: Host,
    pub(crate) config: RouterConfig,
    registry: RefCell<Registry>,
    counters: Cell<Counters>,
    leak_timer: Cell<Option<TimerId>>,
}

/// Central registry of delegated and direct listeners.
///
/// - Delegation keeps one host subscription per (container, event kind)
///   and dispatches to selectors in registration order.
/// - Direct registrations are de-duplicated on (target, kind, callback identity)
///   and released as soon as their target is removed from its parent.
/// - Throttle and debounce coalesce bursts with host timers.
/// - A periodic sweep reclaims whatever else ended up on a detached node.
///
/// Callback errors are logged and swallowed. Callbacks may call back into the
/// router. Handles are cheap to clone; dropping the last one removes every
/// host listener and timer the router owns.
#[derive(Clone)]
pub struct EventRouter {
    pub(crate) inner: Rc<Inner>,
}

impl EventRouter {
    /// Create a router and arm its leak sweep on the host scheduler.
    pub fn new(host: Host, config: RouterConfig) -> Self {
        let inner = Rc::new(Inner {
            host,
            config,
            registry: RefCell::new(Registry::default()),
            counters: Cell::new(Counters::default()),
            leak_timer: Cell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        let timer = inner.host.scheduler.set_interval(
            config.leak_sweep_interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.sweep();
                }
            }),
        );
        inner.leak_timer.set(Some(timer));
        Self { inner }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Run `callback` when `kind` reaches a descendant of `container` that
    /// matches `selector`. The event's `current_target` is the matched node.
    ///
    /// `options` of the first selector on a group decide the shared host
    /// subscription; they default to passive.
    pub fn delegate(
        &self,
        container: NodeKey,
        selector: &str,
        kind: &str,
        callback: Callback,
        options: Option<ListenerOptions>,
    ) -> Cleanup {
        Inner::delegate(
            &self.inner,
            GroupKey {
                container,
                kind: kind.to_owned(),
            },
            selector,
            callback,
            options.unwrap_or(ListenerOptions::PASSIVE),
        )
    }

    /// Remove every association of `selector` on the (container, kind)
    /// group. Returns how many were removed; each counts as released.
    pub fn undelegate(&self, container: NodeKey, selector: &str, kind: &str) -> usize {
        let group = GroupKey {
            container,
            kind: kind.to_owned(),
        };
        let removed = self
            .inner
            .remove_delegates(&group, |entry| entry.selector == selector);
        self.inner.bump(|counters| {
            counters.released = counters.released.saturating_add(removed as u64);
        });
        removed
    }

    /// Attach `callback` directly to `target`.
    ///
    /// Registering the same callback for the same target and kind again
    /// returns the existing cleanup and attaches nothing. The listener is
    /// released when `target` is removed from its parent.
    pub fn on(
        &self,
        target: NodeKey,
        kind: &str,
        callback: Callback,
        options: ListenerOptions,
    ) -> Cleanup {
        Inner::register_direct(
            &self.inner,
            DirectSpec {
                target,
                kind: kind.to_owned(),
                identity: callback.identity(),
                mode: Mode::Plain,
                callback,
                options,
                release: None,
            },
        )
    }

    /// Invoke `callback` at most once per `interval`: immediately on the
    /// first event of a window, then once at the window boundary with the
    /// latest event that arrived inside it.
    pub fn throttle(
        &self,
        target: NodeKey,
        kind: &str,
        callback: Callback,
        interval: Duration,
        options: ListenerOptions,
    ) -> Cleanup {
        Inner::register_direct(
            &self.inner,
            DirectSpec {
                target,
                kind: kind.to_owned(),
                identity: callback.identity(),
                mode: Mode::Throttle(interval),
                callback,
                options,
                release: None,
            },
        )
    }

    /// Invoke `callback` once `delay` has passed without another event,
    /// with the last event.
    pub fn debounce(
        &self,
        target: NodeKey,
        kind: &str,
        callback: Callback,
        delay: Duration,
        options: ListenerOptions,
    ) -> Cleanup {
        Inner::register_direct(
            &self.inner,
            DirectSpec {
                target,
                kind: kind.to_owned(),
                identity: callback.identity(),
                mode: Mode::Debounce(delay),
                callback,
                options,
                release: None,
            },
        )
    }

    /// Tear down every registration. The router stays usable.
    pub fn cleanup_all(&self) {
        self.inner.cleanup_all();
    }

    /// Reclaim registrations whose node left the document. Returns how many
    /// were reclaimed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    pub fn metrics(&self) -> RouterMetrics {
        self.inner.metrics()
    }
}

impl Inner {
    fn bump(&self, update: impl FnOnce(&mut Counters)) {
        let mut counters = self.counters.get();
        update(&mut counters);
        self.counters.set(counters);
    }

    fn delegate(
        this: &Rc<Self>,
        group: GroupKey,
        selector: &str,
        callback: Callback,
        options: ListenerOptions,
    ) -> Cleanup {
        let id = this.registry.borrow_mut().next_id();
        let entry = DelegateEntry {
            id,
            selector: selector.to_owned(),
            callback,
        };
        let pushed = this.registry.borrow_mut().push_delegate(&group, entry);
        if let Err(entry) = pushed {
            let weak = Rc::downgrade(this);
            let key = group.clone();
            let listener: HostListener = Rc::new(move |event: &Event| {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch_delegated(&key, event);
                }
            });
            let subscription =
                this.host
                    .events
                    .add_listener(group.container, &group.kind, options, listener);
            this.registry.borrow_mut().insert_group(
                group.clone(),
                DelegateGroup {
                    subscription,
                    entries: vec![entry],
                },
            );
            debug!(
                "delegating {:?} on node {}",
                group.kind,
                group.container.get()
            );
        }
        trace!(
            "delegated {selector:?} for {:?} on node {}",
            group.kind,
            group.container.get()
        );
        Cleanup::new(Rc::downgrade(this), Registration::Delegated { group, id })
    }

    fn dispatch_delegated(&self, group: &GroupKey, event: &Event) {
        let entries = self.registry.borrow().delegates(group);
        let document = &self.host.document;
        for (id, selector, callback) in entries {
            if !self.registry.borrow().has_delegate(group, id) {
                continue;
            }
            let matched = match document.closest(event.target, &selector) {
                Ok(Some(node)) if document.contains(group.container, node) => node,
                Ok(_) => continue,
                Err(err) => {
                    warn!("delegated selector {selector:?} cannot be matched: {err:#}");
                    continue;
                }
            };
            invoke(&callback, &event.retargeted(matched), "delegated");
            self.bump(|counters| counters.delegated = counters.delegated.saturating_add(1));
        }
    }

    fn remove_delegates(
        &self,
        group: &GroupKey,
        doomed: impl FnMut(&DelegateEntry) -> bool,
    ) -> usize {
        let (removed, emptied) = self.registry.borrow_mut().remove_delegates(group, doomed);
        if let Some(subscription) = emptied {
            self.host.events.remove_listener(subscription);
            debug!(
                "last selector for {:?} on node {} removed",
                group.kind,
                group.container.get()
            );
        }
        removed
    }

    pub(crate) fn register_direct(this: &Rc<Self>, spec: DirectSpec) -> Cleanup {
        let key = DirectKey {
            target: spec.target,
            kind: spec.kind,
            identity: spec.identity,
            mode: spec.mode,
        };
        let existing = this.registry.borrow().find_direct(&key);
        if let Some(id) = existing {
            debug!(
                "duplicate {:?} registration on node {} ignored",
                key.kind,
                key.target.get()
            );
            return Cleanup::new(Rc::downgrade(this), Registration::Direct(id));
        }

        let id = this.registry.borrow_mut().next_id();
        let weak = Rc::downgrade(this);
        let listener: HostListener = Rc::new(move |event: &Event| {
            if let Some(inner) = weak.upgrade() {
                Self::dispatch_direct(&inner, id, event);
            }
        });
        let subscription =
            this.host
                .events
                .add_listener(key.target, &key.kind, spec.options, listener);
        let behavior = match key.mode {
            Mode::Throttle(interval) => Behavior::Throttle(ThrottleState::new(interval)),
            Mode::Debounce(delay) => Behavior::Debounce(DebounceState::new(delay)),
            Mode::ClickGate(gate) => Behavior::Gated(ClickGate::new(gate)),
            Mode::Plain | Mode::HoverEnter(_) | Mode::HoverLeave => Behavior::Plain,
        };
        let document = &this.host.document;
        let parent = if document.is_attached(key.target) {
            document.parent(key.target)
        } else {
            None
        };
        let removal = parent.map(|parent| {
            let owner = Rc::downgrade(this);
            let on_change: ChangeCallback = Rc::new(move |_: NodeKey| {
                if let Some(inner) = owner.upgrade() {
                    inner.reclaim_removed(id);
                }
            });
            this.host.subtree.observe_subtree(parent, on_change)
        });
        debug!(
            "registered {:?} listener on node {} ({:?})",
            key.kind,
            key.target.get(),
            key.mode
        );
        this.registry.borrow_mut().insert_direct(
            id,
            DirectRecord {
                key,
                callback: spec.callback,
                subscription,
                behavior,
                removal,
                release: spec.release,
            },
        );
        Cleanup::new(Rc::downgrade(this), Registration::Direct(id))
    }

    fn dispatch_direct(this: &Rc<Self>, id: RegistrationId, event: &Event) {
        let now = this.host.scheduler.now();
        let action = {
            let mut registry = this.registry.borrow_mut();
            let Some(record) = registry.direct_mut(id) else {
                return;
            };
            match &mut record.behavior {
                Behavior::Plain => Action::Run(record.callback.clone()),
                Behavior::Gated(gate) => {
                    if gate.accept(now) {
                        Action::Run(record.callback.clone())
                    } else {
                        Action::Suppressed
                    }
                }
                Behavior::Throttle(state) => match state.on_event(now, event) {
                    ThrottleStep::Fire => Action::Leading(record.callback.clone()),
                    ThrottleStep::Schedule { delay, generation } => {
                        Action::ArmTrailing { delay, generation }
                    }
                    ThrottleStep::Replaced | ThrottleStep::Dropped => Action::Coalesced,
                },
                Behavior::Debounce(state) => {
                    let (previous, generation) = state.on_event(event);
                    Action::Restart {
                        previous,
                        delay: state.delay(),
                        generation,
                    }
                }
            }
        };

        match action {
            Action::Run(callback) => {
                invoke(&callback, event, "direct");
                this.bump(|counters| counters.direct = counters.direct.saturating_add(1));
            }
            Action::Leading(callback) => {
                invoke(&callback, event, "throttled");
                this.bump(|counters| counters.throttled = counters.throttled.saturating_add(1));
            }
            Action::ArmTrailing { delay, generation } => {
                let weak = Rc::downgrade(this);
                let timer = this.host.scheduler.set_timeout(
                    delay,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.fire_throttle(id, generation);
                        }
                    }),
                );
                this.arm(id, generation, timer);
            }
            Action::Restart {
                previous,
                delay,
                generation,
            } => {
                if let Some(previous) = previous {
                    this.host.scheduler.clear_timer(previous);
                }
                let weak = Rc::downgrade(this);
                let timer = this.host.scheduler.set_timeout(
                    delay,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.fire_debounce(id, generation);
                        }
                    }),
                );
                this.arm(id, generation, timer);
            }
            Action::Coalesced => trace!("{:?} coalesced into a pending call", event.kind),
            Action::Suppressed => trace!(
                "{:?} on node {} suppressed by the click gate",
                event.kind,
                event.target.get()
            ),
        }
    }

    fn arm(&self, id: RegistrationId, generation: u64, timer: TimerId) {
        let armed = self
            .registry
            .borrow_mut()
            .direct_mut(id)
            .is_some_and(|record| match &mut record.behavior {
                Behavior::Throttle(state) => state.arm(generation, timer),
                Behavior::Debounce(state) => state.arm(generation, timer),
                Behavior::Plain | Behavior::Gated(_) => false,
            });
        if !armed {
            self.host.scheduler.clear_timer(timer);
        }
    }

    fn fire_throttle(&self, id: RegistrationId, generation: u64) {
        let now = self.host.scheduler.now();
        let due = self
            .registry
            .borrow_mut()
            .direct_mut(id)
            .and_then(|record| match &mut record.behavior {
                Behavior::Throttle(state) => state
                    .on_timer(now, generation)
                    .map(|event| (record.callback.clone(), event)),
                Behavior::Plain | Behavior::Gated(_) | Behavior::Debounce(_) => None,
            });
        if let Some((callback, event)) = due {
            invoke(&callback, &event, "throttled");
            self.bump(|counters| counters.throttled = counters.throttled.saturating_add(1));
        }
    }

    fn fire_debounce(&self, id: RegistrationId, generation: u64) {
        let due = self
            .registry
            .borrow_mut()
            .direct_mut(id)
            .and_then(|record| match &mut record.behavior {
                Behavior::Debounce(state) => state
                    .on_timer(generation)
                    .map(|event| (record.callback.clone(), event)),
                Behavior::Plain | Behavior::Gated(_) | Behavior::Throttle(_) => None,
            });
        if let Some((callback, event)) = due {
            invoke(&callback, &event, "debounced");
            self.bump(|counters| counters.debounced = counters.debounced.saturating_add(1));
        }
    }

    /// Release a registration through its cleanup handle.
    pub(crate) fn release_handle(&self, registration: &Registration) {
        let released = match registration {
            Registration::Delegated { group, id } => {
                self.remove_delegates(group, |entry| entry.id == *id) > 0
            }
            Registration::Direct(id) => {
                let record = self.registry.borrow_mut().remove_direct(*id);
                record.map(|record| self.dispose(record)).is_some()
            }
        };
        if released {
            self.bump(|counters| counters.released = counters.released.saturating_add(1));
        }
    }

    pub(crate) fn is_registered(&self, registration: &Registration) -> bool {
        let registry = self.registry.borrow();
        match registration {
            Registration::Delegated { group, id } => registry.has_delegate(group, *id),
            Registration::Direct(id) => registry.has_direct(*id),
        }
    }

    /// The parent of registration `id`'s target changed. Release the
    /// registration if the target is gone from the document.
    fn reclaim_removed(&self, id: RegistrationId) {
        let target = self.registry.borrow().direct_target(id);
        let Some(target) = target else {
            return;
        };
        if self.host.document.is_attached(target) {
            return;
        }
        let record = self.registry.borrow_mut().remove_direct(id);
        if let Some(record) = record {
            debug!(
                "node {} was removed, releasing its {:?} listener",
                target.get(),
                record.key.kind
            );
            self.dispose(record);
            self.bump(|counters| counters.reclaimed = counters.reclaimed.saturating_add(1));
        }
    }

    /// Detach a removed direct record from the host.
    fn dispose(&self, record: DirectRecord) {
        self.host.events.remove_listener(record.subscription);
        if let Some(observer) = record.removal {
            self.host.subtree.unobserve_subtree(observer);
        }
        let pending = match record.behavior {
            Behavior::Throttle(mut state) => state.cancel(),
            Behavior::Debounce(mut state) => state.cancel(),
            Behavior::Plain | Behavior::Gated(_) => None,
        };
        if let Some(timer) = pending {
            self.host.scheduler.clear_timer(timer);
        }
        if let Some(release) = record.release {
            release();
        }
    }

    fn cleanup_all(&self) {
        let drained = self.registry.borrow_mut().drain();
        let groups = drained.groups.len();
        let directs = drained.directs.len();
        for group in drained.groups {
            self.host.events.remove_listener(group.subscription);
        }
        for record in drained.directs {
            self.dispose(record);
        }
        if groups + directs > 0 {
            debug!("router cleanup removed {groups} delegate groups and {directs} direct registrations");
        }
    }

    fn sweep(&self) -> usize {
        let directs = self.registry.borrow().direct_targets();
        let groups = self.registry.borrow().group_keys();
        let document = &self.host.document;

        let mut reclaimed = 0_usize;
        for (id, target) in directs {
            if document.is_attached(target) {
                continue;
            }
            let record = self.registry.borrow_mut().remove_direct(id);
            if let Some(record) = record {
                self.dispose(record);
                reclaimed += 1;
            }
        }
        for group in groups {
            if document.is_attached(group.container) {
                continue;
            }
            let removed = self.registry.borrow_mut().remove_group(&group);
            if let Some(removed) = removed {
                self.host.events.remove_listener(removed.subscription);
                reclaimed += removed.entries.len();
            }
        }

        if reclaimed > 0 {
            warn!("event router reclaimed {reclaimed} registrations on detached nodes");
            self.bump(|counters| {
                counters.reclaimed = counters.reclaimed.saturating_add(reclaimed as u64);
            });
        }
        reclaimed
    }

    fn metrics(&self) -> RouterMetrics {
        let counters = self.counters.get();
        let registry = self.registry.borrow();
        let (direct, throttled, debounced) = registry.direct_counts();
        RouterMetrics {
            delegated_calls: counters.delegated,
            direct_calls: counters.direct,
            throttled_calls: counters.throttled,
            debounced_calls: counters.debounced,
            reclaimed: counters.reclaimed,
            released: counters.released,
            delegate_groups: registry.group_count(),
            delegated_selectors: registry.selector_count(),
            direct_listeners: direct,
            throttled,
            debounced,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.leak_timer.take() {
            self.host.scheduler.clear_timer(timer);
        }
        self.cleanup_all();
    }
}
