//! The resource cache.

use crate::config::CacheConfig;
use crate::key::{CacheKey, CacheValue, KindTag};
use crate::metrics::CacheMetrics;
use crate::observation::{ObservationRecord, Observations};
use crate::storage::{CacheEntry, Store};
use anyhow::Result;
use log::{debug, trace, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use squirrel_host::selector::is_plain;
use squirrel_host::{Host, NodeKey, Rect, TimerId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

#[derive(Clone, Copy, Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    invalidations: u64,
    swept: u64,
}

struct Inner {
    host: Host,
    config: CacheConfig,
    store: RefCell<Store>,
    observations: RefCell<Observations>,
    counters: Cell<Counters>,
    sweep_timer: Cell<Option<TimerId>>,
}

/// Memoizes structural lookups, computed-style reads and layout reads.
///
/// Structural entries stay valid for as long as the cached node is attached
/// under its scope. Style and rect entries expire after their TTL, on
/// [`ResourceCache::invalidate`], or when the host reports a change on a
/// node the cache observes. A background sweep drops anything older than
/// `max_age` and forgets nodes that left the document.
///
/// Handles are cheap to clone and share one cache. Dropping the last handle
/// cancels the sweep timer and every host observation.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Rc<Inner>,
}

impl ResourceCache {
    /// Create a cache and arm its periodic sweep on the host scheduler.
    pub fn new(host: Host, config: CacheConfig) -> Self {
        let inner = Rc::new(Inner {
            host,
            config,
            store: RefCell::new(Store::default()),
            observations: RefCell::new(Observations::default()),
            counters: Cell::new(Counters::default()),
            sweep_timer: Cell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        let timer = inner.host.scheduler.set_interval(
            config.sweep_interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.sweep();
                }
            }),
        );
        inner.sweep_timer.set(Some(timer));
        Self { inner }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// First descendant of `scope` (the document root when `None`) matching
    /// `selector`.
    ///
    /// A cached node is only returned while it is still attached under
    /// `scope`; otherwise the entry is discarded and the query re-run.
    pub fn lookup(&self, selector: &str, scope: Option<NodeKey>) -> Result<Option<NodeKey>> {
        Inner::lookup(&self.inner, selector, scope)
    }

    /// Computed value of `property` on `node`.
    pub fn read_style(&self, node: NodeKey, property: &str) -> Result<Option<String>> {
        self.inner.read_style(node, property)
    }

    /// Layout rectangle of `node`. The first miss starts observing its size.
    pub fn read_rect(&self, node: NodeKey) -> Result<Rect> {
        Inner::read_rect(&self.inner, node)
    }

    /// Drop every style entry and the rect entry of `node`. Call this after
    /// mutating `node` directly. Returns how many entries were removed.
    pub fn invalidate(&self, node: NodeKey) -> usize {
        self.inner.invalidate(node)
    }

    /// Drop only the rect entry of `node`.
    pub fn invalidate_rect(&self, node: NodeKey) -> bool {
        self.inner.invalidate_rect(node)
    }

    /// Every descendant of `scope` matching each selector, in document order.
    ///
    /// Plain selectors share one combined query whose results are
    /// partitioned with `matches`; anything else is queried on its own. The
    /// first node of each list is what [`ResourceCache::lookup`] returns.
    pub fn batch_lookup(
        &self,
        selectors: &[&str],
        scope: Option<NodeKey>,
    ) -> Result<FxHashMap<String, Vec<NodeKey>>> {
        self.inner.batch_lookup(selectors, scope)
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.inner.metrics()
    }

    /// Run the sweep now. Returns how many entries were dropped.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Cancel the sweep timer and every host observation, and clear all
    /// entries. The cache keeps answering reads afterwards, uncached until
    /// refilled, but no longer sweeps.
    pub fn destroy(&self) {
        self.inner.teardown();
        debug!("resource cache destroyed");
    }
}

impl Inner {
    fn now(&self) -> Instant {
        self.host.scheduler.now()
    }

    fn bump(&self, update: impl FnOnce(&mut Counters)) {
        let mut counters = self.counters.get();
        update(&mut counters);
        self.counters.set(counters);
    }

    fn hit(&self) {
        self.bump(|counters| counters.hits = counters.hits.saturating_add(1));
    }

    fn miss(&self) {
        self.bump(|counters| counters.misses = counters.misses.saturating_add(1));
    }

    /// Cached value for `key` if it is still within its TTL. Expired entries
    /// are removed on the way.
    fn fresh(&self, key: &CacheKey) -> Option<CacheValue> {
        let now = self.now();
        let mut store = self.store.borrow_mut();
        let entry = store.get(key)?;
        let ttl = self.config.ttl(key.kind.tag());
        if ttl.is_none_or(|ttl| entry.age(now) < ttl) {
            return Some(entry.value.clone());
        }
        store.remove(key);
        None
    }

    fn lookup(this: &Rc<Self>, selector: &str, scope: Option<NodeKey>) -> Result<Option<NodeKey>> {
        let document = &this.host.document;
        let scope = scope.unwrap_or_else(|| document.root());
        let key = CacheKey::structural(scope, selector);
        let cached = this
            .store
            .borrow()
            .get(&key)
            .and_then(|entry| entry.value.as_node());
        if let Some(node) = cached {
            if document.is_attached(node)
                && document.contains(scope, node)
                && document.matches(node, selector)?
            {
                this.hit();
                trace!("lookup hit {selector:?} -> {}", node.get());
                return Ok(Some(node));
            }
            warn!(
                "discarding cached {selector:?}: node {} left the scope or stopped matching",
                node.get()
            );
            this.store.borrow_mut().remove(&key);
        }

        this.miss();
        trace!("lookup miss {selector:?} under {}", scope.get());
        let found = document.query_selector(scope, selector)?;
        if let Some(node) = found {
            let entry = CacheEntry::new(CacheValue::Node(node), this.now());
            this.store.borrow_mut().insert(key, entry);
            Self::observe_subtree(this, node);
        }
        Ok(found)
    }

    fn read_style(&self, node: NodeKey, property: &str) -> Result<Option<String>> {
        let key = CacheKey::style(node, property);
        if let Some(value) = self.fresh(&key).and_then(|value| value.as_style()) {
            self.hit();
            trace!("style hit {}:{property}", node.get());
            return Ok(value);
        }

        self.miss();
        trace!("style miss {}:{property}", node.get());
        let value = self.host.document.computed_style(node, property)?;
        let entry = CacheEntry::new(CacheValue::Style(value.clone()), self.now());
        self.store.borrow_mut().insert(key, entry);
        Ok(value)
    }

    fn read_rect(this: &Rc<Self>, node: NodeKey) -> Result<Rect> {
        let key = CacheKey::rect(node);
        if let Some(rect) = this.fresh(&key).and_then(|value| value.as_rect()) {
            this.hit();
            trace!("rect hit {}", node.get());
            return Ok(rect);
        }

        this.miss();
        trace!("rect miss {}", node.get());
        let rect = this.host.document.bounding_rect(node)?;
        let entry = CacheEntry::new(CacheValue::Rect(rect), this.now());
        this.store.borrow_mut().insert(key, entry);
        Self::observe_resize(this, node);
        Ok(rect)
    }

    fn observe_subtree(this: &Rc<Self>, node: NodeKey) {
        if this.observations.borrow().has_subtree(node) {
            return;
        }
        let weak = Rc::downgrade(this);
        let id = this.host.subtree.observe_subtree(
            node,
            Rc::new(move |changed: NodeKey| {
                if let Some(inner) = weak.upgrade() {
                    inner.invalidate(changed);
                }
            }),
        );
        this.observations.borrow_mut().set_subtree(node, id);
        debug!("observing subtree of {}", node.get());
    }

    fn observe_resize(this: &Rc<Self>, node: NodeKey) {
        if this.observations.borrow().has_resize(node) {
            return;
        }
        let weak = Rc::downgrade(this);
        let id = this.host.resize.observe_resize(
            node,
            Rc::new(move |changed: NodeKey| {
                if let Some(inner) = weak.upgrade() {
                    inner.invalidate_rect(changed);
                }
            }),
        );
        this.observations.borrow_mut().set_resize(node, id);
        debug!("observing size of {}", node.get());
    }

    fn invalidate(&self, node: NodeKey) -> usize {
        let removed = self.store.borrow_mut().remove_node(node);
        if removed > 0 {
            self.bump(|counters| {
                counters.invalidations = counters.invalidations.saturating_add(removed as u64);
            });
            trace!("invalidated {removed} entries for {}", node.get());
        }
        removed
    }

    fn invalidate_rect(&self, node: NodeKey) -> bool {
        let removed = self.store.borrow_mut().remove(&CacheKey::rect(node)).is_some();
        if removed {
            self.bump(|counters| {
                counters.invalidations = counters.invalidations.saturating_add(1);
            });
            trace!("invalidated rect of {}", node.get());
        }
        removed
    }

    fn batch_lookup(
        &self,
        selectors: &[&str],
        scope: Option<NodeKey>,
    ) -> Result<FxHashMap<String, Vec<NodeKey>>> {
        let document = &self.host.document;
        let scope = scope.unwrap_or_else(|| document.root());
        let (plain, complex): (Vec<&str>, Vec<&str>) =
            selectors.iter().copied().partition(|selector| is_plain(selector));

        let mut results = FxHashMap::default();
        match plain.as_slice() {
            [] => {}
            [only] => {
                results.insert((*only).to_owned(), document.query_selector_all(scope, only)?);
            }
            many => {
                let combined = document.query_selector_all(scope, &many.join(", "))?;
                for selector in many {
                    let mut matched = Vec::new();
                    for &node in &combined {
                        if document.matches(node, selector)? {
                            matched.push(node);
                        }
                    }
                    results.insert((*selector).to_owned(), matched);
                }
            }
        }
        for selector in complex {
            results.insert(selector.to_owned(), document.query_selector_all(scope, selector)?);
        }
        debug!(
            "batch lookup of {} selectors ({} combined)",
            selectors.len(),
            plain.len()
        );
        Ok(results)
    }

    fn metrics(&self) -> CacheMetrics {
        let counters = self.counters.get();
        let store = self.store.borrow();
        CacheMetrics {
            hits: counters.hits,
            misses: counters.misses,
            invalidations: counters.invalidations,
            swept: counters.swept,
            structural_entries: store.count(KindTag::Structural),
            style_entries: store.count(KindTag::Style),
            rect_entries: store.count(KindTag::Rect),
            observed_nodes: self.observations.borrow().len(),
        }
    }

    fn sweep(&self) -> usize {
        let now = self.now();
        let max_age = self.config.max_age;

        let mut candidates = self.store.borrow().referenced_nodes();
        candidates.extend(self.observations.borrow().nodes());
        let document = &self.host.document;
        let gone: FxHashSet<NodeKey> = candidates
            .into_iter()
            .filter(|&node| !document.is_attached(node))
            .collect();

        let dropped = self.store.borrow_mut().retain(|key, entry| {
            let cached_gone = entry.value.as_node().is_some_and(|node| gone.contains(&node));
            entry.age(now) <= max_age && !gone.contains(&key.node) && !cached_gone
        });

        let released: Vec<ObservationRecord> = {
            let mut observations = self.observations.borrow_mut();
            gone.iter().filter_map(|&node| observations.remove(node)).collect()
        };
        for record in &released {
            self.unobserve(record);
        }

        if dropped > 0 || !released.is_empty() {
            self.bump(|counters| counters.swept = counters.swept.saturating_add(dropped as u64));
            debug!(
                "cache sweep dropped {dropped} entries and released {} detached nodes",
                released.len()
            );
        }
        dropped
    }

    fn unobserve(&self, record: &ObservationRecord) {
        if let Some(id) = record.subtree {
            self.host.subtree.unobserve_subtree(id);
        }
        if let Some(id) = record.resize {
            self.host.resize.unobserve_resize(id);
        }
    }

    fn teardown(&self) {
        if let Some(timer) = self.sweep_timer.take() {
            self.host.scheduler.clear_timer(timer);
        }
        let records = self.observations.borrow_mut().drain();
        for record in &records {
            self.unobserve(record);
        }
        self.store.borrow_mut().clear();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squirrel_host::{Document as _, ManualScheduler, MemoryDocument};

    struct Fixture {
        document: Rc<MemoryDocument>,
        scheduler: Rc<ManualScheduler>,
        cache: ResourceCache,
        app: NodeKey,
        items: Vec<NodeKey>,
    }

    /// root > main#app > ul > (li.item, li.item), footer
    fn fixture() -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let document = Rc::new(MemoryDocument::new());
        let scheduler = Rc::new(ManualScheduler::new());
        let app = document.append_element(NodeKey::ROOT, "main").unwrap();
        document.set_attribute(app, "id", "app").unwrap();
        let list = document.append_element(app, "ul").unwrap();
        let mut items = Vec::new();
        for _ in 0..2 {
            let item = document.append_element(list, "li").unwrap();
            document.set_attribute(item, "class", "item").unwrap();
            items.push(item);
        }
        document.append_element(NodeKey::ROOT, "footer").unwrap();
        let cache = ResourceCache::new(
            Host::in_memory(&document, &scheduler),
            CacheConfig::default(),
        );
        Fixture {
            document,
            scheduler,
            cache,
            app,
            items,
        }
    }

    #[test]
    fn lookup_never_returns_a_removed_node() {
        let fx = fixture();
        assert_eq!(fx.cache.lookup(".item", None).unwrap(), Some(fx.items[0]));
        assert_eq!(fx.cache.lookup(".item", None).unwrap(), Some(fx.items[0]));
        assert_eq!(fx.document.reads().queries, 1);

        fx.document.remove(fx.items[0]).unwrap();
        assert_eq!(fx.cache.lookup(".item", None).unwrap(), Some(fx.items[1]));
        assert_eq!(fx.document.reads().queries, 2);

        let metrics = fx.cache.metrics();
        assert_eq!((metrics.hits, metrics.misses), (1, 2));
    }

    #[test]
    fn lookup_drops_a_node_that_stopped_matching() {
        let fx = fixture();
        assert_eq!(fx.cache.lookup(".item", None).unwrap(), Some(fx.items[0]));
        fx.document.set_attribute(fx.items[0], "class", "done").unwrap();

        let single = fx.cache.lookup(".item", None).unwrap();
        assert_eq!(single, Some(fx.items[1]));
        assert_eq!(fx.document.reads().queries, 2);
        let batched = fx.cache.batch_lookup(&[".item"], None).unwrap();
        assert_eq!(batched[".item"].first().copied(), single);

        assert_eq!(fx.cache.lookup(".item", None).unwrap(), single);
        let metrics = fx.cache.metrics();
        assert_eq!((metrics.hits, metrics.misses), (1, 2));
    }

    #[test]
    fn lookup_respects_scope_and_misses_are_not_stored() {
        let fx = fixture();
        assert_eq!(fx.cache.lookup("footer", Some(fx.app)).unwrap(), None);
        assert_eq!(fx.cache.lookup("footer", Some(fx.app)).unwrap(), None);
        assert_eq!(fx.document.reads().queries, 2);
        assert_eq!(fx.cache.metrics().structural_entries, 0);
    }

    #[test]
    fn invalidate_forces_a_real_read() {
        let fx = fixture();
        let node = fx.items[0];
        fx.document.set_style(node, "color", "red").unwrap();
        assert_eq!(fx.cache.read_style(node, "color").unwrap().as_deref(), Some("red"));

        fx.document.set_style(node, "color", "blue").unwrap();
        assert_eq!(fx.cache.read_style(node, "color").unwrap().as_deref(), Some("red"));
        assert_eq!(fx.document.reads().style_reads, 1);

        assert_eq!(fx.cache.invalidate(node), 1);
        assert_eq!(fx.cache.read_style(node, "color").unwrap().as_deref(), Some("blue"));
        assert_eq!(fx.document.reads().style_reads, 2);
    }

    #[test]
    fn invalidate_drops_cached_rects() {
        let fx = fixture();
        let node = fx.items[0];
        fx.document.set_rect(node, Rect::new(0.0, 0.0, 100.0, 20.0)).unwrap();
        assert!(fx.cache.read_rect(node).unwrap().left.abs() < f64::EPSILON);

        fx.document.set_rect(node, Rect::new(30.0, 0.0, 100.0, 20.0)).unwrap();
        assert!(fx.cache.read_rect(node).unwrap().left.abs() < f64::EPSILON);
        assert_eq!(fx.document.reads().rect_reads, 1);

        assert_eq!(fx.cache.invalidate(node), 1);
        assert!((fx.cache.read_rect(node).unwrap().left - 30.0).abs() < f64::EPSILON);
        assert_eq!(fx.document.reads().rect_reads, 2);
    }

    #[test]
    fn style_entries_expire_after_their_ttl() {
        let fx = fixture();
        let node = fx.items[1];
        fx.cache.read_style(node, "width").unwrap();
        fx.scheduler.advance_ms(4_999);
        fx.cache.read_style(node, "width").unwrap();
        assert_eq!(fx.document.reads().style_reads, 1);
        fx.scheduler.advance_ms(1);
        fx.cache.read_style(node, "width").unwrap();
        assert_eq!(fx.document.reads().style_reads, 2);
    }

    #[test]
    fn mutations_under_a_looked_up_node_invalidate_its_entries() {
        let fx = fixture();
        let app = fx.cache.lookup("#app", None).unwrap().unwrap();
        fx.cache.read_style(app, "display").unwrap();
        fx.cache.read_rect(app).unwrap();

        fx.document.set_attribute(fx.items[1], "class", "item done").unwrap();
        let metrics = fx.cache.metrics();
        assert_eq!(metrics.invalidations, 2);
        assert_eq!((metrics.style_entries, metrics.rect_entries), (0, 0));

        fx.cache.read_style(app, "display").unwrap();
        assert_eq!(fx.document.reads().style_reads, 2);
    }

    #[test]
    fn resizes_invalidate_rects_but_moves_wait_for_the_ttl() {
        let fx = fixture();
        let node = fx.items[0];
        fx.document.set_rect(node, Rect::new(0.0, 0.0, 100.0, 20.0)).unwrap();
        assert!((fx.cache.read_rect(node).unwrap().width - 100.0).abs() < f64::EPSILON);

        fx.document.set_rect(node, Rect::new(0.0, 0.0, 150.0, 20.0)).unwrap();
        assert!((fx.cache.read_rect(node).unwrap().width - 150.0).abs() < f64::EPSILON);
        assert_eq!(fx.document.reads().rect_reads, 2);

        fx.document.set_rect(node, Rect::new(30.0, 0.0, 150.0, 20.0)).unwrap();
        assert!(fx.cache.read_rect(node).unwrap().left.abs() < f64::EPSILON);
        fx.scheduler.advance_ms(1_000);
        assert!((fx.cache.read_rect(node).unwrap().left - 30.0).abs() < f64::EPSILON);
        assert_eq!(fx.document.reads().rect_reads, 3);
    }

    #[test]
    fn failed_reads_are_not_stored() {
        let fx = fixture();
        let node = fx.items[0];
        fx.document.destroy(node).unwrap();
        assert!(fx.cache.read_style(node, "color").is_err());
        assert!(fx.cache.read_rect(node).is_err());
        assert_eq!(fx.cache.metrics().entries(), 0);
        assert_eq!(fx.document.observer_counts(), (0, 0));
    }

    #[test]
    fn batch_lookup_matches_individual_lookups() {
        let fx = fixture();
        let selectors = ["li.item", "#app", ".missing", "ul > li, footer"];
        let batched = fx.cache.batch_lookup(&selectors, None).unwrap();
        assert_eq!(fx.document.reads().queries, 2);

        assert_eq!(batched["li.item"], fx.items);
        assert_eq!(batched["#app"], vec![fx.app]);
        assert!(batched[".missing"].is_empty());
        assert_eq!(batched["ul > li, footer"].len(), 3);
        for selector in selectors {
            let single = fx.cache.lookup(selector, None).unwrap();
            assert_eq!(batched[selector].first().copied(), single);
        }
    }

    #[test]
    fn periodic_sweep_drops_entries_past_max_age() {
        let fx = fixture();
        fx.cache.lookup("#app", None).unwrap();
        fx.cache.read_style(fx.app, "color").unwrap();
        fx.scheduler.advance_ms(60_000);
        assert_eq!(fx.cache.metrics().entries(), 2);
        fx.scheduler.advance_ms(30_000);
        let metrics = fx.cache.metrics();
        assert_eq!(metrics.entries(), 0);
        assert_eq!(metrics.swept, 2);
    }

    #[test]
    fn sweep_releases_detached_nodes() {
        let fx = fixture();
        let node = fx.cache.lookup(".item", None).unwrap().unwrap();
        fx.cache.read_rect(node).unwrap();
        assert_eq!(fx.document.observer_counts(), (1, 1));

        // The structural observer already dropped the rect entry; the sweep
        // takes the lookup entry pointing at the detached node.
        fx.document.remove(node).unwrap();
        assert_eq!(fx.cache.sweep(), 1);
        assert_eq!(fx.cache.metrics().observed_nodes, 0);
        assert_eq!(fx.document.observer_counts(), (0, 0));
    }

    #[test]
    fn destroy_and_drop_cancel_host_resources() {
        let fx = fixture();
        fx.cache.lookup("#app", None).unwrap();
        assert_eq!(fx.scheduler.pending_timers(), 1);
        fx.cache.destroy();
        assert_eq!(fx.scheduler.pending_timers(), 0);
        assert_eq!(fx.document.observer_counts(), (0, 0));
        assert_eq!(fx.cache.metrics().entries(), 0);

        let other = ResourceCache::new(
            Host::in_memory(&fx.document, &fx.scheduler),
            CacheConfig::default(),
        );
        other.read_rect(fx.app).unwrap();
        assert_eq!(fx.scheduler.pending_timers(), 1);
        drop(other);
        assert_eq!(fx.scheduler.pending_timers(), 0);
        assert_eq!(fx.document.observer_counts(), (0, 0));
        assert!(fx.document.is_attached(fx.app));
    }
}
