//! Common interaction patterns built from the router primitives.

use crate::callback::{Callback, invoke};
use crate::cleanup::Cleanup;
use crate::registry::{Mode, ReleaseHook};
use crate::router::{DirectSpec, EventRouter, Inner};
use core::time::Duration;
use log::trace;
use squirrel_host::{ListenerOptions, NodeKey, Scheduler, TimerId};
use std::cell::Cell;
use std::rc::Rc;

/// Pending hover-in timer shared by the enter and leave registrations.
type HoverSlot = Rc<Cell<Option<TimerId>>>;

fn cancel_pending(scheduler: &Rc<dyn Scheduler>, slot: &HoverSlot) {
    if let Some(timer) = slot.take() {
        scheduler.clear_timer(timer);
    }
}

fn release_hook(scheduler: &Rc<dyn Scheduler>, slot: &HoverSlot) -> ReleaseHook {
    let scheduler = Rc::clone(scheduler);
    let slot = Rc::clone(slot);
    Box::new(move || cancel_pending(&scheduler, &slot))
}

impl EventRouter {
    /// Click listener that ignores clicks arriving within `gate` (the
    /// configured click gate when `None`) of the previous accepted one.
    /// Suppressed clicks are not counted as calls.
    pub fn on_click(
        &self,
        target: NodeKey,
        callback: Callback,
        gate: Option<Duration>,
        options: ListenerOptions,
    ) -> Cleanup {
        let gate = gate.unwrap_or(self.inner.config.click_gate);
        Inner::register_direct(
            &self.inner,
            DirectSpec {
                target,
                kind: "click".to_owned(),
                identity: callback.identity(),
                mode: Mode::ClickGate(gate),
                callback,
                options,
                release: None,
            },
        )
    }

    /// Run `enter` once the pointer stayed over `target` for `delay`
    /// (the configured hover delay when `None`), and `leave` as soon as it
    /// leaves. Leaving cancels an enter that has not fired yet.
    pub fn on_hover(
        &self,
        target: NodeKey,
        enter: Callback,
        leave: Callback,
        delay: Option<Duration>,
    ) -> Cleanup {
        let delay = delay.unwrap_or(self.inner.config.hover_delay);
        let scheduler = &self.inner.host.scheduler;
        let slot = HoverSlot::default();

        let enter_identity = enter.identity();
        let delayed = {
            let scheduler = Rc::clone(scheduler);
            let slot = Rc::clone(&slot);
            Callback::infallible(move |event| {
                cancel_pending(&scheduler, &slot);
                let fired = Rc::clone(&slot);
                let enter = enter.clone();
                let event = event.clone();
                let timer = scheduler.set_timeout(
                    delay,
                    Box::new(move || {
                        fired.set(None);
                        invoke(&enter, &event, "hover-in");
                    }),
                );
                slot.set(Some(timer));
            })
        };

        let leave_identity = leave.identity();
        let immediate = {
            let scheduler = Rc::clone(scheduler);
            let slot = Rc::clone(&slot);
            Callback::new(move |event| {
                cancel_pending(&scheduler, &slot);
                leave.call(event)
            })
        };

        let entered = Inner::register_direct(
            &self.inner,
            DirectSpec {
                target,
                kind: "mouseenter".to_owned(),
                identity: enter_identity,
                mode: Mode::HoverEnter(delay),
                callback: delayed,
                options: ListenerOptions::default(),
                release: Some(release_hook(scheduler, &slot)),
            },
        );
        let left = Inner::register_direct(
            &self.inner,
            DirectSpec {
                target,
                kind: "mouseleave".to_owned(),
                identity: leave_identity,
                mode: Mode::HoverLeave,
                callback: immediate,
                options: ListenerOptions::default(),
                release: Some(release_hook(scheduler, &slot)),
            },
        );
        entered.merge(left)
    }

    /// Scroll listener throttled to `interval`, the configured scroll
    /// throttle when `None`. Passive unless `options` say otherwise.
    pub fn on_scroll(
        &self,
        target: NodeKey,
        callback: Callback,
        interval: Option<Duration>,
        options: Option<ListenerOptions>,
    ) -> Cleanup {
        let interval = interval.unwrap_or(self.inner.config.scroll_throttle);
        let options = options.unwrap_or(ListenerOptions::PASSIVE);
        trace!("scroll on node {} throttled to {interval:?}", target.get());
        self.throttle(target, "scroll", callback, interval, options)
    }

    /// Resize listener debounced by `delay`, the configured resize debounce
    /// when `None`.
    pub fn on_resize(
        &self,
        target: NodeKey,
        callback: Callback,
        delay: Option<Duration>,
        options: ListenerOptions,
    ) -> Cleanup {
        let delay = delay.unwrap_or(self.inner.config.resize_debounce);
        self.debounce(target, "resize", callback, delay, options)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Callback, EventRouter, RouterConfig};
    use core::time::Duration;
    use serde_json::{Value, json};
    use squirrel_host::{Host, ListenerOptions, ManualScheduler, MemoryDocument, NodeKey};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Calls = Rc<RefCell<Vec<(&'static str, u128)>>>;

    fn setup() -> (Rc<MemoryDocument>, Rc<ManualScheduler>, EventRouter, NodeKey) {
        let _ = env_logger::builder().is_test(true).try_init();
        let document = Rc::new(MemoryDocument::new());
        let scheduler = Rc::new(ManualScheduler::new());
        let button = document.append_element(NodeKey::ROOT, "button").unwrap();
        let router = EventRouter::new(
            Host::in_memory(&document, &scheduler),
            RouterConfig::default(),
        );
        (document, scheduler, router, button)
    }

    fn stamp(calls: &Calls, clock: &Rc<ManualScheduler>, label: &'static str) -> Callback {
        let sink = Rc::clone(calls);
        let clock = Rc::clone(clock);
        Callback::infallible(move |_| sink.borrow_mut().push((label, clock.elapsed().as_millis())))
    }

    #[test]
    fn click_gate_suppresses_fast_repeats() {
        let (document, scheduler, router, button) = setup();
        let calls = Calls::default();
        router.on_click(
            button,
            stamp(&calls, &scheduler, "click"),
            None,
            ListenerOptions::default(),
        );
        for wait in [100, 200, 100, 0] {
            document.dispatch(button, "click", Value::Null).unwrap();
            scheduler.advance_ms(wait);
        }
        assert_eq!(*calls.borrow(), vec![("click", 0), ("click", 400)]);
        let metrics = router.metrics();
        assert_eq!((metrics.direct_calls, metrics.direct_listeners), (2, 1));
    }

    #[test]
    fn click_gate_can_be_set_per_call() {
        let (document, scheduler, router, button) = setup();
        let calls = Calls::default();
        router.on_click(
            button,
            stamp(&calls, &scheduler, "click"),
            Some(Duration::from_millis(50)),
            ListenerOptions {
                capture: true,
                passive: false,
            },
        );
        for wait in [40, 20, 0] {
            document.dispatch(button, "click", Value::Null).unwrap();
            scheduler.advance_ms(wait);
        }
        assert_eq!(*calls.borrow(), vec![("click", 0), ("click", 60)]);
        assert_eq!(router.metrics().direct_calls, 2);
    }

    #[test]
    fn leaving_cancels_a_pending_hover() {
        let (document, scheduler, router, button) = setup();
        let calls = Calls::default();
        router.on_hover(
            button,
            stamp(&calls, &scheduler, "enter"),
            stamp(&calls, &scheduler, "leave"),
            None,
        );

        document.dispatch(button, "mouseenter", Value::Null).unwrap();
        scheduler.advance_ms(50);
        document.dispatch(button, "mouseleave", Value::Null).unwrap();
        scheduler.advance_ms(200);
        assert_eq!(*calls.borrow(), vec![("leave", 50)]);

        document.dispatch(button, "mouseenter", Value::Null).unwrap();
        scheduler.advance_ms(200);
        assert_eq!(*calls.borrow(), vec![("leave", 50), ("enter", 350)]);
    }

    #[test]
    fn hover_cleanup_cancels_the_pending_enter() {
        let (document, scheduler, router, button) = setup();
        let calls = Calls::default();
        let cleanup = router.on_hover(
            button,
            stamp(&calls, &scheduler, "enter"),
            stamp(&calls, &scheduler, "leave"),
            Some(Duration::from_millis(40)),
        );
        assert_eq!(document.listener_count(button), 2);

        document.dispatch(button, "mouseenter", Value::Null).unwrap();
        assert_eq!(scheduler.pending_timers(), 2);
        cleanup.run();
        assert_eq!(scheduler.pending_timers(), 1);
        assert_eq!(document.listener_count(button), 0);
        scheduler.advance_ms(100);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn scroll_and_resize_use_configured_coalescing() {
        let (document, scheduler, router, button) = setup();
        let calls = Calls::default();
        router.on_scroll(button, stamp(&calls, &scheduler, "scroll"), None, None);
        router.on_resize(
            button,
            stamp(&calls, &scheduler, "resize"),
            None,
            ListenerOptions::default(),
        );
        for at in [0_u64, 4, 8] {
            document.dispatch(button, "scroll", json!(at)).unwrap();
            document.dispatch(button, "resize", json!(at)).unwrap();
            scheduler.advance_ms(4);
        }
        scheduler.advance_ms(500);
        assert_eq!(
            *calls.borrow(),
            vec![("scroll", 0), ("scroll", 16), ("resize", 258)]
        );
        let metrics = router.metrics();
        assert_eq!((metrics.throttled, metrics.debounced), (1, 1));
    }

    #[test]
    fn scroll_and_resize_accept_per_call_timing() {
        let (document, scheduler, router, button) = setup();
        let calls = Calls::default();
        router.on_scroll(
            button,
            stamp(&calls, &scheduler, "scroll"),
            Some(Duration::from_millis(100)),
            Some(ListenerOptions::default()),
        );
        router.on_resize(
            button,
            stamp(&calls, &scheduler, "resize"),
            Some(Duration::from_millis(20)),
            ListenerOptions::default(),
        );
        for at in [0_u64, 30, 60] {
            document.dispatch(button, "scroll", json!(at)).unwrap();
            document.dispatch(button, "resize", json!(at)).unwrap();
            scheduler.advance_ms(30);
        }
        scheduler.advance_ms(500);
        assert_eq!(
            *calls.borrow(),
            vec![
                ("scroll", 0),
                ("resize", 20),
                ("resize", 50),
                ("resize", 80),
                ("scroll", 100)
            ]
        );
    }
}
