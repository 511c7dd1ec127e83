//! Throttle, debounce and click gate state machines.
//!
//! Both are driven by the router: it feeds events and timer expirations in
//! and acts on the returned decision (invoke now, arm a timer, cancel one).
//! Timers carry a generation number so an expiry that raced with a cancel or
//! a reschedule is ignored.

use core::time::Duration;
use squirrel_host::{Event, TimerId};
use std::time::Instant;

/// What to do with an event reaching a throttled registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleStep {
    /// Leading edge: invoke now with this event.
    Fire,
    /// Inside the leading window: the event is held and one trailing
    /// invocation must be armed after `delay`.
    Schedule { delay: Duration, generation: u64 },
    /// A trailing invocation is already pending; it will use this event.
    Replaced,
    /// In the cooldown that follows a trailing invocation.
    Dropped,
}

/// Leading + trailing throttle.
///
/// An event fires immediately when at least `interval` has passed since the
/// previous leading invocation. Events inside that window are coalesced into
/// one trailing invocation at the window boundary, carrying the most recent
/// event. After a trailing invocation the registration cools down for one
/// interval, during which events are dropped.
#[derive(Debug)]
pub struct ThrottleState {
    interval: Duration,
    last_leading: Option<Instant>,
    cooldown_until: Option<Instant>,
    pending: Option<Event>,
    timer: Option<TimerId>,
    generation: u64,
}

impl ThrottleState {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_leading: None,
            cooldown_until: None,
            pending: None,
            timer: None,
            generation: 0,
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    pub const fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn on_event(&mut self, now: Instant, event: &Event) -> ThrottleStep {
        if self.pending.is_some() {
            self.pending = Some(event.clone());
            return ThrottleStep::Replaced;
        }
        if self.cooldown_until.is_some_and(|until| now < until) {
            return ThrottleStep::Dropped;
        }
        match self.last_leading {
            Some(leading) if now.saturating_duration_since(leading) < self.interval => {
                self.pending = Some(event.clone());
                self.generation = self.generation.wrapping_add(1);
                ThrottleStep::Schedule {
                    delay: (leading + self.interval).saturating_duration_since(now),
                    generation: self.generation,
                }
            }
            _ => {
                self.last_leading = Some(now);
                ThrottleStep::Fire
            }
        }
    }

    /// Record the timer armed for `generation`. Returns false when that
    /// generation is already stale; the caller must clear the timer.
    pub fn arm(&mut self, generation: u64, timer: TimerId) -> bool {
        if generation != self.generation || self.pending.is_none() {
            return false;
        }
        self.timer = Some(timer);
        true
    }

    /// The trailing timer of `generation` expired at `now`.
    pub fn on_timer(&mut self, now: Instant, generation: u64) -> Option<Event> {
        if generation != self.generation {
            return None;
        }
        let event = self.pending.take()?;
        self.timer = None;
        self.cooldown_until = Some(now + self.interval);
        Some(event)
    }

    /// Forget any pending trailing invocation, returning its timer.
    pub fn cancel(&mut self) -> Option<TimerId> {
        self.pending = None;
        self.generation = self.generation.wrapping_add(1);
        self.timer.take()
    }
}

/// Trailing-only debounce: every event restarts the delay.
#[derive(Debug)]
pub struct DebounceState {
    delay: Duration,
    pending: Option<Event>,
    timer: Option<TimerId>,
    generation: u64,
}

impl DebounceState {
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            timer: None,
            generation: 0,
        }
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Hold `event` as the latest occurrence. Returns the timer to cancel,
    /// if any, and the generation for the timer to arm.
    pub fn on_event(&mut self, event: &Event) -> (Option<TimerId>, u64) {
        self.pending = Some(event.clone());
        self.generation = self.generation.wrapping_add(1);
        (self.timer.take(), self.generation)
    }

    pub fn arm(&mut self, generation: u64, timer: TimerId) -> bool {
        if generation != self.generation || self.pending.is_none() {
            return false;
        }
        self.timer = Some(timer);
        true
    }

    pub fn on_timer(&mut self, generation: u64) -> Option<Event> {
        if generation != self.generation {
            return None;
        }
        self.timer = None;
        self.pending.take()
    }

    pub fn cancel(&mut self) -> Option<TimerId> {
        self.pending = None;
        self.generation = self.generation.wrapping_add(1);
        self.timer.take()
    }
}

/// Accepts an event only when more than `gate` has passed since the last
/// accepted one.
#[derive(Debug)]
pub struct ClickGate {
    gate: Duration,
    last: Option<Instant>,
}

impl ClickGate {
    pub const fn new(gate: Duration) -> Self {
        Self { gate, last: None }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        if self
            .last
            .is_some_and(|previous| now.saturating_duration_since(previous) <= self.gate)
        {
            return false;
        }
        self.last = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use squirrel_host::NodeKey;

    fn event(at: u64) -> Event {
        Event::new("scroll", NodeKey(1)).with_detail(json!(at))
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn throttle_coalesces_a_burst_into_one_trailing_call() {
        let start = Instant::now();
        let mut state = ThrottleState::new(ms(10));
        let mut calls = Vec::new();

        assert_eq!(state.on_event(start, &event(0)), ThrottleStep::Fire);
        calls.push(0);

        let step = state.on_event(start + ms(5), &event(5));
        assert_eq!(
            step,
            ThrottleStep::Schedule {
                delay: ms(5),
                generation: 1
            }
        );
        assert!(state.arm(1, TimerId(9)));

        let trailing = state.on_timer(start + ms(10), 1);
        assert_eq!(trailing.map(|fired| fired.detail), Some(json!(5)));
        calls.push(10);

        assert_eq!(state.on_event(start + ms(12), &event(12)), ThrottleStep::Dropped);
        assert_eq!(state.on_event(start + ms(25), &event(25)), ThrottleStep::Fire);
        calls.push(25);

        assert_eq!(calls.len(), 3);
    }

    #[test]
    fn trailing_call_uses_the_latest_event() {
        let start = Instant::now();
        let mut state = ThrottleState::new(ms(10));
        state.on_event(start, &event(0));
        state.on_event(start + ms(2), &event(2));
        assert_eq!(state.on_event(start + ms(7), &event(7)), ThrottleStep::Replaced);
        let trailing = state.on_timer(start + ms(10), 1);
        assert_eq!(trailing.map(|fired| fired.detail), Some(json!(7)));
    }

    #[test]
    fn cancelled_throttle_ignores_its_timer() {
        let start = Instant::now();
        let mut state = ThrottleState::new(ms(10));
        state.on_event(start, &event(0));
        state.on_event(start + ms(1), &event(1));
        assert!(state.arm(1, TimerId(3)));
        assert_eq!(state.cancel(), Some(TimerId(3)));
        assert!(state.on_timer(start + ms(10), 1).is_none());
        assert!(!state.has_pending());
    }

    #[test]
    fn click_gate_measures_from_the_last_accepted_click() {
        let start = Instant::now();
        let mut gate = ClickGate::new(ms(300));
        let accepted: Vec<u64> = [0, 100, 300, 400, 650, 701]
            .into_iter()
            .filter(|&at| gate.accept(start + ms(at)))
            .collect();
        assert_eq!(accepted, vec![0, 400, 701]);
    }

    #[test]
    fn debounce_keeps_only_the_last_event() {
        let mut state = DebounceState::new(ms(10));
        let (previous, first) = state.on_event(&event(0));
        assert!(previous.is_none());
        assert!(state.arm(first, TimerId(1)));
        let (previous, second) = state.on_event(&event(5));
        assert_eq!(previous, Some(TimerId(1)));
        assert!(state.arm(second, TimerId(2)));
        let (previous, third) = state.on_event(&event(8));
        assert_eq!(previous, Some(TimerId(2)));
        assert!(state.arm(third, TimerId(3)));

        assert!(state.on_timer(second).is_none());
        assert_eq!(state.on_timer(third).map(|fired| fired.detail), Some(json!(8)));
        assert!(state.on_timer(third).is_none());
    }
}
