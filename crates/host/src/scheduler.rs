//! Host scheduling: clock, timers and next-frame callbacks.

use core::time::Duration;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::mem::take;
use std::rc::Rc;
use std::time::Instant;

/// One-shot timer body.
pub type TimerTask = Box<dyn FnOnce()>;

/// Body of a next-frame callback.
pub type FrameTask = Box<dyn FnOnce()>;

/// Identifier of a pending timer.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TimerId(pub u64);

/// Clock, timers and the "run on next paint" primitive.
///
/// Tasks run on the same logical thread as everything else; a task may call
/// back into the scheduler (to re-arm itself or to cancel another timer).
pub trait Scheduler {
    /// Current time.
    fn now(&self) -> Instant;

    /// Run `task` once after `delay`.
    fn set_timeout(&self, delay: Duration, task: TimerTask) -> TimerId;

    /// Run `task` every `period` until cleared.
    fn set_interval(&self, period: Duration, task: Box<dyn FnMut()>) -> TimerId;

    /// Cancel a timer. Unknown or already fired ids are ignored.
    fn clear_timer(&self, id: TimerId);

    /// Run `task` at the next rendering opportunity.
    fn request_frame(&self, task: FrameTask);
}

enum Pending {
    Once(TimerTask),
    Repeating {
        period: Duration,
        task: Rc<RefCell<Box<dyn FnMut()>>>,
    },
}

enum Runnable {
    Once(TimerTask),
    Repeating(Rc<RefCell<Box<dyn FnMut()>>>),
}

/// Shortest period accepted for repeating timers.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A scheduler driven by an explicit virtual clock.
///
/// Time only moves when [`ManualScheduler::advance`] is called. Timers fire in
/// deadline order (ties in creation order) and the clock reads exactly the
/// timer's deadline while its task runs. Frames run only on
/// [`ManualScheduler::run_frame`].
pub struct ManualScheduler {
    /// Real instant the virtual clock is anchored to.
    origin: Instant,
    /// Virtual time elapsed since `origin`.
    elapsed: Cell<Duration>,
    /// Sequence for timer ids and queue ordering.
    next_seq: Cell<u64>,
    /// Deadline queue. Entries whose timer was cleared are skipped when popped.
    queue: RefCell<BTreeMap<(Duration, u64), TimerId>>,
    /// Live timers.
    tasks: RefCell<FxHashMap<TimerId, Pending>>,
    /// Callbacks waiting for the next frame.
    frames: RefCell<VecDeque<FrameTask>>,
    /// Number of timer tasks run so far.
    fired: Cell<u64>,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    /// A scheduler whose virtual clock starts now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            next_seq: Cell::new(1),
            queue: RefCell::new(BTreeMap::new()),
            tasks: RefCell::new(FxHashMap::default()),
            frames: RefCell::new(VecDeque::new()),
            fired: Cell::new(0),
        }
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    /// Move the clock forward by `by`, running every timer that falls due.
    ///
    /// Timers armed by running tasks also fire if their deadline is within the
    /// advanced window. Must not be called from inside a timer task.
    pub fn advance(&self, by: Duration) {
        let target = self.elapsed.get() + by;
        while let Some((deadline, id)) = self.pop_due(target) {
            if deadline > self.elapsed.get() {
                self.elapsed.set(deadline);
            }
            let Some(runnable) = self.take_runnable(id, deadline) else {
                continue;
            };
            self.fired.set(self.fired.get().saturating_add(1));
            match runnable {
                Runnable::Once(task) => task(),
                Runnable::Repeating(task) => {
                    let mut body = task.borrow_mut();
                    (*body)();
                }
            }
        }
        if target > self.elapsed.get() {
            self.elapsed.set(target);
        }
    }

    /// Convenience wrapper around [`ManualScheduler::advance`].
    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Run every frame callback requested so far. Callbacks requested while
    /// the frame runs wait for the next frame. Returns how many ran.
    pub fn run_frame(&self) -> usize {
        let batch = take(&mut *self.frames.borrow_mut());
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    /// Number of live (armed, not yet fired or cleared) timers.
    pub fn pending_timers(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Number of frame callbacks waiting for the next frame.
    pub fn pending_frames(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Number of timer tasks run so far.
    pub fn fired(&self) -> u64 {
        self.fired.get()
    }

    fn next_seq(&self) -> u64 {
        let seq = self.next_seq.get();
        self.next_seq.set(seq.wrapping_add(1));
        seq
    }

    fn enqueue(&self, deadline: Duration, id: TimerId) {
        let seq = self.next_seq();
        self.queue.borrow_mut().insert((deadline, seq), id);
    }

    fn pop_due(&self, target: Duration) -> Option<(Duration, TimerId)> {
        let mut queue = self.queue.borrow_mut();
        let (&(deadline, seq), &id) = queue.first_key_value()?;
        if deadline > target {
            return None;
        }
        queue.remove(&(deadline, seq));
        Some((deadline, id))
    }

    fn take_runnable(&self, id: TimerId, deadline: Duration) -> Option<Runnable> {
        let mut tasks = self.tasks.borrow_mut();
        match tasks.remove(&id)? {
            Pending::Once(task) => Some(Runnable::Once(task)),
            Pending::Repeating { period, task } => {
                tasks.insert(
                    id,
                    Pending::Repeating {
                        period,
                        task: Rc::clone(&task),
                    },
                );
                drop(tasks);
                self.enqueue(deadline + period, id);
                Some(Runnable::Repeating(task))
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn set_timeout(&self, delay: Duration, task: TimerTask) -> TimerId {
        let id = TimerId(self.next_seq());
        self.tasks.borrow_mut().insert(id, Pending::Once(task));
        self.enqueue(self.elapsed.get() + delay, id);
        id
    }

    fn set_interval(&self, period: Duration, task: Box<dyn FnMut()>) -> TimerId {
        let period = period.max(MIN_PERIOD);
        let id = TimerId(self.next_seq());
        self.tasks.borrow_mut().insert(
            id,
            Pending::Repeating {
                period,
                task: Rc::new(RefCell::new(task)),
            },
        );
        self.enqueue(self.elapsed.get() + period, id);
        id
    }

    fn clear_timer(&self, id: TimerId) {
        self.tasks.borrow_mut().remove(&id);
    }

    fn request_frame(&self, task: FrameTask) {
        self.frames.borrow_mut().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<u128>>>, Rc<ManualScheduler>) {
        (Rc::new(RefCell::new(Vec::new())), Rc::new(ManualScheduler::new()))
    }

    #[test]
    fn timeouts_fire_in_deadline_order_at_their_deadline() {
        let (log, scheduler) = recorder();
        for delay in [30_u64, 10, 20] {
            let log = Rc::clone(&log);
            let clock = Rc::clone(&scheduler);
            scheduler.set_timeout(
                Duration::from_millis(delay),
                Box::new(move || log.borrow_mut().push(clock.elapsed().as_millis())),
            );
        }
        scheduler.advance_ms(25);
        assert_eq!(*log.borrow(), vec![10, 20]);
        scheduler.advance_ms(100);
        assert_eq!(*log.borrow(), vec![10, 20, 30]);
        assert_eq!(scheduler.elapsed(), Duration::from_millis(125));
    }

    #[test]
    fn cleared_timers_never_fire() {
        let (log, scheduler) = recorder();
        let sink = Rc::clone(&log);
        let id = scheduler.set_timeout(
            Duration::from_millis(5),
            Box::new(move || sink.borrow_mut().push(5)),
        );
        scheduler.clear_timer(id);
        scheduler.clear_timer(id);
        scheduler.advance_ms(10);
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn intervals_repeat_until_cleared() {
        let (log, scheduler) = recorder();
        let sink = Rc::clone(&log);
        let clock = Rc::clone(&scheduler);
        let id = scheduler.set_interval(
            Duration::from_millis(10),
            Box::new(move || sink.borrow_mut().push(clock.elapsed().as_millis())),
        );
        scheduler.advance_ms(35);
        assert_eq!(*log.borrow(), vec![10, 20, 30]);
        scheduler.clear_timer(id);
        scheduler.advance_ms(100);
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn tasks_can_arm_new_timers_inside_the_window() {
        let (log, scheduler) = recorder();
        let sink = Rc::clone(&log);
        let inner_scheduler = Rc::clone(&scheduler);
        scheduler.set_timeout(
            Duration::from_millis(5),
            Box::new(move || {
                let sink = Rc::clone(&sink);
                let clock = Rc::clone(&inner_scheduler);
                inner_scheduler.set_timeout(
                    Duration::from_millis(5),
                    Box::new(move || sink.borrow_mut().push(clock.elapsed().as_millis())),
                );
            }),
        );
        scheduler.advance_ms(20);
        assert_eq!(*log.borrow(), vec![10]);
    }

    #[test]
    fn frames_run_only_when_requested() {
        let (log, scheduler) = recorder();
        let sink = Rc::clone(&log);
        let again = Rc::clone(&scheduler);
        let later = Rc::clone(&log);
        scheduler.request_frame(Box::new(move || {
            sink.borrow_mut().push(1);
            again.request_frame(Box::new(move || later.borrow_mut().push(2)));
        }));
        scheduler.advance_ms(100);
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.run_frame(), 1);
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(scheduler.pending_frames(), 1);
        assert_eq!(scheduler.run_frame(), 1);
        assert_eq!(*log.borrow(), vec![1, 2]);
    }
}
