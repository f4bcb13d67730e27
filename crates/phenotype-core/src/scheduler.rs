//! Cooperative single-threaded timer queue on a virtual clock.
//!
//! Nothing runs until the owner drives the clock with
//! [`Scheduler::advance`] or [`Scheduler::run_until_idle`]. Tasks fire in
//! deadline order; tasks sharing a deadline fire in scheduling order.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

type Task = Box<dyn FnOnce()>;

/// Handle of a scheduled task.
///
/// Orders by deadline, then by scheduling sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId {
    deadline: Duration,
    seq: u64,
}

impl TimerId {
    /// Virtual time at which the task fires.
    pub fn deadline(self) -> Duration {
        self.deadline
    }
}

#[derive(Default)]
pub(crate) struct SchedulerState {
    now: Duration,
    seq: u64,
    queue: BTreeMap<TimerId, Task>,
}

/// A virtual-time task queue.
///
/// Cloning shares the queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl Scheduler {
    /// An empty queue at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Run `task` once `delay` has elapsed.
    pub fn schedule(&self, delay: Duration, task: impl FnOnce() + 'static) -> TimerId {
        let mut state = self.state.borrow_mut();
        state.seq += 1;
        let id = TimerId {
            deadline: state.now.saturating_add(delay),
            seq: state.seq,
        };
        state.queue.insert(id, Box::new(task));
        id
    }

    /// Drop a task that has not fired yet. Returns whether it was queued.
    pub fn cancel(&self, id: TimerId) -> bool {
        self.state.borrow_mut().queue.remove(&id).is_some()
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Deadline of the next task to fire.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state
            .borrow()
            .queue
            .first_key_value()
            .map(|(id, _)| id.deadline)
    }

    /// Move the clock forward by `by`, firing every task due on the way.
    ///
    /// Tasks scheduled while advancing fire too if they fall due before
    /// the target time. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now().saturating_add(by);
        let mut ran = 0;
        while let Some(task) = self.pop_due(target) {
            task();
            ran += 1;
        }
        self.state.borrow_mut().now = target;
        ran
    }

    /// Fire tasks until the queue is empty, jumping the clock to each
    /// deadline. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop_due(Duration::MAX) {
            task();
            ran += 1;
        }
        ran
    }

    fn pop_due(&self, target: Duration) -> Option<Task> {
        let mut state = self.state.borrow_mut();
        let entry = state.queue.first_entry()?;
        if entry.key().deadline > target {
            return None;
        }
        let deadline = entry.key().deadline;
        let task = entry.remove();
        state.now = state.now.max(deadline);
        Some(task)
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<SchedulerState>> {
        Rc::downgrade(&self.state)
    }

    pub(crate) fn cancel_weak(state: &Weak<RefCell<SchedulerState>>, id: TimerId) {
        if let Some(state) = state.upgrade() {
            // The timer may be cancelled from inside a running task.
            if let Ok(mut state) = state.try_borrow_mut() {
                state.queue.remove(&id);
            }
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}
