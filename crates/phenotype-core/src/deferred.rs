//! One-shot asynchronous completion token.
//!
//! A member that cannot answer synchronously returns a
//! [`Value::Deferred`](crate::Value::Deferred); callers attach a
//! continuation instead of assuming the call has finished. The token
//! completes at most once with an `(error, value)` pair.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::error::Error;
use crate::id::DeferredId;
use crate::scheduler::{Scheduler, SchedulerState, TimerId};
use crate::value::Value;

/// Listener invoked with the `(error, value)` outcome.
pub type Continuation = Box<dyn FnOnce(Option<Error>, Value)>;

type Outcome = (Option<Error>, Value);

#[derive(Default)]
struct State {
    outcome: Option<Outcome>,
    listeners: Vec<Continuation>,
    callback: Option<Continuation>,
    timer: Option<(Weak<RefCell<SchedulerState>>, TimerId)>,
}

struct DeferredInner {
    id: DeferredId,
    timeout: Cell<Option<Duration>>,
    state: RefCell<State>,
}

/// A pending or completed asynchronous result.
///
/// Cloning shares the token. Listeners registered with
/// [`on_complete`](Self::on_complete) run in registration order, followed
/// by the single terminal callback set with
/// [`set_callback`](Self::set_callback). Registering either after
/// completion invokes it immediately with the stored outcome.
#[derive(Clone)]
pub struct Deferred(Rc<DeferredInner>);

impl Deferred {
    /// A pending token with no timeout.
    pub fn new() -> Self {
        Self(Rc::new(DeferredInner {
            id: DeferredId::next(),
            timeout: Cell::new(None),
            state: RefCell::new(State::default()),
        }))
    }

    /// A pending token that fails with [`Error::Timeout`] if it is still
    /// pending once `after` has elapsed on `scheduler`.
    pub fn with_timeout(scheduler: &Scheduler, after: Duration) -> Self {
        let deferred = Self::new();
        deferred.0.timeout.set(Some(after));
        let token = deferred.clone();
        let timer = scheduler.schedule(after, move || {
            if !token.is_complete() {
                tracing::debug!(token = %token.id(), ?after, "deferred timed out");
                token.fail(Error::Timeout {
                    token: token.id(),
                    after,
                });
            }
        });
        deferred.0.state.borrow_mut().timer = Some((scheduler.downgrade(), timer));
        deferred
    }

    /// Unique token id.
    pub fn id(&self) -> DeferredId {
        self.0.id
    }

    /// The configured timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.0.timeout.get()
    }

    /// Whether the token has completed.
    pub fn is_complete(&self) -> bool {
        self.0.state.borrow().outcome.is_some()
    }

    /// The stored outcome, once complete.
    pub fn outcome(&self) -> Option<(Option<Error>, Value)> {
        self.0.state.borrow().outcome.clone()
    }

    /// Complete with `(error, value)`.
    ///
    /// Only the first call has effect; returns whether this call was it.
    pub fn complete(&self, error: Option<Error>, value: Value) -> bool {
        let (listeners, callback, timer) = {
            let mut state = self.0.state.borrow_mut();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some((error.clone(), value.clone()));
            (
                std::mem::take(&mut state.listeners),
                state.callback.take(),
                state.timer.take(),
            )
        };
        if let Some((scheduler, id)) = timer {
            Scheduler::cancel_weak(&scheduler, id);
        }
        for listener in listeners {
            listener(error.clone(), value.clone());
        }
        if let Some(callback) = callback {
            callback(error, value);
        }
        true
    }

    /// Complete successfully.
    pub fn done(&self, value: impl Into<Value>) -> bool {
        self.complete(None, value.into())
    }

    /// Complete with an error.
    pub fn fail(&self, error: Error) -> bool {
        self.complete(Some(error), Value::Null)
    }

    /// Register a listener.
    pub fn on_complete(&self, listener: impl FnOnce(Option<Error>, Value) + 'static) {
        let mut state = self.0.state.borrow_mut();
        if let Some((error, value)) = state.outcome.clone() {
            drop(state);
            listener(error, value);
            return;
        }
        state.listeners.push(Box::new(listener));
    }

    /// Set the terminal callback, replacing any previous one.
    pub fn set_callback(&self, callback: impl FnOnce(Option<Error>, Value) + 'static) {
        let mut state = self.0.state.borrow_mut();
        if let Some((error, value)) = state.outcome.clone() {
            drop(state);
            callback(error, value);
            return;
        }
        state.callback = Some(Box::new(callback));
    }

    /// Whether both handles share one token.
    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Deferred {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_complete() { "complete" } else { "pending" };
        write!(f, "Deferred(#{}, {state})", self.0.id)
    }
}
