//! The settlement state machine, [`Deferred`].
use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    combinators,
    error::ErrorValue,
    queue::Scheduler,
    resolution,
    value::{Callable, Completion, Value},
};

/// A continuation passed to [`Deferred::then`]. Returning `Err` rejects the
/// chained deferred.
pub type Handler = Rc<dyn Fn(Value) -> Completion>;

/// Wrap a closure as a [`Handler`].
pub fn handler(f: impl Fn(Value) -> Completion + 'static) -> Handler {
    Rc::new(f)
}

fn identity() -> Handler {
    Rc::new(|value: Value| -> Completion { Ok(value) })
}

fn rethrow() -> Handler {
    Rc::new(|reason: Value| -> Completion { Err(reason) })
}

#[derive(Clone, Debug, PartialEq)]
pub enum State {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Fulfilled,
    Rejected,
}

/// A registered continuation, waiting for the settled value or reason.
type Reaction = Box<dyn FnOnce(Value)>;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

struct Shared {
    id: u64,
    scheduler: Scheduler,
    cell: RefCell<Inner>,
}

struct Inner {
    state: State,
    /// Only populated while pending.
    fulfill_reactions: Vec<Reaction>,
    /// Only populated while pending.
    reject_reactions: Vec<Reaction>,
}

/// A value that is available now, later, or never (with a reason).
///
/// Clones refer to the same computation.
#[derive(Clone)]
pub struct Deferred {
    shared: Rc<Shared>,
}

impl Deferred {
    /// Create a deferred and run `executor` immediately with its `fulfill` and
    /// `reject` capabilities. An `Err` from the executor rejects the deferred,
    /// unless a capability already settled it.
    pub fn new<E>(scheduler: &Scheduler, executor: E) -> Deferred
    where
        E: FnOnce(Capability, Capability) -> Result<(), Value>,
    {
        let deferred = Deferred::pending(scheduler);
        let fulfill = Capability::new(deferred.clone(), Outcome::Fulfilled);
        let reject = Capability::new(deferred.clone(), Outcome::Rejected);
        if let Err(reason) = executor(fulfill, reject.clone()) {
            tracing::trace!(deferred = deferred.id(), "executor raised");
            reject.call(reason);
        }
        deferred
    }

    pub(crate) fn pending(scheduler: &Scheduler) -> Deferred {
        Deferred {
            shared: Rc::new(Shared {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                scheduler: scheduler.clone(),
                cell: RefCell::new(Inner {
                    state: State::Pending,
                    fulfill_reactions: Vec::new(),
                    reject_reactions: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }

    pub fn state(&self) -> State {
        self.shared.cell.borrow().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.shared.cell.borrow().state, State::Pending)
    }

    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Leave the pending state. Does nothing if already settled.
    ///
    /// Reactions for `outcome` are scheduled one task each, in registration
    /// order; both lists are cleared.
    ///
    /// Fulfilling a deferred with itself rejects it with a chaining cycle
    /// error instead.
    pub(crate) fn settle(&self, outcome: Outcome, value: Value) {
        let is_self = value.as_deferred().is_some_and(|d| d.ptr_eq(self));
        if outcome == Outcome::Fulfilled && is_self {
            tracing::debug!(deferred = self.id(), "fulfilled with itself");
            return self.settle(Outcome::Rejected, ErrorValue::chaining_cycle().into());
        }
        let reactions = {
            let mut inner = self.shared.cell.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                tracing::trace!(deferred = self.id(), ?outcome, "already settled; ignoring");
                return;
            }
            inner.state = match outcome {
                Outcome::Fulfilled => State::Fulfilled(value.clone()),
                Outcome::Rejected => State::Rejected(value.clone()),
            };
            let fulfill_reactions = std::mem::take(&mut inner.fulfill_reactions);
            let reject_reactions = std::mem::take(&mut inner.reject_reactions);
            match outcome {
                Outcome::Fulfilled => fulfill_reactions,
                Outcome::Rejected => reject_reactions,
            }
        };
        tracing::trace!(
            deferred = self.id(),
            ?outcome,
            reactions = reactions.len(),
            "settled"
        );
        for reaction in reactions {
            let value = value.clone();
            self.shared
                .scheduler
                .schedule_later(move || reaction(value));
        }
    }

    /// Register continuations and return the deferred that represents their
    /// result.
    ///
    /// A missing `on_fulfilled` passes the value through; a missing
    /// `on_rejected` passes the reason through. The applicable handler always
    /// runs from the scheduler, even when `self` is already settled.
    pub fn then(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Deferred {
        let next = Deferred::pending(&self.shared.scheduler);
        let on_fulfilled = reaction(next.clone(), on_fulfilled.unwrap_or_else(identity));
        let on_rejected = reaction(next.clone(), on_rejected.unwrap_or_else(rethrow));

        let settled = {
            let mut inner = self.shared.cell.borrow_mut();
            match &inner.state {
                State::Pending => {
                    inner.fulfill_reactions.push(on_fulfilled);
                    inner.reject_reactions.push(on_rejected);
                    None
                }
                State::Fulfilled(value) => Some((on_fulfilled, value.clone())),
                State::Rejected(reason) => Some((on_rejected, reason.clone())),
            }
        };
        if let Some((reaction, value)) = settled {
            self.shared
                .scheduler
                .schedule_later(move || reaction(value));
        }
        next
    }

    /// [`Deferred::then`] for dynamically typed handlers: anything that is not
    /// a [`Value::Function`] counts as a missing handler.
    pub fn then_dynamic(&self, on_fulfilled: &Value, on_rejected: &Value) -> Deferred {
        self.then(callable_handler(on_fulfilled), callable_handler(on_rejected))
    }

    pub fn then_fulfilled(&self, on_fulfilled: impl Fn(Value) -> Completion + 'static) -> Deferred {
        self.then(Some(handler(on_fulfilled)), None)
    }

    pub fn catch(&self, on_rejected: impl Fn(Value) -> Completion + 'static) -> Deferred {
        self.then(None, Some(handler(on_rejected)))
    }

    /// Run `on_settled` on either outcome, then settle like `self` did.
    ///
    /// If `on_settled` raises, or returns something that rejects, the result
    /// rejects with that reason instead.
    pub fn finally(&self, on_settled: impl Fn() -> Completion + 'static) -> Deferred {
        let on_settled = Rc::new(on_settled);
        let scheduler = self.scheduler().clone();
        let on_fulfilled = {
            let on_settled = on_settled.clone();
            let scheduler = scheduler.clone();
            handler(move |value| {
                let waited = on_settled()?;
                Ok(combinators::adopt(&scheduler, waited)
                    .then_fulfilled(move |_| Ok(value.clone()))
                    .into())
            })
        };
        let on_rejected = handler(move |reason| {
            let waited = on_settled()?;
            Ok(combinators::adopt(&scheduler, waited)
                .then_fulfilled(move |_| Err(reason.clone()))
                .into())
        });
        self.then(Some(on_fulfilled), Some(on_rejected))
    }

    /// The `then` member this deferred exposes to the resolution procedure.
    pub(crate) fn then_member(&self) -> Callable {
        let this = self.clone();
        Callable::new(move |args| {
            let mut args = args.into_iter();
            let on_fulfilled = args.next().unwrap_or_default();
            let on_rejected = args.next().unwrap_or_default();
            Ok(Value::Deferred(this.then_dynamic(&on_fulfilled, &on_rejected)))
        })
    }
}

fn reaction(next: Deferred, handler: Handler) -> Reaction {
    Box::new(move |argument| match handler(argument) {
        Ok(x) => resolution::resolve_with(&next, x),
        Err(reason) => next.settle(Outcome::Rejected, reason),
    })
}

fn callable_handler(value: &Value) -> Option<Handler> {
    value
        .as_callable()
        .cloned()
        .map(|f| handler(move |argument| f.call(&Value::Undefined, vec![argument])))
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shared.cell.try_borrow() {
            Ok(inner) => write!(f, "Deferred(#{}, {:?})", self.id(), inner.state),
            Err(_) => write!(f, "Deferred(#{}, <busy>)", self.id()),
        }
    }
}

/// One of the two settlement capabilities handed to an executor.
///
/// Only the first call on either capability of a deferred has any effect.
#[derive(Clone)]
pub struct Capability {
    target: Deferred,
    outcome: Outcome,
}
impl Capability {
    fn new(target: Deferred, outcome: Outcome) -> Self {
        Capability { target, outcome }
    }

    /// Settle the target with `value`. The value is stored as is; thenables
    /// are not unwrapped here.
    pub fn call(&self, value: Value) {
        self.target.settle(self.outcome, value);
    }

    /// This capability as a function value, taking the value as its first
    /// argument.
    pub fn into_function(self) -> Callable {
        Callable::new(move |args| {
            self.call(args.into_iter().next().unwrap_or_default());
            Ok(Value::Undefined)
        })
    }
}
impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({:?}, #{})", self.outcome, self.target.id())
    }
}
