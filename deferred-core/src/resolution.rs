//! The resolution procedure: how a handler's return value settles the
//! deferred returned by `then`.
use std::{cell::Cell, rc::Rc};

use crate::{
    deferred::{Deferred, Outcome},
    error::ErrorValue,
    value::Value,
};

/// Settle `next` according to `x`.
///
/// - `x` is `next` itself: reject with a chaining cycle error.
/// - `x` has a callable `then` member: adopt its eventual outcome.
/// - otherwise: fulfill with `x`.
///
/// The two callbacks handed to a foreign `then` share one latch per adoption:
/// only the first invocation of either has an effect, and a raise from `then`
/// after that is ignored.
pub(crate) fn resolve_with(next: &Deferred, x: Value) {
    if let Value::Deferred(d) = &x {
        if d.ptr_eq(next) {
            tracing::debug!(deferred = next.id(), "chaining cycle detected");
            next.settle(Outcome::Rejected, ErrorValue::chaining_cycle().into());
            return;
        }
    }

    if !x.has_members() {
        next.settle(Outcome::Fulfilled, x);
        return;
    }

    let called = Rc::new(Cell::new(false));

    let then = match x.get("then") {
        Ok(then) => then,
        Err(reason) => {
            tracing::debug!(deferred = next.id(), "reading `then` raised");
            called.set(true);
            next.settle(Outcome::Rejected, reason);
            return;
        }
    };
    let Some(then) = then.as_callable().cloned() else {
        next.settle(Outcome::Fulfilled, x);
        return;
    };

    let resolve_promise = {
        let next = next.clone();
        let called = called.clone();
        Value::function(move |args| {
            if !called.replace(true) {
                resolve_with(&next, args.into_iter().next().unwrap_or_default());
            }
            Ok(Value::Undefined)
        })
    };
    let reject_promise = {
        let next = next.clone();
        let called = called.clone();
        Value::function(move |args| {
            if !called.replace(true) {
                next.settle(
                    Outcome::Rejected,
                    args.into_iter().next().unwrap_or_default(),
                );
            }
            Ok(Value::Undefined)
        })
    };

    tracing::trace!(deferred = next.id(), "adopting thenable");
    if let Err(reason) = then.call(&x, vec![resolve_promise, reject_promise]) {
        if called.replace(true) {
            tracing::trace!(deferred = next.id(), "`then` raised after settling; ignoring");
        } else {
            tracing::debug!(deferred = next.id(), "`then` raised");
            next.settle(Outcome::Rejected, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        combinators::{reject, resolve},
        deferred::State,
        queue::TaskQueue,
        value::{Completion, Object},
    };
    use std::cell::RefCell;

    /// Resolve a fresh deferred with `x` through a `then` hop.
    fn through_then(queue: &TaskQueue, x: Value) -> Deferred {
        resolve(&queue.scheduler(), Value::Undefined).then_fulfilled(move |_| Ok(x.clone()))
    }

    fn thenable(then: impl Fn(Vec<Value>) -> Completion + 'static) -> Value {
        Value::record([("then", Value::function(then))])
    }

    fn call_arg(args: &[Value], i: usize, value: Value) {
        args[i]
            .as_callable()
            .unwrap()
            .call(&Value::Undefined, vec![value])
            .unwrap();
    }

    #[test]
    fn plain_values_fulfill() {
        let queue = TaskQueue::new();
        let next = through_then(&queue, "plain".into());
        queue.run_until_idle();
        assert_eq!(next.state(), State::Fulfilled("plain".into()));
    }

    #[test]
    fn object_without_then_fulfills_with_itself() {
        let queue = TaskQueue::new();
        let obj = Value::record([("then", Value::from(5))]);
        let next = through_then(&queue, obj.clone());
        queue.run_until_idle();
        assert_eq!(next.state(), State::Fulfilled(obj));
    }

    #[test]
    fn thenable_resolving_twice_only_counts_once() {
        let queue = TaskQueue::new();
        let x = thenable(|args| {
            call_arg(&args, 0, "first".into());
            call_arg(&args, 0, "second".into());
            call_arg(&args, 1, "third".into());
            Ok(Value::Undefined)
        });
        let next = through_then(&queue, x);
        queue.run_until_idle();
        assert_eq!(next.state(), State::Fulfilled("first".into()));
    }

    #[test]
    fn then_raising_after_resolve_is_ignored() {
        let queue = TaskQueue::new();
        let x = thenable(|args| {
            call_arg(&args, 0, 1.into());
            Err("too late".into())
        });
        let next = through_then(&queue, x);
        queue.run_until_idle();
        assert_eq!(next.state(), State::Fulfilled(1.into()));
    }

    #[test]
    fn then_raising_rejects() {
        let queue = TaskQueue::new();
        let next = through_then(&queue, thenable(|_| Err("broken".into())));
        queue.run_until_idle();
        assert_eq!(next.state(), State::Rejected("broken".into()));
    }

    struct ThrowingAccessor {
        reads: Rc<Cell<usize>>,
    }
    impl Object for ThrowingAccessor {
        fn get(&self, _key: &str) -> Completion {
            self.reads.set(self.reads.get() + 1);
            Err("accessor".into())
        }
    }

    #[test]
    fn throwing_then_accessor_rejects_after_one_read() {
        let queue = TaskQueue::new();
        let reads = Rc::new(Cell::new(0));
        let x = Value::Object(Rc::new(ThrowingAccessor {
            reads: reads.clone(),
        }));
        let next = through_then(&queue, x);
        queue.run_until_idle();
        assert_eq!(next.state(), State::Rejected("accessor".into()));
        assert_eq!(reads.get(), 1);
    }

    #[test]
    fn then_is_called_with_the_thenable_as_this() {
        let queue = TaskQueue::new();
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        let x = Value::record([(
            "then",
            Value::method(move |this, args| {
                *seen2.borrow_mut() = Some(this.clone());
                call_arg(&args, 0, Value::Null);
                Ok(Value::Undefined)
            }),
        )]);
        through_then(&queue, x.clone());
        queue.run_until_idle();
        assert_eq!(seen.borrow().clone(), Some(x));
    }

    /// A thenable that resolves with another thenable is unwrapped recursively.
    #[test]
    fn nested_thenables_are_unwrapped() {
        let queue = TaskQueue::new();
        let s = queue.scheduler();
        let inner_deferred = resolve(&s, 42.into());
        let inner = thenable(move |args| {
            call_arg(&args, 0, inner_deferred.clone().into());
            Ok(Value::Undefined)
        });
        let outer = thenable(move |args| {
            call_arg(&args, 0, inner.clone());
            Ok(Value::Undefined)
        });
        let next = through_then(&queue, outer);
        queue.run_until_idle();
        assert_eq!(next.state(), State::Fulfilled(42.into()));
    }

    #[test]
    fn adopting_a_rejected_deferred_rejects() {
        let queue = TaskQueue::new();
        let s = queue.scheduler();
        let next = through_then(&queue, reject(&s, "no".into()).into());
        queue.run_until_idle();
        assert_eq!(next.state(), State::Rejected("no".into()));
    }

    /// A thenable that never calls back leaves the chain pending.
    #[test]
    fn silent_thenable_stays_pending() {
        let queue = TaskQueue::new();
        let next = through_then(&queue, thenable(|_| Ok(Value::Undefined)));
        queue.run_until_idle();
        assert!(next.is_pending());
    }
}
