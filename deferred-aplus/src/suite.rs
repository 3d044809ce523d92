//! The Promises/A+ cases, numbered after the sections of the standard.

use std::{
    cell::{Cell, RefCell},
    fmt::Display,
    rc::Rc,
};

use anyhow::{anyhow, bail, ensure, Result};
use deferred_core::{handler, Completion, Handler, Object, State, Value};
use serde::Serialize;

use crate::{Adapter, DeferredAdapter};

pub struct Case {
    pub id: &'static str,
    pub description: &'static str,
    pub run: fn(&dyn Adapter) -> Result<()>,
}

#[derive(Serialize)]
pub struct CaseResult {
    pub id: &'static str,
    pub description: &'static str,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct Report {
    pub results: Vec<CaseResult>,
}
impl Report {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_none()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results.iter().filter(|r| r.error.is_some())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}
impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for r in &self.results {
            match &r.error {
                None => writeln!(f, "  ok     {} {}", r.id, r.description)?,
                Some(e) => writeln!(f, "  FAILED {} {}: {}", r.id, r.description, e)?,
            }
        }
        write!(
            f,
            "{} passed, {} failed",
            self.passed(),
            self.results.len() - self.passed()
        )
    }
}

/// Run every case, each against a fresh adapter from `new_adapter`.
pub fn run_with<A: Adapter>(new_adapter: impl Fn() -> A) -> Report {
    let results = cases()
        .into_iter()
        .map(|case| {
            let _span = tracing::info_span!("case", id = case.id).entered();
            let adapter = new_adapter();
            let error = (case.run)(&adapter).err().map(|e| format!("{:#}", e));
            match &error {
                None => tracing::debug!("passed"),
                Some(e) => tracing::warn!(error = %e, "failed"),
            }
            CaseResult {
                id: case.id,
                description: case.description,
                error,
            }
        })
        .collect();
    Report { results }
}

pub fn run_all() -> Report {
    run_with(DeferredAdapter::new)
}

/// Records the arguments of every call to its handlers.
#[derive(Clone, Default)]
struct Calls {
    values: Rc<RefCell<Vec<Value>>>,
}
impl Calls {
    fn handler(&self) -> Handler {
        let values = self.values.clone();
        handler(move |v| {
            values.borrow_mut().push(v);
            Ok(Value::Undefined)
        })
    }

    fn values(&self) -> Vec<Value> {
        self.values.borrow().clone()
    }

    fn count(&self) -> usize {
        self.values.borrow().len()
    }
}

/// An object that is only equal to itself.
fn sentinel(name: &str) -> Value {
    Value::record([("sentinel", Value::from(name))])
}

fn expect_state(actual: State, expected: State) -> Result<()> {
    ensure!(actual == expected, "expected {:?}, got {:?}", expected, actual);
    Ok(())
}

/// Call argument `i` of a `then` invocation with `value`.
fn call_arg(args: &[Value], i: usize, value: Value) -> Completion {
    match args.get(i).and_then(Value::as_callable) {
        Some(f) => f.call(&Value::Undefined, vec![value]),
        None => Err("`then` was not given a callable argument".into()),
    }
}

/// A raised [`Value`] as an error of the harness itself.
fn raised(reason: Value) -> anyhow::Error {
    anyhow!("callback raised {:?}", reason)
}

fn thenable(then: impl Fn(Vec<Value>) -> Completion + 'static) -> Value {
    Value::record([("then", Value::function(then))])
}

/// Returns `x` from a fulfillment handler, so that `x` goes through the
/// resolution procedure. Returns the deferred of that handler's result.
fn resolved_through_then(adapter: &dyn Adapter, x: Value) -> deferred_core::Deferred {
    adapter
        .resolved(Value::Undefined)
        .then_fulfilled(move |_| Ok(x.clone()))
}

pub fn cases() -> Vec<Case> {
    vec![
        Case {
            id: "2.1.2",
            description: "a fulfilled deferred cannot be rejected or refulfilled",
            run: fulfilled_is_final,
        },
        Case {
            id: "2.1.3",
            description: "a rejected deferred cannot be fulfilled or rerejected",
            run: rejected_is_final,
        },
        Case {
            id: "2.2.1",
            description: "non-function handlers are ignored",
            run: non_function_handlers_ignored,
        },
        Case {
            id: "2.2.2",
            description: "onFulfilled is called once, after fulfillment, with the value",
            run: on_fulfilled_called_once_with_value,
        },
        Case {
            id: "2.2.3",
            description: "onRejected is called once, after rejection, with the reason",
            run: on_rejected_called_once_with_reason,
        },
        Case {
            id: "2.2.4",
            description: "handlers are not called until the caller's turn has finished",
            run: handlers_are_asynchronous,
        },
        Case {
            id: "2.2.4/pending",
            description: "handlers registered before a same-turn settlement are still deferred",
            run: handlers_deferred_after_same_turn_settlement,
        },
        Case {
            id: "2.2.6.1",
            description: "multiple onFulfilled handlers run in registration order",
            run: fulfilled_handlers_in_order,
        },
        Case {
            id: "2.2.6.2",
            description: "multiple onRejected handlers run in registration order",
            run: rejected_handlers_in_order,
        },
        Case {
            id: "2.2.6/nested",
            description: "a handler registered from within a handler still runs",
            run: nested_registration,
        },
        Case {
            id: "2.2.7",
            description: "then returns a new deferred",
            run: then_returns_new_deferred,
        },
        Case {
            id: "2.2.7.1",
            description: "a handler's return value goes through the resolution procedure",
            run: handler_return_value_resolves_next,
        },
        Case {
            id: "2.2.7.2",
            description: "a handler that raises rejects the returned deferred",
            run: handler_raise_rejects_next,
        },
        Case {
            id: "2.2.7.3",
            description: "without onFulfilled, the returned deferred fulfills with the same value",
            run: missing_on_fulfilled_passes_value,
        },
        Case {
            id: "2.2.7.4",
            description: "without onRejected, the returned deferred rejects with the same reason",
            run: missing_on_rejected_passes_reason,
        },
        Case {
            id: "2.3.1",
            description: "resolving a deferred with itself rejects with a TypeError",
            run: self_resolution_is_type_error,
        },
        Case {
            id: "2.3.2",
            description: "a deferred returned from a handler is adopted in every state",
            run: deferred_is_adopted,
        },
        Case {
            id: "2.3.3.1",
            description: "`then` is read exactly once",
            run: then_read_once,
        },
        Case {
            id: "2.3.3.2",
            description: "a raising `then` accessor rejects",
            run: raising_then_accessor,
        },
        Case {
            id: "2.3.3.3",
            description: "`then` is called with the thenable as `this`",
            run: then_called_with_this,
        },
        Case {
            id: "2.3.3.3.1",
            description: "a thenable's value is resolved recursively",
            run: thenable_value_resolved_recursively,
        },
        Case {
            id: "2.3.3.3.2",
            description: "a thenable's rejection reason is not resolved",
            run: thenable_reason_not_resolved,
        },
        Case {
            id: "2.3.3.3.3",
            description: "only the first call to either thenable callback counts",
            run: first_thenable_call_wins,
        },
        Case {
            id: "2.3.3.3.4",
            description: "a raise from `then` counts only if no callback was called",
            run: raising_then_after_callback,
        },
        Case {
            id: "2.3.3.4",
            description: "an object with a non-function `then` fulfills as is",
            run: non_function_then_member,
        },
        Case {
            id: "2.3.4",
            description: "scalar values fulfill as is",
            run: scalars_fulfill,
        },
    ]
}

fn fulfilled_is_final(adapter: &dyn Adapter) -> Result<()> {
    let d = adapter.deferred();
    let (fulfilled, rejected) = (Calls::default(), Calls::default());
    d.promise
        .then(Some(fulfilled.handler()), Some(rejected.handler()));
    d.resolve.call(1.into());
    d.reject.call(2.into());
    d.resolve.call(3.into());
    adapter.drain();
    ensure!(
        fulfilled.values() == vec![Value::from(1)],
        "onFulfilled calls: {:?}",
        fulfilled.values()
    );
    ensure!(rejected.count() == 0, "onRejected was called");
    expect_state(d.promise.state(), State::Fulfilled(1.into()))
}

fn rejected_is_final(adapter: &dyn Adapter) -> Result<()> {
    let d = adapter.deferred();
    let (fulfilled, rejected) = (Calls::default(), Calls::default());
    d.promise
        .then(Some(fulfilled.handler()), Some(rejected.handler()));
    d.reject.call(1.into());
    d.resolve.call(2.into());
    d.reject.call(3.into());
    adapter.drain();
    ensure!(rejected.values() == vec![Value::from(1)], "onRejected calls: {:?}", rejected.values());
    ensure!(fulfilled.count() == 0, "onFulfilled was called");
    expect_state(d.promise.state(), State::Rejected(1.into()))
}

fn non_function_handlers_ignored(adapter: &dyn Adapter) -> Result<()> {
    let non_functions = [
        Value::Undefined,
        Value::Null,
        Value::from(false),
        Value::from(5),
        Value::from("then"),
        Value::record([("then", Value::Undefined)]),
    ];
    for non_function in non_functions {
        let a = adapter
            .resolved("v".into())
            .then_dynamic(&non_function, &non_function);
        let b = adapter
            .rejected("r".into())
            .then_dynamic(&non_function, &non_function);
        adapter.drain();
        expect_state(a.state(), State::Fulfilled("v".into()))?;
        expect_state(b.state(), State::Rejected("r".into()))?;
    }
    Ok(())
}

fn on_fulfilled_called_once_with_value(adapter: &dyn Adapter) -> Result<()> {
    let value = sentinel("value");
    let d = adapter.deferred();
    let calls = Calls::default();
    d.promise.then(Some(calls.handler()), None);
    adapter.drain();
    ensure!(calls.count() == 0, "called before fulfillment");
    d.resolve.call(value.clone());
    d.resolve.call(value.clone());
    adapter.drain();
    ensure!(calls.values() == vec![value], "calls: {:?}", calls.values());
    Ok(())
}

fn on_rejected_called_once_with_reason(adapter: &dyn Adapter) -> Result<()> {
    let reason = sentinel("reason");
    let d = adapter.deferred();
    let calls = Calls::default();
    d.promise.then(None, Some(calls.handler()));
    adapter.drain();
    ensure!(calls.count() == 0, "called before rejection");
    d.reject.call(reason.clone());
    d.reject.call(reason.clone());
    adapter.drain();
    ensure!(calls.values() == vec![reason], "calls: {:?}", calls.values());
    Ok(())
}

fn handlers_are_asynchronous(adapter: &dyn Adapter) -> Result<()> {
    let (fulfilled, rejected) = (Calls::default(), Calls::default());
    adapter
        .resolved(1.into())
        .then(Some(fulfilled.handler()), None);
    adapter.rejected(2.into()).then(None, Some(rejected.handler()));
    ensure!(fulfilled.count() == 0, "onFulfilled ran inside `then`");
    ensure!(rejected.count() == 0, "onRejected ran inside `then`");
    adapter.drain();
    ensure!(fulfilled.count() == 1 && rejected.count() == 1, "handlers did not run");
    Ok(())
}

fn handlers_deferred_after_same_turn_settlement(adapter: &dyn Adapter) -> Result<()> {
    let d = adapter.deferred();
    let calls = Calls::default();
    d.promise.then(Some(calls.handler()), None);
    d.resolve.call(1.into());
    ensure!(calls.count() == 0, "onFulfilled ran inside the settlement call");
    adapter.drain();
    ensure!(calls.count() == 1, "onFulfilled did not run");
    Ok(())
}

fn handlers_in_order(adapter: &dyn Adapter, reject: bool) -> Result<()> {
    let d = adapter.deferred();
    let order = Rc::new(RefCell::new(Vec::new()));
    for i in 0..3 {
        let order = order.clone();
        let h = handler(move |_| {
            order.borrow_mut().push(i);
            Ok(Value::Undefined)
        });
        if reject {
            d.promise.then(None, Some(h));
        } else {
            d.promise.then(Some(h), None);
        }
    }
    if reject {
        d.reject.call(Value::Undefined);
    } else {
        d.resolve.call(Value::Undefined);
    }
    adapter.drain();
    ensure!(*order.borrow() == vec![0, 1, 2], "order: {:?}", order.borrow());
    Ok(())
}

fn fulfilled_handlers_in_order(adapter: &dyn Adapter) -> Result<()> {
    handlers_in_order(adapter, false)
}

fn rejected_handlers_in_order(adapter: &dyn Adapter) -> Result<()> {
    handlers_in_order(adapter, true)
}

fn nested_registration(adapter: &dyn Adapter) -> Result<()> {
    let p = adapter.resolved("v".into());
    let inner = Calls::default();
    {
        let p2 = p.clone();
        let inner = inner.clone();
        p.then_fulfilled(move |_| {
            p2.then(Some(inner.handler()), None);
            Ok(Value::Undefined)
        });
    }
    adapter.drain();
    ensure!(inner.values() == vec![Value::from("v")], "calls: {:?}", inner.values());
    Ok(())
}

fn then_returns_new_deferred(adapter: &dyn Adapter) -> Result<()> {
    let p = adapter.resolved(1.into());
    let next = p.then(None, None);
    ensure!(!next.ptr_eq(&p), "`then` returned its receiver");
    Ok(())
}

fn handler_return_value_resolves_next(adapter: &dyn Adapter) -> Result<()> {
    let value = sentinel("returned");
    let a = {
        let value = value.clone();
        adapter
            .resolved(Value::Undefined)
            .then_fulfilled(move |_| Ok(value.clone()))
    };
    let b = {
        let value = value.clone();
        adapter
            .rejected(Value::Undefined)
            .catch(move |_| Ok(value.clone()))
    };
    adapter.drain();
    expect_state(a.state(), State::Fulfilled(value.clone()))?;
    expect_state(b.state(), State::Fulfilled(value))
}

fn handler_raise_rejects_next(adapter: &dyn Adapter) -> Result<()> {
    let reason = sentinel("raised");
    let a = {
        let reason = reason.clone();
        adapter
            .resolved(Value::Undefined)
            .then_fulfilled(move |_| Err(reason.clone()))
    };
    let b = {
        let reason = reason.clone();
        adapter
            .rejected(Value::Undefined)
            .catch(move |_| Err(reason.clone()))
    };
    adapter.drain();
    expect_state(a.state(), State::Rejected(reason.clone()))?;
    expect_state(b.state(), State::Rejected(reason))
}

fn missing_on_fulfilled_passes_value(adapter: &dyn Adapter) -> Result<()> {
    let value = sentinel("value");
    let next = adapter
        .resolved(value.clone())
        .then(None, Some(handler(|_| Ok("wrong".into()))));
    adapter.drain();
    expect_state(next.state(), State::Fulfilled(value))
}

fn missing_on_rejected_passes_reason(adapter: &dyn Adapter) -> Result<()> {
    let reason = sentinel("reason");
    let next = adapter
        .rejected(reason.clone())
        .then(Some(handler(|_| Ok("wrong".into()))), None);
    adapter.drain();
    expect_state(next.state(), State::Rejected(reason))
}

fn self_resolution_is_type_error(adapter: &dyn Adapter) -> Result<()> {
    let slot: Rc<RefCell<Option<deferred_core::Deferred>>> = Rc::new(RefCell::new(None));
    let next = {
        let slot = slot.clone();
        adapter.resolved(Value::Undefined).then_fulfilled(move |_| {
            Ok(slot
                .borrow()
                .clone()
                .map(Value::Deferred)
                .unwrap_or_default())
        })
    };
    *slot.borrow_mut() = Some(next.clone());
    adapter.drain();
    slot.borrow_mut().take();
    match next.state() {
        State::Rejected(Value::Error(e)) if e.is_chaining_cycle() && e.name() == "TypeError" => {
            Ok(())
        }
        other => bail!("expected a TypeError rejection, got {:?}", other),
    }
}

fn deferred_is_adopted(adapter: &dyn Adapter) -> Result<()> {
    let value = sentinel("value");
    let reason = sentinel("reason");

    let already_fulfilled = resolved_through_then(adapter, adapter.resolved(value.clone()).into());
    let already_rejected = resolved_through_then(adapter, adapter.rejected(reason.clone()).into());

    let later_fulfilled = adapter.deferred();
    let later_rejected = adapter.deferred();
    let eventually_fulfilled =
        resolved_through_then(adapter, later_fulfilled.promise.clone().into());
    let eventually_rejected =
        resolved_through_then(adapter, later_rejected.promise.clone().into());

    adapter.drain();
    ensure!(eventually_fulfilled.is_pending(), "adopted a pending deferred too early");
    ensure!(eventually_rejected.is_pending(), "adopted a pending deferred too early");
    later_fulfilled.resolve.call(value.clone());
    later_rejected.reject.call(reason.clone());
    adapter.drain();

    expect_state(already_fulfilled.state(), State::Fulfilled(value.clone()))?;
    expect_state(already_rejected.state(), State::Rejected(reason.clone()))?;
    expect_state(eventually_fulfilled.state(), State::Fulfilled(value))?;
    expect_state(eventually_rejected.state(), State::Rejected(reason))
}

struct CountingThenable {
    reads: Rc<Cell<usize>>,
}
impl Object for CountingThenable {
    fn get(&self, key: &str) -> Completion {
        if key != "then" {
            return Ok(Value::Undefined);
        }
        self.reads.set(self.reads.get() + 1);
        Ok(Value::function(|args| call_arg(&args, 0, "once".into())))
    }
}

fn then_read_once(adapter: &dyn Adapter) -> Result<()> {
    let reads = Rc::new(Cell::new(0));
    let x = Value::Object(Rc::new(CountingThenable {
        reads: reads.clone(),
    }));
    let next = resolved_through_then(adapter, x);
    adapter.drain();
    ensure!(reads.get() == 1, "`then` was read {} times", reads.get());
    expect_state(next.state(), State::Fulfilled("once".into()))
}

struct RaisingAccessor {
    reason: Value,
}
impl Object for RaisingAccessor {
    fn get(&self, _key: &str) -> Completion {
        Err(self.reason.clone())
    }
}

fn raising_then_accessor(adapter: &dyn Adapter) -> Result<()> {
    let reason = sentinel("accessor");
    let x = Value::Object(Rc::new(RaisingAccessor {
        reason: reason.clone(),
    }));
    let next = resolved_through_then(adapter, x);
    adapter.drain();
    expect_state(next.state(), State::Rejected(reason))
}

fn then_called_with_this(adapter: &dyn Adapter) -> Result<()> {
    let seen = Rc::new(RefCell::new(Value::Undefined));
    let x = {
        let seen = seen.clone();
        Value::record([(
            "then",
            Value::method(move |this, args| {
                *seen.borrow_mut() = this.clone();
                call_arg(&args, 0, Value::Undefined)
            }),
        )])
    };
    resolved_through_then(adapter, x.clone());
    adapter.drain();
    ensure!(*seen.borrow() == x, "`this` was {:?}", seen.borrow());
    Ok(())
}

fn thenable_value_resolved_recursively(adapter: &dyn Adapter) -> Result<()> {
    let value = sentinel("value");

    // A thenable that fulfills with a thenable that fulfills with a deferred.
    let innermost = adapter.deferred();
    let middle = {
        let innermost = innermost.promise.clone();
        thenable(move |args| call_arg(&args, 0, innermost.clone().into()))
    };
    let outer = thenable(move |args| call_arg(&args, 0, middle.clone()));

    let next = resolved_through_then(adapter, outer);
    adapter.drain();
    ensure!(next.is_pending(), "settled before the innermost deferred");
    innermost.resolve.call(value.clone());
    adapter.drain();
    expect_state(next.state(), State::Fulfilled(value))
}

fn thenable_reason_not_resolved(adapter: &dyn Adapter) -> Result<()> {
    let reason = adapter.resolved("not unwrapped".into());
    let x = {
        let reason = reason.clone();
        thenable(move |args| call_arg(&args, 1, reason.clone().into()))
    };
    let next = resolved_through_then(adapter, x);
    adapter.drain();
    expect_state(next.state(), State::Rejected(reason.into()))
}

fn first_thenable_call_wins(adapter: &dyn Adapter) -> Result<()> {
    let resolve_twice = thenable(|args| {
        call_arg(&args, 0, "first".into())?;
        call_arg(&args, 0, "second".into())
    });
    let resolve_then_reject = thenable(|args| {
        call_arg(&args, 0, "first".into())?;
        call_arg(&args, 1, "second".into())
    });
    let reject_then_resolve = thenable(|args| {
        call_arg(&args, 1, "first".into())?;
        call_arg(&args, 0, "second".into())
    });

    // Hold on to the callbacks and call them from a later task.
    let stash: Rc<RefCell<Vec<Value>>> = Default::default();
    let delayed = {
        let stash = stash.clone();
        thenable(move |args| {
            *stash.borrow_mut() = args;
            Ok(Value::Undefined)
        })
    };

    let a = resolved_through_then(adapter, resolve_twice);
    let b = resolved_through_then(adapter, resolve_then_reject);
    let c = resolved_through_then(adapter, reject_then_resolve);
    let d = resolved_through_then(adapter, delayed);
    adapter.drain();
    let args = stash.borrow().clone();
    call_arg(&args, 1, "first".into()).map_err(raised)?;
    call_arg(&args, 0, "second".into()).map_err(raised)?;
    call_arg(&args, 1, "third".into()).map_err(raised)?;
    adapter.drain();

    expect_state(a.state(), State::Fulfilled("first".into()))?;
    expect_state(b.state(), State::Fulfilled("first".into()))?;
    expect_state(c.state(), State::Rejected("first".into()))?;
    expect_state(d.state(), State::Rejected("first".into()))
}

fn raising_then_after_callback(adapter: &dyn Adapter) -> Result<()> {
    let after_resolve = thenable(|args| {
        call_arg(&args, 0, "value".into())?;
        Err("raised".into())
    });
    let after_reject = thenable(|args| {
        call_arg(&args, 1, "reason".into())?;
        Err("raised".into())
    });
    let before_callbacks = thenable(|_| Err("raised".into()));

    let a = resolved_through_then(adapter, after_resolve);
    let b = resolved_through_then(adapter, after_reject);
    let c = resolved_through_then(adapter, before_callbacks);
    adapter.drain();
    expect_state(a.state(), State::Fulfilled("value".into()))?;
    expect_state(b.state(), State::Rejected("reason".into()))?;
    expect_state(c.state(), State::Rejected("raised".into()))
}

fn non_function_then_member(adapter: &dyn Adapter) -> Result<()> {
    for then in [Value::from(5), Value::Null, Value::record([("x", Value::from(1))])] {
        let x = Value::record([("then", then)]);
        let next = resolved_through_then(adapter, x.clone());
        adapter.drain();
        expect_state(next.state(), State::Fulfilled(x))?;
    }
    Ok(())
}

fn scalars_fulfill(adapter: &dyn Adapter) -> Result<()> {
    for x in [
        Value::Undefined,
        Value::Null,
        Value::from(true),
        Value::from(0),
        Value::from("then"),
        Value::from(vec![Value::from(1)]),
    ] {
        let next = resolved_through_then(adapter, x.clone());
        adapter.drain();
        expect_state(next.state(), State::Fulfilled(x))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_cases_pass() {
        let report = run_all();
        assert!(report.is_success(), "{}", report);
        assert_eq!(report.passed(), cases().len());
    }

    #[test]
    fn case_ids_are_unique() {
        let mut ids: Vec<_> = cases().iter().map(|c| c.id).collect();
        ids.sort();
        let len = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), len);
    }

    /// Rejections that come out fulfilled.
    struct BrokenAdapter(DeferredAdapter);
    impl Adapter for BrokenAdapter {
        fn resolved(&self, value: Value) -> deferred_core::Deferred {
            self.0.resolved(value)
        }
        fn rejected(&self, reason: Value) -> deferred_core::Deferred {
            self.0.resolved(reason)
        }
        fn deferred(&self) -> crate::Triple {
            self.0.deferred()
        }
        fn drain(&self) -> usize {
            self.0.drain()
        }
    }

    #[test]
    fn report_lists_failures() {
        let report = run_with(|| BrokenAdapter(DeferredAdapter::new()));
        assert!(!report.is_success());
        assert!(report.failures().any(|f| f.id == "2.2.1"));
        assert!(report.failures().any(|f| f.id == "2.2.7.4"));
        assert!(report.failures().all(|f| f.id != "2.1.2"));
        assert!(report.to_string().contains("FAILED 2.2.1"));
    }

    #[test]
    fn report_serializes_per_case() {
        let report = run_all();
        let json = serde_json::to_value(&report).unwrap();
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), cases().len());
        assert!(results.iter().all(|r| r["error"].is_null()));
    }
}
