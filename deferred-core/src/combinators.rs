//! Combinators built from the public [`Deferred`] contract.
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    deferred::{handler, Capability, Deferred},
    error::ErrorValue,
    queue::Scheduler,
    value::Value,
};

/// A deferred fulfilled with `value`. Thenables are stored as is, not adopted.
pub fn resolve(scheduler: &Scheduler, value: Value) -> Deferred {
    Deferred::new(scheduler, |fulfill, _| {
        fulfill.call(value);
        Ok(())
    })
}

/// A deferred rejected with `reason`.
pub fn reject(scheduler: &Scheduler, reason: Value) -> Deferred {
    Deferred::new(scheduler, |_, reject| {
        reject.call(reason);
        Ok(())
    })
}

/// Turn an arbitrary value into a deferred that settles like it.
///
/// Every item takes exactly one `then` hop: a native deferred is chained
/// directly, anything else is wrapped with [`resolve`] first. The hop runs the
/// resolution procedure, so nested deferreds and thenables are unwrapped, and
/// items already settled at call time become observable in input order.
pub fn adopt(scheduler: &Scheduler, item: Value) -> Deferred {
    match item {
        Value::Deferred(d) => d.then(None, None),
        item => resolve(scheduler, item).then(None, None),
    }
}

/// A handler that settles `capability` with its argument.
fn settle_with(capability: Capability) -> impl Fn(Value) -> Result<Value, Value> + 'static {
    move |value| {
        capability.call(value);
        Ok(Value::Undefined)
    }
}

/// Fulfill with every item's value, in input order, once all have fulfilled.
/// Reject with the first rejection.
pub fn all(scheduler: &Scheduler, items: Vec<Value>) -> Deferred {
    let scheduler2 = scheduler.clone();
    Deferred::new(scheduler, move |fulfill, reject| {
        if items.is_empty() {
            fulfill.call(Value::List(Vec::new()));
            return Ok(());
        }
        let total = items.len();
        let results = Rc::new(RefCell::new(vec![Value::Undefined; total]));
        let completed = Rc::new(Cell::new(0));
        for (index, item) in items.into_iter().enumerate() {
            let results = results.clone();
            let completed = completed.clone();
            let fulfill = fulfill.clone();
            adopt(&scheduler2, item).then(
                Some(handler(move |value| {
                    results.borrow_mut()[index] = value;
                    completed.set(completed.get() + 1);
                    if completed.get() == total {
                        let values = results.borrow().clone();
                        fulfill.call(Value::List(values));
                    }
                    Ok(Value::Undefined)
                })),
                Some(handler(settle_with(reject.clone()))),
            );
        }
        Ok(())
    })
}

/// Settle like whichever item settles first. Never settles for no items.
pub fn race(scheduler: &Scheduler, items: Vec<Value>) -> Deferred {
    let scheduler2 = scheduler.clone();
    Deferred::new(scheduler, move |fulfill, reject| {
        for item in items {
            adopt(&scheduler2, item).then(
                Some(handler(settle_with(fulfill.clone()))),
                Some(handler(settle_with(reject.clone()))),
            );
        }
        Ok(())
    })
}

/// Fulfill, once every item has settled, with one record per item:
/// `{status: "fulfilled", value}` or `{status: "rejected", reason}`.
pub fn all_settled(scheduler: &Scheduler, items: Vec<Value>) -> Deferred {
    let scheduler2 = scheduler.clone();
    Deferred::new(scheduler, move |fulfill, _| {
        if items.is_empty() {
            fulfill.call(Value::List(Vec::new()));
            return Ok(());
        }
        let total = items.len();
        let results = Rc::new(RefCell::new(vec![Value::Undefined; total]));
        let completed = Rc::new(Cell::new(0));
        let record = move |index: usize, entry: Value| {
            results.borrow_mut()[index] = entry;
            completed.set(completed.get() + 1);
            if completed.get() == total {
                let values = results.borrow().clone();
                fulfill.call(Value::List(values));
            }
        };
        let record = Rc::new(record);
        for (index, item) in items.into_iter().enumerate() {
            let on_fulfilled = {
                let record = record.clone();
                handler(move |value| {
                    record(
                        index,
                        Value::record([("status", "fulfilled".into()), ("value", value)]),
                    );
                    Ok(Value::Undefined)
                })
            };
            let on_rejected = {
                let record = record.clone();
                handler(move |reason| {
                    record(
                        index,
                        Value::record([("status", "rejected".into()), ("reason", reason)]),
                    );
                    Ok(Value::Undefined)
                })
            };
            adopt(&scheduler2, item).then(Some(on_fulfilled), Some(on_rejected));
        }
        Ok(())
    })
}

/// Fulfill with the first fulfillment. If every item rejects, reject with an
/// aggregate error holding the reasons in input order.
pub fn any(scheduler: &Scheduler, items: Vec<Value>) -> Deferred {
    let scheduler2 = scheduler.clone();
    Deferred::new(scheduler, move |fulfill, reject| {
        if items.is_empty() {
            reject.call(ErrorValue::aggregate(Vec::new()).into());
            return Ok(());
        }
        let total = items.len();
        let reasons = Rc::new(RefCell::new(vec![Value::Undefined; total]));
        let rejected = Rc::new(Cell::new(0));
        for (index, item) in items.into_iter().enumerate() {
            let reasons = reasons.clone();
            let rejected = rejected.clone();
            let reject = reject.clone();
            adopt(&scheduler2, item).then(
                Some(handler(settle_with(fulfill.clone()))),
                Some(handler(move |reason| {
                    reasons.borrow_mut()[index] = reason;
                    rejected.set(rejected.get() + 1);
                    if rejected.get() == total {
                        let reasons = reasons.borrow().clone();
                        reject.call(ErrorValue::aggregate(reasons).into());
                    }
                    Ok(Value::Undefined)
                })),
            );
        }
        Ok(())
    })
}
