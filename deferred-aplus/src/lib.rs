//! Promises/A+ conformance for `deferred-core`.
//!
//! [`Adapter`] is the contract a conformance runner needs; [`suite`] holds the
//! cases and the runner.

pub mod suite;

use deferred_core::{combinators, Capability, Deferred, Scheduler, TaskQueue, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// A deferred together with the capabilities that settle it.
#[derive(Clone, Debug)]
pub struct Triple {
    pub promise: Deferred,
    pub resolve: Capability,
    pub reject: Capability,
}

/// The three constructors a conformance runner needs, plus a way to run the
/// pending deferred work.
pub trait Adapter {
    fn resolved(&self, value: Value) -> Deferred;
    fn rejected(&self, reason: Value) -> Deferred;
    fn deferred(&self) -> Triple;

    /// Run scheduled work until nothing is left.
    fn drain(&self) -> usize;
}

/// The [`Adapter`] for [`Deferred`], backed by its own [`TaskQueue`].
#[derive(Clone, Debug, Default)]
pub struct DeferredAdapter {
    queue: TaskQueue,
}
impl DeferredAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduler(&self) -> Scheduler {
        self.queue.scheduler()
    }
}

impl Adapter for DeferredAdapter {
    fn resolved(&self, value: Value) -> Deferred {
        combinators::resolve(&self.scheduler(), value)
    }

    fn rejected(&self, reason: Value) -> Deferred {
        combinators::reject(&self.scheduler(), reason)
    }

    fn deferred(&self) -> Triple {
        let capabilities = Rc::new(RefCell::new(None));
        let promise = {
            let capabilities = capabilities.clone();
            Deferred::new(&self.scheduler(), move |resolve, reject| {
                *capabilities.borrow_mut() = Some((resolve, reject));
                Ok(())
            })
        };
        let (resolve, reject) = capabilities
            .borrow_mut()
            .take()
            .expect("the executor runs synchronously");
        Triple {
            promise,
            resolve,
            reject,
        }
    }

    fn drain(&self) -> usize {
        self.queue.run_until_idle()
    }
}
