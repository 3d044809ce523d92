//! Retrying an operation that produces a deferred.
use std::{rc::Rc, time::Duration};

use deferred_core::{handler, Capability, Deferred, Value};

use crate::host::Host;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Time between a failed attempt and the next one.
    pub delay: Duration,
}

type Operation = Rc<dyn Fn(u32) -> Deferred>;

/// Call `operation` until the deferred it returns fulfills, and fulfill with
/// that value.
///
/// `operation` receives the attempt number, starting at 0. After
/// `policy.max_retries` failed retries, rejects with the last reason. Before
/// each attempt the host's interrupt flag is checked; if set, rejects with an
/// interruption error without calling `operation` again.
pub fn retry(
    host: &Host,
    policy: RetryPolicy,
    operation: impl Fn(u32) -> Deferred + 'static,
) -> Deferred {
    let operation: Operation = Rc::new(operation);
    let host2 = host.clone();
    Deferred::new(&host.scheduler(), move |fulfill, reject| {
        attempt(host2, policy, operation, 0, fulfill, reject);
        Ok(())
    })
}

fn attempt(
    host: Host,
    policy: RetryPolicy,
    operation: Operation,
    n: u32,
    fulfill: Capability,
    reject: Capability,
) {
    if let Err(reason) = host.interrupt_state().check_interrupted_value() {
        tracing::info!(attempt = n, "interrupted; not retrying");
        reject.call(reason);
        return;
    }
    tracing::debug!(attempt = n, "starting attempt");
    let outcome = operation(n);
    let on_fulfilled = {
        let fulfill = fulfill.clone();
        handler(move |value| {
            tracing::debug!(attempt = n, "attempt succeeded");
            fulfill.call(value);
            Ok(Value::Undefined)
        })
    };
    let on_rejected = handler(move |reason| {
        if n >= policy.max_retries {
            tracing::warn!(attempt = n, %reason, "attempt failed; giving up");
            reject.call(reason);
        } else {
            tracing::info!(attempt = n, %reason, delay = ?policy.delay, "attempt failed; retrying");
            let (host2, operation, fulfill, reject) =
                (host.clone(), operation.clone(), fulfill.clone(), reject.clone());
            host.set_timeout(policy.delay, move || {
                attempt(host2, policy, operation, n + 1, fulfill, reject)
            });
        }
        Ok(Value::Undefined)
    });
    outcome.then(Some(on_fulfilled), Some(on_rejected));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{interrupt::InterruptState, timer};
    use deferred_core::{combinators, ErrorValue, State};
    use std::cell::Cell;
    use tokio::task::LocalSet;

    const POLICY: RetryPolicy = RetryPolicy {
        max_retries: 3,
        delay: Duration::from_millis(100),
    };

    /// An operation that rejects on its first `failures` attempts.
    fn flaky(host: &Host, failures: u32, calls: Rc<Cell<u32>>) -> impl Fn(u32) -> Deferred {
        let host = host.clone();
        move |n| {
            calls.set(calls.get() + 1);
            if n < failures {
                let reason = format!("failure {}", n).into();
                timer::delay_reject(&host, Duration::from_millis(10), reason)
            } else {
                timer::delay(&host, Duration::from_millis(10), n.into())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_failures() {
        LocalSet::new()
            .run_until(async {
                let host = Host::new(InterruptState::new());
                let calls = Rc::new(Cell::new(0));
                let start = tokio::time::Instant::now();
                let d = host
                    .run(|host| retry(host, POLICY, flaky(host, 2, calls.clone())))
                    .await;
                assert_eq!(d.state(), State::Fulfilled(2.into()));
                assert_eq!(calls.get(), 3);
                // Three 10ms attempts and two 100ms pauses.
                assert!(start.elapsed() >= Duration::from_millis(230));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_with_last_reason() {
        LocalSet::new()
            .run_until(async {
                let host = Host::new(InterruptState::new());
                let calls = Rc::new(Cell::new(0));
                let d = host
                    .run(|host| retry(host, POLICY, flaky(host, 10, calls.clone())))
                    .await;
                assert_eq!(d.state(), State::Rejected("failure 3".into()));
                assert_eq!(calls.get(), POLICY.max_retries + 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_retries() {
        LocalSet::new()
            .run_until(async {
                let host = Host::new(InterruptState::new());
                let policy = RetryPolicy {
                    max_retries: 0,
                    ..POLICY
                };
                let d = host
                    .run(|host| {
                        let s = host.scheduler();
                        retry(host, policy, move |_| combinators::reject(&s, "once".into()))
                    })
                    .await;
                assert_eq!(d.state(), State::Rejected("once".into()));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn interruption_stops_retrying() {
        LocalSet::new()
            .run_until(async {
                let host = Host::new(InterruptState::new());
                let calls = Rc::new(Cell::new(0));
                let d = host
                    .run(|host| {
                        let interrupt_state = host.interrupt_state().clone();
                        let calls2 = calls.clone();
                        let s = host.scheduler();
                        retry(host, POLICY, move |_| {
                            calls2.set(calls2.get() + 1);
                            // Ask to stop while the first attempt is failing.
                            interrupt_state.set_interrupted();
                            combinators::reject(&s, "failed".into())
                        })
                    })
                    .await;
                assert_eq!(d.state(), State::Rejected(ErrorValue::interrupted().into()));
                assert_eq!(calls.get(), 1);
            })
            .await;
    }
}
