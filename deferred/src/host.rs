//! The host environment: a [`TaskQueue`] for deferred reactions, plus timers
//! on the tokio runtime.
use std::{cell::Cell, future::Future, rc::Rc, time::Duration};

use anyhow::{Context as _, Result};
use deferred_core::{Scheduler, TaskQueue};
use tokio::sync::Notify;

use crate::interrupt::InterruptState;

/// Drives deferred computations.
///
/// Reactions go onto a FIFO [`TaskQueue`], which is drained after the main
/// function returns and after every timer callback. Timers run as local tasks,
/// so all host methods must be used from within a [`tokio::task::LocalSet`].
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostInner>,
}

struct HostInner {
    queue: TaskQueue,
    interrupt_state: InterruptState,
    pending_timers: Cell<usize>,
    /// Signalled whenever a timer has run.
    timer_done: Notify,
}

impl Host {
    pub fn new(interrupt_state: InterruptState) -> Self {
        Host {
            inner: Rc::new(HostInner {
                queue: TaskQueue::new(),
                interrupt_state,
                pending_timers: Cell::new(0),
                timer_done: Notify::new(),
            }),
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        self.inner.queue.scheduler()
    }

    pub fn interrupt_state(&self) -> &InterruptState {
        &self.inner.interrupt_state
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.pending_timers.get()
    }

    /// Run the queued reactions to completion.
    pub fn drain(&self) -> usize {
        self.inner.queue.run_until_idle()
    }

    /// Run `task` once `delay` has elapsed, then drain the queue.
    pub fn set_timeout(&self, delay: Duration, task: impl FnOnce() + 'static) {
        let inner = self.inner.clone();
        inner.pending_timers.set(inner.pending_timers.get() + 1);
        tracing::trace!(?delay, "timer set");
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
            inner.queue.run_until_idle();
            inner.pending_timers.set(inner.pending_timers.get() - 1);
            inner.timer_done.notify_one();
        });
    }

    /// Run `main`, then keep draining reactions until no timers are left.
    pub async fn run<T>(&self, main: impl FnOnce(&Host) -> T) -> T {
        let result = main(self);
        self.drain();
        while self.pending_timers() > 0 {
            self.inner.timer_done.notified().await;
        }
        result
    }
}

/// Run `f` to completion on a fresh single-threaded runtime, inside a
/// [`tokio::task::LocalSet`] so that [`Host`] timers can be spawned.
pub fn block_on<F: Future>(f: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("initializing the tokio runtime")?;
    let local = tokio::task::LocalSet::new();
    Ok(runtime.block_on(local.run_until(f)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tokio::task::LocalSet;

    #[test]
    fn block_on_drives_timers_to_completion() {
        let fired = block_on(async {
            let host = Host::new(InterruptState::new());
            let fired = Rc::new(Cell::new(false));
            let fired2 = fired.clone();
            host.run(|host| {
                host.set_timeout(Duration::from_millis(1), move || fired2.set(true));
            })
            .await;
            fired.get()
        })
        .unwrap();
        assert!(fired);
    }

    #[tokio::test(start_paused = true)]
    async fn timers_fire_in_deadline_order() {
        LocalSet::new()
            .run_until(async {
                let host = Host::new(InterruptState::new());
                let log = Rc::new(RefCell::new(Vec::new()));
                host.run(|host| {
                    for (name, ms) in [("slow", 30), ("fast", 10), ("middle", 20)] {
                        let log = log.clone();
                        host.set_timeout(Duration::from_millis(ms), move || {
                            log.borrow_mut().push(name)
                        });
                    }
                    assert_eq!(host.pending_timers(), 3);
                })
                .await;
                assert_eq!(*log.borrow(), vec!["fast", "middle", "slow"]);
                assert_eq!(host.pending_timers(), 0);
            })
            .await;
    }

    /// Timers set by timer callbacks are waited for too.
    #[tokio::test(start_paused = true)]
    async fn run_waits_for_chained_timers() {
        LocalSet::new()
            .run_until(async {
                let host = Host::new(InterruptState::new());
                let fired = Rc::new(Cell::new(false));
                let fired2 = fired.clone();
                host.run(move |host| {
                    let host2 = host.clone();
                    host.set_timeout(Duration::from_millis(5), move || {
                        host2.set_timeout(Duration::from_millis(5), move || fired2.set(true));
                    });
                })
                .await;
                assert!(fired.get());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn reactions_drain_after_timers() {
        LocalSet::new()
            .run_until(async {
                let host = Host::new(InterruptState::new());
                let seen = Rc::new(RefCell::new(None));
                let seen2 = seen.clone();
                host.run(move |host| {
                    let scheduler = host.scheduler();
                    host.set_timeout(Duration::from_millis(1), move || {
                        scheduler.schedule_later(move || *seen2.borrow_mut() = Some("reaction"));
                    });
                })
                .await;
                assert_eq!(*seen.borrow(), Some("reaction"));
            })
            .await;
    }
}
