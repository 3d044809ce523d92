//! The "schedule for later" seam, and a FIFO [`TaskQueue`] implementing it.

use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Something that can run a closure after the current call stack unwinds.
///
/// Implementations must run tasks in the order they were scheduled, and never
/// run a task from within `schedule_later` itself.
pub trait Schedule {
    fn schedule_later(&self, task: Task);
}

/// A cloneable handle to a [`Schedule`] implementation.
///
/// Every [`crate::Deferred`] holds one, and hands it to the deferreds it creates
/// through `then`.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<dyn Schedule>,
}
impl Scheduler {
    pub fn new(schedule: impl Schedule + 'static) -> Self {
        Scheduler {
            inner: Rc::new(schedule),
        }
    }

    pub fn schedule_later(&self, task: impl FnOnce() + 'static) {
        self.inner.schedule_later(Box::new(task));
    }
}
impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scheduler({:p})", Rc::as_ptr(&self.inner))
    }
}

/// An explicit FIFO queue of tasks, drained by [`TaskQueue::run_until_idle`].
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}
impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A [`Scheduler`] that enqueues onto this queue.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Run the task at the front of the queue, if any.
    pub fn run_one(&self) -> bool {
        // Release the borrow before running, the task may schedule more work.
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks scheduled while
    /// draining. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        while self.run_one() {
            count += 1;
        }
        if count > 0 {
            tracing::trace!(tasks = count, "task queue idle");
        }
        count
    }
}
impl Schedule for TaskQueue {
    fn schedule_later(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}
impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn runs_in_fifo_order() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            queue.scheduler().schedule_later(move || log.borrow_mut().push(i));
        }
        assert!(log.borrow().is_empty());
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    /// Work scheduled by a running task goes behind work that was already queued.
    #[test]
    fn reentrant_tasks_go_to_the_back() {
        let queue = TaskQueue::new();
        let scheduler = queue.scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            let scheduler2 = scheduler.clone();
            scheduler.schedule_later(move || {
                log.borrow_mut().push("a");
                let log = log.clone();
                scheduler2.schedule_later(move || log.borrow_mut().push("c"));
            });
        }
        {
            let log = log.clone();
            scheduler.schedule_later(move || log.borrow_mut().push("b"));
        }
        assert!(queue.run_one());
        assert_eq!(*log.borrow(), vec!["a"]);
        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert!(!queue.run_one());
    }
}
