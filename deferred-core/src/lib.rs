//! A single-threaded deferred computation ("promise") with Promises/A+
//! semantics.
//!
//! A [`Deferred`] is created with an executor that receives two settlement
//! [`Capability`]s. Continuations registered with [`Deferred::then`] never run
//! inline: they are handed to a [`Scheduler`], which the host drains on its own
//! schedule. [`TaskQueue`] is the stock FIFO implementation of that seam.

pub mod combinators;
pub mod deferred;
pub mod error;
pub mod queue;
pub mod resolution;
pub mod value;

pub use deferred::{handler, Capability, Deferred, Handler, State};
pub use error::{ErrorKind, ErrorValue};
pub use queue::{Schedule, Scheduler, Task, TaskQueue};
pub use value::{Callable, Completion, Object, Record, Value};
