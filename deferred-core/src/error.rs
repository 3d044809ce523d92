use std::{error::Error, fmt::Display};

use crate::value::Value;

/// Errors raised by the framework itself, as opposed to reasons supplied by
/// user code. They travel in-band as [`Value::Error`].
#[derive(Clone, Debug)]
pub enum ErrorKind {
    /// A deferred was resolved with itself.
    ChainingCycle,
    /// Every input of an `any` combinator rejected. Holds the reasons in input order.
    Aggregate(Vec<Value>),
    /// The host was asked to stop.
    Interrupted,
    /// A failure reported by the host environment, such as a failed timer.
    Host,
}

#[derive(Clone, Debug)]
pub struct ErrorValue {
    pub kind: ErrorKind,
    pub message: String,
}
impl ErrorValue {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ErrorValue {
            kind,
            message: message.into(),
        }
    }

    pub fn chaining_cycle() -> Self {
        ErrorValue::new(
            ErrorKind::ChainingCycle,
            "Chaining cycle detected for promise",
        )
    }

    pub fn aggregate(reasons: Vec<Value>) -> Self {
        ErrorValue::new(ErrorKind::Aggregate(reasons), "All promises were rejected")
    }

    pub fn interrupted() -> Self {
        ErrorValue::new(ErrorKind::Interrupted, "interrupted")
    }

    pub fn is_chaining_cycle(&self) -> bool {
        matches!(self.kind, ErrorKind::ChainingCycle)
    }

    /// The JavaScript-style name of the error, used when rendering it.
    pub fn name(&self) -> &'static str {
        match self.kind {
            ErrorKind::ChainingCycle => "TypeError",
            ErrorKind::Aggregate(_) => "AggregateError",
            ErrorKind::Interrupted => "InterruptedError",
            ErrorKind::Host => "Error",
        }
    }
}
impl Display for ErrorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name(), self.message)
    }
}
impl Error for ErrorValue {}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Value::Error(e)
    }
}
