//! The type-erased values that deferreds settle with.

use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

use serde_json::json;

use crate::{deferred::Deferred, error::ErrorValue};

/// The outcome of running user code: `Ok` for a normal return, `Err` for a
/// raised reason.
pub type Completion = Result<Value, Value>;

/// A native function value.
///
/// Functions receive the `this` value they were invoked on, which lets a
/// foreign `then` implementation find the object it was read from.
#[derive(Clone)]
pub struct Callable {
    f: Rc<dyn Fn(&Value, Vec<Value>) -> Completion>,
}
impl Callable {
    /// A function that ignores `this`.
    pub fn new(f: impl Fn(Vec<Value>) -> Completion + 'static) -> Self {
        Callable {
            f: Rc::new(move |_this, args| f(args)),
        }
    }

    pub fn method(f: impl Fn(&Value, Vec<Value>) -> Completion + 'static) -> Self {
        Callable { f: Rc::new(f) }
    }

    pub fn call(&self, this: &Value, args: Vec<Value>) -> Completion {
        (self.f)(this, args)
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}
impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({:p})", Rc::as_ptr(&self.f) as *const ())
    }
}

/// A value with named members.
///
/// `get` is fallible so that an implementation can model an accessor that
/// raises. The resolution procedure reads `then` through this method exactly
/// once per adoption.
pub trait Object {
    fn get(&self, key: &str) -> Completion;

    fn to_json(&self) -> serde_json::Value {
        json!("[object]")
    }
}

/// A plain property bag; the stock [`Object`].
#[derive(Default)]
pub struct Record {
    fields: RefCell<BTreeMap<String, Value>>,
}
impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Record {
            fields: RefCell::new(fields.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.fields.borrow_mut().insert(key.into(), value);
    }
}
impl Object for Record {
    fn get(&self, key: &str) -> Completion {
        Ok(self
            .fields
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or(Value::Undefined))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    List(Vec<Value>),
    Function(Callable),
    Object(Rc<dyn Object>),
    Deferred(Deferred),
    Error(ErrorValue),
}

impl Value {
    pub fn function(f: impl Fn(Vec<Value>) -> Completion + 'static) -> Self {
        Value::Function(Callable::new(f))
    }

    pub fn method(f: impl Fn(&Value, Vec<Value>) -> Completion + 'static) -> Self {
        Value::Function(Callable::method(f))
    }

    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Rc::new(Record::with(fields)))
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&Deferred> {
        match self {
            Value::Deferred(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the value may carry members, and so may be a thenable.
    pub fn has_members(&self) -> bool {
        matches!(
            self,
            Value::Object(_) | Value::Function(_) | Value::Deferred(_)
        )
    }

    /// Read a member. Scalars have no members and read as `Undefined`.
    ///
    /// A native [`Deferred`] exposes its own `then` as a function member, so
    /// the resolution procedure can adopt it like any other thenable.
    pub fn get(&self, key: &str) -> Completion {
        match self {
            Value::Object(o) => o.get(key),
            Value::Deferred(d) if key == "then" => Ok(Value::Function(d.then_member())),
            _ => Ok(Value::Undefined),
        }
    }

    /// Identity for reference values, equality for everything else.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a.same(b))
            }
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            (Value::Deferred(a), Value::Deferred(b)) => a.ptr_eq(b),
            (Value::Error(a), Value::Error(b)) => {
                a.name() == b.name() && a.message == b.message
            }
            _ => false,
        }
    }

    /// Render the value as JSON. Functions and deferreds become descriptive
    /// strings (a deferred by id only), non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                    json!(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(s) => json!(s.as_ref()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Function(_) => json!("[function]"),
            Value::Object(o) => o.to_json(),
            Value::Deferred(d) => json!(format!("Deferred(#{})", d.id())),
            Value::Error(e) => match &e.kind {
                crate::ErrorKind::Aggregate(reasons) => json!({
                    "name": e.name(),
                    "message": e.message,
                    "errors": reasons.iter().map(Value::to_json).collect::<Vec<_>>(),
                }),
                _ => json!({ "name": e.name(), "message": e.message }),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Function(c) => write!(f, "{:?}", c),
            Value::Object(o) => write!(f, "Object({})", o.to_json()),
            // The nested deferred may be the one being printed.
            Value::Deferred(d) => write!(f, "Deferred(#{})", d.id()),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::String(s) => write!(f, "{}", s),
            Value::Error(e) => write!(f, "{}", e),
            _ => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}
impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}
impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}
impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}
impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}
impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
impl From<Deferred> for Value {
    fn from(d: Deferred) -> Self {
        Value::Deferred(d)
    }
}
impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Function(c)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => {
                Value::record(fields.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_values_compare_by_identity() {
        let f = Value::function(|_| Ok(Value::Undefined));
        let g = Value::function(|_| Ok(Value::Undefined));
        assert_eq!(f, f.clone());
        assert_ne!(f, g);

        let a = Value::record([("x", Value::from(1))]);
        let b = Value::record([("x", Value::from(1))]);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        assert_eq!(Value::from("s"), Value::from(String::from("s")));
        assert_eq!(
            Value::from(vec![Value::from(1), Value::Null]),
            Value::from(vec![Value::from(1), Value::Null])
        );
    }

    #[test]
    fn scalars_have_no_members() {
        assert_eq!(Value::from(3).get("then"), Ok(Value::Undefined));
        assert!(!Value::from("then").has_members());
        assert!(Value::record(Vec::<(String, Value)>::new()).has_members());
    }

    #[test]
    fn json_conversion() {
        let json = serde_json::json!({"a": [1, 2.5, null, true], "b": "text"});
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), json);
        assert_eq!(Value::Number(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(
            Value::from(ErrorValue::chaining_cycle()).to_json(),
            serde_json::json!({
                "name": "TypeError",
                "message": "Chaining cycle detected for promise",
            })
        );
    }
}
