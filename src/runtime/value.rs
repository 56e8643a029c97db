// src/runtime/value.rs
//! Live values owned by a single runtime
//!
//! Composite values are reference types: cloning a `Value` clones the
//! reference, not the contents, so a value graph can share sub-values the
//! way script objects do. Because of that `Value` is deliberately `!Send`;
//! the only way to move data into another runtime is through a
//! [`Shareable`](crate::Shareable).

use crate::runtime::handle::RuntimeHandle;
use crate::worklet::{Function, Worklet};
use ahash::RandomState;
use indexmap::IndexMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Insertion-ordered, string-keyed map
pub type Map<V> = IndexMap<String, V, RandomState>;

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<Map<Value>>>;
pub type BufferRef = Rc<RefCell<Vec<u8>>>;

/// Dynamic value type
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Buffer(BufferRef),
    Function(Rc<Function>),
    Runtime(RuntimeHandle),
    Opaque(Opaque),
}

/// Host object bound to the context that created it. Never transferable.
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    inner: Rc<dyn Any>,
}

impl Opaque {
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Rc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Opaque").field(&self.type_name).finish()
    }
}

impl Value {
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let map: Map<Value> = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Object(Rc::new(RefCell::new(map)))
    }

    pub fn buffer(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Buffer(Rc::new(RefCell::new(bytes.into())))
    }

    /// Name of the variant, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Buffer(_) => "buffer",
            Value::Function(_) => "function",
            Value::Runtime(_) => "runtime",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Convert value to boolean (for conditionals)
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Convert value to integer
    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(n) => *n,
            Value::Float(f) => *f as i64,
            Value::Bool(b) => i64::from(*b),
            Value::String(s) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    /// Convert value to float
    pub fn as_float(&self) -> f64 {
        match self {
            Value::Float(f) => *f,
            Value::Int(n) => *n as f64,
            Value::Bool(b) => if *b { 1.0 } else { 0.0 },
            Value::String(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Convert value to string; strings come back unquoted
    pub fn as_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Field lookup on objects, `Undefined` for anything else
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.borrow().get(key).cloned().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    pub fn as_runtime(&self) -> Option<&RuntimeHandle> {
        match self {
            Value::Runtime(handle) => Some(handle),
            _ => None,
        }
    }

    /// The worklet behind a function value, `None` for host functions
    pub fn as_worklet(&self) -> Option<&Worklet> {
        match self {
            Value::Function(function) => match function.as_ref() {
                Function::Worklet(worklet) => Some(worklet),
                Function::Host { .. } => None,
            },
            _ => None,
        }
    }

    /// Check if value is null or undefined
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    /// Check if value is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Address of the shared storage behind a reference value
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Value::Array(rc) => Some(address(rc)),
            Value::Object(rc) => Some(address(rc)),
            Value::Buffer(rc) => Some(address(rc)),
            Value::Function(rc) => Some(address(rc)),
            _ => None,
        }
    }
}

pub(crate) fn address<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Order-sensitive map equality; `IndexMap`'s own `PartialEq` ignores order
pub(crate) fn maps_eq(a: &Map<Value>, b: &Map<Value>) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| ka == kb && va == vb)
}

/// Structural equality. Reference values compare by contents, functions by
/// code and captured bindings, runtimes by id.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b) || maps_eq(&a.borrow(), &b.borrow())
            }
            (Value::Buffer(a), Value::Buffer(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b) || **a == **b,
            (Value::Runtime(a), Value::Runtime(b)) => a.id() == b.id(),
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(&a.inner, &b.inner),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, val) in arr.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", val)?;
                }
                write!(f, "]")
            }
            Value::Object(obj) => {
                write!(f, "{{")?;
                for (i, (k, v)) in obj.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Buffer(bytes) => write!(f, "<Buffer {} bytes>", bytes.borrow().len()),
            Value::Function(func) => write!(f, "{}", func),
            Value::Runtime(rt) => write!(f, "[Runtime {}]", rt.name()),
            Value::Opaque(o) => write!(f, "[Opaque {}]", o.type_name()),
        }
    }
}

// Convenient conversions
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<RuntimeHandle> for Value {
    fn from(handle: RuntimeHandle) -> Self {
        Value::Runtime(handle)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::array(v.into_iter().map(|x| x.into()))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_conversion() {
        assert!(Value::Bool(true).as_bool());
        assert!(!Value::Bool(false).as_bool());
        assert!(Value::Int(1).as_bool());
        assert!(!Value::Int(0).as_bool());
        assert!(!Value::Undefined.as_bool());
        assert!(Value::array(vec![]).as_bool());
    }

    #[test]
    fn test_numeric_conversion() {
        assert_eq!(Value::Int(42).as_int(), 42);
        assert_eq!(Value::Float(42.5).as_int(), 42);
        assert_eq!(Value::Int(42).as_float(), 42.0);
        assert_eq!(Value::String("7".into()).as_int(), 7);
    }

    #[test]
    fn test_reference_semantics() {
        let arr = Value::array(vec![Value::Int(1)]);
        let alias = arr.clone();
        if let Value::Array(items) = &alias {
            items.borrow_mut().push(Value::Int(2));
        }
        assert_eq!(arr, Value::from(vec![1, 2]));
        assert_eq!(arr.identity(), alias.identity());
    }

    #[test]
    fn test_object_equality_is_order_sensitive() {
        let a = Value::object([("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = Value::object([("y", Value::Int(2)), ("x", Value::Int(1))]);
        assert_ne!(a, b);
        assert_eq!(a.get("y"), Value::Int(2));
        assert_eq!(a.get("z"), Value::Undefined);
    }

    #[test]
    fn test_display() {
        let v = Value::object([("k", Value::from(vec!["a", "b"]))]);
        assert_eq!(v.to_string(), r#"{"k": ["a", "b"]}"#);
        assert_eq!(Value::from("x").as_string(), "x");
        assert_eq!(Value::buffer(vec![1u8, 2, 3]).to_string(), "<Buffer 3 bytes>");
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(42.5), Value::Float(42.5));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_value_predicates() {
        assert!(Value::Null.is_null());
        assert!(Value::Undefined.is_null());
        assert!(!Value::Int(0).is_null());
        assert!(Value::Int(3).is_numeric());
        assert!(Value::Float(0.5).is_numeric());
        assert!(!Value::from("3").is_numeric());
        assert!(!Value::Null.is_numeric());
    }

    #[test]
    fn test_opaque_downcast() {
        let handle = Opaque::new(5u32);
        assert_eq!(handle.downcast_ref::<u32>(), Some(&5));
        assert_eq!(handle.downcast_ref::<String>(), None);
        assert_eq!(handle.type_name(), "u32");

        let value = Value::Opaque(handle.clone());
        assert_eq!(value, Value::Opaque(handle));
        assert_eq!(value.to_string(), "[Opaque u32]");
    }
}
