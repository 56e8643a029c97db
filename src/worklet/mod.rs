// src/worklet/mod.rs
//! Worklets: callables explicitly marked as transferable between runtimes
//!
//! A worklet is a `'static` function pointer plus the values it captured
//! when it was defined. The function pointer is the "code": it exists in
//! every runtime of the process, so only the captured bindings need to be
//! cloned when a worklet crosses a runtime boundary. Plain host closures
//! (`Function::Host`) capture live, context-bound state and can never be
//! transferred.

use crate::runtime::value::{maps_eq, Map};
use crate::runtime::Scope;
use crate::{DispatchError, Value, WorkletExecutionError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

/// Entry point of a worklet. Receives the executing runtime's scope, the
/// captured bindings, and call arguments.
pub type WorkletFn = fn(&mut Scope<'_>, &Closure, &[Value]) -> Result<Value, Thrown>;

/// Source position captured with `#[track_caller]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn from_caller(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
        }
    }

    #[track_caller]
    pub fn caller() -> Self {
        Self::from_caller(Location::caller())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One worklet a failure unwound through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub worklet: String,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(at) => write!(f, "{} ({})", self.worklet, at),
            None => f.write_str(&self.worklet),
        }
    }
}

/// Code identity of a worklet
#[derive(Clone)]
pub struct WorkletCode {
    name: Cow<'static, str>,
    entry: WorkletFn,
    location: Option<SourceLocation>,
}

impl WorkletCode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub(crate) fn entry(&self) -> WorkletFn {
        self.entry
    }

    pub(crate) fn frame(&self) -> Frame {
        Frame {
            worklet: self.name.to_string(),
            location: self.location.clone(),
        }
    }
}

impl fmt::Debug for WorkletCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkletCode")
            .field("name", &self.name)
            .field("location", &self.location)
            .finish()
    }
}

/// Bindings captured by a worklet at definition time
#[derive(Debug, Clone, Default)]
pub struct Closure {
    bindings: Map<Value>,
}

impl Closure {
    pub(crate) fn from_bindings(bindings: Map<Value>) -> Self {
        Self { bindings }
    }

    /// Captured value, `Undefined` when nothing was captured under `name`
    pub fn get(&self, name: &str) -> Value {
        self.bindings.get(name).cloned().unwrap_or(Value::Undefined)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// A transferable callable
#[derive(Debug, Clone)]
pub struct Worklet {
    code: WorkletCode,
    closure: Closure,
}

impl Worklet {
    /// Define a worklet. The definition site is recorded for diagnostics.
    #[track_caller]
    pub fn new(name: &'static str, entry: WorkletFn) -> Self {
        Self {
            code: WorkletCode {
                name: Cow::Borrowed(name),
                entry,
                location: Some(SourceLocation::caller()),
            },
            closure: Closure::default(),
        }
    }

    pub(crate) fn from_parts(code: WorkletCode, closure: Closure) -> Self {
        Self { code, closure }
    }

    /// Capture a value into the worklet's closure
    pub fn capture(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.closure.bindings.insert(name.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        self.code.name()
    }

    pub fn code(&self) -> &WorkletCode {
        &self.code
    }

    pub fn closure(&self) -> &Closure {
        &self.closure
    }
}

impl PartialEq for Worklet {
    fn eq(&self, other: &Self) -> bool {
        self.code.name == other.code.name
            && self.code.location == other.code.location
            && maps_eq(&self.closure.bindings, &other.closure.bindings)
    }
}

/// Host function signature
pub type HostFn = dyn Fn(&[Value]) -> Result<Value, Thrown>;

/// Function value
pub enum Function {
    Worklet(Worklet),
    /// Plain closure bound to the context that created it
    Host { name: String, call: Rc<HostFn> },
}

impl Function {
    pub fn host(
        name: impl Into<String>,
        call: impl Fn(&[Value]) -> Result<Value, Thrown> + 'static,
    ) -> Self {
        Function::Host {
            name: name.into(),
            call: Rc::new(call),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Function::Worklet(w) => w.name(),
            Function::Host { name, .. } => name,
        }
    }

    pub fn is_worklet(&self) -> bool {
        matches!(self, Function::Worklet(_))
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Function::Worklet(a), Function::Worklet(b)) => a == b,
            (Function::Host { call: a, .. }, Function::Host { call: b, .. }) => {
                Rc::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Worklet(w) => fmt::Debug::fmt(w, f),
            Function::Host { name, .. } => f.debug_struct("Host").field("name", name).finish(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Worklet(w) => write!(f, "[Worklet {}]", w.name()),
            Function::Host { name, .. } => write!(f, "[Function {}]", name),
        }
    }
}

impl From<Worklet> for Value {
    fn from(worklet: Worklet) -> Self {
        Value::Function(Rc::new(Function::Worklet(worklet)))
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(Rc::new(function))
    }
}

/// Failure raised by worklet code
#[derive(Debug, Clone, PartialEq)]
pub struct Thrown {
    pub message: String,
    pub thrown_at: Option<SourceLocation>,
    pub trace: Vec<Frame>,
    /// Failure in another runtime that this one propagates
    pub cause: Option<Box<WorkletExecutionError>>,
}

impl Thrown {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            thrown_at: Some(SourceLocation::caller()),
            ..Self::without_site(message)
        }
    }

    /// Failure with no throw site, such as a panic payload
    pub(crate) fn without_site(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            thrown_at: None,
            trace: Vec::new(),
            cause: None,
        }
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        self.trace.push(frame);
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(at) = &self.thrown_at {
            write!(f, " (at {})", at)?;
        }
        Ok(())
    }
}

/// A failed nested dispatch keeps the remote message, throw site and
/// frames, and links the remote record (its runtime and the dispatch site
/// inside this runtime) as the cause.
impl From<DispatchError> for Thrown {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Execution(e) => Thrown {
                message: e.message.clone(),
                thrown_at: e.thrown_at.clone(),
                trace: e.trace.clone(),
                cause: Some(Box::new(e)),
            },
            other => Self::without_site(other.to_string()),
        }
    }
}
