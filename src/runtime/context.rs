// src/runtime/context.rs
//! Execution scope handed to worklet code running inside a runtime

use crate::runtime::console::ConsoleRelay;
use crate::runtime::handle::{RuntimeId, RuntimeShared};
use crate::runtime::value::Map;
use crate::worklet::{Function, Thrown, Worklet};
use crate::Value;

/// View of a runtime's state for the duration of one work item
pub struct Scope<'a> {
    runtime: &'a RuntimeShared,
    globals: &'a mut Map<Value>,
    console: &'a ConsoleRelay,
    depth: usize,
    max_depth: usize,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        runtime: &'a RuntimeShared,
        globals: &'a mut Map<Value>,
        console: &'a ConsoleRelay,
        max_depth: usize,
    ) -> Self {
        Self {
            runtime,
            globals,
            console,
            depth: 0,
            max_depth,
        }
    }

    pub fn runtime_id(&self) -> RuntimeId {
        self.runtime.id()
    }

    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    /// Get global binding, `Undefined` when unset
    #[inline]
    pub fn global(&self, name: &str) -> Value {
        self.globals.get(name).cloned().unwrap_or(Value::Undefined)
    }

    /// Set global binding
    #[inline]
    pub fn set_global(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }

    /// Remove global binding, returning the old value
    pub fn remove_global(&mut self, name: &str) -> Option<Value> {
        self.globals.shift_remove(name)
    }

    #[inline]
    pub fn console(&self) -> &ConsoleRelay {
        self.console
    }

    /// Call a function value in this runtime
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value, Thrown> {
        match callee {
            Value::Function(function) => match function.as_ref() {
                Function::Worklet(worklet) => self.call_worklet(worklet, args),
                Function::Host { call, .. } => (**call)(args),
            },
            other => Err(Thrown::new(format!("{} is not a function", other.type_name()))),
        }
    }

    /// Run a worklet in this runtime. A failure leaving the worklet records
    /// the worklet as a frame, innermost first.
    pub fn call_worklet(&mut self, worklet: &Worklet, args: &[Value]) -> Result<Value, Thrown> {
        if self.depth >= self.max_depth {
            return Err(Thrown::new(format!(
                "maximum call depth of {} exceeded in runtime `{}`",
                self.max_depth,
                self.runtime_name()
            )));
        }

        self.depth += 1;
        let entry = worklet.code().entry();
        let result = entry(self, worklet.closure(), args);
        self.depth -= 1;

        result.map_err(|mut thrown| {
            thrown.push_frame(worklet.code().frame());
            thrown
        })
    }
}
