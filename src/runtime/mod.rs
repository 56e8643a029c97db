// src/runtime/mod.rs
//! Runtimes: isolated execution contexts, one thread each

pub mod console;
pub mod context;
pub mod guard;
pub mod handle;
pub mod value;
pub(crate) mod worker;

pub use console::{ConsoleEntry, ConsoleRelay, LogLevel, OutputSink, TracingSink};
pub use context::Scope;
pub use guard::{CallGuard, ErrorReporter, TracingReporter};
pub use handle::{RuntimeHandle, RuntimeId, RuntimeState};
pub use value::Value;
