// src/lib.rs
//! # Worklet Runtime
//!
//! Independent execution contexts ("runtimes") with their own state, and
//! the plumbing to run code ("worklets") inside them from another context.
//!
//! Each runtime owns a thread and a FIFO command queue. Values cross a
//! runtime boundary only as [`Shareable`] snapshots produced by
//! [`clone_recursive`]; a worklet is a `fn` pointer plus a snapshot of the
//! values it captured. Failures inside a runtime are caught by its call
//! guard and come back as [`WorkletExecutionError`] records instead of
//! unwinding into the caller.
//!
//! ## Example
//!
//! ```rust
//! use worklet_runtime::{
//!     run_on_runtime_sync, Closure, RuntimeManager, Scope, Thrown, Value, Worklet,
//! };
//!
//! fn increment(scope: &mut Scope<'_>, closure: &Closure, _: &[Value]) -> Result<Value, Thrown> {
//!     let next = scope.global("count").as_int() + closure.get("step").as_int();
//!     scope.set_global("count", next);
//!     Ok(Value::Int(next))
//! }
//!
//! let manager = RuntimeManager::new();
//! let runtime = manager.create_runtime("animations", None).unwrap();
//! let step = Worklet::new("increment", increment).capture("step", 2);
//!
//! run_on_runtime_sync(&runtime, &step).unwrap();
//! let count = run_on_runtime_sync(&runtime, &step).unwrap();
//! assert_eq!(count, Value::Int(4));
//! ```

pub mod config;
pub mod dispatch;
pub mod runtime;
pub mod shareable;
pub mod worklet;

use ahash::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

pub use config::{ConfigError, RuntimeConfig};
#[cfg(feature = "tokio")]
pub use dispatch::run_on_runtime_awaitable;
pub use dispatch::{current_runtime, run_on_runtime_async, run_on_runtime_sync};
pub use runtime::{
    ConsoleEntry, ConsoleRelay, ErrorReporter, LogLevel, OutputSink, RuntimeHandle, RuntimeId,
    RuntimeState, Scope, TracingReporter, TracingSink, Value,
};
pub use shareable::{clone_recursive, clone_worklet, CloneError, Shareable, ShareableKind};
pub use worklet::{Closure, Frame, Function, SourceLocation, Thrown, Worklet, WorkletFn};

use runtime::worker::{self, RuntimeEnv};

/// Errors while creating a runtime
#[derive(Error, Debug)]
pub enum RuntimeCreationError {
    #[error("Failed to spawn runtime thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Runtime `{name}` stopped before finishing bootstrap")]
    Bootstrap { name: String },

    #[error("Initializer cannot be transferred: {0}")]
    Clone(#[from] CloneError),

    #[error("Initializer failed: {0}")]
    Initializer(WorkletExecutionError),
}

/// Errors from dispatching a worklet
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error("Runtime `{name}` is not ready")]
    NotReady { name: String },

    #[error("Runtime `{name}` is no longer available")]
    RuntimeUnavailable { name: String },

    #[error("Synchronous dispatch from runtime `{name}` into itself")]
    SelfDispatch { name: String },

    #[error("Worklet failed in runtime {0}")]
    Execution(#[from] WorkletExecutionError),
}

/// Structured record of a failure inside a runtime.
///
/// `trace` lists the worklets the failure unwound through, innermost first,
/// including those on the far side of a nested synchronous dispatch.
/// `dispatched_from` is the call site that sent the work to `runtime`. When
/// the failure came back from a nested dispatch, `cause` holds the record
/// made by the runtime it originated in; its `dispatched_from` is the call
/// site inside this runtime.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("[{runtime}] {message}")]
pub struct WorkletExecutionError {
    pub runtime: String,
    pub message: String,
    pub thrown_at: Option<SourceLocation>,
    pub trace: Vec<Frame>,
    pub dispatched_from: Option<SourceLocation>,
    pub panicked: bool,
    #[source]
    #[serde(default)]
    pub cause: Option<Box<WorkletExecutionError>>,
}

impl WorkletExecutionError {
    /// The record made where the failure was raised
    pub fn root_cause(&self) -> &WorkletExecutionError {
        let mut error = self;
        while let Some(cause) = &error.cause {
            error = cause;
        }
        error
    }

    /// Runtimes the failure passed through, outermost first
    pub fn runtimes(&self) -> Vec<&str> {
        let mut names = vec![self.runtime.as_str()];
        let mut error = self;
        while let Some(cause) = &error.cause {
            names.push(cause.runtime.as_str());
            error = cause;
        }
        names
    }
}

/// Owner of every runtime it creates.
///
/// Runtimes live until [`RuntimeManager::dispose`] is called for them or
/// the manager is dropped.
pub struct RuntimeManager {
    env: RuntimeEnv,
    runtimes: Mutex<HashMap<RuntimeId, ManagedRuntime>>,
    next_id: AtomicU64,
}

struct ManagedRuntime {
    handle: RuntimeHandle,
    thread: JoinHandle<()>,
}

impl RuntimeManager {
    /// Manager with default config, logging console output and failures
    /// through `tracing`
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            env: RuntimeEnv {
                config,
                sink: Arc::new(TracingSink),
                reporter: Arc::new(TracingReporter),
            },
            runtimes: Mutex::new(HashMap::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Where console calls made inside runtimes end up
    pub fn with_output_sink(mut self, sink: impl OutputSink + 'static) -> Self {
        self.env.sink = Arc::new(sink);
        self
    }

    /// Where worklet failures are reported
    pub fn with_error_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.env.reporter = Arc::new(reporter);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.env.config
    }

    /// Create a runtime and block until it is Ready.
    ///
    /// The runtime is bootstrapped (core primitives, call guard, console)
    /// and then runs `initializer`, if given, before this returns.
    pub fn create_runtime(
        &self,
        name: impl Into<String>,
        initializer: Option<&Worklet>,
    ) -> Result<RuntimeHandle, RuntimeCreationError> {
        let name = name.into();
        let initializer = initializer.map(clone_worklet).transpose()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (handle, queue) = RuntimeHandle::new(id, name);
        let thread = worker::spawn(handle.shared().clone(), queue, self.env.clone(), initializer)?;

        tracing::debug!(runtime = handle.name(), id, "runtime created");
        self.runtimes.lock().insert(
            id,
            ManagedRuntime {
                handle: handle.clone(),
                thread,
            },
        );
        Ok(handle)
    }

    pub fn get(&self, id: RuntimeId) -> Option<RuntimeHandle> {
        self.runtimes.lock().get(&id).map(|r| r.handle.clone())
    }

    /// Live runtimes, oldest first
    pub fn runtimes(&self) -> Vec<RuntimeHandle> {
        let mut handles: Vec<_> =
            self.runtimes.lock().values().map(|r| r.handle.clone()).collect();
        handles.sort_by_key(RuntimeHandle::id);
        handles
    }

    /// Stop a runtime. Work already queued still runs; later dispatches fail
    /// with `DispatchError::RuntimeUnavailable`. Returns `false` if the
    /// runtime does not belong to this manager or is already disposed.
    pub fn dispose(&self, runtime: &RuntimeHandle) -> bool {
        let Some(managed) = self.runtimes.lock().remove(&runtime.id()) else {
            return false;
        };
        Self::stop(managed);
        true
    }

    pub fn dispose_all(&self) {
        let drained: Vec<_> = self.runtimes.lock().drain().map(|(_, r)| r).collect();
        for managed in drained {
            Self::stop(managed);
        }
    }

    fn stop(managed: ManagedRuntime) {
        let ManagedRuntime { handle, thread } = managed;
        handle.shutdown();

        // A runtime disposing itself cannot wait for its own thread
        if current_runtime() == Some(handle.id()) {
            return;
        }
        if thread.join().is_err() {
            tracing::warn!(runtime = handle.name(), "runtime thread panicked");
        }
        tracing::debug!(runtime = handle.name(), "runtime disposed");
    }
}

impl Default for RuntimeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RuntimeManager {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
