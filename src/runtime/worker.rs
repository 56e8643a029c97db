// src/runtime/worker.rs
//! Runtime thread: bootstrap, then execute queued worklets one at a time

use crate::config::RuntimeConfig;
use crate::dispatch;
use crate::runtime::console::{ConsoleRelay, OutputSink};
use crate::runtime::context::Scope;
use crate::runtime::guard::{CallGuard, ErrorReporter};
use crate::runtime::handle::{Command, ExecutionResult, RuntimeShared, RuntimeState};
use crate::runtime::value::Map;
use crate::shareable::{clone_recursive, Shareable};
use crate::worklet::{SourceLocation, Thrown};
use crate::{RuntimeCreationError, Value};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Host collaborators every runtime is wired to
#[derive(Clone)]
pub(crate) struct RuntimeEnv {
    pub config: RuntimeConfig,
    pub sink: Arc<dyn OutputSink>,
    pub reporter: Arc<dyn ErrorReporter>,
}

/// Spawn the runtime thread and wait until it is Ready
pub(crate) fn spawn(
    shared: Arc<RuntimeShared>,
    queue: Receiver<Command>,
    env: RuntimeEnv,
    initializer: Option<Shareable>,
) -> Result<JoinHandle<()>, RuntimeCreationError> {
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), RuntimeCreationError>>(1);
    let name = shared.name().to_string();

    let thread_name = format!("{}-{}", env.config.thread_name_prefix, name);
    let mut builder = thread::Builder::new().name(thread_name);
    if let Some(size) = env.config.thread_stack_size {
        builder = builder.stack_size(size);
    }

    let thread = builder.spawn(move || {
        let _exit = DisposeOnExit(shared.clone());
        let mut core = RuntimeCore::bootstrap(shared, &env);

        if let Some(initializer) = initializer {
            if let Err(e) = core.execute(&initializer, None) {
                core.shared.set_state(RuntimeState::Disposed);
                let _ = ready_tx.send(Err(RuntimeCreationError::Initializer(e)));
                return;
            }
        }

        core.shared.set_state(RuntimeState::Ready);
        tracing::debug!(runtime = core.shared.name(), id = core.shared.id(), "runtime ready");
        let _ = ready_tx.send(Ok(()));

        core.run(queue);
    })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(thread),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(RuntimeCreationError::Bootstrap { name })
        }
    }
}

/// Marks the runtime disposed however its thread exits
struct DisposeOnExit(Arc<RuntimeShared>);

impl Drop for DisposeOnExit {
    fn drop(&mut self) {
        self.0.set_state(RuntimeState::Disposed);
    }
}

/// State owned by the runtime thread
struct RuntimeCore {
    shared: Arc<RuntimeShared>,
    globals: Map<Value>,
    guard: CallGuard,
    console: ConsoleRelay,
    max_depth: usize,
}

impl RuntimeCore {
    /// Core dispatch primitives, then the call guard, then the console
    fn bootstrap(shared: Arc<RuntimeShared>, env: &RuntimeEnv) -> Self {
        shared.set_state(RuntimeState::Initializing);

        let mut globals = Map::default();
        install_core_functions(&shared, &mut globals);
        let config = &env.config;
        let guard = CallGuard::install(shared.name(), env.reporter.clone(), config.catch_panics);
        let console =
            ConsoleRelay::install(shared.name(), env.sink.clone(), config.forward_console);

        tracing::debug!(runtime = shared.name(), "runtime bootstrapped");
        Self {
            shared,
            globals,
            guard,
            console,
            max_depth: env.config.max_call_depth,
        }
    }

    /// Serve commands until `Shutdown`. Every command accepted before the
    /// runtime was disposed sits ahead of that marker and runs.
    fn run(&mut self, queue: Receiver<Command>) {
        while let Ok(command) = queue.recv() {
            let Command::Run { worklet, origin, reply } = command else {
                break;
            };

            let result = self.execute(&worklet, origin.as_ref());
            let fatal = matches!(&result, Err(e) if e.panicked) && !self.guard.catches_panics();
            if fatal {
                // Rejects new dispatches; commands still queued are dropped
                self.shared.set_state(RuntimeState::Disposed);
                tracing::warn!(runtime = self.shared.name(), "runtime stopped after a panic");
            }
            if let Some(reply) = reply {
                reply.send(result);
            }
            if fatal {
                return;
            }
        }

        self.shared.set_state(RuntimeState::Disposed);
        tracing::debug!(runtime = self.shared.name(), "runtime stopped");
    }

    fn execute(&mut self, payload: &Shareable, origin: Option<&SourceLocation>) -> ExecutionResult {
        let Some(worklet) = payload.unpack_worklet() else {
            let message = format!("expected a worklet, got {:?}", payload.kind());
            let thrown = Thrown::without_site(message);
            return Err(self.guard.fail(thrown, false, origin));
        };

        let value = {
            let mut scope =
                Scope::new(&self.shared, &mut self.globals, &self.console, self.max_depth);
            self.guard.run(&mut scope, &worklet, origin)?
        };

        clone_recursive(&value).map_err(|e| {
            let message = format!("result of `{}` cannot be returned: {}", worklet.name(), e);
            let mut thrown = Thrown::without_site(message);
            thrown.push_frame(worklet.code().frame());
            self.guard.fail(thrown, false, origin)
        })
    }
}

/// Mark this thread as the runtime and expose the runtime's identity
fn install_core_functions(shared: &RuntimeShared, globals: &mut Map<Value>) {
    dispatch::enter_runtime(shared.id());
    globals.insert("_WORKLET".to_string(), Value::Bool(true));
    globals.insert("__runtimeName".to_string(), Value::from(shared.name()));
}
