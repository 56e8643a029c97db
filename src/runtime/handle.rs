// src/runtime/handle.rs
//! Opaque handle to a runtime and the commands it accepts

use crate::shareable::Shareable;
use crate::worklet::SourceLocation;
use crate::{DispatchError, WorkletExecutionError};
use parking_lot::RwLock;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

pub type RuntimeId = u64;

/// Lifecycle of a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

/// State visible both to handles and to the runtime thread.
///
/// Enqueueing holds the state lock for reading and disposal holds it for
/// writing, so no command can land behind the `Shutdown` marker.
pub(crate) struct RuntimeShared {
    id: RuntimeId,
    name: String,
    state: RwLock<RuntimeState>,
}

impl RuntimeShared {
    pub(crate) fn id(&self) -> RuntimeId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn state(&self) -> RuntimeState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: RuntimeState) {
        *self.state.write() = state;
    }
}

pub(crate) type ExecutionResult = Result<Shareable, WorkletExecutionError>;

/// Where the outcome of a dispatched worklet goes
pub(crate) enum Reply {
    Blocking(Sender<ExecutionResult>),
    #[cfg(feature = "tokio")]
    Future(tokio::sync::oneshot::Sender<ExecutionResult>),
}

impl Reply {
    /// The caller may have stopped waiting; nothing to do then
    pub(crate) fn send(self, result: ExecutionResult) {
        match self {
            Reply::Blocking(tx) => {
                let _ = tx.send(result);
            }
            #[cfg(feature = "tokio")]
            Reply::Future(tx) => {
                let _ = tx.send(result);
            }
        }
    }
}

/// Work item accepted by a runtime thread
pub(crate) enum Command {
    Run {
        worklet: Shareable,
        origin: Option<SourceLocation>,
        reply: Option<Reply>,
    },
    Shutdown,
}

/// Cheap, cloneable reference to a runtime. Grants no access to the
/// runtime's state; everything goes through its command queue.
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<RuntimeShared>,
    commands: Sender<Command>,
}

impl RuntimeHandle {
    pub(crate) fn new(id: RuntimeId, name: String) -> (Self, Receiver<Command>) {
        let (commands, queue) = mpsc::channel();
        let shared = Arc::new(RuntimeShared {
            id,
            name,
            state: RwLock::new(RuntimeState::Uninitialized),
        });
        (Self { shared, commands }, queue)
    }

    pub fn id(&self) -> RuntimeId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> RuntimeState {
        self.shared.state()
    }

    pub(crate) fn shared(&self) -> &Arc<RuntimeShared> {
        &self.shared
    }

    /// Enqueue a command on a Ready runtime
    pub(crate) fn send(&self, command: Command) -> Result<(), DispatchError> {
        let state = self.shared.state.read();
        match *state {
            RuntimeState::Ready => {}
            RuntimeState::Disposed => return Err(self.unavailable()),
            RuntimeState::Uninitialized | RuntimeState::Initializing => {
                return Err(DispatchError::NotReady {
                    name: self.name().to_string(),
                })
            }
        }
        self.commands.send(command).map_err(|_| self.unavailable())
    }

    /// Mark the runtime disposed and ask its thread to stop once the
    /// commands already queued have run
    pub(crate) fn shutdown(&self) {
        let mut state = self.shared.state.write();
        *state = RuntimeState::Disposed;
        let _ = self.commands.send(Command::Shutdown);
    }

    pub(crate) fn unavailable(&self) -> DispatchError {
        DispatchError::RuntimeUnavailable {
            name: self.name().to_string(),
        }
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
