// src/dispatch.rs
//! Cross-runtime dispatch
//!
//! A dispatch clones the worklet on the calling thread, so preparation
//! failures surface right here, then sends the snapshot to the target's
//! queue. Dispatches from one thread into one runtime run in the order they
//! were issued. There is no timeout: a synchronous dispatch waits for as
//! long as the worklet runs, and a cycle of synchronous dispatches
//! (A waits on B, B waits on A) deadlocks.

use crate::runtime::handle::{Command, Reply, RuntimeHandle, RuntimeId};
use crate::shareable::clone_worklet;
use crate::worklet::{SourceLocation, Worklet};
use crate::{DispatchError, Value};
use std::cell::Cell;
use std::sync::mpsc;

thread_local! {
    static CURRENT_RUNTIME: Cell<Option<RuntimeId>> = const { Cell::new(None) };
}

/// Called once on a runtime thread during bootstrap
pub(crate) fn enter_runtime(id: RuntimeId) {
    CURRENT_RUNTIME.with(|current| current.set(Some(id)));
}

/// Id of the runtime whose thread is calling, `None` on host threads
pub fn current_runtime() -> Option<RuntimeId> {
    CURRENT_RUNTIME.with(Cell::get)
}

/// Run `worklet` on `runtime` and wait for it to finish.
///
/// Returns the worklet's return value, cloned back into the caller's
/// context. A failure inside the worklet is reported through the error
/// reporter and returned as [`DispatchError::Execution`]. A runtime cannot
/// wait on itself: a synchronous dispatch from a runtime's own thread is
/// rejected with [`DispatchError::SelfDispatch`].
#[track_caller]
pub fn run_on_runtime_sync(
    runtime: &RuntimeHandle,
    worklet: &Worklet,
) -> Result<Value, DispatchError> {
    let origin = SourceLocation::caller();

    if current_runtime() == Some(runtime.id()) {
        return Err(DispatchError::SelfDispatch {
            name: runtime.name().to_string(),
        });
    }

    let payload = clone_worklet(worklet)?;
    let (tx, rx) = mpsc::channel();

    tracing::debug!(runtime = runtime.name(), worklet = worklet.name(), "sync dispatch");
    runtime.send(Command::Run {
        worklet: payload,
        origin: Some(origin),
        reply: Some(Reply::Blocking(tx)),
    })?;

    let result = rx.recv().map_err(|_| runtime.unavailable())?;
    Ok(result?.unpack())
}

/// Enqueue `worklet` on `runtime` and return immediately.
///
/// Nothing comes back to the caller; failures go to the error reporter. A
/// worklet that needs to hand a result back must dispatch it itself.
#[track_caller]
pub fn run_on_runtime_async(
    runtime: &RuntimeHandle,
    worklet: &Worklet,
) -> Result<(), DispatchError> {
    let origin = SourceLocation::caller();
    let payload = clone_worklet(worklet)?;

    tracing::debug!(runtime = runtime.name(), worklet = worklet.name(), "async dispatch");
    runtime.send(Command::Run {
        worklet: payload,
        origin: Some(origin),
        reply: None,
    })
}

/// Like [`run_on_runtime_sync`], but the caller awaits instead of blocking
/// its thread. Resolves to the result snapshot; `unpack` it where it is
/// needed.
#[cfg(feature = "tokio")]
#[track_caller]
pub fn run_on_runtime_awaitable(
    runtime: &RuntimeHandle,
    worklet: &Worklet,
) -> Result<
    impl std::future::Future<Output = Result<crate::Shareable, DispatchError>> + Send + 'static,
    DispatchError,
> {
    let origin = SourceLocation::caller();
    let payload = clone_worklet(worklet)?;
    let (tx, rx) = tokio::sync::oneshot::channel();

    runtime.send(Command::Run {
        worklet: payload,
        origin: Some(origin),
        reply: Some(Reply::Future(tx)),
    })?;

    let unavailable = runtime.unavailable();
    Ok(async move {
        match rx.await {
            Ok(result) => result.map_err(DispatchError::from),
            Err(_) => Err(unavailable),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::handle::RuntimeState;
    use crate::runtime::Scope;
    use crate::worklet::{Closure, Function, Thrown};
    use crate::CloneError;

    fn noop(_: &mut Scope<'_>, _: &Closure, _: &[Value]) -> Result<Value, Thrown> {
        Ok(Value::Undefined)
    }

    #[test]
    fn test_host_thread_is_not_a_runtime() {
        assert_eq!(current_runtime(), None);
    }

    #[test]
    fn test_clone_failure_raised_before_enqueue() {
        let (handle, queue) = RuntimeHandle::new(5, "rt".to_string());
        handle.shared().set_state(RuntimeState::Ready);

        let host: Value = Function::host("cb", |_| Ok(Value::Undefined)).into();
        let worklet = Worklet::new("noop", noop).capture("cb", host);

        let err = run_on_runtime_async(&handle, &worklet).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Clone(CloneError::NonWorkletFunction { name: "cb".into() })
        );
        assert!(queue.try_recv().is_err());
    }

    #[test]
    fn test_self_dispatch_rejected() {
        let (handle, _queue) = RuntimeHandle::new(6, "self".to_string());
        handle.shared().set_state(RuntimeState::Ready);

        let result = std::thread::spawn(move || {
            enter_runtime(6);
            run_on_runtime_sync(&handle, &Worklet::new("noop", noop)).map(|_| ())
        })
        .join()
        .unwrap();

        assert_eq!(result, Err(DispatchError::SelfDispatch { name: "self".into() }));
    }

    #[test]
    fn test_async_enqueues_with_origin() {
        let (handle, queue) = RuntimeHandle::new(7, "rt".to_string());
        handle.shared().set_state(RuntimeState::Ready);

        run_on_runtime_async(&handle, &Worklet::new("noop", noop)).unwrap();
        match queue.try_recv() {
            Ok(Command::Run { origin, reply, .. }) => {
                assert!(origin.unwrap().file.ends_with("dispatch.rs"));
                assert!(reply.is_none());
            }
            _ => panic!("expected a queued run"),
        }
    }
}
