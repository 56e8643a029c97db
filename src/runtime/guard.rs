// src/runtime/guard.rs
//! Call guard: every worklet a runtime executes runs through here
//!
//! Failures never unwind out of a runtime. A returned [`Thrown`] or a panic
//! becomes a [`WorkletExecutionError`], which goes to the error reporter and
//! back to whoever is waiting on the dispatch.

use crate::runtime::context::Scope;
use crate::worklet::{SourceLocation, Thrown, Worklet};
use crate::{Value, WorkletExecutionError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Host-side channel for worklet failures
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &WorkletExecutionError);
}

impl<F> ErrorReporter for F
where
    F: Fn(&WorkletExecutionError) + Send + Sync,
{
    fn report(&self, error: &WorkletExecutionError) {
        self(error)
    }
}

/// Default reporter: one `tracing` error event per failure
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &WorkletExecutionError) {
        tracing::error!(
            runtime = %error.runtime,
            thrown_at = ?error.thrown_at,
            dispatched_from = ?error.dispatched_from,
            panicked = error.panicked,
            "worklet failed: {}",
            error.message
        );
    }
}

pub struct CallGuard {
    runtime: String,
    reporter: Arc<dyn ErrorReporter>,
    catch_panics: bool,
}

impl CallGuard {
    pub(crate) fn install(
        runtime: &str,
        reporter: Arc<dyn ErrorReporter>,
        catch_panics: bool,
    ) -> Self {
        Self {
            runtime: runtime.to_string(),
            reporter,
            catch_panics,
        }
    }

    /// Whether the runtime survives a panicking worklet
    pub fn catches_panics(&self) -> bool {
        self.catch_panics
    }

    /// Execute `worklet` as a top-level work item. A panic is always
    /// reported; [`CallGuard::catches_panics`] decides whether the runtime
    /// keeps serving afterwards.
    pub fn run(
        &self,
        scope: &mut Scope<'_>,
        worklet: &Worklet,
        origin: Option<&SourceLocation>,
    ) -> Result<Value, WorkletExecutionError> {
        let call = AssertUnwindSafe(|| scope.call_worklet(worklet, &[]));
        let outcome = match panic::catch_unwind(call) {
            Ok(result) => result.map_err(|thrown| (thrown, false)),
            Err(payload) => {
                let mut thrown = Thrown::without_site(panic_message(payload.as_ref()));
                thrown.push_frame(worklet.code().frame());
                Err((thrown, true))
            }
        };

        outcome.map_err(|(thrown, panicked)| self.fail(thrown, panicked, origin))
    }

    /// Build the structured record for a failure and report it
    pub(crate) fn fail(
        &self,
        thrown: Thrown,
        panicked: bool,
        origin: Option<&SourceLocation>,
    ) -> WorkletExecutionError {
        let error = WorkletExecutionError {
            runtime: self.runtime.clone(),
            message: thrown.message,
            thrown_at: thrown.thrown_at,
            trace: thrown.trace,
            dispatched_from: origin.cloned(),
            panicked,
            cause: thrown.cause,
        };
        self.reporter.report(&error);
        error
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worklet panicked".to_string()
    }
}
