//! Background computations on the rayon pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::debug;

use super::builder::LambdaBuilder;
use crate::errors::{Error, ErrorKind, Result};
use crate::scope::Scope;
use crate::sync::lock;
use crate::values::Value;

/// Progress of a forked computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkState {
    NotYetAvailable,
    Completed,
    Failed,
}

#[derive(Default)]
struct Outcome {
    result: Mutex<Option<Result<Value>>>,
    done: Condvar,
}

impl Outcome {
    fn complete(&self, result: Result<Value>) {
        *lock(&self.result) = Some(result);
        self.done.notify_all();
    }

    fn state(&self) -> ForkState {
        match &*lock(&self.result) {
            None => ForkState::NotYetAvailable,
            Some(Ok(_)) => ForkState::Completed,
            Some(Err(_)) => ForkState::Failed,
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<Value> {
        let result = lock(&self.result);
        let result = match timeout {
            Some(timeout) => {
                self.done
                    .wait_timeout_while(result, timeout, |result| result.is_none())
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .0
            }
            None => self
                .done
                .wait_while(result, |result| result.is_none())
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        };
        match &*result {
            Some(outcome) => outcome.clone(),
            None => Err(Error::new(
                ErrorKind::Timeout,
                "Forked computation did not complete in time",
            )),
        }
    }
}

/// A computation running in the background, and the lambda value that
/// resolves to its result.
pub struct Forked {
    value: Value,
    outcome: Arc<Outcome>,
}

impl Forked {
    /// Forcing this value blocks until the computation completes.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn fork_state(&self) -> ForkState {
        self.outcome.state()
    }

    /// Wait at most `timeout`. Fails with `TIMEOUT` if still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Value> {
        self.outcome.wait(Some(timeout))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    match payload.downcast_ref::<&str>() {
        Some(message) => (*message).to_string(),
        None => payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}

/// Run `compute` on the rayon pool in a child of `scope`.
///
/// The result is fully fixed on the pool thread before it is published. A
/// panic in `compute` completes the fork with an `EXCEPTION`.
pub fn fork(
    scope: &Scope,
    operation: &str,
    compute: impl FnOnce(&Scope) -> Result<Value> + Send + 'static,
) -> Result<Forked> {
    let child = scope.sub_scope(scope.is_pure(), operation)?;
    let outcome = Arc::new(Outcome::default());

    let worker = outcome.clone();
    let name = operation.to_string();
    rayon::spawn(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            compute(&child).and_then(|value| value.fix_deep(false))
        }))
        .unwrap_or_else(|payload| {
            Err(Error::exception(format!(
                "Forked computation panicked: {}",
                panic_message(payload.as_ref())
            )))
        });
        debug!(operation = name.as_str(), ok = result.is_ok(), "fork finished");
        worker.complete(result);
    });

    let waiter = outcome.clone();
    let value = LambdaBuilder::new(scope, operation).build(move |_| waiter.wait(None));
    Ok(Forked { value, outcome })
}
