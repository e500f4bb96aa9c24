//! Futures over host-side asynchronous jobs.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::error::{RunResult, ScriptError};
use crate::value::Value;

#[derive(Debug)]
enum FutureState {
    Pending,
    Ready(Value),
    Failed(ScriptError),
}

/// A handle to a host-side job that will eventually produce a value.
///
/// The first time a future is stored into any stack frame it is registered
/// with the owning task; `Task::is_ready` reports true only once every
/// registered future has resolved.
#[derive(Debug)]
pub struct FutureValue {
    name: String,
    state: Mutex<FutureState>,
    cv: Condvar,
    registered: AtomicBool,
}

impl FutureValue {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(FutureState::Pending),
            cv: Condvar::new(),
            registered: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves the future; later `get` calls return clones of `value`.
    pub fn resolve(&self, value: Value) {
        let mut state = self.state.lock();
        if matches!(*state, FutureState::Pending) {
            *state = FutureState::Ready(value);
        }
        self.cv.notify_all();
    }

    /// Fails the future; later `get` calls re-raise `error`.
    pub fn fail(&self, error: ScriptError) {
        let mut state = self.state.lock();
        if matches!(*state, FutureState::Pending) {
            *state = FutureState::Failed(error);
        }
        self.cv.notify_all();
    }

    /// Non-blocking readiness check.
    pub fn is_available(&self) -> bool {
        !matches!(*self.state.lock(), FutureState::Pending)
    }

    /// The resolved value if available, without blocking.
    pub fn try_get(&self) -> Option<RunResult<Value>> {
        match &*self.state.lock() {
            FutureState::Pending => None,
            FutureState::Ready(value) => Some(Ok(value.clone())),
            FutureState::Failed(err) => Some(Err(err.clone())),
        }
    }

    /// Blocks until the job resolves. Callers must release the script lock
    /// first; the host thread resolving this future may need it.
    pub fn wait(&self) -> RunResult<Value> {
        let mut state = self.state.lock();
        while matches!(*state, FutureState::Pending) {
            self.cv.wait(&mut state);
        }
        match &*state {
            FutureState::Ready(value) => Ok(value.clone()),
            FutureState::Failed(err) => Err(err.clone()),
            FutureState::Pending => unreachable!("wait loop exits only on resolution"),
        }
    }

    /// Marks the future as registered with a task; returns true on the first
    /// call only.
    pub fn mark_registered(&self) -> bool {
        !self.registered.swap(true, Ordering::SeqCst)
    }

    pub fn print(&self) -> String {
        format!("Future[{}]", self.name)
    }
}
