//! The run-time call stack and the script lock.
//!
//! Each task owns one [`ScriptLock`]. Every non-static script statement
//! executes while some stack copy owns it. The lock is not re-entrant by
//! counting; re-entrancy falls out of ownership transfer: a nested call
//! receives the caller's owned state, sees it already owns the lock, and
//! skips acquisition. Thread-pool workers instead get deferred copies and
//! acquire fresh.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::lock_api::RawMutex as _;
use parking_lot::{Mutex, RawMutex};

use crate::error::{RunResult, ScriptError};
use crate::scope::StackLocation;
use crate::task::TaskCore;
use crate::value::Value;

/// The task-wide mutual-exclusion primitive behind all non-static execution.
pub struct ScriptLock {
    raw: RawMutex,
}

impl ScriptLock {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self { raw: RawMutex::INIT }
    }

    fn lock(&self) {
        self.raw.lock();
    }

    fn unlock(&self) {
        // SAFETY: callers pair this with a successful `lock` on the same
        // thread; `LockState` tracks ownership and never double-unlocks.
        unsafe { self.raw.unlock() }
    }
}

impl fmt::Debug for ScriptLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScriptLock")
    }
}

/// Lock state carried by one call-stack copy: which lock, and whether this
/// copy currently owns it.
#[derive(Debug)]
pub(crate) struct LockState {
    lock: Option<Arc<ScriptLock>>,
    owned: bool,
}

impl LockState {
    pub fn deferred(lock: Arc<ScriptLock>) -> Self {
        Self {
            lock: Some(lock),
            owned: false,
        }
    }

    /// No lock attached; placeholder for stack copies stored inside function
    /// values.
    pub fn detached() -> Self {
        Self {
            lock: None,
            owned: false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.lock.is_some()
    }

    /// Acquires the lock unless this state already owns it. Returns whether
    /// this call took it (and must therefore release it).
    fn acquire_if_unowned(&mut self) -> bool {
        if self.owned {
            return false;
        }
        let lock = self
            .lock
            .as_ref()
            .expect("script lock must be attached before execution");
        lock.lock();
        self.owned = true;
        true
    }

    fn release(&mut self) {
        debug_assert!(self.owned, "releasing a lock this state does not own");
        if let Some(lock) = &self.lock {
            lock.unlock();
        }
        self.owned = false;
    }
}

/// One function invocation's local storage: a fixed-size slot vector behind
/// its own mutex. Slots start [`Value::Undefined`].
#[derive(Debug)]
pub struct Frame {
    module: u32,
    function: u32,
    values: Mutex<Vec<Value>>,
}

impl Frame {
    fn new(module: u32, function: u32, slots: usize) -> Self {
        Self {
            module,
            function,
            values: Mutex::new(vec![Value::Undefined; slots]),
        }
    }

    fn get(&self, var: u32) -> RunResult<Value> {
        let values = self.values.lock();
        values.get(var as usize).cloned().ok_or_else(|| {
            ScriptError::status(1, format!("variable slot {var} out of frame bounds"))
        })
    }

    fn set(&self, var: u32, value: Value) -> RunResult<()> {
        let mut values = self.values.lock();
        let slot = values.get_mut(var as usize).ok_or_else(|| {
            ScriptError::status(1, format!("variable slot {var} out of frame bounds"))
        })?;
        *slot = value;
        Ok(())
    }
}

/// The run-time call stack.
///
/// Frames live in a `[module][function] → stack of frames` table plus a
/// parallel currently-executing stack. Copies share frames (`Arc`), which is
/// what gives closures access to their defining frames and lets parallel
/// workers observe the caller's environment.
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<Vec<Vec<Arc<Frame>>>>,
    active: Vec<Arc<Frame>>,
    task: Weak<TaskCore>,
    pub(crate) lock: LockState,
}

impl CallStack {
    pub(crate) fn new(task: Weak<TaskCore>, lock: Arc<ScriptLock>) -> Self {
        Self {
            frames: Vec::new(),
            active: Vec::new(),
            task,
            lock: LockState::deferred(lock),
        }
    }

    pub(crate) fn task(&self) -> Option<Arc<TaskCore>> {
        self.task.upgrade()
    }

    /// Copies the frame table without any lock; used when a function value
    /// captures the stack at definition time.
    pub(crate) fn clone_frames(&self) -> Self {
        Self {
            frames: self.frames.clone(),
            active: self.active.clone(),
            task: self.task.clone(),
            lock: LockState::detached(),
        }
    }

    /// Copies the frame table with a fresh deferred lock, for thread-pool
    /// workers that must acquire the script lock themselves.
    pub(crate) fn create_copy_with_deferred_lock(&self) -> Self {
        let lock = match self.task.upgrade() {
            Some(task) => LockState::deferred(Arc::clone(&task.script_lock)),
            None => LockState::detached(),
        };
        Self {
            frames: self.frames.clone(),
            active: self.active.clone(),
            task: self.task.clone(),
            lock,
        }
    }

    /// Moves the lock state out of `other` into `self` (and back, when the
    /// call returns). This is the transfer that makes nested calls run under
    /// the caller's logical lock.
    pub(crate) fn take_lock_from(&mut self, other: &mut Self) {
        self.lock = std::mem::replace(&mut other.lock, LockState::detached());
    }

    /// Runs `f` while holding the script lock, acquiring it only if this
    /// stack copy does not already own it.
    pub(crate) fn with_script_lock<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> RunResult<T>,
    ) -> RunResult<T> {
        let acquired = self.lock.acquire_if_unowned();
        let result = f(self);
        if acquired {
            self.lock.release();
        }
        result
    }

    /// Runs `f` with the script lock temporarily released (for blocking
    /// waits); re-acquires before returning if it was owned on entry.
    pub(crate) fn with_lock_released<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let was_owned = self.lock.owned;
        if was_owned {
            self.lock.release();
        }
        let result = f();
        if was_owned {
            let reacquired = self.lock.acquire_if_unowned();
            debug_assert!(reacquired);
        }
        result
    }

    /// Pushes a new frame for `[module][function]` with `slots` variables.
    pub(crate) fn enter_frame(&mut self, module: u32, function: u32, slots: usize) {
        let module_idx = module as usize;
        let function_idx = function as usize;
        if self.frames.len() <= module_idx {
            self.frames.resize_with(module_idx + 1, Vec::new);
        }
        let functions = &mut self.frames[module_idx];
        if functions.len() <= function_idx {
            functions.resize_with(function_idx + 1, Vec::new);
        }
        let frame = Arc::new(Frame::new(module, function, slots));
        functions[function_idx].push(Arc::clone(&frame));
        self.active.push(frame);
    }

    /// Pops the currently-executing frame from both tables.
    pub(crate) fn exit_frame(&mut self) -> RunResult<()> {
        let frame = self.active.pop().ok_or_else(|| {
            ScriptError::status(
                1,
                "Attempting to exit function frame when there is currently no function running",
            )
        })?;
        let stack = &mut self.frames[frame.module as usize][frame.function as usize];
        if stack.pop().is_none() {
            return Err(ScriptError::status(
                1,
                "Function existed in functions stack, but can't find its frame pointer",
            ));
        }
        Ok(())
    }

    fn top_frame(&self, loc: StackLocation) -> RunResult<Arc<Frame>> {
        self.frames
            .get(loc.module as usize)
            .and_then(|functions| functions.get(loc.function as usize))
            .and_then(|stack| stack.last())
            .cloned()
            .ok_or_else(|| {
                ScriptError::status(
                    1,
                    format!(
                        "no live frame for module={} function={}",
                        loc.module, loc.function
                    ),
                )
            })
    }

    pub(crate) fn get_variable(&self, loc: StackLocation) -> RunResult<Value> {
        self.top_frame(loc)?.get(loc.var)
    }

    /// Writes a variable cell. The first time any future value is stored it
    /// is registered with the task for `is_ready` tracking.
    pub(crate) fn set_variable(&self, loc: StackLocation, value: Value) -> RunResult<()> {
        if let Value::Future(future) = &value {
            if future.mark_registered() {
                if let Some(task) = self.task.upgrade() {
                    task.save_future(future);
                }
            }
        }
        self.top_frame(loc)?.set(loc.var, value)
    }
}
