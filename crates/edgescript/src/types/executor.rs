//! The in-script concurrency primitive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::bounded;
use parking_lot::Mutex;

use crate::error::{RunResult, ScriptError};
use crate::pool;
use crate::stack::CallStack;
use crate::value::Value;

/// Script-visible executor with two operations: `sync` (serialized through
/// the executor's own mutex) and `run_parallel` (fan-out over the thread
/// pool).
#[derive(Debug, Default)]
pub struct ConcurrentExecutor {
    mutex: Mutex<()>,
}

impl ConcurrentExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `fn(*args)` while holding the executor mutex, guarding
    /// against overlapping `sync` calls on the same executor.
    pub fn run_sync(&self, args: Vec<Value>, stack: &mut CallStack) -> RunResult<Value> {
        let _guard = self.mutex.lock();
        if args.is_empty() {
            return Err(ScriptError::argument(
                "sync requires atleast one argument, the function to call",
            ));
        }
        let mut iter = args.into_iter();
        let func = iter.next().expect("checked non-empty");
        func.execute_function(iter.collect(), stack)
    }

    /// Calls `fn(e, *extra)` for each element of the iterable on the thread
    /// pool and returns the results as a list in input order.
    ///
    /// Each job gets a deferred-lock copy of the caller's stack, so static
    /// functions run in parallel while non-static ones serialize on the
    /// script lock. The caller releases its own hold on the script lock and
    /// pumps the pool queue while draining, storing the first worker error;
    /// a shared cancel flag short-circuits jobs that have not started yet.
    pub fn run_parallel(&self, args: Vec<Value>, stack: &mut CallStack) -> RunResult<Value> {
        if args.len() < 2 {
            return Err(ScriptError::argument(format!(
                "run_parallel requires atleast 2 arguments 1st function and 2nd iteratable got {} \
                 arguments",
                args.len()
            )));
        }
        let func = args[0].clone();
        let iterable = args[1].clone();
        let extra: Vec<Value> = args[2..].to_vec();
        let total = iterable.size()?;

        let cancel = Arc::new(AtomicBool::new(false));
        let pool = pool::global_pool();
        let mut receivers = Vec::with_capacity(total as usize);

        for i in 0..total {
            let element = iterable.get_int_subscript(i)?;
            let mut call_args = Vec::with_capacity(1 + extra.len());
            call_args.push(element);
            call_args.extend(extra.iter().cloned());

            let mut worker_stack = stack.create_copy_with_deferred_lock();
            let func = func.clone();
            let cancel = Arc::clone(&cancel);
            let (tx, rx) = bounded(1);
            pool.execute(move || {
                let result = if cancel.load(Ordering::SeqCst) {
                    Ok(Value::None)
                } else {
                    func.execute_function(call_args, &mut worker_stack)
                };
                if result.is_err() {
                    cancel.store(true, Ordering::SeqCst);
                }
                let _ = tx.send(result);
            });
            receivers.push(rx);
        }

        // Drain with the script lock released so pumped-inline jobs (and
        // non-static workers) can acquire it.
        let drained: Vec<RunResult<Value>> = stack.with_lock_released(|| {
            receivers
                .into_iter()
                .map(|rx| loop {
                    match rx.try_recv() {
                        Ok(result) => break result,
                        Err(_) => {
                            if !pool.run_queued_task() {
                                std::thread::yield_now();
                            }
                        }
                    }
                })
                .collect()
        });

        let mut results = Vec::with_capacity(drained.len());
        let mut first_error = None;
        for result in drained {
            match result {
                Ok(value) => results.push(value),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                    results.push(Value::None);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(Value::list(results))
    }
}
