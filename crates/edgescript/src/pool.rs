//! The process-wide thread pool.
//!
//! Workers pull closures off a shared channel. The submitting side keeps a
//! receiver too, so a caller blocked on parallel results can pump queued
//! jobs inline instead of idling (see `ConcurrentExecutor::run_parallel`).
//!
//! The pool size may be set once before first use; after the pool is built
//! it is fixed for the life of the process.

use std::sync::{Arc, OnceLock};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{RunResult, ScriptError};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
pub struct ThreadPool {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
}

impl ThreadPool {
    fn new(threads: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        for i in 0..threads {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("edgescript-worker-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })
                .expect("failed to spawn thread-pool worker");
        }
        Self { sender, receiver }
    }

    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        self.sender
            .send(Box::new(job))
            .expect("thread pool queue closed");
    }

    /// Runs one queued job on the calling thread, if any is waiting.
    pub fn run_queued_task(&self) -> bool {
        match self.receiver.try_recv() {
            Ok(job) => {
                job();
                true
            }
            Err(_) => false,
        }
    }
}

#[derive(Debug)]
struct PoolConfig {
    threads: usize,
    pool: Option<Arc<ThreadPool>>,
}

static POOL: OnceLock<Mutex<PoolConfig>> = OnceLock::new();

fn config() -> &'static Mutex<PoolConfig> {
    POOL.get_or_init(|| {
        Mutex::new(PoolConfig {
            threads: default_threads(),
            pool: None,
        })
    })
}

/// Default pool size: one core left for the caller, never fewer than two
/// workers.
pub fn default_threads() -> usize {
    num_cpus::get().saturating_sub(1).max(2)
}

/// Sets the pool size. Fails once the pool has been built.
pub fn set_threadpool_threads(threads: i64) -> RunResult<()> {
    let mut cfg = config().lock();
    if cfg.pool.is_some() {
        return Err(ScriptError::argument(
            "Threadpool is already created can't set threads now",
        ));
    }
    if threads < 1 {
        return Err(ScriptError::argument(format!(
            "ThreadCount cannot be less than 1 given {threads}"
        )));
    }
    cfg.threads = threads as usize;
    Ok(())
}

/// The shared pool, built on first use.
pub fn global_pool() -> Arc<ThreadPool> {
    let mut cfg = config().lock();
    if let Some(pool) = &cfg.pool {
        return Arc::clone(pool);
    }
    let pool = Arc::new(ThreadPool::new(cfg.threads));
    cfg.pool = Some(Arc::clone(&pool));
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn jobs_run_on_workers_or_inline() {
        let pool = global_pool();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        while counter.load(Ordering::SeqCst) < 16 {
            if !pool.run_queued_task() {
                std::thread::yield_now();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }
}
