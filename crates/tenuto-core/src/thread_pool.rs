//! Fixed-size worker pool for plugin-requested parallel work.
//!
//! A dispatch of `n` tasks resets a shared task cursor, posts `n` wake
//! permits, and waits for exactly `n` completion permits. Each woken worker
//! claims the next task index with an atomic increment and runs the job for
//! that index. Workers re-check the stop flag after every wake, and shutdown
//! posts one wake per worker so none stays blocked.

use crate::error::{Error, Result};
use crate::semaphore::Semaphore;
use crate::thread_check::mark_audio_thread;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn Fn(u32) + Send + Sync>;

struct PoolShared {
    job: Job,
    next_task: AtomicU32,
    wake: Semaphore,
    done: Semaphore,
    stop: AtomicBool,
}

/// A set of worker threads that execute indexed tasks on demand.
///
/// Workers are tagged as audio threads since they run inside the audio
/// callback's dispatch.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    dispatch: Mutex<()>,
}

impl ThreadPool {
    /// Spawn `size` workers that run `job(task_index)` for each claimed task.
    pub fn new<F>(name: &str, size: usize, job: F) -> Result<Self>
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        if size == 0 {
            return Err(Error::EmptyPool);
        }

        let shared = Arc::new(PoolShared {
            job: Box::new(job),
            next_task: AtomicU32::new(0),
            wake: Semaphore::new(0),
            done: Semaphore::new(0),
            stop: AtomicBool::new(false),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(size),
            dispatch: Mutex::new(()),
        };

        for index in 0..size {
            let shared = Arc::clone(&pool.shared);
            // On error `pool` drops here, which stops the workers already spawned.
            let handle = thread::Builder::new()
                .name(format!("{name}-worker-{index}"))
                .spawn(move || Self::worker_loop(&shared))?;
            pool.workers.push(handle);
        }

        tracing::debug!(name, size, "Thread pool started");
        Ok(pool)
    }

    fn worker_loop(shared: &PoolShared) {
        mark_audio_thread();
        loop {
            shared.wake.acquire();
            if shared.stop.load(Ordering::Acquire) {
                break;
            }
            let task = shared.next_task.fetch_add(1, Ordering::AcqRel);
            // A panicking job must still signal completion or the dispatcher hangs.
            let _ = catch_unwind(AssertUnwindSafe(|| (shared.job)(task)));
            shared.done.release(1);
        }
    }

    /// Run tasks `0..num_tasks` on the workers and block until all complete.
    ///
    /// `num_tasks == 0` returns immediately without waking any worker.
    pub fn exec(&self, num_tasks: u32) -> Result<()> {
        if num_tasks == 0 {
            return Ok(());
        }
        if self.shared.stop.load(Ordering::Acquire) {
            return Err(Error::PoolShutDown);
        }

        let _dispatch = self.dispatch.lock();
        self.shared.next_task.store(0, Ordering::Release);
        self.shared.wake.release(num_tasks as usize);
        for _ in 0..num_tasks {
            self.shared.done.acquire();
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop every worker and join it.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.stop.store(true, Ordering::Release);
        self.shared.wake.release(self.workers.len());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("Thread pool worker exited with a panic");
            }
        }
        tracing::debug!("Thread pool stopped");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
