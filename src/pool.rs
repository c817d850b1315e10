// Stract is an open source web search engine.
// Copyright (C) 2024 Stract ApS
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! A bounded pool of worker threads sharing one FIFO task list. Per
//! spec.md 4.E/9: the idle loop blocks on a condvar instead of busy-spinning,
//! and workers never hold a back-reference to the pool beyond this shared
//! state — no cyclic references between worker and pool.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const WORKER_STARTUP_DELAY: Duration = Duration::from_millis(100);

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    tasks: Mutex<VecDeque<Task>>,
    condvar: Condvar,
    closed: AtomicBool,
    killed: AtomicBool,
    running: AtomicUsize,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// `n == 0` is coerced to `1` per spec.md 8 ("thread = 0 ⇒ coerced to 1").
    pub fn new(n: usize) -> Self {
        let n = n.max(1);
        let shared = Arc::new(Shared {
            tasks: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            closed: AtomicBool::new(false),
            killed: AtomicBool::new(false),
            running: AtomicUsize::new(0),
        });

        let handles = (0..n)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(shared))
            })
            .collect();

        Self {
            shared,
            handles: Mutex::new(handles),
        }
    }

    /// Appends a task. Precondition: the pool is not closed.
    pub fn add(&self, task: impl FnOnce() + Send + 'static) -> Result<(), PoolClosed> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(PoolClosed);
        }
        let mut tasks = self.lock_tasks();
        tasks.push_back(Box::new(task));
        drop(tasks);
        self.shared.condvar.notify_one();
        Ok(())
    }

    /// Bulk-enqueues one task per item, blocking until every task has run
    /// and returning results in input order.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let n = items.len();
        let f = Arc::new(f);
        let results: Arc<Mutex<Vec<Option<R>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));
        let remaining = Arc::new((Mutex::new(n), Condvar::new()));

        for (i, item) in items.into_iter().enumerate() {
            let f = Arc::clone(&f);
            let results = Arc::clone(&results);
            let remaining = Arc::clone(&remaining);
            let _ = self.add(move || {
                let value = f(item);
                results.lock().unwrap_or_else(|e| e.into_inner())[i] = Some(value);
                // Drop this closure's clone before signalling completion so
                // the caller's `Arc::try_unwrap` below isn't racing against
                // a reference that is merely about to go out of scope.
                drop(results);

                let (lock, condvar) = &*remaining;
                let mut count = lock.lock().unwrap_or_else(|e| e.into_inner());
                *count -= 1;
                if *count == 0 {
                    condvar.notify_all();
                }
            });
        }

        let (lock, condvar) = &*remaining;
        let mut count = lock.lock().unwrap_or_else(|e| e.into_inner());
        while *count > 0 {
            count = condvar.wait(count).unwrap_or_else(|e| e.into_inner());
        }
        drop(count);

        Arc::try_unwrap(results)
            .map_err(|_| ())
            .unwrap()
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .into_iter()
            .map(|slot| slot.expect("every mapped task runs exactly once"))
            .collect()
    }

    /// Fire-and-forget variant of `map`: enqueues and returns immediately.
    pub fn map_async<T, F>(&self, items: Vec<T>, f: F)
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        for item in items {
            let f = Arc::clone(&f);
            let _ = self.add(move || f(item));
        }
    }

    /// Subsequent `add` calls fail their precondition.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.condvar.notify_all();
    }

    /// Sets every worker's killed flag; they observe it on their next
    /// loop iteration and terminate without picking up further tasks.
    pub fn kill_all(&self) {
        self.shared.killed.store(true, Ordering::SeqCst);
        self.shared.condvar.notify_all();
    }

    pub fn clear_tasks(&self) {
        self.lock_tasks().clear();
    }

    /// Blocks until every worker has reported done. Precondition: closed.
    pub fn join(&self) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn running(&self) -> usize {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn pending_tasks(&self) -> usize {
        self.lock_tasks().len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.shared.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
pub struct PoolClosed;

impl std::fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "the pool is closed")
    }
}

impl std::error::Error for PoolClosed {}

/// Scoped use per spec.md 4.E ("the pool may be used as a scoped
/// resource"): entering returns the pool, exiting always closes it.
/// `join()` remains the caller's responsibility.
pub struct PoolGuard<'a> {
    pool: &'a WorkerPool,
}

impl<'a> PoolGuard<'a> {
    pub fn new(pool: &'a WorkerPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &WorkerPool {
        self.pool
    }
}

impl Drop for PoolGuard<'_> {
    fn drop(&mut self) {
        self.pool.close();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    thread::sleep(WORKER_STARTUP_DELAY);

    loop {
        let task = {
            let mut tasks = shared.tasks.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                if shared.killed.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(task) = tasks.pop_front() {
                    break task;
                }
                if shared.closed.load(Ordering::SeqCst) {
                    return;
                }
                tasks = shared
                    .condvar
                    .wait(tasks)
                    .unwrap_or_else(|e| e.into_inner());
            }
        };

        shared.running.fetch_add(1, Ordering::SeqCst);
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
            log::error!("worker task panicked");
        }
        shared.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[test]
    fn zero_threads_is_coerced_to_one() {
        let pool = WorkerPool::new(0);
        pool.close();
        pool.join();
    }

    #[test]
    fn runs_all_added_tasks_before_join_returns() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(StdAtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.add(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.close();
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn add_after_close_fails() {
        let pool = WorkerPool::new(1);
        pool.close();
        assert!(pool.add(|| {}).is_err());
        pool.join();
    }

    #[test]
    fn map_returns_ordered_results() {
        let pool = WorkerPool::new(4);
        let results = pool.map(vec![1, 2, 3, 4, 5], |x| x * x);
        pool.close();
        pool.join();
        assert_eq!(results, vec![1, 4, 9, 16, 25]);
    }

    #[test]
    fn a_panicking_task_does_not_kill_the_pool() {
        let pool = WorkerPool::new(1);
        pool.add(|| panic!("boom")).unwrap();
        let counter = Arc::new(StdAtomicUsize::new(0));
        let counter2 = Arc::clone(&counter);
        pool.add(move || {
            counter2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.close();
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn kill_all_stops_pending_tasks_from_running() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(StdAtomicUsize::new(0));
        // block the single worker so the next task stays queued
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        pool.add(move || {
            let _ = rx.recv();
        })
        .unwrap();
        let counter2 = Arc::clone(&counter);
        pool.add(move || {
            counter2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        pool.kill_all();
        drop(tx);
        pool.close();
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn guard_closes_pool_on_drop() {
        let pool = WorkerPool::new(1);
        {
            let _guard = PoolGuard::new(&pool);
        }
        assert!(pool.is_closed());
        pool.join();
    }
}
