//! Bounded worker pool that runs deferred work under the submitter's context.
//!
//! Every submitted task is decorated with [`reqctx_core::decorate`], so it
//! sees a snapshot of the submitting thread's context taken at submission
//! time. Worker threads clear their own store after every task.
//!
//! Submission follows the classic core/queue/max sequence:
//!
//! 1. fewer than `core_pool_size` workers: start a worker for the task
//! 2. queue below `queue_capacity`: enqueue the task
//! 3. fewer than `max_pool_size` workers: start an extra worker for the task
//! 4. otherwise apply the [`RejectionPolicy`]
//!
//! Extra (non-core) workers exit after `keep_alive` without work.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use reqctx_core::context;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do with a task when every worker is busy and the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RejectionPolicy {
    /// Run the task on the submitting thread.
    CallerRuns,
    /// Refuse the task with [`ExecutorError::Rejected`].
    Abort,
}

/// Sizing of the context-propagating executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Workers kept alive even when idle.
    pub core_pool_size: usize,
    /// Upper bound on workers, reached only once the queue is full.
    pub max_pool_size: usize,
    /// Maximum number of tasks waiting for a worker.
    pub queue_capacity: usize,
    /// Idle time after which a non-core worker exits.
    pub keep_alive: Duration,
    /// Worker thread names are this prefix followed by a sequence number.
    pub thread_name_prefix: String,
    pub rejection_policy: RejectionPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            core_pool_size: 5,
            max_pool_size: 10,
            queue_capacity: 100,
            keep_alive: Duration::from_secs(60),
            thread_name_prefix: "ctx-async-".to_string(),
            rejection_policy: RejectionPolicy::CallerRuns,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by [`ContextExecutor`] and [`TaskHandle`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor saturated: {max_pool_size} workers busy and {queue_capacity} tasks queued")]
    Rejected {
        max_pool_size: usize,
        queue_capacity: usize,
    },
    #[error("executor has been shut down")]
    Shutdown,
    #[error("failed to start worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was dropped before it completed")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

/// Receives the outcome of a submitted task.
///
/// The task's context teardown has already run by the time an outcome,
/// including a panic, becomes observable here.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, String>>,
}

impl<T> TaskHandle<T> {
    /// Waits for the task without blocking the async runtime.
    ///
    /// # Errors
    ///
    /// Returns `Panicked` if the task panicked, `Cancelled` if it was dropped
    /// unexecuted.
    pub async fn join(self) -> Result<T, ExecutorError> {
        Self::outcome(self.rx.await)
    }

    /// Blocks the current thread until the task finishes.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Same as [`TaskHandle::join`].
    pub fn blocking_join(self) -> Result<T, ExecutorError> {
        Self::outcome(self.rx.blocking_recv())
    }

    fn outcome(
        received: Result<Result<T, String>, oneshot::error::RecvError>,
    ) -> Result<T, ExecutorError> {
        match received {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(ExecutorError::Panicked(message)),
            Err(_) => Err(ExecutorError::Cancelled),
        }
    }
}

// ---------------------------------------------------------------------------
// ContextExecutor
// ---------------------------------------------------------------------------

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct PoolState {
    queue: VecDeque<Job>,
    workers: usize,
    active: usize,
    shutdown: bool,
}

struct Shared {
    config: ExecutorConfig,
    state: Mutex<PoolState>,
    work_available: Condvar,
    terminated: Condvar,
    thread_seq: AtomicUsize,
}

/// Bounded pool of named OS threads running context-decorated tasks.
pub struct ContextExecutor {
    shared: Arc<Shared>,
}

impl ContextExecutor {
    /// Creates the executor. Workers start lazily on first submissions.
    ///
    /// A `max_pool_size` below `core_pool_size` is raised to it.
    #[must_use]
    pub fn new(mut config: ExecutorConfig) -> Self {
        config.max_pool_size = config.max_pool_size.max(config.core_pool_size);
        info!(
            core_pool_size = config.core_pool_size,
            max_pool_size = config.max_pool_size,
            queue_capacity = config.queue_capacity,
            rejection_policy = ?config.rejection_policy,
            "Context-propagating executor configured"
        );
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(PoolState::default()),
                work_available: Condvar::new(),
                terminated: Condvar::new(),
                thread_seq: AtomicUsize::new(0),
            }),
        }
    }

    /// Submits `work` to run on a worker with the caller's current context.
    ///
    /// # Errors
    ///
    /// Returns `Shutdown` after [`ContextExecutor::shutdown`], `Rejected`
    /// when saturated under [`RejectionPolicy::Abort`], or `Spawn` if a
    /// worker thread could not be started.
    pub fn submit<F, T>(&self, work: F) -> Result<TaskHandle<T>, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let decorated = reqctx_core::decorate(work);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(decorated))
                .map_err(|payload| panic_message(payload.as_ref()));
            // The caller may have stopped waiting; the outcome is then dropped.
            let _ = tx.send(outcome);
        });
        self.execute(job)?;
        Ok(TaskHandle { rx })
    }

    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        let config = &self.shared.config;
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(ExecutorError::Shutdown);
        }

        if state.workers < config.core_pool_size {
            return self.spawn_worker(&mut state, Some(job));
        }

        if state.queue.len() < config.queue_capacity {
            state.queue.push_back(job);
            if state.workers == 0 {
                return self.spawn_worker(&mut state, None);
            }
            self.shared.work_available.notify_one();
            return Ok(());
        }

        if state.workers < config.max_pool_size {
            return self.spawn_worker(&mut state, Some(job));
        }

        drop(state);
        match config.rejection_policy {
            RejectionPolicy::CallerRuns => {
                warn!(
                    max_pool_size = config.max_pool_size,
                    queue_capacity = config.queue_capacity,
                    "Executor saturated, running task on submitting thread"
                );
                run_on_caller(job);
                Ok(())
            }
            RejectionPolicy::Abort => {
                warn!(
                    max_pool_size = config.max_pool_size,
                    queue_capacity = config.queue_capacity,
                    "Executor saturated, rejecting task"
                );
                Err(ExecutorError::Rejected {
                    max_pool_size: config.max_pool_size,
                    queue_capacity: config.queue_capacity,
                })
            }
        }
    }

    /// Starts a worker. Called with the state lock held, so the new thread
    /// cannot observe the worker count before it is incremented.
    fn spawn_worker(&self, state: &mut PoolState, first: Option<Job>) -> Result<(), ExecutorError> {
        let seq = self.shared.thread_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}{seq}", self.shared.config.thread_name_prefix);
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(&shared, first))?;
        state.workers += 1;
        debug!(worker = %name, workers = state.workers, "Executor worker started");
        Ok(())
    }

    /// Stops accepting tasks. Queued tasks still run; workers then exit.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        self.shared.work_available.notify_all();
        info!(queued = state.queue.len(), "Executor shutting down");
    }

    /// Blocks until every worker has exited or `timeout` elapses.
    ///
    /// Returns `true` if all workers exited.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.workers > 0 {
            if self
                .shared
                .terminated
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.workers == 0;
            }
        }
        true
    }

    /// Number of live worker threads.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.shared.state.lock().workers
    }

    /// Number of workers currently running a task.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active
    }

    /// Number of tasks waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.shared.config
    }
}

impl Drop for ContextExecutor {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if !state.shutdown {
            state.shutdown = true;
            self.shared.work_available.notify_all();
            debug!(queued = state.queue.len(), "Executor dropped, releasing workers");
        }
    }
}

impl std::fmt::Debug for ContextExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextExecutor")
            .field("config", &self.shared.config)
            .field("pool_size", &self.pool_size())
            .finish_non_exhaustive()
    }
}

/// Runs a rejected task on the submitting thread. On a multi-thread tokio
/// worker the thread is handed over first so other tasks queued on it move.
fn run_on_caller(job: Job) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(job);
        }
        _ => job(),
    }
}

fn worker_loop(shared: &Shared, first: Option<Job>) {
    let mut next = first;
    while let Some(job) = next.take().or_else(|| next_job(shared)) {
        run_job(shared, job);
    }
}

/// Waits for the next queued task. Returns `None` once this worker should exit,
/// after removing it from the worker count.
fn next_job(shared: &Shared) -> Option<Job> {
    let core = shared.config.core_pool_size;
    let mut state = shared.state.lock();
    loop {
        if let Some(job) = state.queue.pop_front() {
            return Some(job);
        }
        if state.shutdown {
            break;
        }
        if state.workers > core {
            let timed_out = shared
                .work_available
                .wait_for(&mut state, shared.config.keep_alive)
                .timed_out();
            if timed_out && state.queue.is_empty() && state.workers > core {
                break;
            }
        } else {
            shared.work_available.wait(&mut state);
        }
    }

    state.workers -= 1;
    if state.workers == 0 {
        shared.terminated.notify_all();
    }
    debug!(workers = state.workers, "Executor worker exiting");
    None
}

fn run_job(shared: &Shared, job: Job) {
    shared.state.lock().active += 1;
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        error!(panic = %panic_message(payload.as_ref()), "Executor job panicked outside task wrapper");
    }
    // Worker threads never carry context from one task into the next.
    context::clear();
    shared.state.lock().active -= 1;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
