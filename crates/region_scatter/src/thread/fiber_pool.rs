//! Pool of OS threads, each multiplexing cooperative fiber slots over a
//! shared task queue.
//!
//! Two scheduling levels coexist: a fixed set of worker threads, and per
//! thread a fixed set of fiber slots that each take at most one task from the
//! queue before yielding to the next slot. Futures returned by
//! [`FiberPool::send`] are fiber-aware: waiting on one from inside a pool
//! worker cooperatively drains the queue instead of blocking the OS thread,
//! so a task may wait on another task's future without stalling the pool.
use std::cell::Cell;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{Error as CrateError, Result};
use crate::thread::task_queue::TaskQueue;

const IDLE_PARK: Duration = Duration::from_millis(1);
const HELP_PARK: Duration = Duration::from_millis(1);

const STATE_CONSTRUCTING: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_DRAINING: u8 = 2;
const STATE_STOPPED: u8 = 3;

thread_local! {
    static IS_POOL_WORKER: Cell<bool> = const { Cell::new(false) };
}

fn is_pool_worker() -> bool {
    IS_POOL_WORKER.with(Cell::get)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle of a [`FiberPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Constructing,
    Running,
    Draining,
    Stopped,
}

impl PoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            STATE_CONSTRUCTING => Self::Constructing,
            STATE_RUNNING => Self::Running,
            STATE_DRAINING => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// Configuration for a [`FiberPool`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiberPoolConfig {
    /// Number of worker threads; at least 2.
    pub os_threads: usize,
    /// Number of fiber slots per worker thread; at least 1.
    pub fibers_per_thread: usize,
    /// Stack size applied to the worker threads, `None` for the platform
    /// default.
    pub stack_size: Option<usize>,
}

impl Default for FiberPoolConfig {
    fn default() -> Self {
        let os_threads = thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(2)
            .max(2);
        Self {
            os_threads,
            fibers_per_thread: 16,
            stack_size: None,
        }
    }
}

impl FiberPoolConfig {
    /// Creates a configuration with the given fiber count per thread.
    pub fn new(fibers_per_thread: usize) -> Self {
        Self {
            fibers_per_thread,
            ..Default::default()
        }
    }

    /// Sets the worker thread count.
    pub fn with_os_threads(mut self, os_threads: usize) -> Self {
        self.os_threads = os_threads;
        self
    }

    /// Sets the worker thread stack size in bytes.
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Validates the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.os_threads < 2 {
            return Err(CrateError::InvalidConfig(
                "fiber pool needs at least 2 OS threads".into(),
            ));
        }
        if self.fibers_per_thread == 0 {
            return Err(CrateError::InvalidConfig(
                "fiber pool needs at least 1 fiber per thread".into(),
            ));
        }
        Ok(())
    }
}

/// Why a [`TaskFuture`] carries no value.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task canceled before it ran")]
    Canceled,
}

enum FutureState<T> {
    Pending,
    Ready(T),
    Panicked(String),
    Canceled,
    Taken,
}

struct Shared<T> {
    cell: Mutex<FutureState<T>>,
    cond: Condvar,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            cell: Mutex::new(FutureState::Pending),
            cond: Condvar::new(),
        }
    }

    /// First completion wins; the future transitions out of `Pending` exactly
    /// once.
    fn complete(&self, value: FutureState<T>) {
        let mut guard = lock(&self.cell);
        if matches!(*guard, FutureState::Pending) {
            *guard = value;
            self.cond.notify_all();
        }
    }
}

pub(crate) trait Job: Send {
    fn run(self: Box<Self>);
}

type BoxedJob = Box<dyn Job>;

/// A packaged callable bound to its future's completion cell. Dropping it
/// unexecuted resolves the future as canceled, so undequeued tasks never
/// strand their waiters.
struct Packaged<T, F> {
    f: Option<F>,
    shared: Arc<Shared<T>>,
}

impl<T, F> Job for Packaged<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    fn run(mut self: Box<Self>) {
        if let Some(f) = self.f.take() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f));
            self.shared.complete(match outcome {
                Ok(value) => FutureState::Ready(value),
                Err(payload) => FutureState::Panicked(panic_message(payload.as_ref())),
            });
        }
    }
}

impl<T, F> Drop for Packaged<T, F> {
    fn drop(&mut self) {
        if self.f.is_some() {
            self.shared.complete(FutureState::Canceled);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_owned()
    }
}

/// Future for a task submitted with [`FiberPool::send`].
///
/// Resolves exactly once: with the task's value, with the captured panic, or
/// as canceled when the task was dropped unexecuted.
pub struct TaskFuture<T> {
    shared: Arc<Shared<T>>,
    queue: Weak<TaskQueue<BoxedJob>>,
}

impl<T> TaskFuture<T> {
    /// Whether the future has resolved.
    pub fn is_ready(&self) -> bool {
        !matches!(*lock(&self.shared.cell), FutureState::Pending)
    }

    /// Blocks until the future resolves. On a pool worker thread this drains
    /// queued tasks cooperatively instead of blocking the OS thread.
    pub fn wait(&self) {
        self.wait_until(None);
    }

    /// Waits up to `timeout`; returns whether the future resolved in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Some(Instant::now() + timeout))
    }

    /// Waits for resolution and takes the result.
    pub fn join(self) -> std::result::Result<T, TaskError> {
        self.wait();
        let mut guard = lock(&self.shared.cell);
        match mem::replace(&mut *guard, FutureState::Taken) {
            FutureState::Ready(value) => Ok(value),
            FutureState::Panicked(message) => Err(TaskError::Panicked(message)),
            _ => Err(TaskError::Canceled),
        }
    }

    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        loop {
            if self.is_ready() {
                return true;
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    return self.is_ready();
                }
            }
            if is_pool_worker() {
                // Fiber-style suspension: make progress on other tasks while
                // this one is parked.
                if let Some(queue) = self.queue.upgrade() {
                    if let Some(job) = queue.try_pop() {
                        job.run();
                        continue;
                    }
                }
                let guard = lock(&self.shared.cell);
                if matches!(*guard, FutureState::Pending) {
                    let _ = self
                        .shared
                        .cond
                        .wait_timeout(guard, HELP_PARK)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            } else {
                let mut guard = lock(&self.shared.cell);
                while matches!(*guard, FutureState::Pending) {
                    match deadline {
                        None => {
                            guard = self
                                .shared
                                .cond
                                .wait(guard)
                                .unwrap_or_else(PoisonError::into_inner);
                        }
                        Some(d) => {
                            let now = Instant::now();
                            if now >= d {
                                return false;
                            }
                            let (g, _) = self
                                .shared
                                .cond
                                .wait_timeout(guard, d - now)
                                .unwrap_or_else(PoisonError::into_inner);
                            guard = g;
                        }
                    }
                }
                return true;
            }
        }
    }
}

/// One cooperative fiber slot inside a worker thread.
struct FiberSlot {
    completed: u64,
}

impl FiberSlot {
    fn new() -> Self {
        Self { completed: 0 }
    }

    fn run(&mut self, job: BoxedJob) {
        job.run();
        self.completed += 1;
    }
}

/// Two-phase start barrier of arity `os_threads + 1` with an abort path, so
/// a failed thread spawn cannot strand the workers that did start.
struct StartGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

#[derive(Default)]
struct GateState {
    arrived: usize,
    released: bool,
    aborted: bool,
}

impl StartGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            cond: Condvar::new(),
        }
    }

    /// Worker side: register arrival, then wait for release. Returns false
    /// when construction was aborted.
    fn arrive_and_wait(&self) -> bool {
        let mut guard = lock(&self.state);
        guard.arrived += 1;
        self.cond.notify_all();
        while !guard.released && !guard.aborted {
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !guard.aborted
    }

    /// Constructor side: wait for `expected` arrivals, then release everyone.
    fn release(&self, expected: usize) {
        let mut guard = lock(&self.state);
        while guard.arrived < expected {
            guard = self
                .cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        guard.released = true;
        self.cond.notify_all();
    }

    fn abort(&self) {
        let mut guard = lock(&self.state);
        guard.aborted = true;
        self.cond.notify_all();
    }
}

/// Multiplexes submitted tasks over `os_threads x fibers_per_thread`
/// cooperative fiber slots.
pub struct FiberPool {
    queue: Arc<TaskQueue<BoxedJob>>,
    done: Arc<AtomicBool>,
    state: AtomicU8,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl FiberPool {
    /// Starts the pool. The constructor returns once every worker thread has
    /// reached its start barrier; a failed spawn shuts the pool down and
    /// propagates the error.
    pub fn new(config: &FiberPoolConfig) -> Result<Self> {
        config.validate()?;
        let queue = Arc::new(TaskQueue::new());
        let done = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(StartGate::new());

        let mut handles = Vec::with_capacity(config.os_threads);
        for i in 0..config.os_threads {
            let mut builder = thread::Builder::new().name(format!("fiber-worker-{i}"));
            if let Some(bytes) = config.stack_size {
                builder = builder.stack_size(bytes);
            }
            let queue = Arc::clone(&queue);
            let done_thread = Arc::clone(&done);
            let gate_thread = Arc::clone(&gate);
            let fibers = config.fibers_per_thread;
            match builder.spawn(move || worker(i, fibers, queue, done_thread, gate_thread)) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(index = i, error = %e, "worker thread failed to spawn; aborting pool");
                    gate.abort();
                    done.store(true, Ordering::Release);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(e.into());
                }
            }
        }
        gate.release(config.os_threads);
        info!(
            os_threads = config.os_threads,
            fibers_per_thread = config.fibers_per_thread,
            "fiber pool running"
        );

        Ok(Self {
            queue,
            done,
            state: AtomicU8::new(STATE_RUNNING),
            threads: Mutex::new(handles),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of tasks waiting in the queue.
    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Submits a callable and returns its future immediately. The callable
    /// runs on some worker fiber; the specific OS thread is unspecified.
    ///
    /// Submitting to a pool that is already shutting down resolves the
    /// future as canceled without enqueueing.
    pub fn send<F, T>(&self, task: F) -> TaskFuture<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let shared = Arc::new(Shared::new());
        let future = TaskFuture {
            shared: Arc::clone(&shared),
            queue: Arc::downgrade(&self.queue),
        };
        if self.done.load(Ordering::Acquire) {
            shared.complete(FutureState::Canceled);
            return future;
        }
        self.queue.push(Box::new(Packaged {
            f: Some(task),
            shared,
        }));
        future
    }

    /// Stops the workers, joins them, and cancels undequeued tasks.
    /// Idempotent; tasks already running finish first.
    pub fn shutdown(&self) {
        if self
            .done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.state.store(STATE_DRAINING, Ordering::Release);
        info!("fiber pool draining");
        let handles = mem::take(&mut *lock(&self.threads));
        for handle in handles {
            // A worker that panicked outside a task still gets collected.
            let _ = handle.join();
        }
        while let Some(job) = self.queue.try_pop() {
            drop(job);
        }
        self.state.store(STATE_STOPPED, Ordering::Release);
        info!("fiber pool stopped");
    }
}

impl Drop for FiberPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker(
    index: usize,
    fibers_per_thread: usize,
    queue: Arc<TaskQueue<BoxedJob>>,
    done: Arc<AtomicBool>,
    gate: Arc<StartGate>,
) {
    #[cfg(feature = "affinity")]
    pin_to_processor(index);
    IS_POOL_WORKER.with(|flag| flag.set(true));
    if !gate.arrive_and_wait() {
        return;
    }

    let mut fibers: Vec<FiberSlot> = (0..fibers_per_thread).map(|_| FiberSlot::new()).collect();
    'scheduler: loop {
        let mut ran = false;
        for fiber in &mut fibers {
            if done.load(Ordering::Acquire) {
                break 'scheduler;
            }
            if let Some(job) = queue.try_pop() {
                fiber.run(job);
                ran = true;
            }
            // Mandatory yield: the next slot gets the queue even when this
            // one just ran.
        }
        if done.load(Ordering::Acquire) {
            break;
        }
        if !ran {
            if let Some(job) = queue.pop_timeout(IDLE_PARK) {
                fibers[0].run(job);
            }
        }
    }
    debug!(
        worker = index,
        tasks = fibers.iter().map(|f| f.completed).sum::<u64>(),
        "fiber pool worker exiting"
    );
}

#[cfg(feature = "affinity")]
fn pin_to_processor(index: usize) {
    if let Some(cores) = core_affinity::get_core_ids() {
        if !cores.is_empty() {
            core_affinity::set_for_current(cores[index % cores.len()]);
        }
    }
}
