//! Native implementation of `WorkerPool` using OS threads.
//!
//! # Design Principles
//!
//! - **No polling**: idle workers park on a Condvar; overflow workers use a
//!   timed wait that doubles as their retirement timer
//! - **Two locks**: one mutex for the task queue, one for the worker registry,
//!   never held while a task runs. Lock order is registry, then queue
//! - **Detached workers**: a retiring worker removes its own registry record,
//!   which drops (detaches) its `JoinHandle`; callers never block on a join

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::core::PoolError;
use crate::latch::CountDownLatch;
use crate::util::clock::deadline_after;

use super::{
    panic_message, PoolCounters, PoolStats, QueuedTask, TaskHandle, TaskId, TaskOutcome,
    WorkerId, WorkerInfo, WorkerKind, WorkerState,
};

/// Per-worker flags shared between the worker thread and the registry.
#[derive(Debug)]
struct WorkerControl {
    id: WorkerId,
    kind: WorkerKind,
    state: AtomicU8,
    stop_requested: AtomicBool,
}

impl WorkerControl {
    fn new(id: WorkerId, kind: WorkerKind) -> Self {
        Self {
            id,
            kind,
            state: AtomicU8::new(WorkerState::Created as u8),
            stop_requested: AtomicBool::new(false),
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.id,
            kind: self.kind,
            state: self.state(),
        }
    }
}

/// Registry entry for a live worker.
struct WorkerRecord {
    control: Arc<WorkerControl>,
    /// Dropped when the record is removed, which detaches the thread.
    _handle: JoinHandle<()>,
}

/// State shared by the pool handle and every worker thread.
struct Shared {
    config: RwLock<PoolConfig>,
    /// Set when the construction-time config failed validation.
    invalid_reason: Option<String>,
    queue: Mutex<VecDeque<QueuedTask>>,
    task_cv: Condvar,
    workers: Mutex<HashMap<WorkerId, WorkerRecord>>,
    /// Signalled whenever the registry becomes empty.
    workers_cv: Condvar,
    counters: PoolCounters,
    started: AtomicBool,
    shutdown: AtomicBool,
    shutdown_now: AtomicBool,
    next_worker_id: AtomicU64,
    next_task_id: AtomicU64,
}

impl Shared {
    fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire) || self.shutdown_now.load(Ordering::Acquire)
    }

    fn is_available(&self) -> bool {
        self.invalid_reason.is_none() && !self.is_shut_down()
    }

    fn accepting(&self) -> bool {
        self.is_available() && self.started.load(Ordering::Acquire)
    }

    /// Anything other than a task that should end a worker's wait.
    fn should_wake(&self, control: &WorkerControl) -> bool {
        self.is_shut_down() || control.stop_requested()
    }

    fn begin_shutdown(&self, now: bool) {
        let flag = if now { &self.shutdown_now } else { &self.shutdown };
        if flag.swap(true, Ordering::AcqRel) {
            return;
        }

        let abandoned: Vec<QueuedTask> = {
            let mut queue = self.queue.lock();
            if now {
                queue.drain(..).collect()
            } else {
                Vec::new()
            }
        };
        self.task_cv.notify_all();

        if abandoned.is_empty() {
            info!(now, "Worker pool shutting down");
        } else {
            let count = abandoned.len() as u64;
            self.counters.queued_tasks.fetch_sub(count, Ordering::AcqRel);
            self.counters.abandoned_tasks.fetch_add(count, Ordering::Relaxed);
            warn!(abandoned = count, "Worker pool shutting down now, discarding queued tasks");
        }
        // Dropping the jobs outside the queue lock disconnects their handles.
        drop(abandoned);
    }

    /// Removes a finished worker from the registry, detaching its thread.
    fn deregister(&self, id: WorkerId) {
        let mut workers = self.workers.lock();
        workers.remove(&id);
        self.counters.live_workers.fetch_sub(1, Ordering::AcqRel);
        if workers.is_empty() {
            self.workers_cv.notify_all();
        }
    }
}

/// Elastic pool of worker threads with a FIFO task queue.
///
/// # Design
///
/// - **Core workers** block indefinitely while the queue is empty
/// - **Overflow workers** are spawned by `run`/`execute` when no worker is
///   idle and the pool is below `max_threads`; they retire after `idle_timeout`
/// - **Shutdown**: `shutdown` drains queued tasks, `shutdown_now` drops them
///
/// Dropping the pool performs a graceful `shutdown` without waiting for the
/// workers to exit.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a pool. No threads are started until [`WorkerPool::start`].
    ///
    /// An invalid configuration does not fail here; it leaves the pool
    /// permanently unavailable and `start` reports the reason.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let invalid_reason = config.validate().err();
        if let Some(reason) = &invalid_reason {
            warn!(reason = %reason, "WorkerPool created with invalid configuration");
        }

        Self {
            shared: Arc::new(Shared {
                config: RwLock::new(config),
                invalid_reason,
                queue: Mutex::new(VecDeque::new()),
                task_cv: Condvar::new(),
                workers: Mutex::new(HashMap::new()),
                workers_cv: Condvar::new(),
                counters: PoolCounters::default(),
                started: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                shutdown_now: AtomicBool::new(false),
                next_worker_id: AtomicU64::new(0),
                next_task_id: AtomicU64::new(0),
            }),
        }
    }

    /// Spawn the core workers and wait until every one of them is parked.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration was invalid
    /// - `PoolError::PoolUnavailable` if the pool has been shut down
    /// - `PoolError::AlreadyStarted` on a second call
    /// - `PoolError::ResourceExhausted` if a core thread cannot be spawned;
    ///   the pool is shut down in that case
    pub fn start(&self) -> Result<(), PoolError> {
        let shared = &self.shared;
        if let Some(reason) = &shared.invalid_reason {
            return Err(PoolError::InvalidConfig(reason.clone()));
        }
        if shared.is_shut_down() {
            return Err(PoolError::PoolUnavailable);
        }

        let core_threads = shared.config.read().core_threads;
        let ready = Arc::new(CountDownLatch::new(
            u32::try_from(core_threads).unwrap_or(u32::MAX),
        ));

        {
            // Nothing registers a worker before the first start, so a
            // non-empty registry means another start got here first.
            let mut workers = shared.workers.lock();
            if shared.started.load(Ordering::Acquire) || !workers.is_empty() {
                return Err(PoolError::AlreadyStarted);
            }
            for _ in 0..core_threads {
                if let Err(e) = spawn_worker(
                    shared,
                    &mut workers,
                    WorkerKind::Core,
                    Some(Arc::clone(&ready)),
                ) {
                    drop(workers);
                    error!(error = %e, "Failed to spawn core worker, shutting pool down");
                    shared.begin_shutdown(true);
                    return Err(e);
                }
            }
        }

        // Submissions are rejected until every core worker is parked.
        ready.wait();
        shared.started.store(true, Ordering::Release);
        info!(core_threads, "WorkerPool started");
        Ok(())
    }

    /// Submit a closure and get a handle to its return value.
    ///
    /// Never blocks on task execution. A panic inside `f` is caught and
    /// reported through the handle as `PoolError::TaskPanicked`.
    ///
    /// # Errors
    ///
    /// `PoolError::PoolUnavailable` if the pool is not started, shut down,
    /// or was built from an invalid configuration.
    pub fn run<F, R>(&self, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let id = self.submit(move || match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => {
                let _ = tx.send(Ok(value));
                TaskOutcome::Completed
            }
            Err(payload) => {
                let _ = tx.send(Err(PoolError::TaskPanicked(panic_message(payload.as_ref()))));
                TaskOutcome::Panicked
            }
        })?;
        Ok(TaskHandle::new(id, rx))
    }

    /// Submit a closure whose result nobody waits for.
    ///
    /// # Errors
    ///
    /// Same as [`WorkerPool::run`].
    pub fn execute<F>(&self, f: F) -> Result<TaskId, PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(move || match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => TaskOutcome::Completed,
            Err(payload) => {
                warn!(panic = %panic_message(payload.as_ref()), "Fire-and-forget task panicked");
                TaskOutcome::Panicked
            }
        })
    }

    fn submit<J>(&self, job: J) -> Result<TaskId, PoolError>
    where
        J: FnOnce() -> TaskOutcome + Send + 'static,
    {
        let shared = &self.shared;
        if !shared.accepting() {
            return Err(PoolError::PoolUnavailable);
        }

        self.grow_if_saturated();

        let id = shared.next_task_id.fetch_add(1, Ordering::Relaxed);
        let depth = {
            let mut queue = shared.queue.lock();
            // Re-checked under the queue lock so shutdown_now cannot miss this task.
            if !shared.accepting() {
                return Err(PoolError::PoolUnavailable);
            }
            queue.push_back(QueuedTask {
                id,
                job: Box::new(job),
            });
            shared.counters.queued_tasks.fetch_add(1, Ordering::AcqRel);
            queue.len()
        };
        shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        shared.task_cv.notify_one();

        let max_queue_size = shared.config.read().max_queue_size;
        if max_queue_size > 0 && depth > max_queue_size {
            shared.counters.backpressure_events.fetch_add(1, Ordering::Relaxed);
            warn!(
                task_id = id,
                depth, max_queue_size, "Worker pool queue above advisory size"
            );
        } else {
            debug!(task_id = id, depth, "Task submitted to worker pool");
        }
        Ok(id)
    }

    /// Spawns one overflow worker if no worker is free to take a new task.
    fn grow_if_saturated(&self) {
        let shared = &self.shared;
        let max_threads = shared.config.read().max_threads;

        // Queued tasks already have a claim on the waiting workers.
        let idle = |counters: &PoolCounters| {
            let queued = counters.queued_tasks.load(Ordering::Acquire);
            let waiting = counters.waiting_workers.load(Ordering::Acquire) as u64;
            waiting.saturating_sub(queued)
        };
        if idle(&shared.counters) > 0
            || shared.counters.live_workers.load(Ordering::Acquire) >= max_threads
        {
            return;
        }

        let mut workers = shared.workers.lock();
        if idle(&shared.counters) > 0 || workers.len() >= max_threads {
            return;
        }
        match spawn_worker(shared, &mut workers, WorkerKind::Overflow, None) {
            Ok(worker_id) => {
                shared.counters.overflow_spawned.fetch_add(1, Ordering::Relaxed);
                debug!(worker_id, total = workers.len(), "Spawned overflow worker");
            }
            Err(e) => {
                warn!(error = %e, "Overflow worker unavailable, task will wait for a busy worker");
            }
        }
    }

    /// Replace the configuration of a running pool.
    ///
    /// New bounds apply to the next overflow and idle-timeout decisions;
    /// existing workers are not resized.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if `config` is invalid or changes
    ///   `core_threads`
    /// - `PoolError::PoolUnavailable` if the pool is shut down or was built
    ///   from an invalid configuration
    pub fn reset(&self, config: PoolConfig) -> Result<(), PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        if !self.shared.is_available() {
            return Err(PoolError::PoolUnavailable);
        }

        let mut current = self.shared.config.write();
        if current.core_threads != config.core_threads {
            return Err(PoolError::InvalidConfig(format!(
                "core_threads cannot change on reset ({} -> {})",
                current.core_threads, config.core_threads
            )));
        }
        info!(
            max_threads = config.max_threads,
            max_queue_size = config.max_queue_size,
            idle_timeout_ms = config.idle_timeout_ms,
            "WorkerPool configuration reset"
        );
        *current = config;
        Ok(())
    }

    /// Move the worker count toward `target`, clamped to
    /// `[core_threads, max_threads]`.
    ///
    /// Growing spawns overflow workers immediately. Shrinking flags idle
    /// overflow workers to stop and wakes them; each flagged worker exits on
    /// that wake-up, so the count converges within one scheduling cycle.
    /// Busy overflow workers are left alone and retire through the idle
    /// timeout. Returns how many workers were spawned or flagged.
    ///
    /// # Errors
    ///
    /// `PoolError::PoolUnavailable` if the pool is not started or shut down.
    pub fn resize(&self, target: usize) -> Result<usize, PoolError> {
        let shared = &self.shared;
        if !shared.accepting() {
            return Err(PoolError::PoolUnavailable);
        }
        let (core_threads, max_threads) = {
            let cfg = shared.config.read();
            (cfg.core_threads, cfg.max_threads)
        };
        let target = target.clamp(core_threads, max_threads);

        let mut workers = shared.workers.lock();
        let current = workers
            .values()
            .filter(|record| !record.control.stop_requested())
            .count();

        if target > current {
            // Flagged workers still hold a slot until they deregister.
            let room = max_threads.saturating_sub(workers.len());
            let wanted = (target - current).min(room);
            let mut spawned = 0;
            for _ in 0..wanted {
                if spawn_worker(shared, &mut workers, WorkerKind::Overflow, None).is_err() {
                    break;
                }
                spawned += 1;
            }
            shared
                .counters
                .overflow_spawned
                .fetch_add(spawned as u64, Ordering::Relaxed);
            info!(target, spawned, "WorkerPool resized up");
            return Ok(spawned);
        }

        let mut flagged = 0;
        {
            // Flags are set under the queue lock so a worker cannot slip from
            // its stop check into a wait between our read and our notify.
            let _queue = shared.queue.lock();
            for record in workers.values() {
                if flagged == current - target {
                    break;
                }
                let control = &record.control;
                if control.kind == WorkerKind::Overflow
                    && control.state() != WorkerState::Running
                    && !control.stop_requested()
                {
                    control.request_stop();
                    flagged += 1;
                }
            }
        }
        shared.task_cv.notify_all();
        info!(target, flagged, "WorkerPool resized down");
        Ok(flagged)
    }

    /// Stop accepting work, let queued tasks drain, then let workers exit.
    pub fn shutdown(&self) {
        self.shared.begin_shutdown(false);
    }

    /// Stop accepting work and discard queued tasks. Running tasks finish;
    /// handles of discarded tasks resolve to `PoolError::TaskAbandoned`.
    pub fn shutdown_now(&self) {
        self.shared.begin_shutdown(true);
    }

    /// Block until every worker has left its loop, or `timeout` elapses.
    ///
    /// Only meaningful after a shutdown; returns `false` on timeout.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        let mut workers = self.shared.workers.lock();
        while !workers.is_empty() {
            if self
                .shared
                .workers_cv
                .wait_until(&mut workers, deadline)
                .timed_out()
            {
                return workers.is_empty();
            }
        }
        true
    }

    /// True while the configuration is valid and no shutdown was requested.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.shared.is_available()
    }

    /// Workers currently parked waiting for work.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.shared.counters.waiting_workers.load(Ordering::Acquire)
    }

    /// Live worker threads, core and overflow.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.shared.counters.live_workers.load(Ordering::Acquire)
    }

    /// Tasks that have finished running.
    #[must_use]
    pub fn completed_count(&self) -> u64 {
        self.shared.counters.completed_tasks.load(Ordering::Acquire)
    }

    /// Tasks waiting in the queue.
    #[must_use]
    pub fn queued_count(&self) -> u64 {
        self.shared.counters.queued_tasks.load(Ordering::Acquire)
    }

    /// Tasks accepted since the pool was created.
    #[must_use]
    pub fn submitted_count(&self) -> u64 {
        self.shared.counters.submitted_tasks.load(Ordering::Relaxed)
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot()
    }

    /// Copy of the active configuration.
    #[must_use]
    pub fn config(&self) -> PoolConfig {
        self.shared.config.read().clone()
    }

    /// Snapshot of every registered worker, ordered by id.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerInfo> {
        let mut infos: Vec<WorkerInfo> = self
            .shared
            .workers
            .lock()
            .values()
            .map(|record| record.control.info())
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join; workers drain the queue and detach.
        if !self.shared.is_shut_down() {
            debug!("WorkerPool dropped without explicit shutdown");
            self.shared.begin_shutdown(false);
        }
    }
}

/// Spawn a worker thread and register it. Caller holds the registry lock.
fn spawn_worker(
    shared: &Arc<Shared>,
    workers: &mut HashMap<WorkerId, WorkerRecord>,
    kind: WorkerKind,
    ready: Option<Arc<CountDownLatch>>,
) -> Result<WorkerId, PoolError> {
    let worker_id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
    let control = Arc::new(WorkerControl::new(worker_id, kind));

    let thread_shared = Arc::clone(shared);
    let thread_control = Arc::clone(&control);
    let handle = thread::Builder::new()
        .name(format!("tp-{kind}-{worker_id}"))
        .spawn(move || worker_loop(&thread_shared, &thread_control, ready))
        .map_err(|e| {
            shared.counters.spawn_failures.fetch_add(1, Ordering::Relaxed);
            PoolError::ResourceExhausted(format!("cannot spawn {kind} worker: {e}"))
        })?;

    // The worker cannot deregister before this insert: it needs the registry
    // lock, which our caller holds.
    shared.counters.live_workers.fetch_add(1, Ordering::AcqRel);
    workers.insert(
        worker_id,
        WorkerRecord {
            control,
            _handle: handle,
        },
    );
    Ok(worker_id)
}

/// Worker state machine: `Created -> Waiting <-> Running -> Stopped`.
fn worker_loop(shared: &Shared, control: &WorkerControl, mut ready: Option<Arc<CountDownLatch>>) {
    let worker_id = control.id;
    debug!(worker_id, kind = %control.kind, "Worker thread started");

    loop {
        let task = {
            let mut queue = shared.queue.lock();
            if control.stop_requested() {
                debug!(worker_id, "Worker asked to stop");
                break;
            }

            control.set_state(WorkerState::Waiting);
            shared.counters.waiting_workers.fetch_add(1, Ordering::AcqRel);
            if let Some(latch) = ready.take() {
                latch.count_down();
            }

            let idle_timed_out = match control.kind {
                WorkerKind::Core => {
                    shared
                        .task_cv
                        .wait_while(&mut queue, |q| q.is_empty() && !shared.should_wake(control));
                    false
                }
                WorkerKind::Overflow => {
                    let idle_timeout = shared.config.read().idle_timeout();
                    let result = shared.task_cv.wait_while_for(
                        &mut queue,
                        |q| q.is_empty() && !shared.should_wake(control),
                        idle_timeout,
                    );
                    result.timed_out() && queue.is_empty() && !shared.should_wake(control)
                }
            };
            shared.counters.waiting_workers.fetch_sub(1, Ordering::AcqRel);

            if idle_timed_out {
                debug!(worker_id, "Overflow worker idle, retiring");
                break;
            }
            if control.stop_requested() {
                debug!(worker_id, "Worker asked to stop");
                break;
            }
            if shared.shutdown_now.load(Ordering::Acquire) {
                debug!(worker_id, "Worker exiting on shutdown_now");
                break;
            }
            if shared.shutdown.load(Ordering::Acquire) && queue.is_empty() {
                debug!(worker_id, "Worker exiting on shutdown, queue drained");
                break;
            }

            let Some(task) = queue.pop_front() else {
                continue;
            };
            shared.counters.queued_tasks.fetch_sub(1, Ordering::AcqRel);
            control.set_state(WorkerState::Running);
            task
        };

        shared.counters.active_tasks.fetch_add(1, Ordering::Relaxed);
        let outcome = (task.job)();
        shared.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);

        if outcome == TaskOutcome::Panicked {
            shared.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
            warn!(worker_id, task_id = task.id, "Task panicked");
        } else {
            debug!(worker_id, task_id = task.id, "Worker completed task");
        }
        shared.counters.completed_tasks.fetch_add(1, Ordering::AcqRel);
    }

    control.set_state(WorkerState::Stopped);
    if let Some(latch) = ready.take() {
        latch.count_down();
    }
    shared.deregister(worker_id);
    debug!(worker_id, "Worker thread exiting");
}
