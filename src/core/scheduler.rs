//! Timer scheduler: deferred, absolute-time and repeating tasks.
//!
//! A [`TimerScheduler`] owns a time-ordered [`TimerQueue`], one dispatch
//! thread and one [`WorkerPool`]. The dispatch thread is the only consumer of
//! the queue: it sleeps until the earliest entry is due (or a new entry or a
//! stop request wakes it), pops the entry and hands its callable to the pool.
//! User code never runs on the dispatch thread.
//!
//! Repeating timers re-arm themselves on the worker that ran them: after the
//! user function returns, the firing checks its remaining count and the
//! series' [`RepeatState`] and, if the series is still live, inserts the next
//! occurrence and returns. A slow callback therefore delays only its own
//! series.
//!
//! # Example
//!
//! ```
//! use prometheus_timer_pool::core::{Repeat, TimerScheduler};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let scheduler = TimerScheduler::new();
//! scheduler.start().unwrap();
//!
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&ticks);
//! let id = scheduler
//!     .add_repeated(Repeat::Forever, Duration::from_millis(10), move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     })
//!     .unwrap();
//!
//! std::thread::sleep(Duration::from_millis(100));
//! assert!(scheduler.cancel(id));
//! scheduler.stop();
//! assert!(ticks.load(Ordering::SeqCst) >= 1);
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::timer_queue::{RepeatId, TimerEntry, TimerQueue, TimerTask};
use super::worker_pool::panic_message;
use crate::config::SchedulerConfig;
use crate::core::{PoolError, WorkerPool};
use crate::sync_map::SyncMap;
use crate::util::clock::deadline_after;

/// How many times a repeating timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Fire this many times, then stop on its own.
    Times(u32),
    /// Fire until cancelled or the scheduler stops.
    Forever,
}

impl Repeat {
    /// Map a signed count to a `Repeat`; any negative count means forever.
    #[must_use]
    pub fn from_count(count: i64) -> Self {
        if count < 0 {
            Self::Forever
        } else {
            Self::Times(u32::try_from(count).unwrap_or(u32::MAX))
        }
    }

    const fn remaining(self) -> Option<u32> {
        match self {
            Self::Times(n) => Some(n),
            Self::Forever => None,
        }
    }
}

/// Lifecycle of a repeating series, tracked in the scheduler's [`SyncMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatState {
    /// The series re-arms after each firing.
    Running,
    /// `cancel` was called; the series stops at its next check.
    Cancelled,
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// State shared by the scheduler handle, the dispatch thread and re-arming
/// firings (which only hold a `Weak` to it).
struct SchedulerShared {
    queue: Mutex<TimerQueue>,
    cond: Condvar,
    state: AtomicU8,
    pool: WorkerPool,
    repeats: SyncMap<RepeatId, RepeatState>,
    next_repeat_id: AtomicU64,
}

/// A repeating registration travelling from one firing to the next.
struct RepeatSeries {
    id: RepeatId,
    interval: Duration,
    /// Firings left, `None` for unbounded series.
    remaining: Option<u32>,
    func: Arc<dyn Fn() + Send + Sync + 'static>,
}

impl SchedulerShared {
    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) == STOPPED
    }

    /// Insert an entry and wake the dispatcher. False once stopped.
    fn push(&self, fire_time: Instant, repeat_id: Option<RepeatId>, task: TimerTask) -> bool {
        let mut queue = self.queue.lock();
        if self.is_stopped() {
            return false;
        }
        let seq = queue.push(fire_time, repeat_id, task);
        drop(queue);
        self.cond.notify_one();
        debug!(seq, ?repeat_id, "Timer entry queued");
        true
    }

    /// Schedule the next firing of `series`, `interval` from now.
    fn arm(self: &Arc<Self>, series: RepeatSeries) -> bool {
        let id = series.id;
        let fire_time = deadline_after(series.interval);
        let weak = Arc::downgrade(self);
        let armed = self.push(fire_time, Some(id), Box::new(move || fire_repeat(&weak, series)));
        if !armed {
            self.repeats.remove(&id);
        }
        armed
    }

    fn series_live(&self, id: RepeatId) -> bool {
        self.repeats.get(&id) == Some(RepeatState::Running)
    }

    /// Hand a due entry to the pool, unless its series was cancelled.
    fn dispatch(&self, entry: TimerEntry) {
        let seq = entry.seq;
        if let Some(id) = entry.repeat_id {
            if !self.series_live(id) {
                self.repeats.remove(&id);
                debug!(seq, repeat_id = id, "Skipping firing of cancelled series");
                return;
            }
        }
        let repeat_id = entry.repeat_id;
        if let Err(e) = self.pool.execute(entry.task) {
            warn!(seq, ?repeat_id, error = %e, "Worker pool rejected timer task");
            if let Some(id) = repeat_id {
                self.repeats.remove(&id);
            }
        }
    }
}

/// Runs one firing of a repeating series and re-arms it if it is still live.
fn fire_repeat(weak: &Weak<SchedulerShared>, mut series: RepeatSeries) {
    let id = series.id;
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (series.func)())) {
        warn!(
            repeat_id = id,
            panic = %panic_message(payload.as_ref()),
            "Repeating timer panicked, ending series"
        );
        if let Some(shared) = weak.upgrade() {
            shared.repeats.remove(&id);
        }
        return;
    }

    let Some(shared) = weak.upgrade() else {
        return;
    };

    if let Some(left) = series.remaining.as_mut() {
        *left = left.saturating_sub(1);
        if *left == 0 {
            shared.repeats.remove(&id);
            debug!(repeat_id = id, "Repeating timer exhausted");
            return;
        }
    }
    if !shared.series_live(id) {
        shared.repeats.remove(&id);
        debug!(repeat_id = id, "Repeating timer cancelled");
        return;
    }
    shared.arm(series);
}

/// Dispatch thread body.
fn dispatch_loop(shared: &SchedulerShared) {
    debug!("Timer dispatch thread started");
    while shared.is_running() {
        let mut queue = shared.queue.lock();
        // Stop notifies under this lock, so re-checking here cannot miss it.
        if !shared.is_running() {
            break;
        }
        if queue.is_empty() {
            shared.cond.wait(&mut queue);
            continue;
        }

        let now = Instant::now();
        let next = queue.next_deadline();
        match next {
            Some(deadline) if deadline > now => {
                // An earlier insert or a stop request may cut this short; re-peek either way.
                shared.cond.wait_until(&mut queue, deadline);
            }
            _ => {
                let entry = queue.pop_due(now);
                drop(queue);
                if let Some(entry) = entry {
                    shared.dispatch(entry);
                }
            }
        }
    }
    debug!("Timer dispatch thread exiting");
}

/// Schedules deferred and periodic work onto an owned [`WorkerPool`].
///
/// Entries may be added before [`TimerScheduler::start`]; they wait in the
/// queue until the dispatch thread runs. After [`TimerScheduler::stop`] every
/// add is rejected. Dropping the scheduler stops it.
pub struct TimerScheduler {
    shared: Arc<SchedulerShared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerScheduler {
    /// Scheduler backed by the default timer pool (4 fixed workers).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Scheduler backed by a pool built from `config`.
    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                queue: Mutex::new(TimerQueue::new()),
                cond: Condvar::new(),
                state: AtomicU8::new(IDLE),
                pool: WorkerPool::new(config.pool),
                repeats: SyncMap::new(),
                next_repeat_id: AtomicU64::new(0),
            }),
            dispatcher: Mutex::new(None),
        }
    }

    /// Start the worker pool, then the dispatch thread.
    ///
    /// # Errors
    ///
    /// - `PoolError::AlreadyStarted` if the scheduler is running
    /// - `PoolError::PoolUnavailable` if it was stopped
    /// - any error from [`WorkerPool::start`]
    /// - `PoolError::ResourceExhausted` if the dispatch thread cannot be spawned
    pub fn start(&self) -> Result<(), PoolError> {
        let shared = &self.shared;
        if let Err(state) =
            shared
                .state
                .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
        {
            return Err(if state == RUNNING {
                PoolError::AlreadyStarted
            } else {
                PoolError::PoolUnavailable
            });
        }

        if let Err(e) = shared.pool.start() {
            shared.state.store(IDLE, Ordering::Release);
            return Err(e);
        }

        let thread_shared = Arc::clone(shared);
        let handle = thread::Builder::new()
            .name("tp-timer-dispatch".into())
            .spawn(move || dispatch_loop(&thread_shared))
            .map_err(|e| {
                shared.state.store(STOPPED, Ordering::Release);
                shared.pool.shutdown_now();
                PoolError::ResourceExhausted(format!("cannot spawn dispatch thread: {e}"))
            })?;
        *self.dispatcher.lock() = Some(handle);

        info!(pending = self.pending_count(), "TimerScheduler started");
        Ok(())
    }

    /// Run `f` once, `delay` from now.
    ///
    /// # Errors
    ///
    /// `PoolError::PoolUnavailable` if the scheduler was stopped.
    pub fn add_after_delay<F>(&self, delay: Duration, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_at_time(deadline_after(delay), f)
    }

    /// Run `f` once at `at` (immediately if `at` has passed).
    ///
    /// # Errors
    ///
    /// `PoolError::PoolUnavailable` if the scheduler was stopped.
    pub fn add_at_time<F>(&self, at: Instant, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.push(at, None, Box::new(f)) {
            Ok(())
        } else {
            Err(PoolError::PoolUnavailable)
        }
    }

    /// Run `f` every `interval`, `repeat` times or until cancelled.
    ///
    /// The first firing is `interval` from now; each later firing is armed
    /// `interval` after the previous callback returned. `Repeat::Times(0)`
    /// returns a fresh id and schedules nothing.
    ///
    /// # Errors
    ///
    /// `PoolError::PoolUnavailable` if the scheduler was stopped.
    pub fn add_repeated<F>(
        &self,
        repeat: Repeat,
        interval: Duration,
        f: F,
    ) -> Result<RepeatId, PoolError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.shared.is_stopped() {
            return Err(PoolError::PoolUnavailable);
        }
        let id = self.shared.next_repeat_id.fetch_add(1, Ordering::Relaxed);
        if repeat == Repeat::Times(0) {
            return Ok(id);
        }

        self.shared.repeats.insert(id, RepeatState::Running);
        let series = RepeatSeries {
            id,
            interval,
            remaining: repeat.remaining(),
            func: Arc::new(f),
        };
        if !self.shared.arm(series) {
            return Err(PoolError::PoolUnavailable);
        }
        debug!(repeat_id = id, ?repeat, ?interval, "Repeating timer registered");
        Ok(id)
    }

    /// Cancel a repeating series. Returns true if it was still live.
    ///
    /// A pending firing is dropped by the dispatcher and no further firing is
    /// armed. A firing already handed to the pool still runs.
    pub fn cancel(&self, id: RepeatId) -> bool {
        let was_running = self.shared.repeats.replace(&id, RepeatState::Cancelled)
            == Some(RepeatState::Running);
        if was_running {
            debug!(repeat_id = id, "Repeating timer cancel requested");
        }
        was_running
    }

    /// Stop dispatching, drop pending entries and shut the pool down
    /// gracefully. Idempotent.
    pub fn stop(&self) {
        let shared = &self.shared;
        if shared.state.swap(STOPPED, Ordering::AcqRel) == STOPPED {
            return;
        }

        let dropped = {
            let mut queue = shared.queue.lock();
            let dropped = queue.drain();
            shared.cond.notify_all();
            dropped
        };

        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.join().is_err() {
                warn!("Timer dispatch thread panicked");
            }
        }
        // Series whose next firing was dropped are over.
        for id in dropped.iter().filter_map(|entry| entry.repeat_id) {
            shared.repeats.remove(&id);
        }
        shared.pool.shutdown();
        info!(dropped = dropped.len(), "TimerScheduler stopped");
    }

    /// Entries waiting for their fire time.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// True between a successful `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// The pool that runs expired timers.
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.shared.pool
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::latch::CountDownLatch;
    use std::sync::atomic::AtomicUsize;

    fn test_scheduler() -> TimerScheduler {
        TimerScheduler::with_config(SchedulerConfig {
            pool: PoolConfig::new()
                .with_core_threads(2)
                .with_max_threads(2)
                .with_idle_timeout(Duration::from_secs(1)),
        })
    }

    #[test]
    fn test_repeat_from_count() {
        assert_eq!(Repeat::from_count(-1), Repeat::Forever);
        assert_eq!(Repeat::from_count(3), Repeat::Times(3));
        assert_eq!(Repeat::from_count(0), Repeat::Times(0));
    }

    #[test]
    fn test_entries_added_before_start_fire_after_start() {
        let scheduler = test_scheduler();
        let latch = Arc::new(CountDownLatch::new(1));
        let l = Arc::clone(&latch);
        scheduler
            .add_after_delay(Duration::from_millis(1), move || l.count_down())
            .unwrap();
        assert_eq!(scheduler.pending_count(), 1);

        scheduler.start().unwrap();
        assert!(latch.wait_timeout(Duration::from_secs(2)));
    }

    #[test]
    fn test_times_zero_schedules_nothing() {
        let scheduler = test_scheduler();
        scheduler.start().unwrap();
        let id = scheduler
            .add_repeated(Repeat::Times(0), Duration::from_millis(1), || {})
            .unwrap();
        assert_eq!(scheduler.pending_count(), 0);
        assert!(!scheduler.cancel(id));
    }

    #[test]
    fn test_rejected_firing_ends_series() {
        // The pool is never started, so it rejects every task.
        let scheduler = test_scheduler();
        let shared = &scheduler.shared;
        shared.repeats.insert(9, RepeatState::Running);

        let seq = shared.queue.lock().push(Instant::now(), Some(9), Box::new(|| {}));
        let entry = shared.queue.lock().pop_due(Instant::now()).unwrap();
        assert_eq!(entry.seq, seq);
        shared.dispatch(entry);

        assert!(!shared.repeats.contains_key(&9));
        assert!(!scheduler.cancel(9));
    }

    #[test]
    fn test_add_after_stop_is_rejected() {
        let scheduler = test_scheduler();
        scheduler.start().unwrap();
        scheduler.stop();
        assert!(!scheduler.is_running());
        assert_eq!(
            scheduler.add_after_delay(Duration::ZERO, || {}),
            Err(PoolError::PoolUnavailable)
        );
        assert_eq!(
            scheduler
                .add_repeated(Repeat::Forever, Duration::from_millis(5), || {})
                .unwrap_err(),
            PoolError::PoolUnavailable
        );
        assert_eq!(scheduler.start(), Err(PoolError::PoolUnavailable));
    }

    #[test]
    fn test_panicking_repeat_ends_series() {
        let scheduler = test_scheduler();
        scheduler.start().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let id = scheduler
            .add_repeated(Repeat::Forever, Duration::from_millis(5), move || {
                c.fetch_add(1, Ordering::SeqCst);
                panic!("tick failed");
            })
            .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.cancel(id));
    }
}
