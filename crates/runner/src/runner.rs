//! The serializing runner and its blocking bridge.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crate::error::{Result, RunnerError};
use crate::queue::{Job, Queue, Task, TaskId};

/// Default bound for blocking calls into the runner.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(4000);

static NEXT_RUNNER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the runner whose task this thread is executing, if any.
    static DISPATCHING: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Configuration for a [`SerialRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Thread name, also used in log fields.
    pub name: String,
    /// Bound for [`SerialRunner::call`] and [`SerialRunner::try_call`].
    pub call_timeout: Duration,
    /// Promote call timeouts to panics. Test configurations only.
    pub timeouts_are_errors: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: "modewarden".to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            timeouts_are_errors: false,
        }
    }
}

impl RunnerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

enum Clock {
    Real(Instant),
    /// Virtual time advanced only by [`SerialRunner::advance`].
    Manual(Mutex<Duration>),
}

impl Clock {
    fn now(&self) -> Duration {
        match self {
            Clock::Real(origin) => origin.elapsed(),
            Clock::Manual(now) => *lock(now),
        }
    }
}

struct Inner {
    id: u64,
    name: String,
    call_timeout: Duration,
    timeouts_are_errors: AtomicBool,
    next_task: AtomicU64,
    queue: Mutex<Queue>,
    wake: Condvar,
    clock: Clock,
    owner: Mutex<Option<ThreadId>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Serializes every unit of work onto one logical thread.
///
/// Two flavours exist:
/// - [`SerialRunner::spawn`] owns a dedicated worker thread with a real clock.
/// - [`SerialRunner::manual`] never runs anything on its own; the creating
///   thread drives it with [`dispatch_all`](Self::dispatch_all) and
///   [`advance`](Self::advance) against a virtual clock.
///
/// Handles are cheap to clone. Call [`shutdown`](Self::shutdown) to stop the
/// worker and drop queued work.
#[derive(Clone)]
pub struct SerialRunner {
    inner: Arc<Inner>,
}

impl SerialRunner {
    /// Start a runner on a dedicated worker thread.
    pub fn spawn(config: RunnerConfig) -> Result<Self> {
        let runner = Self::with_clock(config, Clock::Real(Instant::now()));
        let inner = Arc::clone(&runner.inner);
        let handle = thread::Builder::new()
            .name(runner.inner.name.clone())
            .spawn(move || worker_loop(inner))?;
        *lock(&runner.inner.owner) = Some(handle.thread().id());
        *lock(&runner.inner.worker) = Some(handle);
        tracing::debug!(runner = %runner.inner.name, "runner thread started");
        Ok(runner)
    }

    /// Create a runner driven by the calling thread with a virtual clock.
    pub fn manual(config: RunnerConfig) -> Self {
        let runner = Self::with_clock(config, Clock::Manual(Mutex::new(Duration::ZERO)));
        *lock(&runner.inner.owner) = Some(thread::current().id());
        runner
    }

    fn with_clock(config: RunnerConfig, clock: Clock) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_RUNNER_ID.fetch_add(1, Ordering::Relaxed),
                name: config.name,
                call_timeout: config.call_timeout,
                timeouts_are_errors: AtomicBool::new(config.timeouts_are_errors),
                next_task: AtomicU64::new(1),
                queue: Mutex::new(Queue::default()),
                wake: Condvar::new(),
                clock,
                owner: Mutex::new(None),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether this runner is driven manually.
    pub fn is_manual(&self) -> bool {
        matches!(self.inner.clock, Clock::Manual(_))
    }

    /// Time elapsed on this runner's clock.
    pub fn now(&self) -> Duration {
        self.inner.clock.now()
    }

    /// Promote blocking-call timeouts to panics.
    pub fn set_timeouts_are_errors(&self, enabled: bool) {
        self.inner.timeouts_are_errors.store(enabled, Ordering::Relaxed);
    }

    /// Whether the current thread may execute work for this runner inline:
    /// it is the owning thread, or it is inside a task dispatched by it.
    pub fn is_dispatch_context(&self) -> bool {
        if DISPATCHING.with(|d| d.get()) == Some(self.inner.id) {
            return true;
        }
        *lock(&self.inner.owner) == Some(thread::current().id())
    }

    /// Queue `f` behind all ready work. Returns false once shut down.
    pub fn post(&self, f: impl FnOnce() + Send + 'static) -> bool {
        self.enqueue(Box::new(f), None).is_some()
    }

    /// Queue `f` to run no earlier than `delay` from now.
    pub fn post_delayed(
        &self,
        f: impl FnOnce() + Send + 'static,
        delay: Duration,
    ) -> Option<TaskId> {
        self.enqueue(Box::new(f), Some(delay))
    }

    fn enqueue(&self, job: Job, delay: Option<Duration>) -> Option<TaskId> {
        let id = TaskId(self.inner.next_task.fetch_add(1, Ordering::Relaxed));
        let mut queue = lock(&self.inner.queue);
        if queue.shutdown {
            tracing::warn!(runner = %self.inner.name, "post after shutdown, dropping task");
            return None;
        }
        let task = Task { id, job };
        match delay {
            Some(delay) => queue.push_delayed(task, self.inner.clock.now() + delay),
            None => queue.push(task),
        }
        drop(queue);
        self.inner.wake.notify_one();
        Some(id)
    }

    /// Remove a task that has not started yet.
    pub fn cancel(&self, id: TaskId) -> bool {
        let removed = lock(&self.inner.queue).remove(id);
        removed.is_some()
    }

    /// Whether a task is still queued.
    pub fn has_pending(&self, id: TaskId) -> bool {
        lock(&self.inner.queue).contains(id)
    }

    /// Number of queued tasks, ready and delayed.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Run `f` and wait for it. Returns false if it did not complete in time.
    pub fn run(&self, task: &str, f: impl FnOnce() + Send + 'static) -> bool {
        self.call(task, move || {
            f();
            true
        }, false)
    }

    /// Run `f` on the runner and wait for its result, returning `default` if
    /// it does not complete within the call timeout.
    ///
    /// A timed-out task stays queued and may still run; treat a timeout as
    /// an unknown outcome.
    ///
    /// # Panics
    ///
    /// Panics on timeout when `timeouts_are_errors` is set.
    pub fn call<T: Send + 'static>(
        &self,
        task: &str,
        f: impl FnOnce() -> T + Send + 'static,
        default: T,
    ) -> T {
        match self.try_call(task, f) {
            Ok(value) => value,
            Err(err @ RunnerError::Timeout { .. }) => {
                if self.inner.timeouts_are_errors.load(Ordering::Relaxed) {
                    panic!("{err}");
                }
                tracing::warn!(runner = %self.inner.name, error = %err, "returning default value");
                default
            }
            Err(err) => {
                tracing::warn!(runner = %self.inner.name, error = %err, "returning default value");
                default
            }
        }
    }

    /// Like [`call`](Self::call) but reports failures instead of
    /// substituting a default.
    pub fn try_call<T: Send + 'static>(
        &self,
        task: &str,
        f: impl FnOnce() -> T + Send + 'static,
    ) -> Result<T> {
        if self.is_dispatch_context() {
            return Ok(f());
        }

        let (tx, rx) = crossbeam_channel::bounded::<T>(1);
        let posted = self.post(move || {
            let _ = tx.send(f());
        });
        if !posted {
            return Err(RunnerError::Shutdown(self.inner.name.clone()));
        }

        let timeout = self.inner.call_timeout;
        match rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    runner = %self.inner.name,
                    task,
                    timeout_ms = timeout.as_millis() as u64,
                    "blocking call timed out"
                );
                Err(RunnerError::Timeout {
                    task: task.to_string(),
                    timeout,
                })
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(RunnerError::Dropped(task.to_string()))
            }
        }
    }

    /// Run every ready task on the calling thread, including tasks they post,
    /// and every delayed task already due. Returns the number executed.
    ///
    /// Only meaningful for manual runners.
    pub fn dispatch_all(&self) -> usize {
        if !self.is_manual() {
            tracing::warn!(runner = %self.inner.name, "dispatch_all on a threaded runner ignored");
            return 0;
        }
        let mut executed = 0;
        loop {
            let task = {
                let mut queue = lock(&self.inner.queue);
                if queue.shutdown {
                    break;
                }
                queue.promote_due(self.inner.clock.now());
                queue.pop_ready()
            };
            match task {
                Some(task) => {
                    self.inner.dispatch(task);
                    executed += 1;
                }
                None => break,
            }
        }
        executed
    }

    /// Move the virtual clock forward by `by`, running delayed tasks in
    /// deadline order as their time comes. Returns the number executed.
    pub fn advance(&self, by: Duration) -> usize {
        let Clock::Manual(now) = &self.inner.clock else {
            tracing::warn!(runner = %self.inner.name, "advance on a threaded runner ignored");
            return 0;
        };
        let target = *lock(now) + by;
        let mut executed = self.dispatch_all();
        loop {
            let next = lock(&self.inner.queue).next_due();
            match next {
                Some(due) if due <= target => {
                    {
                        let mut current = lock(now);
                        if due > *current {
                            *current = due;
                        }
                    }
                    executed += self.dispatch_all();
                }
                _ => break,
            }
        }
        *lock(now) = target;
        executed + self.dispatch_all()
    }

    /// Stop accepting work, drop everything queued and join the worker.
    pub fn shutdown(&self) {
        let dropped = {
            let mut queue = lock(&self.inner.queue);
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
            queue.drain()
        };
        self.inner.wake.notify_all();
        tracing::debug!(
            runner = %self.inner.name,
            dropped = dropped.len(),
            "runner shutting down"
        );
        drop(dropped);

        let handle = lock(&self.inner.worker).take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.inner.queue).shutdown
    }
}

impl std::fmt::Debug for SerialRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialRunner")
            .field("name", &self.inner.name)
            .field("manual", &self.is_manual())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Inner {
    fn dispatch(&self, task: Task) {
        let previous = DISPATCHING.with(|d| d.replace(Some(self.id)));
        let outcome = panic::catch_unwind(AssertUnwindSafe(task.job));
        DISPATCHING.with(|d| d.set(previous));
        if outcome.is_err() {
            tracing::error!(runner = %self.name, task = %task.id, "task panicked");
        }
    }
}

fn worker_loop(inner: Arc<Inner>) {
    loop {
        let task = {
            let mut queue = lock(&inner.queue);
            loop {
                if queue.shutdown {
                    tracing::debug!(runner = %inner.name, "runner thread exiting");
                    return;
                }
                let now = inner.clock.now();
                queue.promote_due(now);
                if let Some(task) = queue.pop_ready() {
                    break task;
                }
                queue = match queue.next_due() {
                    Some(due) => {
                        let wait = due.saturating_sub(now);
                        inner
                            .wake
                            .wait_timeout(queue, wait)
                            .map(|(guard, _)| guard)
                            .unwrap_or_else(|poisoned| poisoned.into_inner().0)
                    }
                    None => inner
                        .wake
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner),
                };
            }
        };
        inner.dispatch(task);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
