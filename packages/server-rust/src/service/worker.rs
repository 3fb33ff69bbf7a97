//! Background executor for fire-and-forget work.
//!
//! A fixed pool of tokio worker tasks drains a bounded mpsc queue. Every
//! submission holds a [`PendingGuard`] that keeps the pending counter raised
//! until the task finishes (or is discarded), so callers can await
//! [`BackgroundExecutor::wait_for_pending_tasks`] before letting the process
//! freeze.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backbone_core::{Locale, RequestContext, UseCase, UseCaseError, UseCaseResult};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::ServerConfig;
use super::registry::{ManagedService, ServiceContext};

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Submission failures. These are the only errors a submitter ever sees;
/// failures inside a task are logged by the worker and discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackgroundError {
    #[error("background executor is not running")]
    NotRunning,
    #[error("background queue is full")]
    QueueFull,
    #[error("background queue closed")]
    Closed,
    #[error("no background executor configured")]
    NotConfigured,
    #[error("background executor already started")]
    AlreadyStarted,
}

/// Terminal state of one background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(UseCaseError),
    Panicked,
}

impl<T> From<UseCaseResult<T>> for TaskOutcome {
    fn from(result: UseCaseResult<T>) -> Self {
        match result.into_result() {
            Ok(_) => Self::Succeeded,
            Err(err) => Self::Failed(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Pending counter
// ---------------------------------------------------------------------------

/// Counter of submitted-but-unfinished tasks with an awaitable zero.
#[derive(Debug, Default)]
pub struct PendingTracker {
    count: AtomicU64,
    idle: Notify,
}

impl PendingTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the counter; it drops back when the returned guard is dropped.
    #[must_use]
    pub fn acquire(self: &Arc<Self>) -> PendingGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        PendingGuard {
            tracker: Arc::clone(self),
        }
    }

    #[must_use]
    pub fn pending(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Resolves once the counter is observed at zero.
    ///
    /// Work submitted while this is waiting keeps it waiting, as long as the
    /// counter has not touched zero in between.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before reading the counter so a concurrent drop to zero
            // cannot slip between the check and the await.
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII guard for one pending task.
///
/// Dropping it decrements the counter exactly once, whether the task
/// succeeded, failed, panicked, or was never run.
#[derive(Debug)]
pub struct PendingGuard {
    tracker: Arc<PendingTracker>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

// ---------------------------------------------------------------------------
// BackgroundTask
// ---------------------------------------------------------------------------

/// Unit of scheduled work: the future to run plus its bookkeeping.
///
/// The future owns everything it needs (use case, context snapshot, locale,
/// input); nothing in it refers back to the submitting request.
pub struct BackgroundTask {
    name: String,
    work: BoxFuture<'static, TaskOutcome>,
    completion: oneshot::Sender<TaskOutcome>,
    pending: PendingGuard,
}

impl BackgroundTask {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn run(self, worker_id: usize) {
        let Self {
            name,
            work,
            completion,
            pending,
        } = self;

        let outcome = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => TaskOutcome::Panicked,
        };

        match &outcome {
            TaskOutcome::Succeeded => debug!(task = %name, worker = worker_id, "background task done"),
            TaskOutcome::Failed(err) => warn!(
                task = %name,
                worker = worker_id,
                code = %err.code,
                error = %err.message,
                "background task failed"
            ),
            TaskOutcome::Panicked => error!(task = %name, worker = worker_id, "background task panicked"),
        }

        // Release the pending slot before signalling completion, so anyone woken
        // by the handle already sees the counter lowered.
        drop(pending);
        let _ = completion.send(outcome);
    }
}

/// Awaitable completion signal of one submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    /// Waits for the task to finish. A task dropped unrun reports `Panicked`.
    pub async fn outcome(self) -> TaskOutcome {
        self.rx.await.unwrap_or(TaskOutcome::Panicked)
    }
}

// ---------------------------------------------------------------------------
// BackgroundExecutor
// ---------------------------------------------------------------------------

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<BackgroundTask>>>;

/// Bounded worker pool with pending-task tracking.
///
/// Lifecycle follows the deferred startup pattern:
/// 1. `new()` -- allocates the queue and counter
/// 2. `start()` -- spawns the workers (needs a tokio runtime)
/// 3. `shutdown()` -- closes the queue and waits for queued work to finish
pub struct BackgroundExecutor {
    workers: usize,
    queue_size: usize,
    sender: Mutex<Option<mpsc::Sender<BackgroundTask>>>,
    receiver: Mutex<Option<mpsc::Receiver<BackgroundTask>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    pending: Arc<PendingTracker>,
}

impl BackgroundExecutor {
    /// Creates a stopped executor. Zero sizes are clamped to one.
    #[must_use]
    pub fn new(workers: usize, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        Self {
            workers: workers.max(1),
            queue_size: queue_size.max(1),
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            pending: Arc::new(PendingTracker::new()),
        }
    }

    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.background_workers, config.background_queue_size)
    }

    /// Creates and starts an executor in one step.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(workers: usize, queue_size: usize) -> Arc<Self> {
        let executor = Arc::new(Self::new(workers, queue_size));
        // A freshly built executor always has its receiver.
        let _ = executor.start();
        executor
    }

    /// Spawns the worker pool.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` if the workers were spawned before, or
    /// `NotRunning` if the executor has already been shut down.
    pub fn start(&self) -> Result<(), BackgroundError> {
        if self.sender.lock().is_none() {
            return Err(BackgroundError::NotRunning);
        }
        let Some(rx) = self.receiver.lock().take() else {
            return Err(BackgroundError::AlreadyStarted);
        };

        let shared: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let mut handles = self.handles.lock();
        for worker_id in 0..self.workers {
            handles.push(tokio::spawn(worker_loop(worker_id, Arc::clone(&shared))));
        }
        self.running.store(true, Ordering::SeqCst);

        info!(
            workers = self.workers,
            queue_size = self.queue_size,
            "background executor started"
        );
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn worker_count(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_size
    }

    /// Number of submitted tasks that have not finished yet.
    #[must_use]
    pub fn pending_tasks(&self) -> u64 {
        self.pending.pending()
    }

    fn live_sender(&self) -> Result<mpsc::Sender<BackgroundTask>, BackgroundError> {
        if !self.is_running() {
            return Err(BackgroundError::NotRunning);
        }
        self.sender.lock().clone().ok_or(BackgroundError::NotRunning)
    }

    fn package<F>(&self, name: &str, work: F) -> (BackgroundTask, TaskHandle)
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task = BackgroundTask {
            name: name.to_string(),
            work: work.boxed(),
            completion: tx,
            pending: self.pending.acquire(),
        };
        (task, TaskHandle { rx })
    }

    /// Schedules `work`, waiting for queue space when the queue is full.
    ///
    /// The pending counter is raised before the task is queued.
    ///
    /// # Errors
    ///
    /// Returns `NotRunning` before `start()` or after `shutdown()`, and
    /// `Closed` if the queue closed while waiting for space.
    pub async fn submit<F>(&self, name: &str, work: F) -> Result<TaskHandle, BackgroundError>
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        let sender = self.live_sender()?;
        let (task, handle) = self.package(name, work);
        // On failure the task is dropped here, which releases its pending slot.
        sender
            .send(task)
            .await
            .map_err(|_| BackgroundError::Closed)?;
        Ok(handle)
    }

    /// Schedules `work` without waiting; a full queue is rejected.
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` when no slot is free, `NotRunning`/`Closed` otherwise.
    pub fn try_submit<F>(&self, name: &str, work: F) -> Result<TaskHandle, BackgroundError>
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        let sender = self.live_sender()?;
        let (task, handle) = self.package(name, work);
        sender.try_send(task).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => BackgroundError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BackgroundError::Closed,
        })?;
        Ok(handle)
    }

    /// Runs a use case in the background against a frozen copy of its inputs.
    ///
    /// A business error inside the use case is logged and reported through the
    /// returned handle only; it never reaches the submitter's result.
    ///
    /// # Errors
    ///
    /// Returns a [`BackgroundError`] if the task could not be queued.
    pub async fn execute_background_service<U: UseCase>(
        &self,
        service: Arc<U>,
        ctx: RequestContext,
        locale: Locale,
        input: U::Input,
    ) -> Result<TaskHandle, BackgroundError> {
        let name = service.name();
        self.submit(name, async move {
            TaskOutcome::from(service.execute(&ctx, &locale, input).await)
        })
        .await
    }

    /// Waits until no submitted task is left unfinished.
    pub async fn wait_for_pending_tasks(&self) {
        self.pending.wait_idle().await;
    }

    /// Like [`Self::wait_for_pending_tasks`], giving up after `timeout`.
    ///
    /// Returns `true` if the queue drained in time.
    pub async fn wait_for_pending_tasks_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_for_pending_tasks())
            .await
            .is_ok()
    }

    /// Stops accepting work and waits for the workers to finish queued tasks.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        // Closing the last sender lets workers exit once the queue is empty.
        self.sender.lock().take();
        // A never-started executor still owns its receiver; dropping it
        // discards queued tasks, which releases their pending slots.
        self.receiver.lock().take();

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "background worker terminated abnormally");
            }
        }
        info!("background executor stopped");
    }

    /// Stops the workers immediately. Tasks still queued are discarded.
    pub fn abort(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.sender.lock().take();
        self.receiver.lock().take();
        for handle in std::mem::take(&mut *self.handles.lock()) {
            handle.abort();
        }
        warn!(pending = self.pending_tasks(), "background executor aborted");
    }
}

impl std::fmt::Debug for BackgroundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundExecutor")
            .field("workers", &self.workers)
            .field("queue_size", &self.queue_size)
            .field("running", &self.is_running())
            .field("pending", &self.pending_tasks())
            .finish_non_exhaustive()
    }
}

async fn worker_loop(worker_id: usize, rx: SharedReceiver) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(task) = next else { break };
        task.run(worker_id).await;
    }
    debug!(worker = worker_id, "background worker stopped");
}

#[async_trait]
impl ManagedService for BackgroundExecutor {
    fn name(&self) -> &'static str {
        "background"
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        self.start()?;
        Ok(())
    }

    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()> {
        if terminate {
            self.abort();
        } else {
            BackgroundExecutor::shutdown(self).await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
