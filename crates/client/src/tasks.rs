//! Registry of in-flight resolution jobs with cooperative cancellation.
//!
//! Every job is spawned onto the tokio runtime, registered by id, and
//! removed by its own guard when it finishes, fails, panics or is aborted.
//! The registry lock is never held across an await or while a job is
//! spawned, so cleanup can never wait on a submitter.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use favr_core::Error;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::task::{AbortHandle, JoinHandle};

/// Cancellation signal handed to every job.
///
/// Jobs call [`check`](Self::check) before each network request.
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
    }

    /// Resolves when cancellation is requested; pends forever if the manager is gone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Outcome of [`TaskManager::shutdown_and_cancel_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Jobs that were registered when cancellation began.
    pub cancelled: usize,
    /// Whether every job finished inside the grace period.
    pub drained: bool,
}

type JobId = u64;

#[derive(Default)]
struct Registry {
    /// `None` until the spawned task's abort handle is recorded.
    jobs: HashMap<JobId, Option<AbortHandle>>,
    shutting_down: bool,
}

struct Inner {
    registry: Mutex<Registry>,
    cancel: watch::Sender<bool>,
    idle: Notify,
    live: AtomicUsize,
    next_id: AtomicU64,
}

/// Bounded-lifetime job runner shared by a resolver session.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                cancel,
                idle: Notify::new(),
                live: AtomicUsize::new(0),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register and start a job.
    ///
    /// Returns `None` without running anything once shutdown has begun.
    pub fn submit<F, Fut, T>(&self, job: F) -> Option<JobHandle<T>>
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        let id = {
            let mut registry = self.inner.registry.lock();
            if registry.shutting_down {
                return None;
            }
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            registry.jobs.insert(id, None);
            self.inner.live.fetch_add(1, Ordering::SeqCst);
            id
        };

        let token = CancelToken { rx: self.inner.cancel.subscribe() };
        let guard = JobGuard { inner: Arc::clone(&self.inner), id };
        let work = job(token.clone());

        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = work => result,
            }
        });

        let mut registry = self.inner.registry.lock();
        if let Some(slot) = registry.jobs.get_mut(&id) {
            *slot = Some(handle.abort_handle());
        }
        drop(registry);

        Some(JobHandle { handle })
    }

    /// Run `f` only while the manager still accepts work.
    ///
    /// Serialized with [`cancel_all`](Self::cancel_all): once cancellation
    /// begins, `f` never runs. Returns whether it ran.
    pub fn publish(&self, f: impl FnOnce()) -> bool {
        let registry = self.inner.registry.lock();
        if registry.shutting_down {
            return false;
        }
        f();
        true
    }

    /// Stop accepting work and cancel every registered job.
    ///
    /// Synchronous and safe to call from any thread. Returns how many jobs
    /// were registered.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Option<AbortHandle>> = {
            let mut registry = self.inner.registry.lock();
            registry.shutting_down = true;
            registry.jobs.drain().map(|(_, handle)| handle).collect()
        };

        self.inner.cancel.send_replace(true);

        let count = drained.len();
        for handle in drained.into_iter().flatten() {
            handle.abort();
        }
        count
    }

    /// Cancel everything and wait up to `grace` for jobs to unwind.
    ///
    /// Teardown continues after `grace` even if some jobs are still running.
    pub async fn shutdown_and_cancel_all(&self, grace: Duration) -> ShutdownReport {
        let cancelled = self.cancel_all();
        let drained = tokio::time::timeout(grace, self.wait_idle()).await.is_ok();

        if drained {
            tracing::info!(cancelled, "task manager shut down");
        } else {
            tracing::warn!(
                cancelled,
                in_flight = self.in_flight(),
                grace_ms = grace.as_millis() as u64,
                "shutdown grace elapsed with jobs still running"
            );
        }

        ShutdownReport { cancelled, drained }
    }

    /// Wait until no job is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of jobs that have started and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Number of jobs still present in the registry.
    pub fn registered(&self) -> usize {
        self.inner.registry.lock().jobs.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.registry.lock().shutting_down
    }
}

/// Removes a job from the registry when its task ends, however it ends.
struct JobGuard {
    inner: Arc<Inner>,
    id: JobId,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.inner.registry.lock().jobs.remove(&self.id);
        if self.inner.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Awaitable result of a submitted job.
#[derive(Debug)]
pub struct JobHandle<T> {
    handle: JoinHandle<Result<T, Error>>,
}

impl<T> JobHandle<T> {
    /// Wait for the job. An aborted job yields `Err(Cancelled)`; a panic is resumed.
    pub async fn join(self) -> Result<T, Error> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(Error::Cancelled),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_token(cancelled: bool) -> (watch::Sender<bool>, CancelToken) {
    let (tx, rx) = watch::channel(cancelled);
    (tx, CancelToken { rx })
}
