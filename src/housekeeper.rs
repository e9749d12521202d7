//! Background execution context for fire-and-forget housekeeping tasks.
//!
//! An unordered work queue consumed by a small pool of worker tasks on the tokio runtime.
//! Providers implement [`LinkProvider::run_async`](crate::link::LinkProvider::run_async) by
//! handing the task to [`Housekeeper::submit`].

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::DbError;

type Task = BoxFuture<'static, ()>;

/// Options for the housekeeping worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeeperConfig {
    pub workers: usize,
    /// Name reported in log fields
    pub name: String,
}

impl Default for HousekeeperConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            name: "housekeeping".to_string(),
        }
    }
}

impl HousekeeperConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// At least one worker is always started.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

pub struct Housekeeper {
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<watch::Sender<usize>>,
    pending_rx: watch::Receiver<usize>,
    name: String,
}

impl std::fmt::Debug for Housekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Housekeeper")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Housekeeper {
    /// Start the worker pool on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`DbError::ConfigError`] when called outside a tokio runtime.
    pub fn start(config: HousekeeperConfig) -> Result<Self, DbError> {
        let handle = Handle::try_current()
            .map_err(|_| DbError::config("housekeeping requires a running tokio runtime"))?;
        let (sender, receiver) = mpsc::unbounded_channel::<Task>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let (pending, pending_rx) = watch::channel(0usize);
        let pending = Arc::new(pending);

        let worker_count = config.workers.max(1);
        let workers = (0..worker_count)
            .map(|id| {
                handle.spawn(run_worker(
                    id,
                    config.name.clone(),
                    Arc::clone(&receiver),
                    Arc::clone(&pending),
                ))
            })
            .collect();
        tracing::debug!(name = %config.name, workers = worker_count, "housekeeper started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            pending,
            pending_rx,
            name: config.name,
        })
    }

    /// Queue a task. Never blocks.
    ///
    /// After [`shutdown`](Self::shutdown) the task is spawned directly on the runtime so that
    /// the resources it owns are still finalized.
    pub fn submit(&self, task: Task) {
        let guard = lock(&self.sender);
        if let Some(sender) = guard.as_ref() {
            self.pending.send_modify(|n| *n += 1);
            match sender.send(task) {
                Ok(()) => return,
                Err(mpsc::error::SendError(task)) => {
                    self.pending.send_modify(|n| *n = n.saturating_sub(1));
                    spawn_detached(&self.name, task);
                }
            }
        } else {
            spawn_detached(&self.name, task);
        }
    }

    /// Tasks queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.pending_rx.borrow()
    }

    /// Resolve once no task is queued or running.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending_rx.clone();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting queued work and wait for the workers to drain what is already queued.
    pub async fn shutdown(&self) {
        drop(lock(&self.sender).take());
        let workers: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        for worker in workers {
            if let Err(err) = worker.await {
                tracing::warn!(name = %self.name, error = %err, "housekeeping worker ended abnormally");
            }
        }
        tracing::debug!(name = %self.name, "housekeeper stopped");
    }
}

async fn run_worker(
    id: usize,
    name: String,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Task>>>,
    pending: Arc<watch::Sender<usize>>,
) {
    loop {
        let task = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(task) = task else {
            break;
        };
        if AssertUnwindSafe(task).catch_unwind().await.is_err() {
            tracing::error!(name = %name, worker = id, "housekeeping task panicked");
        }
        pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

fn spawn_detached(name: &str, task: Task) {
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(task);
    } else {
        tracing::warn!(name = %name, "housekeeper stopped and no runtime available; task dropped");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        // Clear the poison and continue with the recovered data
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_every_submitted_task() {
        let keeper = Housekeeper::start(HousekeeperConfig::new().with_workers(3)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            keeper.submit(Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        keeper.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(keeper.pending(), 0);
        keeper.shutdown().await;
    }

    #[tokio::test]
    async fn panicking_task_does_not_stop_worker() {
        let keeper = Housekeeper::start(HousekeeperConfig::new().with_workers(1)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        keeper.submit(Box::pin(async { panic!("boom") }));
        let after = Arc::clone(&counter);
        keeper.submit(Box::pin(async move {
            after.fetch_add(1, Ordering::SeqCst);
        }));
        keeper.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        keeper.shutdown().await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_still_runs() {
        let keeper = Housekeeper::start(HousekeeperConfig::default()).unwrap();
        keeper.shutdown().await;
        let (tx, rx) = tokio::sync::oneshot::channel();
        keeper.submit(Box::pin(async move {
            let _ = tx.send(7);
        }));
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[test]
    fn start_requires_runtime() {
        let err = Housekeeper::start(HousekeeperConfig::default()).unwrap_err();
        assert!(matches!(err, DbError::ConfigError(_)));
    }

    #[test]
    fn worker_count_is_at_least_one() {
        assert_eq!(HousekeeperConfig::new().with_workers(0).workers, 1);
    }
}
