use anyhow::Result;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// Owns every background task spawned on behalf of a session
///
/// Tasks stop at the next await point once the session token is cancelled.
#[derive(Clone)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl TaskSupervisor {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            cancel,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `task` in the background, logging its failure
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("{} cancelled", name),
                result = task => {
                    if let Err(e) = result {
                        error!("{} failed: {:#}", name, e);
                    }
                }
            }
        });
    }

    /// Cancel all tasks and wait for them to finish
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// A background worker handling items strictly in submission order
pub struct OrderedStage<T> {
    name: &'static str,
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> OrderedStage<T> {
    pub fn spawn<F, Fut>(tasks: &TaskSupervisor, name: &'static str, mut handler: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        tasks.spawn(name, async move {
            while let Some(item) = rx.recv().await {
                if let Err(e) = handler(item).await {
                    warn!("{} failed: {:#}", name, e);
                }
            }
            Ok(())
        });

        Self { name, tx }
    }

    pub fn push(&self, item: T) {
        if self.tx.send(item).is_err() {
            debug!("{} stopped, dropping item", self.name);
        }
    }
}
