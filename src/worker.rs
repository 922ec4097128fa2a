use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::signal::{stop_channel, StopHandle};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Bounded pool for outbound AI calls, shared by every request.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `work` on its own task once a slot frees up. The work is dropped
    /// as soon as the returned handle is cancelled or dropped, whether it is
    /// still queued for a slot or already running.
    pub fn spawn<F, T>(&self, work: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (stop, signal) = stop_channel();
        let permits = self.permits.clone();

        let join = tokio::spawn(async move {
            let _permit = tokio::select! {
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return None,
                },
                _ = signal.stopped() => return None,
            };
            tokio::select! {
                out = work => Some(out),
                _ = signal.stopped() => None,
            }
        });

        TaskHandle { join, stop }
    }
}

#[derive(Debug)]
pub struct TaskHandle<T> {
    join: JoinHandle<Option<T>>,
    stop: StopHandle,
}

impl<T> TaskHandle<T> {
    /// Wait for the task to finish. Once completion is observed the result
    /// is returned as-is.
    pub async fn wait(&mut self) -> Result<T, WorkerError> {
        match (&mut self.join).await {
            Ok(Some(out)) => Ok(out),
            Ok(None) => Err(WorkerError::Cancelled),
            Err(e) if e.is_panic() => Err(WorkerError::Panicked(e.to_string())),
            Err(_) => Err(WorkerError::Cancelled),
        }
    }

    /// Ask the task to stop, give it `grace` to wind down, then abort it.
    /// Returns true if it wound down on its own.
    pub async fn cancel(mut self, grace: Duration) -> bool {
        self.stop.stop();
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(grace_ms = grace.as_millis() as u64, "worker ignored stop, aborting");
                self.join.abort();
                false
            }
        }
    }
}
