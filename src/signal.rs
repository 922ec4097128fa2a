use tokio::sync::watch;

/// One-shot stop notification that also fires when its handle is dropped.
/// The handler holds the [`StopHandle`] while the client is connected, so a
/// disconnect wakes every [`StopSignal`] clone.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for StopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Non-blocking check.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the handle has stopped or gone away.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // An Err means the sender is gone, which counts as stopped too.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_starts_running() {
        let (_handle, signal) = stop_channel();
        assert!(!signal.is_stopped());
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.stopped()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_explicit_stop_wakes_waiters() {
        let (handle, signal) = stop_channel();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.stopped().await })
        };
        handle.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_dropping_handle_counts_as_stop() {
        let (handle, signal) = stop_channel();
        drop(handle);
        assert!(signal.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), signal.stopped())
            .await
            .expect("dropped handle should resolve stopped()");
    }
}
