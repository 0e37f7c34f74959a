use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Reset-on-trigger timer: each `trigger` call cancels the pending flush and
/// schedules a fresh one after the configured delay, so a burst of calls
/// performs exactly one flush. Supersession is silent.
///
/// The flush closure runs at fire time; callers must capture shared state in
/// it (not a snapshot taken at schedule time) so the flush writes the latest
/// in-memory data.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub async fn trigger<F, Fut>(&self, flush: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut pending = self.pending.lock().await;
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            sleep(delay).await;
            flush().await;
        }));
    }

    /// Drops the pending flush without running it.
    pub async fn cancel(&self) {
        if let Some(handle) = self.pending.lock().await.take() {
            handle.abort();
        }
    }

    /// Awaits the pending flush, if any. Test and shutdown hook.
    pub async fn settle(&self) {
        let handle = self.pending.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
