use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process destruction-countdown timer map (spec §9 externalization
/// strategy: `Scheduler` trait kept as a concrete single-node
/// implementation; a multi-node deployment would inject a shared one).
///
/// Timers are cancellable and reschedulable, matching the lifecycle engine's
/// need to re-arm the same 30s check when a download is in progress (spec
/// §4.I).
#[derive(Clone)]
pub struct Scheduler {
    handles: Arc<Mutex<HashMap<Uuid, tokio::task::JoinHandle<()>>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule `task` to run after `delay`, keyed by `key`. Replaces any
    /// existing timer under the same key without running it.
    pub async fn schedule<F>(&self, key: Uuid, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });

        let mut handles = self.handles.lock().await;
        if let Some(old) = handles.insert(key, handle) {
            old.abort();
        }
    }

    /// Cancel a pending timer, if any. Used on clean shutdown and whenever a
    /// room is deleted out from under a pending destruction check.
    pub async fn cancel(&self, key: Uuid) {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.remove(&key) {
            handle.abort();
        }
    }

    /// Cancel every pending timer (clean shutdown, spec §6 "cancel in-flight
    /// destruction timers").
    pub async fn cancel_all(&self) {
        let mut handles = self.handles.lock().await;
        for (_, handle) in handles.drain() {
            handle.abort();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
