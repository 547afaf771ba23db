//! Async utilities and patterns
//!
//! Provides the cancellable background task primitive the session timers are
//! built on, and the boxed async callback type they report through.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Shared async callback invoked by background tasks
pub type AsyncCallback<A> = Arc<dyn Fn(A) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into an [`AsyncCallback`]
pub fn async_callback<A, F, Fut>(f: F) -> AsyncCallback<A>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |arg: A| f(arg).boxed())
}

/// Cancellation signal handed to a task spawned with [`TaskHandle::spawn`]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
    shutdown_rx: oneshot::Receiver<()>,
    fired: bool,
}

impl CancelSignal {
    /// Synchronous check, valid even while the task is busy in a callback
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the owning handle is cancelled or dropped
    pub async fn cancelled(&mut self) {
        if self.fired {
            return;
        }
        // A dropped sender resolves the receiver as well
        let _ = (&mut self.shutdown_rx).await;
        self.fired = true;
    }
}

/// Owning handle of a cancellable background task.
///
/// Cancelling sets a flag the task checks before every side effect and wakes
/// the task so it can exit. Dropping the handle cancels the task.
pub struct TaskHandle {
    name: &'static str,
    cancelled: Arc<AtomicBool>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `task` on the current tokio runtime
    pub fn spawn<F, Fut>(name: &'static str, task: F) -> Self
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        let signal = CancelSignal {
            cancelled: Arc::clone(&cancelled),
            shutdown_rx,
            fired: false,
        };
        let join = tokio::spawn(task(signal));

        debug!(task = name, "Spawned background task");

        Self {
            name,
            cancelled,
            shutdown_tx: Some(shutdown_tx),
            join,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the task. Idempotent.
    pub fn cancel(&mut self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!(task = self.name, "Cancelled background task");
        }
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Neither cancelled nor finished on its own
    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.join.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn ticking_task(counter: Arc<AtomicUsize>) -> impl FnOnce(CancelSignal) -> BoxFuture<'static, ()> {
        move |mut signal| {
            async move {
                let mut interval = tokio::time::interval(Duration::from_secs(1));
                loop {
                    tokio::select! {
                        _ = signal.cancelled() => break,
                        _ = interval.tick() => {}
                    }
                    if signal.is_cancelled() {
                        break;
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handle = TaskHandle::spawn("ticker", ticking_task(Arc::clone(&counter)));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(handle.is_active());

        handle.cancel();
        handle.cancel();
        let seen = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(counter.load(Ordering::SeqCst), seen);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = TaskHandle::spawn("ticker", ticking_task(Arc::clone(&counter)));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        drop(handle);
        let seen = counter.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_finished_task_is_inactive() {
        let handle = TaskHandle::spawn("oneshot", |_signal| async {});
        for _ in 0..100 {
            if !handle.is_active() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!handle.is_active());
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_async_callback_runs_closure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let callback = {
            let counter = Arc::clone(&counter);
            async_callback(move |amount: usize| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(amount, Ordering::SeqCst);
                }
            })
        };

        callback(2).await;
        callback(3).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
