use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Trailing-edge debounce for async work.
///
/// Each `fire_new` cancels the previously scheduled call if its delay has
/// not elapsed yet. A call that already started always runs to completion,
/// and the next one waits for it first. Dropping the debouncer cancels the
/// pending call.
#[derive(Debug, Default)]
pub struct Debouncer {
    task: Option<JoinHandle<()>>,
    cancel_channel: Option<oneshot::Sender<()>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `func` to run after `delay`. Must be called within a Tokio runtime.
    pub fn fire_new<F, Fut>(&mut self, delay: Duration, func: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(channel) = self.cancel_channel.take() {
            _ = channel.send(());
        }

        let (sender, mut receiver) = oneshot::channel::<()>();
        self.cancel_channel = Some(sender);

        let previous_task = self.task.take();
        self.task = Some(tokio::spawn(async move {
            let timer = tokio::time::sleep(delay);
            tokio::pin!(timer);
            if let Some(previous_task) = previous_task {
                _ = previous_task.await;
            }

            tokio::select! {
                biased;
                _ = &mut receiver => return,
                _ = &mut timer => {}
            }

            func().await;
        }));
    }

    /// Whether a call is scheduled or running.
    pub fn is_pending(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}
