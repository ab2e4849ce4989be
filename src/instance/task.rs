//! Poll-able handles for background work.

use tokio::sync::oneshot;

/// State of a background task as seen by a poller.
#[derive(Debug, PartialEq, Eq)]
pub enum TaskState<'a, T> {
    /// Still running
    Running,
    /// Finished with this result
    Finished(&'a T),
    /// Ended without a result, e.g. after a panic
    Lost,
}

/// Handle to a single background task producing a `T`.
///
/// The result is cached once received, so repeated polls after completion keep
/// returning it.
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Option<oneshot::Receiver<T>>,
    result: Option<T>,
    lost: bool,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Run `future` on the current tokio runtime.
    ///
    /// Returns `None` when called outside a runtime.
    pub fn spawn<F>(future: F) -> Option<Self>
    where
        F: std::future::Future<Output = T> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let (sender, receiver) = oneshot::channel();
        runtime.spawn(async move {
            let _ = sender.send(future.await);
        });
        Some(Self::from_receiver(receiver))
    }

    /// Run a blocking closure on the runtime's blocking pool.
    ///
    /// Returns `None` when called outside a runtime.
    pub fn spawn_blocking<F>(work: F) -> Option<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let (sender, receiver) = oneshot::channel();
        runtime.spawn_blocking(move || {
            let _ = sender.send(work());
        });
        Some(Self::from_receiver(receiver))
    }

    fn from_receiver(receiver: oneshot::Receiver<T>) -> Self {
        Self {
            receiver: Some(receiver),
            result: None,
            lost: false,
        }
    }
}

impl<T> TaskHandle<T> {
    /// Poll without blocking.
    ///
    /// A task that died without sending a result is reported as
    /// [`TaskState::Lost`].
    pub fn poll(&mut self) -> TaskState<'_, T> {
        if self.result.is_none() {
            if let Some(receiver) = self.receiver.as_mut() {
                match receiver.try_recv() {
                    Ok(value) => {
                        self.result = Some(value);
                        self.receiver = None;
                    }
                    Err(oneshot::error::TryRecvError::Empty) => {}
                    Err(oneshot::error::TryRecvError::Closed) => {
                        self.receiver = None;
                        self.lost = true;
                    }
                }
            }
        }

        match &self.result {
            Some(value) => TaskState::Finished(value),
            None if self.lost => TaskState::Lost,
            None => TaskState::Running,
        }
    }

    /// Whether the task has ended, with or without a result.
    pub fn is_finished(&mut self) -> bool {
        !matches!(self.poll(), TaskState::Running)
    }

    /// Wait for the result.
    ///
    /// Returns `None` if the task was dropped without producing one.
    pub async fn wait(&mut self) -> Option<&T> {
        if self.result.is_none() {
            if let Some(receiver) = self.receiver.take() {
                self.result = receiver.await.ok();
                self.lost = self.result.is_none();
            }
        }
        self.result.as_ref()
    }
}
