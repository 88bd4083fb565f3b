use tokio::task::{JoinError, JoinHandle};

/// A spawned task that is tied to the scope of its owner.
///
/// The task is aborted when the [`ScopedTask`] is dropped, so a caller that is cancelled while
/// waiting on it does not leave the task running in the background. Its single result is
/// retrieved with [`ScopedTask::join`].
#[derive(Debug)]
pub struct ScopedTask<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> ScopedTask<T> {
    /// Spawns the future on the current tokio runtime.
    pub fn spawn<F>(task: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self { handle: tokio::spawn(task) }
    }
}

impl<T> ScopedTask<T> {
    /// Waits for the task to complete and returns its result.
    ///
    /// Returns a [`JoinError`] if the task panicked or was aborted.
    pub async fn join(mut self) -> Result<T, JoinError> {
        (&mut self.handle).await
    }
}

impl<T> Drop for ScopedTask<T> {
    fn drop(&mut self) {
        // No-op if the task already completed.
        self.handle.abort();
    }
}

/// Returns a human readable message from a [`JoinError`].
///
/// Panic payloads of type `&str` and `String` are returned as is.
pub fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_owned()
    }

    if err.is_panic() {
        let panic_value = err.into_panic();

        if let Some(s) = panic_value.downcast_ref::<&str>() {
            return (*s).to_owned()
        } else if let Some(s) = panic_value.downcast_ref::<String>() {
            return s.clone()
        }
        return "task panicked with unknown type".to_owned()
    }

    err.to_string()
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    use super::*;

    // Helper to spawn a task that panics with the given value and return its JoinError
    async fn panic_with_value<T: Send + 'static>(value: T) -> JoinError {
        ScopedTask::spawn(async move { std::panic::panic_any(value) })
            .join()
            .await
            .expect_err("task should panic")
    }

    #[tokio::test]
    async fn join_returns_task_output() {
        let task = ScopedTask::spawn(async { 42 });
        assert_eq!(task.join().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn dropping_aborts_task() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let task = ScopedTask::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });
        drop(task);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn message_from_str_panic() {
        let err = panic_with_value("boom").await;
        assert_eq!(join_error_message(err), "boom");
    }

    #[tokio::test]
    async fn message_from_string_panic() {
        let err = panic_with_value("boom".to_owned()).await;
        assert_eq!(join_error_message(err), "boom");
    }

    #[tokio::test]
    async fn message_from_unknown_panic() {
        let err = panic_with_value(42u32).await;
        assert_eq!(join_error_message(err), "task panicked with unknown type");
    }
}
