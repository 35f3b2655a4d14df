use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Coalesces bursts of input: only the latest value is emitted, once `delay`
/// has passed without another push. Pending input is dropped on cancellation.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    input: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn spawn<F>(delay: Duration, cancel: CancellationToken, mut emit: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (input, mut rx) = mpsc::unbounded_channel::<T>();
        tokio::spawn(async move {
            loop {
                let mut pending = tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = rx.recv() => match next {
                        Some(value) => value,
                        None => return,
                    },
                };
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = rx.recv() => match next {
                            Some(value) => pending = value,
                            None => return,
                        },
                        _ = tokio::time::sleep(delay) => break,
                    }
                }
                emit(pending);
            }
        });
        Self { input }
    }

    pub fn push(&self, value: T) {
        // The task only stops after cancellation, when input no longer matters.
        let _ = self.input.send(value);
    }
}
