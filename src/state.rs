use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Current-value state with change notification.
///
/// Writes that leave the value unchanged are not broadcast, so subscribers
/// never see the same state twice in a row.
#[derive(Debug)]
pub struct Observable<T> {
    sender: Arc<watch::Sender<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.sender.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Yields the current value first, then every change.
    pub fn stream(&self) -> WatchStream<T> {
        WatchStream::new(self.subscribe())
    }

    /// Returns whether subscribers were notified.
    pub fn set(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Applies `f` to a copy and publishes it only if it differs.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        self.sender.send_if_modified(|current| {
            let mut next = current.clone();
            f(&mut next);
            if next == *current {
                false
            } else {
                *current = next;
                true
            }
        })
    }
}
